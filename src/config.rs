use crate::chroma::CollectionSettings;
use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8000;
const CLOUD_HOST: &str = "api.trychroma.com";
const CLOUD_PORT: u16 = 443;

/// Errors encountered while turning command-line arguments into a runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required setting was not provided on the command line or in the environment.
    #[error("Missing configuration value: {0}")]
    MissingVariable(String),
    /// Setting contained a value that could not be interpreted.
    #[error("Invalid value for {name}: {value}")]
    InvalidValue {
        /// Setting name as exposed on the command line.
        name: String,
        /// Offending value.
        value: String,
    },
    /// Client type names an in-process ChromaDB which cannot be reached over HTTP.
    #[error("Unsupported client type '{0}': only 'http' and 'cloud' are available")]
    UnsupportedClientType(String),
}

/// Command-line interface; every flag falls back to an environment variable.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "chroma-mcp-server",
    version,
    about = "ChromaDB tools over the Model Context Protocol"
)]
pub struct Cli {
    /// Kind of ChromaDB deployment to connect to (`http` or `cloud`).
    #[arg(long, env = "CHROMA_CLIENT_TYPE", default_value = "http")]
    pub client_type: String,
    /// Host of the ChromaDB server.
    #[arg(long, env = "CHROMA_HOST")]
    pub host: Option<String>,
    /// Port of the ChromaDB server.
    #[arg(long, env = "CHROMA_PORT")]
    pub port: Option<u16>,
    /// Use TLS when talking to ChromaDB.
    #[arg(
        long,
        env = "CHROMA_SSL",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = parse_flag
    )]
    pub ssl: bool,
    /// Tenant owning the databases.
    #[arg(long, env = "CHROMA_TENANT", default_value = "default_tenant")]
    pub tenant: String,
    /// Database holding the collections.
    #[arg(long, env = "CHROMA_DATABASE", default_value = "default_database")]
    pub database: String,
    /// Token sent as `x-chroma-token`.
    #[arg(long, env = "CHROMA_API_KEY")]
    pub api_key: Option<String>,
    /// Directory receiving `chroma_mcp_server.log`.
    #[arg(long, env = "CHROMA_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
    /// Path of an optional `.env` file loaded before the remaining settings are resolved.
    #[arg(long, env = "CHROMA_DOTENV_PATH", default_value = ".env")]
    pub dotenv_path: PathBuf,
    /// Embedding function used for documents and queries (`default`, `ollama`, `openai`).
    #[arg(
        long = "embedding-function",
        env = "CHROMA_EMBEDDING_FUNCTION",
        default_value = "default"
    )]
    pub embedding_function: String,
    /// Model identifier passed to the embedding provider.
    #[arg(long, env = "CHROMA_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,
    /// Vector size produced by the local `default` embedding function.
    #[arg(long, env = "CHROMA_EMBEDDING_DIMENSION", default_value_t = 384)]
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime.
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,
    /// API key for the OpenAI embeddings endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,
    /// Distance function applied to new collections.
    #[arg(long, env = "CHROMA_HNSW_SPACE", default_value = "cosine")]
    pub hnsw_space: String,
    /// HNSW construction-time candidate list size.
    #[arg(long, env = "CHROMA_HNSW_CONSTRUCTION_EF", default_value_t = 100)]
    pub hnsw_construction_ef: u32,
    /// HNSW search-time candidate list size.
    #[arg(long, env = "CHROMA_HNSW_SEARCH_EF", default_value_t = 100)]
    pub hnsw_search_ef: u32,
    /// HNSW graph degree.
    #[arg(long = "hnsw-m", env = "CHROMA_HNSW_M", default_value_t = 16)]
    pub hnsw_m: u32,
}

/// ChromaDB deployments reachable over HTTP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientType {
    /// Self-hosted ChromaDB server.
    Http,
    /// Hosted Chroma Cloud.
    Cloud,
}

/// Embedding backends used to vectorize documents and query texts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingFunction {
    /// Deterministic local hash embedder.
    Default,
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
}

impl std::str::FromStr for EmbeddingFunction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

impl EmbeddingFunction {
    /// Label used in logs and tool output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Ollama => "ollama",
            Self::OpenAI => "openai",
        }
    }
}

/// Runtime configuration for the Chroma MCP server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Kind of deployment the client talks to.
    pub client_type: ClientType,
    /// ChromaDB host name.
    pub host: String,
    /// ChromaDB port.
    pub port: u16,
    /// Whether requests use `https`.
    pub ssl: bool,
    /// Tenant owning the database.
    pub tenant: String,
    /// Database containing the collections.
    pub database: String,
    /// Optional token forwarded to ChromaDB.
    pub api_key: Option<String>,
    /// Optional directory for the log file.
    pub log_dir: Option<PathBuf>,
    /// Embedding backend.
    pub embedding_function: EmbeddingFunction,
    /// Optional model override for the embedding backend.
    pub embedding_model: Option<String>,
    /// Dimension of the local hash embedder.
    pub embedding_dimension: usize,
    /// Optional Ollama base URL.
    pub ollama_url: Option<String>,
    /// Optional OpenAI API key.
    pub openai_api_key: Option<String>,
    /// HNSW settings applied to newly created collections.
    pub collection_settings: CollectionSettings,
}

impl Config {
    /// Validate parsed arguments and apply per-client-type defaults.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let client_type = match cli.client_type.trim().to_lowercase().as_str() {
            "http" => ClientType::Http,
            "cloud" => ClientType::Cloud,
            "ephemeral" | "persistent" => {
                return Err(ConfigError::UnsupportedClientType(cli.client_type));
            }
            _ => {
                return Err(ConfigError::InvalidValue {
                    name: "client-type".into(),
                    value: cli.client_type,
                });
            }
        };

        let embedding_function = cli.embedding_function.parse().map_err(|()| {
            ConfigError::InvalidValue {
                name: "embedding-function".into(),
                value: cli.embedding_function.clone(),
            }
        })?;

        if cli.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue {
                name: "embedding-dimension".into(),
                value: "0".into(),
            });
        }

        let api_key = non_empty(cli.api_key);
        let host = non_empty(cli.host);
        let (host, port, ssl) = match client_type {
            ClientType::Http => (
                host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                cli.port.unwrap_or(DEFAULT_PORT),
                cli.ssl,
            ),
            ClientType::Cloud => {
                if api_key.is_none() {
                    return Err(ConfigError::MissingVariable("CHROMA_API_KEY".into()));
                }
                (
                    host.unwrap_or_else(|| CLOUD_HOST.to_string()),
                    cli.port.unwrap_or(CLOUD_PORT),
                    true,
                )
            }
        };

        if embedding_function == EmbeddingFunction::OpenAI
            && non_empty(cli.openai_api_key.clone()).is_none()
        {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }

        Ok(Self {
            client_type,
            host,
            port,
            ssl,
            tenant: cli.tenant,
            database: cli.database,
            api_key,
            log_dir: cli.log_dir,
            embedding_function,
            embedding_model: non_empty(cli.embedding_model),
            embedding_dimension: cli.embedding_dimension,
            ollama_url: non_empty(cli.ollama_url),
            openai_api_key: non_empty(cli.openai_api_key),
            collection_settings: CollectionSettings {
                space: cli.hnsw_space,
                construction_ef: cli.hnsw_construction_ef,
                search_ef: cli.hnsw_search_ef,
                m: cli.hnsw_m,
            },
        })
    }

    /// Base URL of the ChromaDB HTTP API.
    pub fn chroma_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Parse the process arguments, exiting with clap's usage message on failure.
pub fn parse_cli() -> Cli {
    parse_cli_from(std::env::args_os()).unwrap_or_else(|err| err.exit())
}

/// Parse `args`, loading the configured `.env` file first when it exists.
///
/// Arguments are parsed twice so values from the `.env` file are visible to the
/// environment fallbacks of every flag.
pub fn parse_cli_from<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    let cli = Cli::try_parse_from(args.clone())?;
    if load_dotenv(&cli.dotenv_path) {
        Cli::try_parse_from(args)
    } else {
        Ok(cli)
    }
}

fn load_dotenv(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match dotenvy::from_path(path) {
        Ok(()) => true,
        Err(err) => {
            eprintln!("Failed to load {}: {err}", path.display());
            false
        }
    }
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("expected true/false, got '{other}'")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Install the configuration in the global cache; later calls keep the first value.
pub fn init_config(config: Config) -> &'static Config {
    let config = CONFIG.get_or_init(|| config);
    tracing::debug!(
        client_type = ?config.client_type,
        url = %config.chroma_url(),
        tenant = %config.tenant,
        database = %config.database,
        embedding_function = config.embedding_function.as_str(),
        "Loaded configuration"
    );
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["chroma-mcp-server"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    #[test]
    fn command_line_overrides_are_applied() {
        let cli = parse(&[
            "--host",
            "chroma.internal",
            "--port",
            "9000",
            "--ssl",
            "yes",
            "--tenant",
            "my-tenant",
            "--database",
            "my-db",
            "--api-key",
            "ABCDEF",
            "--embedding-function",
            "ollama",
            "--hnsw-space",
            "l2",
        ]);
        let config = Config::from_cli(cli).expect("config");
        assert_eq!(config.client_type, ClientType::Http);
        assert_eq!(config.chroma_url(), "https://chroma.internal:9000");
        assert_eq!(config.tenant, "my-tenant");
        assert_eq!(config.database, "my-db");
        assert_eq!(config.api_key.as_deref(), Some("ABCDEF"));
        assert_eq!(config.embedding_function, EmbeddingFunction::Ollama);
        assert_eq!(config.collection_settings.space, "l2");
    }

    #[test]
    fn ssl_flag_rejects_garbage() {
        let result = Cli::try_parse_from(["chroma-mcp-server", "--ssl", "maybe"]);
        assert!(result.is_err());
    }

    #[test]
    fn in_process_client_types_are_rejected() {
        let cli = parse(&["--client-type", "persistent"]);
        let err = Config::from_cli(cli).expect_err("persistent is unsupported");
        assert!(matches!(err, ConfigError::UnsupportedClientType(kind) if kind == "persistent"));
    }

    #[test]
    fn cloud_requires_api_key_and_forces_tls() {
        let missing = parse(&["--client-type", "cloud", "--api-key", ""]);
        assert!(matches!(
            Config::from_cli(missing),
            Err(ConfigError::MissingVariable(name)) if name == "CHROMA_API_KEY"
        ));

        let cli = parse(&["--client-type", "cloud", "--api-key", "token", "--ssl", "false"]);
        let config = Config::from_cli(cli).expect("cloud config");
        assert_eq!(config.chroma_url(), "https://api.trychroma.com:443");
    }

    #[test]
    fn unknown_embedding_function_is_invalid() {
        let cli = parse(&["--embedding-function", "cohere"]);
        let err = Config::from_cli(cli).expect_err("unknown provider");
        assert!(
            matches!(err, ConfigError::InvalidValue { name, .. } if name == "embedding-function")
        );
    }

    #[test]
    fn dotenv_file_supplies_environment_fallbacks() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let path = dir.path().join(".env");
        std::fs::write(&path, "CHROMA_TENANT=from_env\n").expect("write .env");
        unsafe { std::env::remove_var("CHROMA_TENANT") };

        let cli = parse_cli_from([
            "chroma-mcp-server",
            "--dotenv-path",
            path.to_str().expect("utf-8 path"),
        ])
        .expect("arguments should parse");
        let config = Config::from_cli(cli).expect("config");
        assert_eq!(config.tenant, "from_env");
    }

    #[test]
    fn missing_dotenv_file_is_ignored() {
        let cli = parse_cli_from([
            "chroma-mcp-server",
            "--dotenv-path",
            "/nonexistent/chroma.env",
            "--database",
            "from_cli",
        ])
        .expect("arguments should parse");
        assert_eq!(cli.database, "from_cli");
    }

    #[test]
    fn global_config_keeps_first_value() {
        let first = Config::from_cli(parse(&["--tenant", "first"])).expect("config");
        let second = Config::from_cli(parse(&["--tenant", "second"])).expect("config");
        let installed = init_config(first).tenant.clone();
        init_config(second);
        assert_eq!(get_config().tenant, installed);
    }
}
