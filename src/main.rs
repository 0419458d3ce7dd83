//! MCP server entrypoint (stdio transport).
//!
//! Loads configuration from the command line, the environment, and an optional `.env` file,
//! checks that ChromaDB answers, then serves the tool set over stdio.
use anyhow::{Context, Result};
use chroma_mcp_server::{chroma::ChromaApi, config, logging, mcp::ChromaMcpServer};
use rmcp::{service::ServiceExt, transport::stdio};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::parse_cli();
    let config = config::Config::from_cli(cli).context("invalid server configuration")?;
    logging::init_tracing(config.log_dir.as_deref());
    let config = config::init_config(config);

    let server =
        ChromaMcpServer::from_config(config).context("failed to initialize ChromaDB tools")?;

    let chroma = &server.context().chroma;
    match chroma.heartbeat().await {
        Ok(heartbeat) => {
            let version = chroma.version().await.unwrap_or_else(|_| "unknown".to_string());
            tracing::info!(
                url = %config.chroma_url(),
                heartbeat,
                %version,
                "Connected to ChromaDB"
            );
        }
        Err(error) => tracing::warn!(
            url = %config.chroma_url(),
            %error,
            "ChromaDB heartbeat failed; tools will report errors until it is reachable"
        ),
    }

    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server over stdio")?;

    service
        .waiting()
        .await
        .context("MCP server terminated unexpectedly")?;

    Ok(())
}
