//! MCP server bootstrap and request dispatch.

use std::{borrow::Cow, sync::Arc};

use crate::{
    chroma::ChromaHttpClient,
    config::Config,
    embedding::{EmbeddingError, get_embedding_client},
    mcp::{
        handlers::{
            ToolContext,
            collections::{
                handle_create_collection, handle_create_collection_with_metadata,
                handle_delete_collection, handle_get_collection, handle_list_collections,
                handle_peek_collection, handle_rename_collection,
                handle_set_collection_description, handle_set_collection_settings,
                handle_update_collection_metadata,
            },
            documents::{
                handle_add_documents, handle_delete_documents, handle_get_documents,
                handle_query_documents, handle_update_documents,
            },
            thinking::{
                handle_find_similar_sessions, handle_find_similar_thoughts,
                handle_get_session_summary, handle_sequential_thinking,
            },
            version::{PACKAGE_NAME, handle_get_server_version},
        },
        registry, schemas,
    },
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, JsonObject, ListToolsResult, ServerCapabilities,
        ServerInfo, Tool, ToolAnnotations,
    },
};
use thiserror::Error;

/// Failures while assembling the server from configuration.
#[derive(Debug, Error)]
pub enum ServerInitError {
    /// ChromaDB client could not be constructed.
    #[error(transparent)]
    Chroma(#[from] crate::chroma::ChromaError),
    /// Embedding provider could not be constructed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// How a tool affects ChromaDB state; drives the advertised annotations.
#[derive(Clone, Copy)]
enum Effect {
    ReadOnly,
    Additive,
    Destructive,
}

struct ToolSpec {
    name: &'static str,
    title: &'static str,
    description: &'static str,
    schema: fn() -> JsonObject,
    effect: Effect,
}

const TOOL_SPECS: &[ToolSpec] = &[
    ToolSpec {
        name: "chroma_list_collections",
        title: "List Collections",
        description: "List collection names with optional case-insensitive filtering and pagination.",
        schema: schemas::list_collections_schema,
        effect: Effect::ReadOnly,
    },
    ToolSpec {
        name: "chroma_create_collection",
        title: "Create Collection",
        description: "Create a collection using the server's default HNSW settings.",
        schema: schemas::create_collection_schema,
        effect: Effect::Additive,
    },
    ToolSpec {
        name: "chroma_create_collection_with_metadata",
        title: "Create Collection With Metadata",
        description: "Create a collection with metadata supplied as a JSON object string; a nested 'settings' object sets HNSW parameters.",
        schema: schemas::create_collection_with_metadata_schema,
        effect: Effect::Additive,
    },
    ToolSpec {
        name: "chroma_get_collection",
        title: "Get Collection",
        description: "Show a collection's metadata, record count, and a small sample of entries.",
        schema: schemas::collection_name_schema,
        effect: Effect::ReadOnly,
    },
    ToolSpec {
        name: "chroma_set_collection_description",
        title: "Set Collection Description",
        description: "Store a description in the collection metadata.",
        schema: schemas::set_description_schema,
        effect: Effect::Additive,
    },
    ToolSpec {
        name: "chroma_set_collection_settings",
        title: "Set Collection Settings",
        description: "Replace the HNSW settings recorded in the collection metadata.",
        schema: schemas::set_settings_schema,
        effect: Effect::Destructive,
    },
    ToolSpec {
        name: "chroma_update_collection_metadata",
        title: "Update Collection Metadata",
        description: "Merge custom key/value pairs into the collection metadata.",
        schema: schemas::update_metadata_schema,
        effect: Effect::Additive,
    },
    ToolSpec {
        name: "chroma_rename_collection",
        title: "Rename Collection",
        description: "Rename an existing collection.",
        schema: schemas::rename_collection_schema,
        effect: Effect::Destructive,
    },
    ToolSpec {
        name: "chroma_delete_collection",
        title: "Delete Collection",
        description: "Delete a collection and every record in it.",
        schema: schemas::collection_name_schema,
        effect: Effect::Destructive,
    },
    ToolSpec {
        name: "chroma_peek_collection",
        title: "Peek Collection",
        description: "Return the first entries of a collection, including embeddings.",
        schema: schemas::peek_collection_schema,
        effect: Effect::ReadOnly,
    },
    ToolSpec {
        name: "chroma_add_documents",
        title: "Add Documents",
        description: "Embed and add documents to a collection, creating it if needed; ids are generated when omitted.",
        schema: schemas::add_documents_schema,
        effect: Effect::Additive,
    },
    ToolSpec {
        name: "chroma_query_documents",
        title: "Query Documents",
        description: "Semantic search over a collection with optional metadata and document filters.",
        schema: schemas::query_documents_schema,
        effect: Effect::ReadOnly,
    },
    ToolSpec {
        name: "chroma_get_documents",
        title: "Get Documents",
        description: "Fetch documents by id or filter, with optional pagination.",
        schema: schemas::get_documents_schema,
        effect: Effect::ReadOnly,
    },
    ToolSpec {
        name: "chroma_update_documents",
        title: "Update Documents",
        description: "Replace the text and/or metadata of existing documents; changed text is re-embedded.",
        schema: schemas::update_documents_schema,
        effect: Effect::Destructive,
    },
    ToolSpec {
        name: "chroma_delete_documents",
        title: "Delete Documents",
        description: "Delete documents by id or filter and report which ids were removed.",
        schema: schemas::delete_documents_schema,
        effect: Effect::Destructive,
    },
    ToolSpec {
        name: "chroma_sequential_thinking",
        title: "Record Thought",
        description: "Record one step of a thinking session and return the earlier steps of the session or branch.",
        schema: schemas::sequential_thinking_schema,
        effect: Effect::Additive,
    },
    ToolSpec {
        name: "chroma_find_similar_thoughts",
        title: "Find Similar Thoughts",
        description: "Find recorded thoughts similar to a query, optionally within one session.",
        schema: schemas::find_similar_thoughts_schema,
        effect: Effect::ReadOnly,
    },
    ToolSpec {
        name: "chroma_get_session_summary",
        title: "Session Summary",
        description: "Return every thought of a session ordered by thought number.",
        schema: schemas::session_summary_schema,
        effect: Effect::ReadOnly,
    },
    ToolSpec {
        name: "chroma_find_similar_sessions",
        title: "Find Similar Sessions",
        description: "Rank thinking sessions by their closest thought to a query.",
        schema: schemas::find_similar_sessions_schema,
        effect: Effect::ReadOnly,
    },
    ToolSpec {
        name: "chroma_get_server_version",
        title: "Server Version",
        description: "Report the server package name and version.",
        schema: schemas::empty_object_schema,
        effect: Effect::ReadOnly,
    },
];

/// MCP server exposing ChromaDB collection, document, and thinking tools.
#[derive(Clone)]
pub struct ChromaMcpServer {
    context: Arc<ToolContext>,
    registry: Arc<registry::Registry>,
}

impl ChromaMcpServer {
    /// Create a server dispatching tool calls against the supplied dependencies.
    pub fn new(context: ToolContext) -> Self {
        let mut registry = registry::Registry::new();
        registry.register_tool("chroma_list_collections", tool_list_collections);
        registry.register_tool("chroma_create_collection", tool_create_collection);
        registry.register_tool(
            "chroma_create_collection_with_metadata",
            tool_create_collection_with_metadata,
        );
        registry.register_tool("chroma_get_collection", tool_get_collection);
        registry.register_tool(
            "chroma_set_collection_description",
            tool_set_collection_description,
        );
        registry.register_tool(
            "chroma_set_collection_settings",
            tool_set_collection_settings,
        );
        registry.register_tool(
            "chroma_update_collection_metadata",
            tool_update_collection_metadata,
        );
        registry.register_tool("chroma_rename_collection", tool_rename_collection);
        registry.register_tool("chroma_delete_collection", tool_delete_collection);
        registry.register_tool("chroma_peek_collection", tool_peek_collection);

        registry.register_tool("chroma_add_documents", tool_add_documents);
        registry.register_tool("chroma_query_documents", tool_query_documents);
        registry.register_tool("chroma_get_documents", tool_get_documents);
        registry.register_tool("chroma_update_documents", tool_update_documents);
        registry.register_tool("chroma_delete_documents", tool_delete_documents);

        registry.register_tool("chroma_sequential_thinking", tool_sequential_thinking);
        registry.register_tool("chroma_find_similar_thoughts", tool_find_similar_thoughts);
        registry.register_tool("chroma_get_session_summary", tool_get_session_summary);
        registry.register_tool("chroma_find_similar_sessions", tool_find_similar_sessions);

        registry.register_tool("chroma_get_server_version", tool_get_server_version);
        tracing::debug!(tools = ?registry.tool_names(), "Registered MCP tools");

        Self {
            context: Arc::new(context),
            registry: Arc::new(registry),
        }
    }

    /// Build the HTTP ChromaDB client and embedding provider described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ServerInitError> {
        let chroma = ChromaHttpClient::new(config)?;
        let embedder = get_embedding_client(config)?;
        Ok(Self::new(ToolContext {
            chroma: Arc::new(chroma),
            embedder,
            settings: config.collection_settings.clone(),
        }))
    }

    /// Dependencies shared by the tool handlers.
    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    fn describe_tools(&self) -> Vec<Tool> {
        TOOL_SPECS
            .iter()
            .filter(|spec| self.registry.tools.contains_key(spec.name))
            .map(describe_tool)
            .collect()
    }
}

fn describe_tool(spec: &ToolSpec) -> Tool {
    let annotations = ToolAnnotations::with_title(spec.title);
    let annotations = match spec.effect {
        Effect::ReadOnly => annotations.read_only(true).idempotent(true),
        Effect::Additive => annotations.destructive(false).idempotent(false),
        Effect::Destructive => annotations.destructive(true).idempotent(false),
    };
    Tool {
        name: Cow::Borrowed(spec.name),
        title: Some(spec.title.to_string()),
        description: Some(Cow::Borrowed(spec.description)),
        input_schema: Arc::new((spec.schema)()),
        output_schema: None,
        annotations: Some(annotations.open_world(false)),
        icons: None,
    }
}

/// Define a registry entry that forwards the call arguments to a context-backed handler.
macro_rules! context_tool {
    ($name:ident => $handler:path) => {
        fn $name(server: &ChromaMcpServer, request: CallToolRequestParam) -> registry::ToolFuture {
            let context = server.context.clone();
            Box::pin(async move { $handler(&context, request.arguments).await })
        }
    };
}

context_tool!(tool_list_collections => handle_list_collections);
context_tool!(tool_create_collection => handle_create_collection);
context_tool!(tool_create_collection_with_metadata => handle_create_collection_with_metadata);
context_tool!(tool_get_collection => handle_get_collection);
context_tool!(tool_set_collection_description => handle_set_collection_description);
context_tool!(tool_set_collection_settings => handle_set_collection_settings);
context_tool!(tool_update_collection_metadata => handle_update_collection_metadata);
context_tool!(tool_rename_collection => handle_rename_collection);
context_tool!(tool_delete_collection => handle_delete_collection);
context_tool!(tool_peek_collection => handle_peek_collection);
context_tool!(tool_add_documents => handle_add_documents);
context_tool!(tool_query_documents => handle_query_documents);
context_tool!(tool_get_documents => handle_get_documents);
context_tool!(tool_update_documents => handle_update_documents);
context_tool!(tool_delete_documents => handle_delete_documents);
context_tool!(tool_sequential_thinking => handle_sequential_thinking);
context_tool!(tool_find_similar_thoughts => handle_find_similar_thoughts);
context_tool!(tool_get_session_summary => handle_get_session_summary);
context_tool!(tool_find_similar_sessions => handle_find_similar_sessions);

fn tool_get_server_version(
    _server: &ChromaMcpServer,
    _request: CallToolRequestParam,
) -> registry::ToolFuture {
    Box::pin(handle_get_server_version())
}

impl ServerHandler for ChromaMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = rmcp::model::Implementation::from_build_env();
        implementation.name = PACKAGE_NAME.to_string();
        implementation.title = Some("Chroma MCP Server".to_string());
        implementation.version = env!("CARGO_PKG_VERSION").to_string();

        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: implementation,
            instructions: Some(
                "Manage ChromaDB collections and documents, run semantic queries, and record sequential-thinking sessions. Create or list collections first, add documents, then query with optional metadata filters.".into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.describe_tools();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            if let Some(handler) = self.registry.tools.get(request.name.as_ref()) {
                tracing::debug!(tool = %request.name, "Dispatching tool call");
                return handler(self, request).await;
            }

            tracing::warn!(tool = %request.name, "Unknown tool requested");
            Err(McpError::invalid_params(
                format!("Tool Error: Unknown tool name '{}'", request.name),
                None,
            ))
        }
    }
}
