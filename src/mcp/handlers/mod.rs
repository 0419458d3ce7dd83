//! Tool handlers for the MCP server.

use std::sync::Arc;

use crate::{
    chroma::{ChromaApi, ChromaError, Collection, CollectionSettings, ErrorKind, ValidationError},
    embedding::{EmbeddingClient, EmbeddingError},
};
use rmcp::{ErrorData as McpError, model::JsonObject};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod collections;
pub mod documents;
pub mod thinking;
pub mod version;

/// Dependencies shared by every tool handler.
pub struct ToolContext {
    /// ChromaDB client.
    pub chroma: Arc<dyn ChromaApi>,
    /// Embedding backend used for documents and query texts.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// HNSW settings applied to collections created through the tools.
    pub settings: CollectionSettings,
}

/// Parse structured arguments supplied to a tool invocation.
pub(crate) fn parse_arguments<T: DeserializeOwned>(
    arguments: Option<JsonObject>,
) -> Result<T, McpError> {
    let value = arguments
        .map(Value::Object)
        .unwrap_or_else(|| Value::Object(JsonObject::new()));
    serde_json::from_value(value).map_err(|err| {
        tracing::warn!(error = %err, "Tool input validation failed");
        McpError::invalid_params(format!("Input Error: {err}"), None)
    })
}

/// Caller-side failure reported as `INVALID_PARAMS`.
pub(crate) fn invalid(message: impl Into<String>) -> McpError {
    let message = message.into();
    tracing::warn!(%message, "Rejected tool call");
    McpError::invalid_params(message, None)
}

/// Server-side failure reported as `INTERNAL_ERROR`.
pub(crate) fn internal(message: impl Into<String>) -> McpError {
    let message = message.into();
    tracing::error!(%message, "Tool call failed");
    McpError::internal_error(message, None)
}

/// Report a rejected value with the `Validation Error:` prefix.
pub(crate) fn validation_error(detail: impl std::fmt::Display) -> McpError {
    invalid(format!("Validation Error: {detail}"))
}

impl From<ValidationError> for McpError {
    fn from(error: ValidationError) -> Self {
        validation_error(error)
    }
}

/// Map an embedding failure raised during `operation`.
pub(crate) fn embedding_error(operation: &str, error: EmbeddingError) -> McpError {
    internal(format!(
        "Tool Error: Failed to generate embeddings during {operation}. Details: {error}"
    ))
}

/// Map a ChromaDB failure raised while working on `collection` during `operation`.
pub(crate) fn chroma_error(operation: &str, collection: &str, error: ChromaError) -> McpError {
    match error.kind() {
        ErrorKind::NotFound => invalid(format!("Tool Error: Collection '{collection}' not found.")),
        ErrorKind::AlreadyExists | ErrorKind::InvalidArgument => invalid(format!(
            "Tool Error: Invalid parameter during {operation}. Details: {error}"
        )),
        ErrorKind::Other => internal(format!(
            "Tool Error: An unexpected error occurred during {operation}. Details: {error}"
        )),
    }
}

/// Look up a collection, mapping a missing collection to `INVALID_PARAMS`.
pub(crate) async fn require_collection(
    context: &ToolContext,
    operation: &str,
    name: &str,
) -> Result<Collection, McpError> {
    context
        .chroma
        .get_collection(name)
        .await
        .map_err(|error| chroma_error(operation, name, error))
}

/// Drop empty filter objects so they are not forwarded to ChromaDB.
pub(crate) fn non_empty_filter(filter: Option<JsonObject>) -> Option<Value> {
    filter
        .filter(|filter| !filter.is_empty())
        .map(Value::Object)
}

/// Current wall-clock time in whole seconds since the Unix epoch.
pub(crate) fn unix_timestamp() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ToolContext;
    use crate::chroma::{CollectionSettings, mock::MockChroma};
    use crate::embedding::HashEmbeddingClient;
    use rmcp::model::{CallToolResult, ErrorCode, JsonObject};
    use rmcp::ErrorData as McpError;
    use serde_json::Value;
    use std::sync::Arc;

    pub(crate) fn context() -> (ToolContext, Arc<MockChroma>) {
        let chroma = Arc::new(MockChroma::new());
        let context = ToolContext {
            chroma: chroma.clone(),
            embedder: Arc::new(HashEmbeddingClient::new(32)),
            settings: CollectionSettings::default(),
        };
        (context, chroma)
    }

    pub(crate) fn args(value: Value) -> Option<JsonObject> {
        value.as_object().cloned()
    }

    pub(crate) fn payload(result: CallToolResult) -> Value {
        result.structured_content.expect("structured payload")
    }

    pub(crate) fn text(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|content| content.as_text())
            .map(|text| text.text.clone())
            .expect("text content")
    }

    pub(crate) fn assert_invalid(error: &McpError, message: &str) {
        assert_eq!(error.code, ErrorCode::INVALID_PARAMS, "{}", error.message);
        assert_eq!(error.message, message);
    }

    pub(crate) fn assert_internal(error: &McpError, prefix: &str) {
        assert_eq!(error.code, ErrorCode::INTERNAL_ERROR, "{}", error.message);
        assert!(
            error.message.starts_with(prefix),
            "unexpected message: {}",
            error.message
        );
    }
}
