//! Handler for `chroma_get_server_version`.

use crate::mcp::format::json_result;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde_json::json;

/// Package name reported to clients.
pub const PACKAGE_NAME: &str = "chroma-mcp-server";

/// Arguments are not inspected; any payload yields the same report.
pub(crate) async fn handle_get_server_version() -> Result<CallToolResult, McpError> {
    Ok(json_result(
        json!({
            "package": PACKAGE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }),
        "chroma_get_server_version",
    ))
}
