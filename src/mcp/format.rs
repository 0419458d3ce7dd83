//! Formatting helpers shared across MCP handlers.

use crate::chroma::{GetResult, Metadata};
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::{Map, Value, json};

/// Serialize a value to pretty JSON, falling back to compact formatting on error.
pub(crate) fn serialize_json<T: Serialize>(value: &T, context: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|error| {
        tracing::warn!(tool = context, %error, "Failed to serialize JSON prettily");
        serde_json::to_string(value).unwrap_or_else(|_| "{}".into())
    })
}

/// Successful tool result carrying pretty JSON text and, for objects, structured content.
pub(crate) fn json_result(value: Value, context: &str) -> CallToolResult {
    let text = serialize_json(&value, context);
    let mut result = CallToolResult::success(vec![Content::text(text)]);
    if value.is_object() {
        result.structured_content = Some(value);
    }
    result
}

/// Successful tool result carrying a plain confirmation message.
pub(crate) fn text_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(message.into())])
}

/// Render a peek sample; embeddings are omitted when `with_embeddings` is false.
pub(crate) fn sample_payload(sample: GetResult, with_embeddings: bool) -> Value {
    let mut payload = Map::new();
    payload.insert("ids".into(), json!(sample.ids));
    if with_embeddings {
        payload.insert("embeddings".into(), json!(sample.embeddings));
    }
    payload.insert("documents".into(), json!(sample.documents));
    payload.insert("metadatas".into(), json!(sample.metadatas));
    payload.insert("included".into(), json!(sample.include));
    Value::Object(payload)
}

/// Split `custom:` keys out of thought metadata into a nested `custom_data` object.
pub(crate) fn split_custom_metadata(metadata: Option<Metadata>) -> Metadata {
    let mut base = Metadata::new();
    let mut custom = Metadata::new();
    for (key, value) in metadata.unwrap_or_default() {
        match key.strip_prefix("custom:") {
            Some(custom_key) => {
                custom.insert(custom_key.to_string(), value);
            }
            None => {
                base.insert(key, value);
            }
        }
    }
    if !custom.is_empty() {
        base.insert("custom_data".into(), Value::Object(custom));
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_result_keeps_objects_structured() {
        let result = json_result(json!({ "ok": true }), "test");
        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.structured_content, Some(json!({ "ok": true })));

        let list = json_result(json!(["a"]), "test");
        assert!(list.structured_content.is_none());
    }

    #[test]
    fn sample_payload_can_drop_embeddings() {
        let sample = GetResult {
            ids: vec!["a".into()],
            documents: Some(vec![Some("doc".into())]),
            metadatas: Some(vec![None]),
            embeddings: Some(vec![vec![0.5, 0.5]]),
            include: vec!["documents".into(), "metadatas".into(), "embeddings".into()],
        };

        let full = sample_payload(sample.clone(), true);
        assert_eq!(full["embeddings"], json!([[0.5, 0.5]]));

        let trimmed = sample_payload(sample, false);
        assert!(trimmed.get("embeddings").is_none());
        assert_eq!(trimmed["documents"], json!(["doc"]));
        assert_eq!(trimmed["metadatas"], json!([null]));
    }

    #[test]
    fn custom_metadata_is_nested() {
        let raw = json!({ "session_id": "s", "custom:mood": "curious", "custom:score": 3 });
        let split = split_custom_metadata(raw.as_object().cloned());
        assert_eq!(
            Value::Object(split),
            json!({ "session_id": "s", "custom_data": { "mood": "curious", "score": 3 } })
        );
    }
}
