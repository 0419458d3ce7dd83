//! Handlers for collection discovery and management tools.

use std::num::NonZeroUsize;

use crate::{
    chroma::{
        Collection, ErrorKind, Metadata, flatten_settings,
        metadata::{SETTING_PREFIX, is_flat, is_reserved_key},
        reconstruct_metadata, validate_collection_name,
    },
    mcp::format::{json_result, sample_payload, text_result},
};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, JsonObject},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{ToolContext, internal, invalid, parse_arguments, validation_error};

const DEFAULT_PEEK_LIMIT: usize = 10;
const INFO_SAMPLE_SIZE: usize = 5;

/// Request payload for `chroma_create_collection`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateCollectionRequest {
    pub(crate) collection_name: String,
}

/// Request payload for `chroma_create_collection_with_metadata`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CreateCollectionWithMetadataRequest {
    pub(crate) collection_name: String,
    /// JSON object encoded as a string.
    pub(crate) metadata: String,
}

/// Request payload for `chroma_list_collections`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListCollectionsRequest {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
    #[serde(default)]
    pub(crate) offset: Option<usize>,
    #[serde(default)]
    pub(crate) name_contains: Option<String>,
}

/// Request payload for tools addressing a single collection by name.
#[derive(Debug, Deserialize)]
pub(crate) struct CollectionNameRequest {
    pub(crate) collection_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetDescriptionRequest {
    pub(crate) collection_name: String,
    pub(crate) description: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetSettingsRequest {
    pub(crate) collection_name: String,
    pub(crate) settings: JsonObject,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateMetadataRequest {
    pub(crate) collection_name: String,
    pub(crate) metadata_update: JsonObject,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RenameCollectionRequest {
    pub(crate) collection_name: String,
    pub(crate) new_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PeekCollectionRequest {
    pub(crate) collection_name: String,
    #[serde(default)]
    pub(crate) limit: Option<NonZeroUsize>,
}

/// `{ name, id, metadata, count }` for a collection, with metadata reconstructed.
async fn collection_info(
    context: &ToolContext,
    collection: &Collection,
) -> Result<Value, McpError> {
    let count = context.chroma.count(&collection.id).await.map_err(|error| {
        internal(format!(
            "Tool Error: Could not count records in collection '{}'. Details: {error}",
            collection.name
        ))
    })?;
    Ok(json!({
        "name": collection.name,
        "id": collection.id,
        "metadata": reconstruct_metadata(collection.metadata.as_ref()),
        "count": count,
    }))
}

/// Handle `chroma_create_collection`, applying the configured default settings.
pub(crate) async fn handle_create_collection(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CreateCollectionRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    validate_collection_name(&name)?;

    let metadata = context.settings.to_metadata();
    tracing::debug!(collection = %name, ?metadata, "Creating collection with default settings");

    let collection = context
        .chroma
        .create_collection(&name, Some(metadata), false)
        .await
        .map_err(|error| match error.kind() {
            ErrorKind::AlreadyExists => {
                invalid(format!("Tool Error: Collection '{name}' already exists."))
            }
            ErrorKind::InvalidArgument => invalid(format!(
                "Tool Error: Invalid parameter during collection creation. Details: {error}"
            )),
            _ => internal(format!(
                "Tool Error: An unexpected error occurred while creating collection '{name}'. Details: {error}"
            )),
        })?;

    tracing::info!(collection = %name, id = %collection.id, "Collection created");
    let info = collection_info(context, &collection).await?;
    Ok(json_result(info, "chroma_create_collection"))
}

/// Handle `chroma_create_collection_with_metadata`, taking metadata as a JSON string.
pub(crate) async fn handle_create_collection_with_metadata(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CreateCollectionWithMetadataRequest = parse_arguments(arguments)?;
    let name = args.collection_name;

    let parsed: Value = serde_json::from_str(&args.metadata)
        .map_err(|err| invalid(format!("Invalid JSON format for metadata field: {err}")))?;
    let Value::Object(parsed) = parsed else {
        return Err(invalid("Metadata string must decode to a JSON object (dictionary)."));
    };

    validate_collection_name(&name)?;

    let mut metadata = Metadata::new();
    for (key, value) in parsed {
        match (key.as_str(), value) {
            ("settings", Value::Object(settings)) => metadata.extend(flatten_settings(&settings)),
            (_, value) => {
                metadata.insert(key, value);
            }
        }
    }
    if !is_flat(&metadata) {
        return Err(validation_error("Metadata values must be strings, numbers, or booleans"));
    }

    let collection = context
        .chroma
        .create_collection(&name, Some(metadata), false)
        .await
        .map_err(|error| match error.kind() {
            ErrorKind::AlreadyExists => {
                invalid(format!("Tool Error: Collection '{name}' already exists."))
            }
            ErrorKind::InvalidArgument => invalid(format!(
                "Tool Error: Invalid parameter during collection creation. Details: {error}"
            )),
            _ => internal(format!(
                "Tool Error: An unexpected error occurred while creating collection '{name}'. Details: {error}"
            )),
        })?;

    tracing::info!(collection = %name, id = %collection.id, "Collection created with metadata");
    let mut info = collection_info(context, &collection).await?;
    if let Value::Object(map) = &mut info {
        map.insert("status".into(), Value::String("success".into()));
    }
    Ok(json_result(info, "chroma_create_collection_with_metadata"))
}

/// Handle `chroma_list_collections` with name filtering and pagination.
pub(crate) async fn handle_list_collections(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: ListCollectionsRequest = parse_arguments(arguments)?;

    let collections = context.chroma.list_collections().await.map_err(|error| {
        internal(format!("Tool Error: Error listing collections. Details: {error}"))
    })?;

    let needle = args
        .name_contains
        .as_deref()
        .filter(|needle| !needle.is_empty())
        .map(str::to_lowercase);
    let filtered: Vec<String> = collections
        .into_iter()
        .map(|collection| collection.name)
        .filter(|name| {
            needle
                .as_ref()
                .is_none_or(|needle| name.to_lowercase().contains(needle))
        })
        .collect();
    let total_count = filtered.len();

    let page: Vec<String> = filtered
        .into_iter()
        .skip(args.offset.unwrap_or(0))
        .take(args.limit.filter(|limit| *limit > 0).unwrap_or(usize::MAX))
        .collect();

    Ok(json_result(
        json!({
            "collection_names": page,
            "total_count": total_count,
            "limit": args.limit,
            "offset": args.offset,
        }),
        "chroma_list_collections",
    ))
}

/// Handle `chroma_get_collection`, including a small sample of entries.
pub(crate) async fn handle_get_collection(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionNameRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    validate_collection_name(&name)?;

    let collection = context
        .chroma
        .get_collection(&name)
        .await
        .map_err(|error| lookup_error(&name, "getting collection", error))?;

    let mut info = collection_info(context, &collection).await?;
    let sample = match context.chroma.peek(&collection.id, INFO_SAMPLE_SIZE).await {
        Ok(sample) => sample_payload(sample, false),
        Err(error) => {
            tracing::warn!(collection = %name, %error, "Could not peek into collection");
            json!({ "error": format!("Could not peek: {error}") })
        }
    };
    if let Value::Object(map) = &mut info {
        map.insert("sample_entries".into(), sample);
    }
    Ok(json_result(info, "chroma_get_collection"))
}

/// Handle `chroma_set_collection_description`.
pub(crate) async fn handle_set_collection_description(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: SetDescriptionRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    validate_collection_name(&name)?;

    update_metadata(context, &name, "chroma_set_collection_description", |metadata| {
        metadata.insert("description".into(), Value::String(args.description));
        Ok(())
    })
    .await
}

/// Handle `chroma_set_collection_settings`, replacing every stored setting.
pub(crate) async fn handle_set_collection_settings(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: SetSettingsRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    validate_collection_name(&name)?;
    if !is_flat(&args.settings) {
        return Err(validation_error("Setting values must be strings, numbers, or booleans"));
    }

    update_metadata(context, &name, "chroma_set_collection_settings", |metadata| {
        metadata.retain(|key, _| !key.starts_with(SETTING_PREFIX) && !key.starts_with("hnsw:"));
        metadata.extend(flatten_settings(&args.settings));
        Ok(())
    })
    .await
}

/// Handle `chroma_update_collection_metadata`, merging custom keys into the metadata.
pub(crate) async fn handle_update_collection_metadata(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: UpdateMetadataRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    validate_collection_name(&name)?;

    if let Some(key) = args.metadata_update.keys().find(|key| is_reserved_key(key)) {
        return Err(validation_error(format!(
            "Key '{key}' is reserved; use chroma_set_collection_settings for collection settings"
        )));
    }
    if !is_flat(&args.metadata_update) {
        return Err(validation_error("Metadata values must be strings, numbers, or booleans"));
    }

    update_metadata(context, &name, "chroma_update_collection_metadata", |metadata| {
        metadata.extend(args.metadata_update);
        Ok(())
    })
    .await
}

/// Read the stored metadata, apply `edit`, write it back, and report the updated collection.
async fn update_metadata<F>(
    context: &ToolContext,
    name: &str,
    tool: &str,
    edit: F,
) -> Result<CallToolResult, McpError>
where
    F: FnOnce(&mut Metadata) -> Result<(), McpError>,
{
    let collection = context
        .chroma
        .get_collection(name)
        .await
        .map_err(|error| lookup_error(name, "updating collection", error))?;

    let mut metadata = collection.metadata.clone().unwrap_or_default();
    edit(&mut metadata)?;

    context
        .chroma
        .modify_collection(&collection.id, None, Some(metadata))
        .await
        .map_err(|error| match error.kind() {
            ErrorKind::NotFound => invalid(format!("Tool Error: Collection '{name}' not found.")),
            ErrorKind::InvalidArgument | ErrorKind::AlreadyExists => invalid(format!(
                "Tool Error: Invalid parameter updating collection '{name}'. Details: {error}"
            )),
            ErrorKind::Other => internal(format!(
                "Tool Error: An unexpected error occurred updating collection '{name}'. Details: {error}"
            )),
        })?;
    tracing::info!(collection = name, "Collection metadata updated");

    let updated = context
        .chroma
        .get_collection(name)
        .await
        .map_err(|error| lookup_error(name, "updating collection", error))?;
    let info = collection_info(context, &updated).await?;
    Ok(json_result(info, tool))
}

/// Handle `chroma_rename_collection`.
pub(crate) async fn handle_rename_collection(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: RenameCollectionRequest = parse_arguments(arguments)?;
    let original = args.collection_name;
    let new_name = args.new_name;
    validate_collection_name(&original)?;
    validate_collection_name(&new_name)?;

    let collection = context
        .chroma
        .get_collection(&original)
        .await
        .map_err(|error| rename_error(&original, &new_name, error))?;

    tracing::info!(from = %original, to = %new_name, "Renaming collection");
    context
        .chroma
        .modify_collection(&collection.id, Some(new_name.as_str()), None)
        .await
        .map_err(|error| rename_error(&original, &new_name, error))?;

    Ok(text_result(format!(
        "Collection '{original}' successfully renamed to '{new_name}'."
    )))
}

fn rename_error(original: &str, new_name: &str, error: crate::chroma::ChromaError) -> McpError {
    match error.kind() {
        ErrorKind::NotFound => invalid(format!("Tool Error: Collection '{original}' not found.")),
        ErrorKind::AlreadyExists => invalid(format!(
            "Tool Error: Collection name '{new_name}' already exists."
        )),
        ErrorKind::InvalidArgument => invalid(format!(
            "Tool Error: Invalid parameter during rename. Details: {error}"
        )),
        ErrorKind::Other => internal(format!(
            "Tool Error: An unexpected error occurred renaming collection '{original}'. Details: {error}"
        )),
    }
}

/// Handle `chroma_delete_collection`.
pub(crate) async fn handle_delete_collection(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CollectionNameRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    validate_collection_name(&name)?;

    context
        .chroma
        .delete_collection(&name)
        .await
        .map_err(|error| match error.kind() {
            ErrorKind::NotFound => invalid(format!("Tool Error: Collection '{name}' not found.")),
            ErrorKind::InvalidArgument | ErrorKind::AlreadyExists => invalid(format!(
                "Tool Error: Invalid parameter deleting collection. Details: {error}"
            )),
            ErrorKind::Other => internal(format!(
                "Tool Error: An unexpected error occurred deleting collection '{name}'. Details: {error}"
            )),
        })?;

    tracing::info!(collection = %name, "Collection deleted");
    Ok(text_result(format!("Collection '{name}' deleted successfully.")))
}

/// Handle `chroma_peek_collection`.
pub(crate) async fn handle_peek_collection(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: PeekCollectionRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    validate_collection_name(&name)?;

    let limit = args.limit.map_or(DEFAULT_PEEK_LIMIT, NonZeroUsize::get);

    let collection = context
        .chroma
        .get_collection(&name)
        .await
        .map_err(|error| peek_error(&name, error))?;
    let sample = context
        .chroma
        .peek(&collection.id, limit)
        .await
        .map_err(|error| peek_error(&name, error))?;

    Ok(json_result(sample_payload(sample, true), "chroma_peek_collection"))
}

fn peek_error(name: &str, error: crate::chroma::ChromaError) -> McpError {
    match error.kind() {
        ErrorKind::NotFound => invalid(format!("Tool Error: Collection '{name}' not found.")),
        ErrorKind::InvalidArgument | ErrorKind::AlreadyExists => invalid(format!(
            "Tool Error: Problem accessing collection '{name}'. Details: {error}"
        )),
        ErrorKind::Other => internal(format!(
            "Tool Error: An unexpected error occurred peeking collection '{name}'. Details: {error}"
        )),
    }
}

fn lookup_error(name: &str, action: &str, error: crate::chroma::ChromaError) -> McpError {
    match error.kind() {
        ErrorKind::NotFound => invalid(format!("Tool Error: Collection '{name}' not found.")),
        ErrorKind::InvalidArgument | ErrorKind::AlreadyExists => invalid(format!(
            "Tool Error: Invalid parameter {action}. Details: {error}"
        )),
        ErrorKind::Other => internal(format!(
            "Tool Error: An unexpected error occurred while {action} '{name}'. Details: {error}"
        )),
    }
}
