//! Handlers for document add/query/get/update/delete tools.

use crate::{
    chroma::{
        AddRecords, DeleteRequest, GetRequest, Include, Metadata, QueryRequest, UpdateRecords,
        metadata::is_flat, validate_collection_name,
    },
    mcp::format::json_result,
};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, JsonObject},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{
    ToolContext, chroma_error, embedding_error, non_empty_filter, parse_arguments,
    require_collection, unix_timestamp, validation_error,
};

const QUERY_INCLUDES: [&str; 4] = ["documents", "embeddings", "metadatas", "distances"];
const GET_INCLUDES: [&str; 3] = ["documents", "embeddings", "metadatas"];

fn default_true() -> bool {
    true
}

fn default_n_results() -> i64 {
    5
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddDocumentsRequest {
    pub(crate) collection_name: String,
    pub(crate) documents: Vec<String>,
    #[serde(default)]
    pub(crate) metadatas: Option<Vec<Metadata>>,
    #[serde(default)]
    pub(crate) ids: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub(crate) increment_index: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryDocumentsRequest {
    pub(crate) collection_name: String,
    pub(crate) query_texts: Vec<String>,
    #[serde(default = "default_n_results")]
    pub(crate) n_results: i64,
    #[serde(default, rename = "where")]
    pub(crate) where_filter: Option<JsonObject>,
    #[serde(default)]
    pub(crate) where_document: Option<JsonObject>,
    #[serde(default)]
    pub(crate) include: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GetDocumentsRequest {
    pub(crate) collection_name: String,
    #[serde(default)]
    pub(crate) ids: Option<Vec<String>>,
    #[serde(default, rename = "where")]
    pub(crate) where_filter: Option<JsonObject>,
    #[serde(default)]
    pub(crate) where_document: Option<JsonObject>,
    #[serde(default)]
    pub(crate) include: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) limit: i64,
    #[serde(default)]
    pub(crate) offset: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateDocumentsRequest {
    pub(crate) collection_name: String,
    pub(crate) ids: Vec<String>,
    #[serde(default)]
    pub(crate) documents: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) metadatas: Option<Vec<Metadata>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteDocumentsRequest {
    pub(crate) collection_name: String,
    #[serde(default)]
    pub(crate) ids: Option<Vec<String>>,
    #[serde(default, rename = "where")]
    pub(crate) where_filter: Option<JsonObject>,
    #[serde(default)]
    pub(crate) where_document: Option<JsonObject>,
}

/// Treat an empty list the same as an absent one.
fn non_empty<T>(items: Option<Vec<T>>) -> Option<Vec<T>> {
    items.filter(|items| !items.is_empty())
}

fn check_flat_metadatas(metadatas: &[Metadata]) -> Result<(), McpError> {
    if metadatas.iter().all(is_flat) {
        Ok(())
    } else {
        Err(validation_error(
            "Metadata values must be strings, numbers, or booleans",
        ))
    }
}

/// Resolve requested include names, falling back to `default` when none were given.
fn resolve_include(
    requested: Option<Vec<String>>,
    valid: &[&str],
    default: &[Include],
) -> Result<Vec<Include>, McpError> {
    let Some(requested) = non_empty(requested) else {
        return Ok(default.to_vec());
    };
    requested
        .iter()
        .map(|item| {
            valid
                .contains(&item.as_str())
                .then(|| Include::parse(item))
                .flatten()
                .ok_or_else(|| {
                    validation_error(format!(
                        "Invalid item in include list. Valid items are: {valid:?}"
                    ))
                })
        })
        .collect()
}

/// Handle `chroma_add_documents`.
pub(crate) async fn handle_add_documents(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: AddDocumentsRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    let metadatas = non_empty(args.metadatas);
    let ids = non_empty(args.ids);

    if args.documents.is_empty() {
        return Err(validation_error("No documents provided"));
    }
    if metadatas
        .as_ref()
        .is_some_and(|metadatas| metadatas.len() != args.documents.len())
    {
        return Err(validation_error(
            "Number of metadatas must match number of documents",
        ));
    }
    if ids
        .as_ref()
        .is_some_and(|ids| ids.len() != args.documents.len())
    {
        return Err(validation_error("Number of IDs must match number of documents"));
    }
    if let Some(metadatas) = &metadatas {
        check_flat_metadatas(metadatas)?;
    }
    validate_collection_name(&name)?;

    let collection = context
        .chroma
        .create_collection(&name, Some(context.settings.to_metadata()), true)
        .await
        .map_err(|error| chroma_error("add_documents", &name, error))?;

    let ids_generated = ids.is_none();
    let ids = match ids {
        Some(ids) => ids,
        None => {
            let start = if args.increment_index {
                context
                    .chroma
                    .count(&collection.id)
                    .await
                    .map_err(|error| chroma_error("add_documents", &name, error))?
            } else {
                0
            };
            let timestamp = unix_timestamp();
            (0..args.documents.len())
                .map(|offset| format!("doc_{timestamp}_{}", start + offset))
                .collect()
        }
    };

    let embeddings = context
        .embedder
        .embed(args.documents.clone())
        .await
        .map_err(|error| embedding_error("add_documents", error))?;

    let added_count = args.documents.len();
    context
        .chroma
        .add(
            &collection.id,
            AddRecords {
                ids: ids.clone(),
                embeddings,
                documents: Some(args.documents),
                metadatas: metadatas.map(|metadatas| metadatas.into_iter().map(Some).collect()),
            },
        )
        .await
        .map_err(|error| chroma_error("add_documents", &name, error))?;

    tracing::info!(collection = %name, added_count, "Added documents");
    Ok(json_result(
        json!({
            "success": true,
            "added_count": added_count,
            "collection_name": name,
            "document_ids": ids,
            "ids_generated": ids_generated,
        }),
        "chroma_add_documents",
    ))
}

/// Handle `chroma_query_documents`.
pub(crate) async fn handle_query_documents(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: QueryDocumentsRequest = parse_arguments(arguments)?;
    let name = args.collection_name;

    if args.query_texts.is_empty() {
        return Err(validation_error("No query texts provided"));
    }
    if args.n_results <= 0 {
        return Err(validation_error("n_results must be a positive integer"));
    }
    let include = resolve_include(
        args.include,
        &QUERY_INCLUDES,
        &[Include::Documents, Include::Metadatas, Include::Distances],
    )?;
    validate_collection_name(&name)?;

    let collection = require_collection(context, "query_documents", &name).await?;
    let query_embeddings = context
        .embedder
        .embed(args.query_texts.clone())
        .await
        .map_err(|error| embedding_error("query_documents", error))?;

    let results = context
        .chroma
        .query(
            &collection.id,
            QueryRequest {
                query_embeddings,
                n_results: usize::try_from(args.n_results).unwrap_or(usize::MAX),
                where_filter: non_empty_filter(args.where_filter),
                where_document: non_empty_filter(args.where_document),
                include: include.clone(),
            },
        )
        .await
        .map_err(|error| chroma_error("query_documents", &name, error))?;

    let formatted: Vec<Value> = args
        .query_texts
        .iter()
        .enumerate()
        .map(|(i, query)| {
            let ids = results.ids.get(i).cloned().unwrap_or_default();
            let matches: Vec<Value> = ids
                .into_iter()
                .enumerate()
                .map(|(j, id)| {
                    let mut entry = Map::new();
                    entry.insert("id".into(), Value::String(id));
                    if include.contains(&Include::Distances)
                        && let Some(distance) = cell(&results.distances, i, j)
                    {
                        entry.insert("distance".into(), json!(distance));
                    }
                    if include.contains(&Include::Documents)
                        && let Some(document) = cell(&results.documents, i, j)
                    {
                        entry.insert("document".into(), json!(document));
                    }
                    if include.contains(&Include::Metadatas)
                        && let Some(metadata) = cell(&results.metadatas, i, j)
                    {
                        entry.insert("metadata".into(), json!(metadata));
                    }
                    if include.contains(&Include::Embeddings)
                        && let Some(embedding) = cell(&results.embeddings, i, j)
                    {
                        entry.insert("embedding".into(), json!(embedding));
                    }
                    Value::Object(entry)
                })
                .collect();
            json!({ "query": query, "matches": matches })
        })
        .collect();

    Ok(json_result(
        json!({
            "results": formatted,
            "total_queries": args.query_texts.len(),
        }),
        "chroma_query_documents",
    ))
}

/// Value at `[query][match]` in a column-oriented query result.
fn cell<T>(column: &Option<Vec<Vec<T>>>, query: usize, index: usize) -> Option<&T> {
    column.as_ref()?.get(query)?.get(index)
}

/// Handle `chroma_get_documents`.
pub(crate) async fn handle_get_documents(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: GetDocumentsRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    let ids = non_empty(args.ids);
    let where_filter = non_empty_filter(args.where_filter);
    let where_document = non_empty_filter(args.where_document);

    if ids.is_none() && where_filter.is_none() && where_document.is_none() {
        return Err(validation_error(
            "At least one of ids, where, or where_document must be provided",
        ));
    }
    if args.limit < 0 {
        return Err(validation_error("limit cannot be negative"));
    }
    if args.offset < 0 {
        return Err(validation_error("offset cannot be negative"));
    }
    let include = resolve_include(
        args.include,
        &GET_INCLUDES,
        &[Include::Documents, Include::Metadatas],
    )?;
    validate_collection_name(&name)?;

    let collection = require_collection(context, "get_documents", &name).await?;
    let results = context
        .chroma
        .get(
            &collection.id,
            GetRequest {
                ids,
                where_filter,
                where_document,
                include: include.clone(),
                limit: usize::try_from(args.limit).ok().filter(|limit| *limit > 0),
                offset: usize::try_from(args.offset).ok().filter(|offset| *offset > 0),
            },
        )
        .await
        .map_err(|error| chroma_error("get_documents", &name, error))?;

    let documents: Vec<Value> = results
        .ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let mut entry = Map::new();
            entry.insert("id".into(), Value::String(id.clone()));
            if include.contains(&Include::Documents)
                && let Some(content) = results.documents.as_ref().and_then(|docs| docs.get(i))
            {
                entry.insert(
                    "content".into(),
                    Value::String(content.clone().unwrap_or_default()),
                );
            }
            if include.contains(&Include::Metadatas)
                && let Some(metadata) = results.metadatas.as_ref().and_then(|metas| metas.get(i))
            {
                entry.insert("metadata".into(), json!(metadata));
            }
            if include.contains(&Include::Embeddings)
                && let Some(embedding) = results.embeddings.as_ref().and_then(|embs| embs.get(i))
            {
                entry.insert("embedding".into(), json!(embedding));
            }
            Value::Object(entry)
        })
        .collect();

    Ok(json_result(
        json!({
            "total_found": documents.len(),
            "documents": documents,
            "limit": args.limit,
            "offset": args.offset,
        }),
        "chroma_get_documents",
    ))
}

/// Handle `chroma_update_documents`; changed documents are re-embedded.
pub(crate) async fn handle_update_documents(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: UpdateDocumentsRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    let documents = non_empty(args.documents);
    let metadatas = non_empty(args.metadatas);

    if args.ids.is_empty() {
        return Err(validation_error("List of document IDs is required for update"));
    }
    if documents.is_none() && metadatas.is_none() {
        return Err(validation_error(
            "Either documents or metadatas must be provided for update",
        ));
    }
    if documents
        .as_ref()
        .is_some_and(|documents| documents.len() != args.ids.len())
    {
        return Err(validation_error("Number of documents must match number of IDs"));
    }
    if metadatas
        .as_ref()
        .is_some_and(|metadatas| metadatas.len() != args.ids.len())
    {
        return Err(validation_error("Number of metadatas must match number of IDs"));
    }
    if let Some(metadatas) = &metadatas {
        check_flat_metadatas(metadatas)?;
    }
    validate_collection_name(&name)?;

    let collection = require_collection(context, "update_documents", &name).await?;
    let embeddings = match &documents {
        Some(documents) => Some(
            context
                .embedder
                .embed(documents.clone())
                .await
                .map_err(|error| embedding_error("update_documents", error))?,
        ),
        None => None,
    };

    context
        .chroma
        .update(
            &collection.id,
            UpdateRecords {
                ids: args.ids.clone(),
                embeddings,
                documents,
                metadatas: metadatas.map(|metadatas| metadatas.into_iter().map(Some).collect()),
            },
        )
        .await
        .map_err(|error| chroma_error("update_documents", &name, error))?;

    tracing::info!(collection = %name, updated_count = args.ids.len(), "Updated documents");
    Ok(json_result(
        json!({
            "success": true,
            "updated_count": args.ids.len(),
            "collection_name": name,
            "document_ids": args.ids,
        }),
        "chroma_update_documents",
    ))
}

/// Handle `chroma_delete_documents`, reporting the ids that matched the selection.
pub(crate) async fn handle_delete_documents(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: DeleteDocumentsRequest = parse_arguments(arguments)?;
    let name = args.collection_name;
    let ids = non_empty(args.ids);
    let where_filter = non_empty_filter(args.where_filter);
    let where_document = non_empty_filter(args.where_document);

    if ids.is_none() && where_filter.is_none() && where_document.is_none() {
        return Err(validation_error(
            "Either ids, where, or where_document must be provided for deletion",
        ));
    }
    validate_collection_name(&name)?;

    let collection = require_collection(context, "delete_documents", &name).await?;
    let matched = context
        .chroma
        .get(
            &collection.id,
            GetRequest {
                ids,
                where_filter,
                where_document,
                include: Vec::new(),
                ..Default::default()
            },
        )
        .await
        .map_err(|error| chroma_error("delete_documents", &name, error))?;
    let deleted_ids = matched.ids;

    if !deleted_ids.is_empty() {
        context
            .chroma
            .delete(
                &collection.id,
                DeleteRequest {
                    ids: Some(deleted_ids.clone()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|error| chroma_error("delete_documents", &name, error))?;
    }

    tracing::info!(collection = %name, deleted_count = deleted_ids.len(), "Deleted documents");
    Ok(json_result(
        json!({
            "success": true,
            "deleted_count": deleted_ids.len(),
            "collection_name": name,
            "deleted_ids": deleted_ids,
        }),
        "chroma_delete_documents",
    ))
}
