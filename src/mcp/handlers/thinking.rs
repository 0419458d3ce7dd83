//! Sequential-thinking tools backed by the `thoughts` collection.
//!
//! Each thought is stored as a document whose metadata records the session, its position in
//! the chain, and optional branch information. Custom caller data is stored under
//! `custom:<key>` entries and surfaced again as a nested `custom_data` object.

use std::collections::HashMap;

use crate::{
    chroma::{
        AddRecords, ChromaError, ErrorKind, GetRequest, Include, Metadata, QueryRequest,
        metadata::is_flat,
    },
    mcp::format::{json_result, split_custom_metadata},
};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, JsonObject},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    ToolContext, chroma_error, embedding_error, parse_arguments, unix_timestamp,
    validation_error,
};

/// Collection holding every recorded thought.
pub const THOUGHTS_COLLECTION: &str = "thoughts";
const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_thought_results() -> usize {
    5
}

fn default_session_results() -> usize {
    3
}

#[derive(Debug, Deserialize)]
pub(crate) struct SequentialThinkingRequest {
    pub(crate) thought: String,
    pub(crate) thought_number: i64,
    pub(crate) total_thoughts: i64,
    #[serde(default)]
    pub(crate) session_id: String,
    #[serde(default)]
    pub(crate) branch_from_thought: i64,
    #[serde(default)]
    pub(crate) branch_id: String,
    #[serde(default)]
    pub(crate) next_thought_needed: bool,
    #[serde(default)]
    pub(crate) custom_data: Option<JsonObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FindSimilarThoughtsRequest {
    pub(crate) query: String,
    #[serde(default = "default_thought_results")]
    pub(crate) n_results: usize,
    #[serde(default = "default_threshold")]
    pub(crate) threshold: f64,
    #[serde(default)]
    pub(crate) session_id: String,
    #[serde(default = "default_true")]
    pub(crate) include_branches: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionSummaryRequest {
    pub(crate) session_id: String,
    #[serde(default = "default_true")]
    pub(crate) include_branches: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FindSimilarSessionsRequest {
    pub(crate) query: String,
    #[serde(default = "default_session_results")]
    pub(crate) n_results: usize,
    #[serde(default = "default_threshold")]
    pub(crate) threshold: f64,
}

fn is_branch(metadata: Option<&Metadata>) -> bool {
    metadata
        .and_then(|metadata| metadata.get("branch_id"))
        .and_then(Value::as_str)
        .is_some_and(|branch| !branch.is_empty())
}

fn thought_number(metadata: &Metadata) -> i64 {
    metadata
        .get("thought_number")
        .and_then(Value::as_i64)
        .unwrap_or(i64::MAX)
}

/// Pair documents with their metadata, ordered by `thought_number`.
fn ordered_thoughts(
    documents: Option<Vec<Option<String>>>,
    metadatas: Option<Vec<Option<Metadata>>>,
    include_branches: bool,
) -> Vec<Value> {
    let documents = documents.unwrap_or_default();
    let metadatas = metadatas.unwrap_or_default();
    let mut thoughts: Vec<(Option<String>, Metadata)> = documents
        .into_iter()
        .zip(metadatas)
        .filter(|(_, metadata)| include_branches || !is_branch(metadata.as_ref()))
        .map(|(document, metadata)| (document, split_custom_metadata(metadata)))
        .collect();
    thoughts.sort_by_key(|(_, metadata)| thought_number(metadata));
    thoughts
        .into_iter()
        .map(|(content, metadata)| json!({ "content": content, "metadata": metadata }))
        .collect()
}

async fn thoughts_collection_id(context: &ToolContext) -> Result<String, ChromaError> {
    context
        .chroma
        .get_collection(THOUGHTS_COLLECTION)
        .await
        .map(|collection| collection.id)
}

/// All thoughts of `session_id`, ordered by position in the chain.
async fn session_thoughts(
    context: &ToolContext,
    collection_id: &str,
    session_id: &str,
    include_branches: bool,
) -> Result<Vec<Value>, ChromaError> {
    let results = context
        .chroma
        .get(
            collection_id,
            GetRequest {
                where_filter: Some(json!({ "session_id": session_id })),
                include: vec![Include::Documents, Include::Metadatas],
                ..Default::default()
            },
        )
        .await?;
    Ok(ordered_thoughts(
        results.documents,
        results.metadatas,
        include_branches,
    ))
}

fn session_summary(session_id: &str, thoughts: Vec<Value>) -> Value {
    json!({
        "session_id": session_id,
        "total_thoughts_in_session": thoughts.len(),
        "session_thoughts": thoughts,
    })
}

/// Handle `chroma_sequential_thinking`: record a thought and return its predecessors.
pub(crate) async fn handle_sequential_thinking(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: SequentialThinkingRequest = parse_arguments(arguments)?;

    if args.thought.is_empty() {
        return Err(validation_error("Thought content is required"));
    }
    if args.thought_number < 1 || args.thought_number > args.total_thoughts {
        return Err(validation_error(format!(
            "Invalid thought number: {}",
            args.thought_number
        )));
    }
    if args.branch_from_thought > 0 && args.branch_from_thought >= args.thought_number {
        return Err(validation_error("Branch must come from an earlier thought"));
    }
    let custom_data = args.custom_data.unwrap_or_default();
    if !is_flat(&custom_data) {
        return Err(validation_error(
            "custom_data values must be strings, numbers, or booleans",
        ));
    }

    let session_id = if args.session_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        args.session_id
    };

    let mut metadata = Metadata::new();
    metadata.insert("session_id".into(), json!(session_id));
    metadata.insert("thought_number".into(), json!(args.thought_number));
    metadata.insert("total_thoughts".into(), json!(args.total_thoughts));
    metadata.insert("timestamp".into(), json!(unix_timestamp()));
    if args.branch_from_thought > 0 {
        metadata.insert("branch_from_thought".into(), json!(args.branch_from_thought));
    }
    if !args.branch_id.is_empty() {
        metadata.insert("branch_id".into(), json!(args.branch_id));
    }
    metadata.insert("next_thought_needed".into(), json!(args.next_thought_needed));
    for (key, value) in custom_data {
        metadata.insert(format!("custom:{key}"), value);
    }

    let mut thought_id = format!("thought_{session_id}_{}", args.thought_number);
    if !args.branch_id.is_empty() {
        thought_id.push_str(&format!("_branch_{}", args.branch_id));
    }

    let collection = context
        .chroma
        .create_collection(
            THOUGHTS_COLLECTION,
            Some(context.settings.to_metadata()),
            true,
        )
        .await
        .map_err(|error| chroma_error("sequential_thinking", THOUGHTS_COLLECTION, error))?;

    let embeddings = context
        .embedder
        .embed(vec![args.thought.clone()])
        .await
        .map_err(|error| embedding_error("sequential_thinking", error))?;

    context
        .chroma
        .add(
            &collection.id,
            AddRecords {
                ids: vec![thought_id.clone()],
                embeddings,
                documents: Some(vec![args.thought]),
                metadatas: Some(vec![Some(metadata)]),
            },
        )
        .await
        .map_err(|error| chroma_error("sequential_thinking", THOUGHTS_COLLECTION, error))?;

    let previous_thoughts = if args.thought_number > 1 {
        let mut clauses = vec![
            json!({ "session_id": session_id }),
            json!({ "thought_number": { "$lt": args.thought_number } }),
        ];
        if !args.branch_id.is_empty() {
            clauses.push(json!({ "branch_id": args.branch_id }));
        }
        let results = context
            .chroma
            .get(
                &collection.id,
                GetRequest {
                    where_filter: Some(json!({ "$and": clauses })),
                    include: vec![Include::Documents, Include::Metadatas],
                    ..Default::default()
                },
            )
            .await
            .map_err(|error| chroma_error("sequential_thinking", THOUGHTS_COLLECTION, error))?;
        ordered_thoughts(results.documents, results.metadatas, true)
    } else {
        Vec::new()
    };

    tracing::info!(
        session = %session_id,
        thought = args.thought_number,
        total = args.total_thoughts,
        "Recorded thought"
    );
    Ok(json_result(
        json!({
            "success": true,
            "thought_id": thought_id,
            "session_id": session_id,
            "thought_number": args.thought_number,
            "total_thoughts": args.total_thoughts,
            "previous_thoughts": previous_thoughts,
            "next_thought_needed": args.next_thought_needed,
        }),
        "chroma_sequential_thinking",
    ))
}

/// Handle `chroma_find_similar_thoughts`.
pub(crate) async fn handle_find_similar_thoughts(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: FindSimilarThoughtsRequest = parse_arguments(arguments)?;
    if args.n_results == 0 {
        return Err(validation_error("n_results must be a positive integer"));
    }

    let collection_id = match thoughts_collection_id(context).await {
        Ok(id) => id,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            tracing::warn!("Thoughts collection not found during similar thought search");
            return Ok(json_result(
                json!({
                    "similar_thoughts": [],
                    "total_found": 0,
                    "threshold": args.threshold,
                    "message": format!("Collection '{THOUGHTS_COLLECTION}' not found."),
                }),
                "chroma_find_similar_thoughts",
            ));
        }
        Err(error) => {
            return Err(chroma_error(
                "find_similar_thoughts",
                THOUGHTS_COLLECTION,
                error,
            ));
        }
    };

    let query_embeddings = context
        .embedder
        .embed(vec![args.query])
        .await
        .map_err(|error| embedding_error("find_similar_thoughts", error))?;
    let where_filter =
        (!args.session_id.is_empty()).then(|| json!({ "session_id": args.session_id }));

    let results = context
        .chroma
        .query(
            &collection_id,
            QueryRequest {
                query_embeddings,
                n_results: args.n_results,
                where_filter,
                where_document: None,
                include: vec![Include::Documents, Include::Metadatas, Include::Distances],
            },
        )
        .await
        .map_err(|error| chroma_error("find_similar_thoughts", THOUGHTS_COLLECTION, error))?;

    let documents = first_row(results.documents);
    let metadatas = first_row(results.metadatas);
    let distances = first_row(results.distances);

    let similar: Vec<Value> = documents
        .into_iter()
        .zip(metadatas)
        .zip(distances)
        .filter_map(|((content, metadata), distance)| {
            let similarity = 1.0 - f64::from(distance?);
            if similarity < args.threshold {
                return None;
            }
            if !args.include_branches && is_branch(metadata.as_ref()) {
                return None;
            }
            Some(json!({
                "content": content,
                "metadata": split_custom_metadata(metadata),
                "similarity": similarity,
            }))
        })
        .collect();

    Ok(json_result(
        json!({
            "total_found": similar.len(),
            "similar_thoughts": similar,
            "threshold": args.threshold,
        }),
        "chroma_find_similar_thoughts",
    ))
}

/// Results for the single query this module issues.
fn first_row<T>(column: Option<Vec<Vec<T>>>) -> Vec<T> {
    column
        .and_then(|rows| rows.into_iter().next())
        .unwrap_or_default()
}

/// Handle `chroma_get_session_summary`.
pub(crate) async fn handle_get_session_summary(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: SessionSummaryRequest = parse_arguments(arguments)?;
    let operation = format!("get_session_summary({})", args.session_id);

    let thoughts = match thoughts_collection_id(context).await {
        Ok(collection_id) => {
            session_thoughts(
                context,
                &collection_id,
                &args.session_id,
                args.include_branches,
            )
            .await
        }
        Err(error) => Err(error),
    };

    match thoughts {
        Ok(thoughts) => Ok(json_result(
            session_summary(&args.session_id, thoughts),
            "chroma_get_session_summary",
        )),
        Err(error) if error.kind() == ErrorKind::NotFound => {
            tracing::warn!(
                session = %args.session_id,
                "Thoughts collection not found during session summary"
            );
            let mut summary = session_summary(&args.session_id, Vec::new());
            if let Value::Object(map) = &mut summary {
                map.insert(
                    "message".into(),
                    json!(format!(
                        "Collection '{THOUGHTS_COLLECTION}' not found or session '{}' has no thoughts.",
                        args.session_id
                    )),
                );
            }
            Ok(json_result(summary, "chroma_get_session_summary"))
        }
        Err(error) => Err(chroma_error(&operation, THOUGHTS_COLLECTION, error)),
    }
}

/// Handle `chroma_find_similar_sessions`, ranking sessions by their best-matching thought.
pub(crate) async fn handle_find_similar_sessions(
    context: &ToolContext,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: FindSimilarSessionsRequest = parse_arguments(arguments)?;
    if args.n_results == 0 {
        return Err(validation_error("n_results must be a positive integer"));
    }

    let collection_id = match thoughts_collection_id(context).await {
        Ok(id) => id,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            tracing::warn!("Thoughts collection not found during similar session search");
            return Ok(json_result(
                json!({
                    "similar_sessions": [],
                    "total_found": 0,
                    "threshold": args.threshold,
                    "message": format!("Collection '{THOUGHTS_COLLECTION}' not found."),
                }),
                "chroma_find_similar_sessions",
            ));
        }
        Err(error) => {
            return Err(chroma_error(
                "find_similar_sessions",
                THOUGHTS_COLLECTION,
                error,
            ));
        }
    };

    let query_embeddings = context
        .embedder
        .embed(vec![args.query])
        .await
        .map_err(|error| embedding_error("find_similar_sessions", error))?;
    let results = context
        .chroma
        .query(
            &collection_id,
            QueryRequest {
                query_embeddings,
                n_results: args.n_results.saturating_mul(10),
                where_filter: None,
                where_document: None,
                include: vec![Include::Metadatas, Include::Distances],
            },
        )
        .await
        .map_err(|error| chroma_error("find_similar_sessions", THOUGHTS_COLLECTION, error))?;

    let mut best: HashMap<String, f64> = HashMap::new();
    for (metadata, distance) in first_row(results.metadatas)
        .into_iter()
        .zip(first_row(results.distances))
    {
        let Some(distance) = distance else { continue };
        let similarity = 1.0 - f64::from(distance);
        if similarity < args.threshold {
            continue;
        }
        let Some(session_id) = metadata
            .as_ref()
            .and_then(|metadata| metadata.get("session_id"))
            .and_then(Value::as_str)
            .filter(|session| !session.is_empty())
        else {
            continue;
        };
        let entry = best.entry(session_id.to_string()).or_insert(similarity);
        if similarity > *entry {
            *entry = similarity;
        }
    }

    let mut ranked: Vec<(String, f64)> = best.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(args.n_results);

    let mut sessions = Vec::with_capacity(ranked.len());
    for (session_id, similarity) in ranked {
        let thoughts = session_thoughts(context, &collection_id, &session_id, true)
            .await
            .map_err(|error| chroma_error("find_similar_sessions", THOUGHTS_COLLECTION, error))?;
        let mut summary = session_summary(&session_id, thoughts);
        if let Value::Object(map) = &mut summary {
            map.insert("similarity_score".into(), json!(similarity));
        }
        sessions.push(summary);
    }

    Ok(json_result(
        json!({
            "total_found": sessions.len(),
            "similar_sessions": sessions,
            "threshold": args.threshold,
        }),
        "chroma_find_similar_sessions",
    ))
}
