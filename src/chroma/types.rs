//! Shared types used by the ChromaDB client and the tool handlers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Metadata attached to collections and records.
pub type Metadata = Map<String, Value>;

/// Errors returned while interacting with ChromaDB.
#[derive(Debug, Error)]
pub enum ChromaError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid ChromaDB URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// ChromaDB responded with an unexpected status code.
    #[error("{message}")]
    UnexpectedStatus {
        /// HTTP status returned from ChromaDB.
        status: StatusCode,
        /// Message extracted from the error body.
        message: String,
    },
    /// Response body did not match the expected shape.
    #[error("Malformed ChromaDB response: {0}")]
    InvalidResponse(String),
}

/// Coarse classification of a [`ChromaError`] used to choose the outward error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Collection or record does not exist.
    NotFound,
    /// Collection with the requested name already exists.
    AlreadyExists,
    /// ChromaDB rejected a parameter.
    InvalidArgument,
    /// Anything else, including transport failures.
    Other,
}

impl ChromaError {
    /// Classify the error, matching the message text first and the HTTP status second.
    pub fn kind(&self) -> ErrorKind {
        let message = self.to_string().to_lowercase();
        if message.contains("already exists") {
            return ErrorKind::AlreadyExists;
        }
        if message.contains("does not exist") || message.contains("not found") {
            return ErrorKind::NotFound;
        }
        match self {
            Self::UnexpectedStatus { status, .. } => match *status {
                StatusCode::NOT_FOUND => ErrorKind::NotFound,
                StatusCode::CONFLICT => ErrorKind::AlreadyExists,
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    ErrorKind::InvalidArgument
                }
                _ => ErrorKind::Other,
            },
            _ => ErrorKind::Other,
        }
    }
}

/// Collection description returned by ChromaDB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Server-assigned identifier.
    pub id: String,
    /// Collection name.
    pub name: String,
    /// Flat metadata stored alongside the collection.
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// Record fields that can be requested from `get` and `query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
    /// Document text.
    Documents,
    /// Embedding vectors.
    Embeddings,
    /// Record metadata.
    Metadatas,
    /// Query distances.
    Distances,
}

impl Include {
    /// Parse a field name as accepted by ChromaDB.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "documents" => Some(Self::Documents),
            "embeddings" => Some(Self::Embeddings),
            "metadatas" => Some(Self::Metadatas),
            "distances" => Some(Self::Distances),
            _ => None,
        }
    }
}

/// Records inserted with `add`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AddRecords {
    /// Record identifiers.
    pub ids: Vec<String>,
    /// One embedding per record.
    pub embeddings: Vec<Vec<f32>>,
    /// Optional document texts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<String>>,
    /// Optional metadata per record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadatas: Option<Vec<Option<Metadata>>>,
}

/// Partial record updates applied with `update`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateRecords {
    /// Identifiers of the records to update.
    pub ids: Vec<String>,
    /// Replacement embeddings, required when documents change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<Vec<Vec<f32>>>,
    /// Replacement document texts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<String>>,
    /// Replacement metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadatas: Option<Vec<Option<Metadata>>>,
}

/// Selection passed to `get`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetRequest {
    /// Restrict to these identifiers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Metadata filter.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<Value>,
    /// Document content filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_document: Option<Value>,
    /// Fields returned for each record.
    pub include: Vec<Include>,
    /// Maximum number of records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Number of records to skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

/// Column-oriented result of `get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    /// Record identifiers.
    pub ids: Vec<String>,
    /// Document texts, when included.
    #[serde(default)]
    pub documents: Option<Vec<Option<String>>>,
    /// Record metadata, when included.
    #[serde(default)]
    pub metadatas: Option<Vec<Option<Metadata>>>,
    /// Embedding vectors, when included.
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<f32>>>,
    /// Fields ChromaDB reports as included.
    #[serde(default)]
    pub include: Vec<String>,
}

/// Similarity search passed to `query`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryRequest {
    /// One embedding per query text.
    pub query_embeddings: Vec<Vec<f32>>,
    /// Number of neighbours per query.
    pub n_results: usize,
    /// Metadata filter.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<Value>,
    /// Document content filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_document: Option<Value>,
    /// Fields returned for each match.
    pub include: Vec<Include>,
}

/// Column-oriented result of `query`, one inner list per query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matched identifiers.
    pub ids: Vec<Vec<String>>,
    /// Matched document texts.
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    /// Matched metadata.
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    /// Distances between each query and match.
    #[serde(default)]
    pub distances: Option<Vec<Vec<Option<f32>>>>,
    /// Matched embeddings.
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<Vec<f32>>>>,
    /// Fields ChromaDB reports as included.
    #[serde(default)]
    pub include: Vec<String>,
}

/// Selection passed to `delete`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteRequest {
    /// Identifiers to delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Metadata filter.
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<Value>,
    /// Document content filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub where_document: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct HeartbeatResponse {
    #[serde(rename = "nanosecond heartbeat")]
    pub(crate) nanosecond_heartbeat: u64,
}

#[derive(Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: StatusCode, message: &str) -> ChromaError {
        ChromaError::UnexpectedStatus {
            status,
            message: message.to_string(),
        }
    }

    #[test]
    fn message_text_takes_precedence_over_status() {
        let err = status_error(StatusCode::BAD_REQUEST, "Collection [docs] already exists");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let err = status_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Collection [docs] does not exists",
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn status_is_used_when_message_is_generic() {
        assert_eq!(status_error(StatusCode::NOT_FOUND, "missing").kind(), ErrorKind::NotFound);
        assert_eq!(status_error(StatusCode::CONFLICT, "dup").kind(), ErrorKind::AlreadyExists);
        assert_eq!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, "bad field").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom").kind(),
            ErrorKind::Other
        );
        assert_eq!(
            ChromaError::InvalidResponse("eof".into()).kind(),
            ErrorKind::Other
        );
    }

    #[test]
    fn get_request_uses_chroma_field_names() {
        let request = GetRequest {
            where_filter: Some(serde_json::json!({ "session_id": "s1" })),
            include: vec![Include::Documents, Include::Metadatas],
            limit: Some(5),
            ..Default::default()
        };
        let body = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "where": { "session_id": "s1" },
                "include": ["documents", "metadatas"],
                "limit": 5
            })
        );
    }
}
