use super::types::{
    AddRecords, ChromaError, Collection, DeleteRequest, GetRequest, GetResult, Include, Metadata,
    QueryRequest, QueryResult, UpdateRecords,
};
use async_trait::async_trait;

/// Operations the tool handlers need from ChromaDB.
///
/// Collection lookups take names; record operations take the collection identifier returned by
/// [`ChromaApi::get_collection`] or [`ChromaApi::create_collection`].
#[async_trait]
pub trait ChromaApi: Send + Sync {
    /// Liveness probe returning the server clock in nanoseconds.
    async fn heartbeat(&self) -> Result<u64, ChromaError>;

    /// Version string reported by the server.
    async fn version(&self) -> Result<String, ChromaError>;

    /// All collections in the configured tenant and database.
    async fn list_collections(&self) -> Result<Vec<Collection>, ChromaError>;

    /// Create a collection; with `get_or_create` an existing one is returned instead of failing.
    async fn create_collection(
        &self,
        name: &str,
        metadata: Option<Metadata>,
        get_or_create: bool,
    ) -> Result<Collection, ChromaError>;

    /// Look up a collection by name.
    async fn get_collection(&self, name: &str) -> Result<Collection, ChromaError>;

    /// Rename a collection and/or replace its metadata.
    async fn modify_collection(
        &self,
        id: &str,
        new_name: Option<&str>,
        new_metadata: Option<Metadata>,
    ) -> Result<(), ChromaError>;

    /// Delete a collection by name.
    async fn delete_collection(&self, name: &str) -> Result<(), ChromaError>;

    /// Number of records stored in a collection.
    async fn count(&self, id: &str) -> Result<usize, ChromaError>;

    /// Insert records.
    async fn add(&self, id: &str, records: AddRecords) -> Result<(), ChromaError>;

    /// Update existing records.
    async fn update(&self, id: &str, records: UpdateRecords) -> Result<(), ChromaError>;

    /// Fetch records by id and/or filter.
    async fn get(&self, id: &str, request: GetRequest) -> Result<GetResult, ChromaError>;

    /// Nearest-neighbour search.
    async fn query(&self, id: &str, request: QueryRequest) -> Result<QueryResult, ChromaError>;

    /// Delete records by id and/or filter.
    async fn delete(&self, id: &str, request: DeleteRequest) -> Result<(), ChromaError>;

    /// First `limit` records with documents, metadata, and embeddings.
    async fn peek(&self, id: &str, limit: usize) -> Result<GetResult, ChromaError> {
        self.get(
            id,
            GetRequest {
                include: vec![Include::Embeddings, Include::Documents, Include::Metadatas],
                limit: Some(limit),
                ..Default::default()
            },
        )
        .await
    }
}
