//! ChromaDB integration over the v2 HTTP API.

/// Trait describing the operations the tools need from ChromaDB.
pub mod api;
pub mod client;
pub mod metadata;
#[cfg(test)]
pub(crate) mod mock;
pub mod naming;
pub mod types;

pub use api::ChromaApi;
pub use client::ChromaHttpClient;
pub use metadata::{CollectionSettings, flatten_settings, reconstruct_metadata};
pub use naming::{ValidationError, validate_collection_name};
pub use types::{
    AddRecords, ChromaError, Collection, DeleteRequest, ErrorKind, GetRequest, GetResult, Include,
    Metadata, QueryRequest, QueryResult, UpdateRecords,
};
