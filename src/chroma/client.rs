//! HTTP client wrapper for the ChromaDB v2 REST API.

use crate::chroma::api::ChromaApi;
use crate::chroma::types::{
    AddRecords, ChromaError, Collection, DeleteRequest, ErrorBody, GetRequest, GetResult,
    HeartbeatResponse, Metadata, QueryRequest, QueryResult, UpdateRecords,
};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

/// Lightweight HTTP client for ChromaDB operations scoped to one tenant and database.
pub struct ChromaHttpClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) tenant: String,
    pub(crate) database: String,
    pub(crate) api_key: Option<String>,
}

impl ChromaHttpClient {
    /// Construct a new client from the runtime configuration.
    pub fn new(config: &Config) -> Result<Self, ChromaError> {
        let client = Client::builder()
            .user_agent(concat!("chroma-mcp-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url =
            normalize_base_url(&config.chroma_url()).map_err(ChromaError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            tenant = %config.tenant,
            database = %config.database,
            has_api_key = config.api_key.is_some(),
            "Initialized ChromaDB HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            tenant: config.tenant.clone(),
            database: config.database.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn collections_path(&self) -> String {
        format!(
            "api/v2/tenants/{}/databases/{}/collections",
            self.tenant, self.database
        )
    }

    fn collection_path(&self, id_or_name: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/{id_or_name}/{action}", self.collections_path()),
            None => format!("{}/{id_or_name}", self.collections_path()),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("x-chroma-token", api_key);
        }
        req
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, ChromaError> {
        let response = self.send(request, operation).await?;
        response.json::<T>().await.map_err(|error| {
            let error = ChromaError::InvalidResponse(format!("{operation}: {error}"));
            tracing::error!(operation, error = %error, "Failed to decode ChromaDB response");
            error
        })
    }

    async fn send(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<Response, ChromaError> {
        let response = request.send().await?;
        if response.status().is_success() {
            tracing::debug!(operation, status = %response.status(), "ChromaDB request succeeded");
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = ChromaError::UnexpectedStatus {
            status,
            message: extract_error_message(&body, status),
        };
        tracing::warn!(operation, status = %status, error = %error, "ChromaDB request failed");
        Err(error)
    }
}

#[async_trait]
impl ChromaApi for ChromaHttpClient {
    async fn heartbeat(&self) -> Result<u64, ChromaError> {
        let body: HeartbeatResponse = self
            .send_json(self.request(Method::GET, "api/v2/heartbeat"), "heartbeat")
            .await?;
        Ok(body.nanosecond_heartbeat)
    }

    async fn version(&self) -> Result<String, ChromaError> {
        self.send_json(self.request(Method::GET, "api/v2/version"), "version")
            .await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, ChromaError> {
        let path = self.collections_path();
        self.send_json(self.request(Method::GET, &path), "list_collections")
            .await
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: Option<Metadata>,
        get_or_create: bool,
    ) -> Result<Collection, ChromaError> {
        let mut body = Map::new();
        body.insert("name".into(), Value::String(name.to_string()));
        body.insert("get_or_create".into(), Value::Bool(get_or_create));
        if let Some(metadata) = metadata.filter(|metadata| !metadata.is_empty()) {
            body.insert("metadata".into(), Value::Object(metadata));
        }

        let path = self.collections_path();
        let collection: Collection = self
            .send_json(
                self.request(Method::POST, &path).json(&body),
                "create_collection",
            )
            .await?;
        tracing::debug!(
            collection = name,
            id = %collection.id,
            get_or_create,
            "Collection created"
        );
        Ok(collection)
    }

    async fn get_collection(&self, name: &str) -> Result<Collection, ChromaError> {
        let path = self.collection_path(name, None);
        self.send_json(self.request(Method::GET, &path), "get_collection")
            .await
    }

    async fn modify_collection(
        &self,
        id: &str,
        new_name: Option<&str>,
        new_metadata: Option<Metadata>,
    ) -> Result<(), ChromaError> {
        let mut body = Map::new();
        if let Some(name) = new_name {
            body.insert("new_name".into(), Value::String(name.to_string()));
        }
        if let Some(metadata) = new_metadata {
            body.insert("new_metadata".into(), Value::Object(metadata));
        }

        let path = self.collection_path(id, None);
        self.send(
            self.request(Method::PUT, &path).json(&body),
            "modify_collection",
        )
        .await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), ChromaError> {
        let path = self.collection_path(name, None);
        self.send(self.request(Method::DELETE, &path), "delete_collection")
            .await?;
        tracing::debug!(collection = name, "Collection deleted");
        Ok(())
    }

    async fn count(&self, id: &str) -> Result<usize, ChromaError> {
        let path = self.collection_path(id, Some("count"));
        self.send_json(self.request(Method::GET, &path), "count")
            .await
    }

    async fn add(&self, id: &str, records: AddRecords) -> Result<(), ChromaError> {
        let count = records.ids.len();
        let path = self.collection_path(id, Some("add"));
        self.send(self.request(Method::POST, &path).json(&records), "add")
            .await?;
        tracing::debug!(collection_id = id, records = count, "Records added");
        Ok(())
    }

    async fn update(&self, id: &str, records: UpdateRecords) -> Result<(), ChromaError> {
        let path = self.collection_path(id, Some("update"));
        self.send(self.request(Method::POST, &path).json(&records), "update")
            .await?;
        Ok(())
    }

    async fn get(&self, id: &str, request: GetRequest) -> Result<GetResult, ChromaError> {
        let path = self.collection_path(id, Some("get"));
        self.send_json(self.request(Method::POST, &path).json(&request), "get")
            .await
    }

    async fn query(&self, id: &str, request: QueryRequest) -> Result<QueryResult, ChromaError> {
        let path = self.collection_path(id, Some("query"));
        self.send_json(self.request(Method::POST, &path).json(&request), "query")
            .await
    }

    async fn delete(&self, id: &str, request: DeleteRequest) -> Result<(), ChromaError> {
        let path = self.collection_path(id, Some("delete"));
        self.send(self.request(Method::POST, &path).json(&request), "delete")
            .await?;
        Ok(())
    }
}

fn extract_error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        match (parsed.error, parsed.message) {
            (_, Some(message)) if !message.is_empty() => return message,
            (Some(error), _) if !error.is_empty() => return error,
            _ => {}
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        json!({ "status": status.as_u16() }).to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chroma::types::{ErrorKind, Include};
    use httpmock::{
        Method::{DELETE, GET, POST, PUT},
        MockServer,
    };

    const COLLECTIONS: &str = "/api/v2/tenants/default_tenant/databases/default_database/collections";

    fn client(server: &MockServer, api_key: Option<&str>) -> ChromaHttpClient {
        ChromaHttpClient {
            client: Client::builder()
                .user_agent("chroma-mcp-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            tenant: "default_tenant".into(),
            database: "default_database".into(),
            api_key: api_key.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_collection_posts_metadata_and_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(COLLECTIONS)
                    .header("x-chroma-token", "secret")
                    .json_body(json!({
                        "name": "docs",
                        "get_or_create": false,
                        "metadata": { "description": "notes" }
                    }));
                then.status(200).json_body(json!({
                    "id": "c-1",
                    "name": "docs",
                    "metadata": { "description": "notes" }
                }));
            })
            .await;

        let mut metadata = Map::new();
        metadata.insert("description".into(), json!("notes"));
        let collection = client(&server, Some("secret"))
            .create_collection("docs", Some(metadata), false)
            .await
            .expect("create");

        mock.assert();
        assert_eq!(collection.id, "c-1");
        assert_eq!(collection.name, "docs");
    }

    #[tokio::test]
    async fn error_body_message_is_surfaced_and_classified() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{COLLECTIONS}/missing"));
                then.status(404).json_body(json!({
                    "error": "NotFoundError",
                    "message": "Collection [missing] does not exists"
                }));
            })
            .await;

        let err = client(&server, None)
            .get_collection("missing")
            .await
            .expect_err("missing collection");
        assert_eq!(err.to_string(), "Collection [missing] does not exists");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn query_sends_embeddings_and_parses_columns() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(format!("{COLLECTIONS}/c-1/query"))
                    .json_body(json!({
                        "query_embeddings": [[1.0, 0.0]],
                        "n_results": 2,
                        "where": { "topic": "rust" },
                        "include": ["documents", "distances"]
                    }));
                then.status(200).json_body(json!({
                    "ids": [["a", "b"]],
                    "documents": [["first", null]],
                    "metadatas": null,
                    "distances": [[0.1, 0.4]],
                    "embeddings": null,
                    "include": ["documents", "distances"]
                }));
            })
            .await;

        let result = client(&server, None)
            .query(
                "c-1",
                QueryRequest {
                    query_embeddings: vec![vec![1.0, 0.0]],
                    n_results: 2,
                    where_filter: Some(json!({ "topic": "rust" })),
                    where_document: None,
                    include: vec![Include::Documents, Include::Distances],
                },
            )
            .await
            .expect("query");

        mock.assert();
        assert_eq!(result.ids, vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(
            result.documents,
            Some(vec![vec![Some("first".to_string()), None]])
        );
        assert_eq!(result.distances, Some(vec![vec![Some(0.1), Some(0.4)]]));
        assert!(result.metadatas.is_none());
    }

    #[tokio::test]
    async fn modify_and_delete_use_expected_routes() {
        let server = MockServer::start_async().await;
        let modify = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path(format!("{COLLECTIONS}/c-1"))
                    .json_body(json!({ "new_name": "renamed" }));
                then.status(200).json_body(json!({}));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE).path(format!("{COLLECTIONS}/renamed"));
                then.status(200).json_body(json!({}));
            })
            .await;
        let count = server
            .mock_async(|when, then| {
                when.method(GET).path(format!("{COLLECTIONS}/c-1/count"));
                then.status(200).json_body(json!(7));
            })
            .await;

        let client = client(&server, None);
        client
            .modify_collection("c-1", Some("renamed"), None)
            .await
            .expect("modify");
        assert_eq!(client.count("c-1").await.expect("count"), 7);
        client.delete_collection("renamed").await.expect("delete");

        modify.assert();
        count.assert();
        delete.assert();
    }

    #[tokio::test]
    async fn heartbeat_and_version_are_read() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v2/heartbeat");
                then.status(200)
                    .json_body(json!({ "nanosecond heartbeat": 1_700_000_000_000_u64 }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v2/version");
                then.status(200).json_body(json!("1.0.15"));
            })
            .await;

        let client = client(&server, None);
        assert_eq!(client.heartbeat().await.expect("heartbeat"), 1_700_000_000_000);
        assert_eq!(client.version().await.expect("version"), "1.0.15");
    }

    #[test]
    fn error_message_falls_back_to_raw_body() {
        assert_eq!(
            extract_error_message("upstream exploded", reqwest::StatusCode::BAD_GATEWAY),
            "upstream exploded"
        );
        assert_eq!(
            extract_error_message(
                "{\"error\":\"InvalidArgumentError\"}",
                reqwest::StatusCode::BAD_REQUEST
            ),
            "InvalidArgumentError"
        );
    }
}
