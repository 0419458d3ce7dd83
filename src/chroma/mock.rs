//! In-memory [`ChromaApi`] used by handler tests.
//!
//! Filters support equality, comparison operators, `$in`/`$nin`, `$and`/`$or`, and
//! `$contains`/`$not_contains` document filters. Query distances are cosine distances.

use super::api::ChromaApi;
use super::types::{
    AddRecords, ChromaError, Collection, DeleteRequest, GetRequest, GetResult, Include, Metadata,
    QueryRequest, QueryResult, UpdateRecords,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone)]
struct Record {
    id: String,
    document: Option<String>,
    metadata: Option<Metadata>,
    embedding: Vec<f32>,
}

struct StoredCollection {
    collection: Collection,
    records: Vec<Record>,
}

/// Mock ChromaDB keeping collections in memory.
#[derive(Default)]
pub struct MockChroma {
    collections: Mutex<Vec<StoredCollection>>,
    next_id: Mutex<usize>,
    failures: Mutex<HashMap<&'static str, (StatusCode, String)>>,
}

impl MockChroma {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call to `operation` fail with the given status and message.
    pub fn fail(&self, operation: &'static str, status: StatusCode, message: &str) {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(operation, (status, message.to_string()));
    }

    /// Names of all stored collections in creation order.
    pub fn collection_names(&self) -> Vec<String> {
        self.collections
            .lock()
            .expect("collections lock")
            .iter()
            .map(|stored| stored.collection.name.clone())
            .collect()
    }

    fn check(&self, operation: &'static str) -> Result<(), ChromaError> {
        match self.failures.lock().expect("failures lock").get(operation) {
            Some((status, message)) => Err(ChromaError::UnexpectedStatus {
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn with_collection<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut StoredCollection) -> T,
    ) -> Result<T, ChromaError> {
        let mut collections = self.collections.lock().expect("collections lock");
        collections
            .iter_mut()
            .find(|stored| stored.collection.id == id)
            .map(f)
            .ok_or_else(|| not_found(id))
    }
}

fn not_found(name: &str) -> ChromaError {
    ChromaError::UnexpectedStatus {
        status: StatusCode::NOT_FOUND,
        message: format!("Collection [{name}] does not exist"),
    }
}

fn already_exists(name: &str) -> ChromaError {
    ChromaError::UnexpectedStatus {
        status: StatusCode::CONFLICT,
        message: format!("Collection [{name}] already exists"),
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    compare(left, right) == Some(Ordering::Equal)
}

fn matches_condition(actual: Option<&Value>, condition: &Value) -> bool {
    let Some(operators) = condition.as_object() else {
        return actual.is_some_and(|actual| values_equal(actual, condition));
    };
    operators.iter().all(|(op, expected)| match op.as_str() {
        "$eq" => actual.is_some_and(|a| values_equal(a, expected)),
        "$ne" => !actual.is_some_and(|a| values_equal(a, expected)),
        "$lt" => actual.and_then(|a| compare(a, expected)) == Some(Ordering::Less),
        "$lte" => matches!(
            actual.and_then(|a| compare(a, expected)),
            Some(Ordering::Less | Ordering::Equal)
        ),
        "$gt" => actual.and_then(|a| compare(a, expected)) == Some(Ordering::Greater),
        "$gte" => matches!(
            actual.and_then(|a| compare(a, expected)),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        "$in" => expected.as_array().is_some_and(|options| {
            actual.is_some_and(|a| options.iter().any(|o| values_equal(a, o)))
        }),
        "$nin" => expected.as_array().is_some_and(|options| {
            !actual.is_some_and(|a| options.iter().any(|o| values_equal(a, o)))
        }),
        _ => false,
    })
}

fn matches_where(metadata: Option<&Metadata>, filter: &Value) -> bool {
    let Some(filter) = filter.as_object() else {
        return false;
    };
    filter.iter().all(|(key, condition)| match key.as_str() {
        "$and" => condition
            .as_array()
            .is_some_and(|clauses| clauses.iter().all(|c| matches_where(metadata, c))),
        "$or" => condition
            .as_array()
            .is_some_and(|clauses| clauses.iter().any(|c| matches_where(metadata, c))),
        field => matches_condition(metadata.and_then(|m| m.get(field)), condition),
    })
}

fn matches_document(document: Option<&str>, filter: &Value) -> bool {
    let document = document.unwrap_or_default();
    let Some(filter) = filter.as_object() else {
        return false;
    };
    filter.iter().all(|(op, needle)| match (op.as_str(), needle.as_str()) {
        ("$contains", Some(needle)) => document.contains(needle),
        ("$not_contains", Some(needle)) => !document.contains(needle),
        _ => false,
    })
}

fn selected<'a>(
    records: &'a [Record],
    ids: Option<&[String]>,
    where_filter: Option<&Value>,
    where_document: Option<&Value>,
) -> Vec<&'a Record> {
    records
        .iter()
        .filter(|record| ids.is_none_or(|ids| ids.contains(&record.id)))
        .filter(|record| where_filter.is_none_or(|f| matches_where(record.metadata.as_ref(), f)))
        .filter(|record| {
            where_document.is_none_or(|f| matches_document(record.document.as_deref(), f))
        })
        .collect()
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

fn include_names(include: &[Include]) -> Vec<String> {
    include
        .iter()
        .filter_map(|field| serde_json::to_value(field).ok())
        .filter_map(|value| value.as_str().map(str::to_string))
        .collect()
}

#[async_trait]
impl ChromaApi for MockChroma {
    async fn heartbeat(&self) -> Result<u64, ChromaError> {
        self.check("heartbeat")?;
        Ok(1)
    }

    async fn version(&self) -> Result<String, ChromaError> {
        self.check("version")?;
        Ok("1.0.0".to_string())
    }

    async fn list_collections(&self) -> Result<Vec<Collection>, ChromaError> {
        self.check("list_collections")?;
        Ok(self
            .collections
            .lock()
            .expect("collections lock")
            .iter()
            .map(|stored| stored.collection.clone())
            .collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        metadata: Option<Metadata>,
        get_or_create: bool,
    ) -> Result<Collection, ChromaError> {
        self.check("create_collection")?;
        let mut collections = self.collections.lock().expect("collections lock");
        if let Some(existing) = collections.iter().find(|s| s.collection.name == name) {
            return if get_or_create {
                Ok(existing.collection.clone())
            } else {
                Err(already_exists(name))
            };
        }

        let mut next_id = self.next_id.lock().expect("id lock");
        *next_id += 1;
        let collection = Collection {
            id: format!("collection-{next_id}"),
            name: name.to_string(),
            metadata: metadata.filter(|m| !m.is_empty()),
        };
        collections.push(StoredCollection {
            collection: collection.clone(),
            records: Vec::new(),
        });
        Ok(collection)
    }

    async fn get_collection(&self, name: &str) -> Result<Collection, ChromaError> {
        self.check("get_collection")?;
        self.collections
            .lock()
            .expect("collections lock")
            .iter()
            .find(|stored| stored.collection.name == name)
            .map(|stored| stored.collection.clone())
            .ok_or_else(|| not_found(name))
    }

    async fn modify_collection(
        &self,
        id: &str,
        new_name: Option<&str>,
        new_metadata: Option<Metadata>,
    ) -> Result<(), ChromaError> {
        self.check("modify_collection")?;
        let mut collections = self.collections.lock().expect("collections lock");
        if let Some(name) = new_name
            && collections
                .iter()
                .any(|s| s.collection.name == name && s.collection.id != id)
        {
            return Err(already_exists(name));
        }
        let stored = collections
            .iter_mut()
            .find(|stored| stored.collection.id == id)
            .ok_or_else(|| not_found(id))?;
        if let Some(name) = new_name {
            stored.collection.name = name.to_string();
        }
        if let Some(metadata) = new_metadata {
            stored.collection.metadata = Some(metadata);
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), ChromaError> {
        self.check("delete_collection")?;
        let mut collections = self.collections.lock().expect("collections lock");
        let before = collections.len();
        collections.retain(|stored| stored.collection.name != name);
        if collections.len() == before {
            return Err(not_found(name));
        }
        Ok(())
    }

    async fn count(&self, id: &str) -> Result<usize, ChromaError> {
        self.check("count")?;
        self.with_collection(id, |stored| stored.records.len())
    }

    async fn add(&self, id: &str, records: AddRecords) -> Result<(), ChromaError> {
        self.check("add")?;
        self.with_collection(id, |stored| {
            for (index, record_id) in records.ids.iter().enumerate() {
                stored.records.push(Record {
                    id: record_id.clone(),
                    document: records
                        .documents
                        .as_ref()
                        .and_then(|docs| docs.get(index).cloned()),
                    metadata: records
                        .metadatas
                        .as_ref()
                        .and_then(|metas| metas.get(index).cloned().flatten()),
                    embedding: records.embeddings.get(index).cloned().unwrap_or_default(),
                });
            }
        })
    }

    async fn update(&self, id: &str, records: UpdateRecords) -> Result<(), ChromaError> {
        self.check("update")?;
        self.with_collection(id, |stored| {
            for (index, record_id) in records.ids.iter().enumerate() {
                let Some(record) = stored.records.iter_mut().find(|r| &r.id == record_id) else {
                    continue;
                };
                if let Some(document) = records.documents.as_ref().and_then(|d| d.get(index)) {
                    record.document = Some(document.clone());
                }
                if let Some(metadata) = records.metadatas.as_ref().and_then(|m| m.get(index)) {
                    record.metadata = metadata.clone();
                }
                if let Some(embedding) = records.embeddings.as_ref().and_then(|e| e.get(index)) {
                    record.embedding = embedding.clone();
                }
            }
        })
    }

    async fn get(&self, id: &str, request: GetRequest) -> Result<GetResult, ChromaError> {
        self.check("get")?;
        self.with_collection(id, |stored| {
            let matches: Vec<&Record> = selected(
                &stored.records,
                request.ids.as_deref(),
                request.where_filter.as_ref(),
                request.where_document.as_ref(),
            )
            .into_iter()
            .skip(request.offset.unwrap_or(0))
            .take(request.limit.unwrap_or(usize::MAX))
            .collect();

            let include = &request.include;
            GetResult {
                ids: matches.iter().map(|r| r.id.clone()).collect(),
                documents: include
                    .contains(&Include::Documents)
                    .then(|| matches.iter().map(|r| r.document.clone()).collect()),
                metadatas: include
                    .contains(&Include::Metadatas)
                    .then(|| matches.iter().map(|r| r.metadata.clone()).collect()),
                embeddings: include
                    .contains(&Include::Embeddings)
                    .then(|| matches.iter().map(|r| r.embedding.clone()).collect()),
                include: include_names(include),
            }
        })
    }

    async fn query(&self, id: &str, request: QueryRequest) -> Result<QueryResult, ChromaError> {
        self.check("query")?;
        self.with_collection(id, |stored| {
            let candidates = selected(
                &stored.records,
                None,
                request.where_filter.as_ref(),
                request.where_document.as_ref(),
            );
            let include = &request.include;
            let mut result = QueryResult {
                include: include_names(include),
                ..Default::default()
            };
            let mut documents = Vec::new();
            let mut metadatas = Vec::new();
            let mut distances = Vec::new();
            let mut embeddings = Vec::new();

            for query in &request.query_embeddings {
                let mut scored: Vec<(f32, &Record)> = candidates
                    .iter()
                    .map(|record| (cosine_distance(query, &record.embedding), *record))
                    .collect();
                scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
                scored.truncate(request.n_results);

                result.ids.push(scored.iter().map(|(_, r)| r.id.clone()).collect());
                documents.push(scored.iter().map(|(_, r)| r.document.clone()).collect());
                metadatas.push(scored.iter().map(|(_, r)| r.metadata.clone()).collect());
                distances.push(scored.iter().map(|(d, _)| Some(*d)).collect());
                embeddings.push(scored.iter().map(|(_, r)| r.embedding.clone()).collect());
            }

            result.documents = include.contains(&Include::Documents).then_some(documents);
            result.metadatas = include.contains(&Include::Metadatas).then_some(metadatas);
            result.distances = include.contains(&Include::Distances).then_some(distances);
            result.embeddings = include.contains(&Include::Embeddings).then_some(embeddings);
            result
        })
    }

    async fn delete(&self, id: &str, request: DeleteRequest) -> Result<(), ChromaError> {
        self.check("delete")?;
        self.with_collection(id, |stored| {
            let doomed: Vec<String> = selected(
                &stored.records,
                request.ids.as_deref(),
                request.where_filter.as_ref(),
                request.where_document.as_ref(),
            )
            .into_iter()
            .map(|record| record.id.clone())
            .collect();
            stored.records.retain(|record| !doomed.contains(&record.id));
        })
    }
}
