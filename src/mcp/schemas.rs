//! JSON schema builders for MCP tools.

use serde_json::{Map, Value, json};

/// Schema for tools whose only input is a collection name.
pub(crate) fn collection_name_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    finalize_object_schema(properties, &["collection_name"])
}

/// Schema for `chroma_create_collection`; extra keys are rejected.
pub(crate) fn create_collection_schema() -> Map<String, Value> {
    strict_object_schema(collection_name_schema())
}

pub(crate) fn create_collection_with_metadata_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "metadata".into(),
        string_schema(
            "JSON object encoded as a string; a nested 'settings' object holds hnsw:* parameters",
        ),
    );
    strict_object_schema(finalize_object_schema(properties, &["collection_name", "metadata"]))
}

pub(crate) fn list_collections_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        "limit".into(),
        integer_schema("Maximum number of names to return (0 or omitted for all)", 0, None),
    );
    properties.insert("offset".into(), integer_schema("Number of names to skip", 0, None));
    properties.insert(
        "name_contains".into(),
        string_schema("Case-insensitive substring filter applied before pagination"),
    );
    finalize_object_schema(properties, &[])
}

pub(crate) fn set_description_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "description".into(),
        string_schema("Human-readable description stored in the collection metadata"),
    );
    finalize_object_schema(properties, &["collection_name", "description"])
}

pub(crate) fn set_settings_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "settings".into(),
        object_schema("HNSW settings such as hnsw:space, hnsw:construction_ef, hnsw:search_ef, hnsw:M"),
    );
    finalize_object_schema(properties, &["collection_name", "settings"])
}

pub(crate) fn update_metadata_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "metadata_update".into(),
        object_schema("Scalar key/value pairs merged into the collection metadata"),
    );
    finalize_object_schema(properties, &["collection_name", "metadata_update"])
}

pub(crate) fn rename_collection_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert("new_name".into(), string_schema("New collection name"));
    finalize_object_schema(properties, &["collection_name", "new_name"])
}

pub(crate) fn peek_collection_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert("limit".into(), integer_schema("Number of entries to return", 1, Some(10)));
    finalize_object_schema(properties, &["collection_name"])
}

pub(crate) fn add_documents_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "documents".into(),
        array_schema(
            json!({ "type": "string" }),
            "Document texts to embed and store",
        ),
    );
    properties.insert(
        "metadatas".into(),
        array_schema(
            json!({ "type": "object" }),
            "Optional metadata per document",
        ),
    );
    properties.insert(
        "ids".into(),
        array_schema(
            json!({ "type": "string" }),
            "Optional ids; generated as doc_<timestamp>_<index> when omitted",
        ),
    );
    properties.insert(
        "increment_index".into(),
        boolean_schema(
            "Start generated ids at the current collection count",
            true,
        ),
    );
    finalize_object_schema(properties, &["collection_name", "documents"])
}

pub(crate) fn query_documents_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "query_texts".into(),
        array_schema(json!({ "type": "string" }), "Texts to search for"),
    );
    properties.insert("n_results".into(), integer_schema("Matches returned per query", 1, Some(5)));
    properties.insert("where".into(), where_property());
    properties.insert("where_document".into(), where_document_property());
    properties.insert(
        "include".into(),
        include_property(&["documents", "embeddings", "metadatas", "distances"]),
    );
    finalize_object_schema(properties, &["collection_name", "query_texts"])
}

pub(crate) fn get_documents_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "ids".into(),
        array_schema(json!({ "type": "string" }), "Document ids to fetch"),
    );
    properties.insert("where".into(), where_property());
    properties.insert("where_document".into(), where_document_property());
    properties.insert(
        "include".into(),
        include_property(&["documents", "embeddings", "metadatas"]),
    );
    properties.insert(
        "limit".into(),
        integer_schema("Maximum number of documents (0 for no limit)", 0, Some(0)),
    );
    properties.insert("offset".into(), integer_schema("Number of documents to skip", 0, Some(0)));
    finalize_object_schema(properties, &["collection_name"])
}

pub(crate) fn update_documents_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "ids".into(),
        array_schema(json!({ "type": "string" }), "Ids of the documents to update"),
    );
    properties.insert(
        "documents".into(),
        array_schema(json!({ "type": "string" }), "Replacement texts, one per id"),
    );
    properties.insert(
        "metadatas".into(),
        array_schema(json!({ "type": "object" }), "Replacement metadata, one per id"),
    );
    finalize_object_schema(properties, &["collection_name", "ids"])
}

pub(crate) fn delete_documents_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("collection_name".into(), collection_name_property());
    properties.insert(
        "ids".into(),
        array_schema(json!({ "type": "string" }), "Ids of the documents to delete"),
    );
    properties.insert("where".into(), where_property());
    properties.insert("where_document".into(), where_document_property());
    finalize_object_schema(properties, &["collection_name"])
}

pub(crate) fn sequential_thinking_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("thought".into(), string_schema("Content of this thought"));
    properties.insert(
        "thought_number".into(),
        integer_schema("Position of this thought in the chain", 1, None),
    );
    properties.insert(
        "total_thoughts".into(),
        integer_schema("Expected length of the chain", 1, None),
    );
    properties.insert(
        "session_id".into(),
        string_schema("Session identifier; a new one is generated when empty"),
    );
    properties.insert(
        "branch_from_thought".into(),
        integer_schema("Earlier thought this branch starts from (0 for none)", 0, Some(0)),
    );
    properties.insert("branch_id".into(), string_schema("Branch identifier"));
    properties.insert(
        "next_thought_needed".into(),
        boolean_schema("Whether another thought follows", false),
    );
    properties.insert(
        "custom_data".into(),
        object_schema("Additional scalar values stored with the thought"),
    );
    finalize_object_schema(properties, &["thought", "thought_number", "total_thoughts"])
}

pub(crate) fn find_similar_thoughts_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("query".into(), string_schema("Text to compare thoughts against"));
    properties.insert(
        "n_results".into(),
        integer_schema("Maximum number of thoughts to return", 1, Some(5)),
    );
    properties.insert("threshold".into(), threshold_property());
    properties.insert("session_id".into(), string_schema("Restrict the search to one session"));
    properties.insert(
        "include_branches".into(),
        boolean_schema("Include thoughts recorded on branches", true),
    );
    finalize_object_schema(properties, &["query"])
}

pub(crate) fn session_summary_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("session_id".into(), string_schema("Session to summarize"));
    properties.insert(
        "include_branches".into(),
        boolean_schema("Include thoughts recorded on branches", true),
    );
    finalize_object_schema(properties, &["session_id"])
}

pub(crate) fn find_similar_sessions_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("query".into(), string_schema("Text to compare sessions against"));
    properties.insert(
        "n_results".into(),
        integer_schema("Maximum number of sessions to return", 1, Some(3)),
    );
    properties.insert("threshold".into(), threshold_property());
    finalize_object_schema(properties, &["query"])
}

pub(crate) fn empty_object_schema() -> Map<String, Value> {
    finalize_object_schema(Map::new(), &[])
}

fn collection_name_property() -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert(
        "description".into(),
        Value::String("Collection name (letters, digits, '_' and '-', at most 64 characters)".into()),
    );
    schema.insert("minLength".into(), Value::Number(1.into()));
    schema.insert("maxLength".into(), Value::Number(64.into()));
    Value::Object(schema)
}

fn where_property() -> Value {
    object_schema(
        "Metadata filter, e.g. {\"topic\": \"rust\"} or {\"$and\": [{\"a\": 1}, {\"b\": {\"$gt\": 5}}]}",
    )
}

fn where_document_property() -> Value {
    object_schema("Document content filter, e.g. {\"$contains\": \"text\"}")
}

fn include_property(valid: &[&str]) -> Value {
    array_schema(
        json!({ "type": "string", "enum": valid }),
        "Fields to include in each result",
    )
}

fn threshold_property() -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("number".into()));
    schema.insert(
        "description".into(),
        Value::String("Minimum similarity (1 - distance) for a match".into()),
    );
    schema.insert("default".into(), json!(0.75));
    Value::Object(schema)
}

fn string_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn integer_schema(description: &str, minimum: u64, default: Option<u64>) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("integer".into()));
    schema.insert("description".into(), Value::String(description.into()));
    schema.insert("minimum".into(), Value::Number(minimum.into()));
    if let Some(default) = default {
        schema.insert("default".into(), Value::Number(default.into()));
    }
    Value::Object(schema)
}

fn boolean_schema(description: &str, default: bool) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("boolean".into()));
    schema.insert("description".into(), Value::String(description.into()));
    schema.insert("default".into(), Value::Bool(default));
    Value::Object(schema)
}

fn object_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn array_schema(items: Value, description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("array".into()));
    schema.insert("items".into(), items);
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn finalize_object_schema(properties: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(
                required
                    .iter()
                    .map(|&key| Value::String(key.into()))
                    .collect(),
            ),
        );
    }
    schema
}

fn strict_object_schema(mut schema: Map<String, Value>) -> Map<String, Value> {
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema
}
