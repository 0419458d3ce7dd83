//! Conversions between user-facing collection metadata and the flat form ChromaDB stores.
//!
//! Collection settings such as `hnsw:space` are stored as `chroma:setting:hnsw_space` and
//! reported back under a nested `settings` object.

use super::types::Metadata;
use serde_json::{Value, json};

/// Prefix applied to flattened collection setting keys.
pub const SETTING_PREFIX: &str = "chroma:setting:";

/// HNSW parameters applied to collections created by this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSettings {
    /// Distance function (`cosine`, `l2`, or `ip`).
    pub space: String,
    /// Candidate list size while building the index.
    pub construction_ef: u32,
    /// Candidate list size while searching.
    pub search_ef: u32,
    /// Maximum number of graph neighbours per node.
    pub m: u32,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            space: "cosine".to_string(),
            construction_ef: 100,
            search_ef: 100,
            m: 16,
        }
    }
}

impl CollectionSettings {
    /// Settings keyed the way ChromaDB names them (`hnsw:space`, `hnsw:M`, ...).
    pub fn to_settings(&self) -> Metadata {
        let mut settings = Metadata::new();
        settings.insert("hnsw:space".into(), json!(self.space));
        settings.insert("hnsw:construction_ef".into(), json!(self.construction_ef));
        settings.insert("hnsw:search_ef".into(), json!(self.search_ef));
        settings.insert("hnsw:M".into(), json!(self.m));
        settings
    }

    /// Settings flattened into collection metadata keys.
    pub fn to_metadata(&self) -> Metadata {
        flatten_settings(&self.to_settings())
    }
}

/// Flatten a settings object into `chroma:setting:*` keys.
pub fn flatten_settings(settings: &Metadata) -> Metadata {
    settings
        .iter()
        .map(|(key, value)| (setting_key(key), value.clone()))
        .collect()
}

/// Metadata key under which a setting is stored.
pub fn setting_key(key: &str) -> String {
    format!("{SETTING_PREFIX}{}", key.replace(':', "_"))
}

/// Rebuild structured metadata from the flat form ChromaDB returns.
///
/// Flattened setting keys and raw `hnsw:*` keys are grouped under `settings`; other
/// `chroma:` keys are internal and dropped.
pub fn reconstruct_metadata(metadata: Option<&Metadata>) -> Metadata {
    let Some(metadata) = metadata else {
        return Metadata::new();
    };

    let mut reconstructed = Metadata::new();
    let mut settings = Metadata::new();
    for (key, value) in metadata {
        if let Some(flattened) = key.strip_prefix(SETTING_PREFIX) {
            settings.insert(flattened.replacen('_', ":", 1), value.clone());
        } else if key.starts_with("hnsw:") {
            settings.insert(key.clone(), value.clone());
        } else if !key.starts_with("chroma:") {
            reconstructed.insert(key.clone(), value.clone());
        }
    }

    if !settings.is_empty() {
        reconstructed.insert("settings".into(), Value::Object(settings));
    }
    reconstructed
}

/// Whether `key` is managed by the server rather than free-form user metadata.
pub fn is_reserved_key(key: &str) -> bool {
    key == "settings" || key.starts_with("chroma:") || key.starts_with("hnsw:")
}

/// Whether every value is a string, number, or boolean.
pub fn is_flat(metadata: &Metadata) -> bool {
    metadata
        .values()
        .all(|value| matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)))
}
