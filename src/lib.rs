#![deny(missing_docs)]

//! Core library for the Chroma MCP server.

/// ChromaDB HTTP client, shared types, and metadata helpers.
pub mod chroma;
/// Command-line and environment-driven configuration.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Model Context Protocol server implementation.
pub mod mcp;
