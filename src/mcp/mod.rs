//! Model Context Protocol (MCP) integration for ChromaDB.
//!
//! The server exposes twenty tools over stdio:
//!
//! - Collections: list, create (with default or supplied metadata), get, describe, configure,
//!   update metadata, rename, delete, and peek.
//! - Documents: add, query, get, update, and delete.
//! - Sequential thinking: record thoughts, search thoughts and sessions, summarize a session.
//! - `chroma_get_server_version`.
//!
//! Handlers receive a [`ToolContext`] so they can run against any [`crate::chroma::ChromaApi`]
//! implementation.

mod format;
pub mod handlers;
mod registry;
mod schemas;
mod server;

pub use handlers::ToolContext;
pub use server::{ChromaMcpServer, ServerInitError};
