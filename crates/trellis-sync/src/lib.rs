//! trellis-sync: Command-line access to Trellis sessions.
//!
//! Loads object graphs from Neo4j as JSON documents and compiles write plans
//! for documents without touching the store.

pub mod document;
pub mod plan;

pub use document::{DocumentError, GraphDocument, LoadedDocument, ObjectDocument};
pub use plan::{plan_document, PlanOutput};
