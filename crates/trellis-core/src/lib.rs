//! trellis-core: Shared types, schema, configuration, and error handling for Trellis.
//!
//! This crate provides the foundational types used by the mapper and the graph client:
//! - Property values, store identities, and relationship records
//! - The entity schema (`MetaData`) that replaces per-type reflection
//! - The object arena (`ObjectGraph`) holding live domain objects
//! - Persistence events for session listeners
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod object;
pub mod schema;
pub mod types;

pub use error::{MappingError, SchemaError, TrellisError};
pub use object::{
    DefaultInstantiator, Entity, EntityInstantiator, ObjectGraph, ObjectRef, RelationshipValue,
};
pub use schema::{ClassInfo, EntityKind, EntitySchema, MetaData, RelationshipField};
pub use types::{
    Cardinality, Direction, GraphModel, MappedRelationship, NodeRecord, PropertyMap,
    RelationshipRecord, Value,
};
