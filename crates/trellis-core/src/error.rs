use thiserror::Error;

use crate::object::ObjectRef;
use crate::types::Direction;

/// Programming errors raised while mapping between objects and the graph.
///
/// These are never retried. A save that fails this way leaves the mapping
/// context and the object graph untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("Relationship entity {class} ({object}) has no {side} node")]
    MissingEndpoint {
        class: String,
        object: ObjectRef,
        side: &'static str,
    },

    #[error("No class mapped for type: {0}")]
    UnknownClass(String),

    #[error("Unknown object reference: {0}")]
    UnknownObject(ObjectRef),

    #[error("{0} is not a relationship entity")]
    NotARelationshipEntity(String),

    #[error("{0} is a relationship entity and cannot be mapped to a node")]
    NotANodeEntity(String),

    #[error(
        "Ambiguous relationship mapping on {class}: [:{rel_type}] {direction} to {value_class} matches fields {fields:?}"
    )]
    AmbiguousWriter {
        class: String,
        rel_type: String,
        direction: Direction,
        value_class: String,
        fields: Vec<String>,
    },

    #[error("Write acknowledgement has no id for reference {0}")]
    MissingAcknowledgement(i64),
}

/// Errors raised while building or loading an entity schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Class declared twice: {0}")]
    DuplicateClass(String),

    #[error("Class {class} extends unknown class {superclass}")]
    UnknownSuperclass { class: String, superclass: String },

    #[error("Inheritance cycle through class {0}")]
    InheritanceCycle(String),

    #[error("Field {class}.{field} refers to unknown class {target}")]
    UnknownTarget {
        class: String,
        field: String,
        target: String,
    },

    #[error("Relationship entity {class} refers to unknown {side} class {target}")]
    UnknownEndpoint {
        class: String,
        side: &'static str,
        target: String,
    },

    #[error("Schema parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error type for Trellis.
#[derive(Error, Debug)]
pub enum TrellisError {
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MappingError>;
