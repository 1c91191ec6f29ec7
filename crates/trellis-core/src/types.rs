//! Core value types shared by the save and load paths.
//!
//! Store identities are plain `i64` values assigned by the graph store. Records
//! coming back from a query are described by [`NodeRecord`] and
//! [`RelationshipRecord`]; edges known to exist in the store are tracked as
//! [`MappedRelationship`] values.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

// ── Property values ──────────────────────────────────────────────

/// A scalar (or nested) property value as stored on a node or edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Merge an incoming list value with the current one, keeping existing
    /// elements first and skipping duplicates. Non-list values are replaced.
    pub fn merged_with(self, current: Option<&Value>) -> Value {
        match (self, current) {
            (Value::List(incoming), Some(Value::List(existing))) => {
                let mut merged = existing.clone();
                for item in incoming {
                    if !merged.contains(&item) {
                        merged.push(item);
                    }
                }
                Value::List(merged)
            }
            (incoming, _) => incoming,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

/// Property map of a node, edge, or domain object. Ordered so that
/// serialized forms are canonical.
pub type PropertyMap = BTreeMap<String, Value>;

// ── Relationship metadata ────────────────────────────────────────

/// Direction of a relationship field, relative to the declaring object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
    Undirected,
}

impl Direction {
    /// The direction as seen from the other endpoint.
    pub fn reverse(self) -> Self {
        match self {
            Self::Outgoing => Self::Incoming,
            Self::Incoming => Self::Outgoing,
            Self::Undirected => Self::Undirected,
        }
    }

    /// Whether a field declared with `self` can read or write an edge
    /// traversed in `direction`.
    pub fn accepts(self, direction: Direction) -> bool {
        self == direction || self == Self::Undirected
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outgoing => write!(f, "OUTGOING"),
            Self::Incoming => write!(f, "INCOMING"),
            Self::Undirected => write!(f, "UNDIRECTED"),
        }
    }
}

/// Whether a relationship field holds one related object or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    Scalar,
    #[default]
    Collection,
}

// ── Mapped relationships ─────────────────────────────────────────

/// An edge known, as of the last sync, to exist in the store.
///
/// Equality, ordering, and hashing use `(start_id, rel_type, end_id,
/// relationship_id)`. The endpoint types are informational: they let the
/// differ find the relationships belonging to a particular field. The
/// relationship id is only kept for edges backed by a relationship entity;
/// plain edges compare by their `(start, type, end)` triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedRelationship {
    pub start_id: i64,
    pub rel_type: String,
    pub end_id: i64,
    pub relationship_id: Option<i64>,
    pub start_type: String,
    pub end_type: String,
}

impl MappedRelationship {
    pub fn new(
        start_id: i64,
        rel_type: impl Into<String>,
        end_id: i64,
        relationship_id: Option<i64>,
        start_type: impl Into<String>,
        end_type: impl Into<String>,
    ) -> Self {
        Self {
            start_id,
            rel_type: rel_type.into(),
            end_id,
            relationship_id,
            start_type: start_type.into(),
            end_type: end_type.into(),
        }
    }

    fn key(&self) -> (i64, &str, i64, Option<i64>) {
        (
            self.start_id,
            self.rel_type.as_str(),
            self.end_id,
            self.relationship_id,
        )
    }

    /// The same edge seen from its end node.
    pub fn reversed(&self) -> Self {
        Self {
            start_id: self.end_id,
            rel_type: self.rel_type.clone(),
            end_id: self.start_id,
            relationship_id: self.relationship_id,
            start_type: self.end_type.clone(),
            end_type: self.start_type.clone(),
        }
    }

    pub fn touches(&self, id: i64) -> bool {
        self.start_id == id || self.end_id == id
    }

    /// The endpoint opposite `id`, if `id` is one of the endpoints.
    pub fn other_end(&self, id: i64) -> Option<i64> {
        if self.start_id == id {
            Some(self.end_id)
        } else if self.end_id == id {
            Some(self.start_id)
        } else {
            None
        }
    }
}

impl PartialEq for MappedRelationship {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for MappedRelationship {}

impl Hash for MappedRelationship {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for MappedRelationship {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MappedRelationship {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for MappedRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.relationship_id {
            Some(rid) => write!(
                f,
                "({})-[{}:{}]->({})",
                self.start_id, rid, self.rel_type, self.end_id
            ),
            None => write!(f, "({})-[:{}]->({})", self.start_id, self.rel_type, self.end_id),
        }
    }
}

// ── Query records ────────────────────────────────────────────────

/// A node as returned by a read query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: i64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// An edge as returned by a read query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(rename = "startId")]
    pub start: i64,
    #[serde(rename = "endId")]
    pub end: i64,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// The node and relationship records of one query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphModel {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRecord>,
}

impl GraphModel {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}
