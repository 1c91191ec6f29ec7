//! Write intents produced by the differ and the ordered plan built from them.
//!
//! Store identities and provisional references share one `i64` space in a
//! plan: non-negative values are ids already assigned by the store, negative
//! values denote nodes or edges created earlier in the same plan.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use trellis_core::{ObjectRef, PropertyMap};

// ── Builders ─────────────────────────────────────────────────────

/// Create or update intent for one node.
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    /// Store id, or the provisional reference of a new node.
    pub reference: i64,
    pub object: ObjectRef,
    pub labels: Vec<String>,
    pub removed_labels: Vec<String>,
    pub properties: PropertyMap,
    pub is_new: bool,
    /// Whether the node's properties or labels changed since the last sync.
    pub dirty: bool,
}

impl NodeBuilder {
    fn operation(&self) -> Option<WriteOperation> {
        if self.is_new {
            return Some(WriteOperation::CreateNode {
                reference: self.reference,
                labels: self.labels.clone(),
                properties: self.properties.clone(),
            });
        }
        if !self.dirty && self.removed_labels.is_empty() {
            return None;
        }
        Some(WriteOperation::MatchNode {
            id: self.reference,
            labels: self.labels.clone(),
            removed_labels: self.removed_labels.clone(),
            properties: self.properties.clone(),
        })
    }
}

/// Create or update intent for one edge, oriented from `start` to `end`.
#[derive(Debug, Clone)]
pub struct RelationshipBuilder {
    /// Store id of an existing edge, or the provisional reference of a new one.
    pub reference: i64,
    pub rel_type: String,
    pub start: i64,
    pub end: i64,
    /// Plain edges are merged (at most one per type between two nodes);
    /// relationship entities may repeat.
    pub singleton: bool,
    pub is_new: bool,
    pub relationship_entity: Option<ObjectRef>,
    /// Set when mirrored fields on both endpoints describe this edge.
    pub bidirectional: bool,
    pub properties: PropertyMap,
    pub dirty: bool,
}

impl RelationshipBuilder {
    fn operation(&self) -> Option<WriteOperation> {
        if self.is_new {
            return Some(WriteOperation::CreateRel {
                reference: self.reference,
                rel_type: self.rel_type.clone(),
                start: self.start,
                end: self.end,
                properties: self.properties.clone(),
                singleton: self.singleton,
            });
        }
        self.dirty.then(|| WriteOperation::MatchRel {
            id: self.reference,
            rel_type: self.rel_type.clone(),
            properties: self.properties.clone(),
        })
    }
}

// ── Plan ─────────────────────────────────────────────────────────

/// A single graph write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOperation {
    CreateNode {
        reference: i64,
        labels: Vec<String>,
        properties: PropertyMap,
    },
    MatchNode {
        id: i64,
        labels: Vec<String>,
        removed_labels: Vec<String>,
        properties: PropertyMap,
    },
    CreateRel {
        reference: i64,
        rel_type: String,
        start: i64,
        end: i64,
        properties: PropertyMap,
        singleton: bool,
    },
    MatchRel {
        id: i64,
        rel_type: String,
        properties: PropertyMap,
    },
    DeleteRel {
        start: i64,
        rel_type: String,
        end: i64,
        id: Option<i64>,
    },
}

impl WriteOperation {
    fn rank(&self) -> u8 {
        match self {
            Self::CreateNode { .. } => 0,
            Self::CreateRel { .. } => 1,
            Self::MatchNode { .. } => 2,
            Self::MatchRel { .. } => 3,
            Self::DeleteRel { id: None, .. } => 4,
            Self::DeleteRel { id: Some(_), .. } => 5,
        }
    }
}

/// Ordered write operations for one save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WritePlan {
    pub operations: Vec<WriteOperation>,
}

impl WritePlan {
    /// Order builder output as node creates, edge creates, node updates,
    /// edge updates, then deletes (plain edges before relationship entities).
    /// Relative order within each group is preserved.
    pub fn from_builders(
        nodes: &[NodeBuilder],
        relationships: &[RelationshipBuilder],
        deletes: Vec<WriteOperation>,
    ) -> Self {
        let mut operations: Vec<WriteOperation> = nodes
            .iter()
            .filter_map(NodeBuilder::operation)
            .chain(relationships.iter().filter_map(RelationshipBuilder::operation))
            .chain(deletes)
            .collect();
        operations.sort_by_key(WriteOperation::rank);
        Self { operations }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for op in &self.operations {
            match op {
                WriteOperation::CreateNode { .. } => summary.nodes_created += 1,
                WriteOperation::MatchNode { .. } => summary.nodes_updated += 1,
                WriteOperation::CreateRel { .. } => summary.relationships_created += 1,
                WriteOperation::MatchRel { .. } => summary.relationships_updated += 1,
                WriteOperation::DeleteRel { .. } => summary.relationships_deleted += 1,
            }
        }
        summary
    }
}

/// Operation counts of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub nodes_created: u32,
    pub nodes_updated: u32,
    pub relationships_created: u32,
    pub relationships_updated: u32,
    pub relationships_deleted: u32,
}

/// Store ids assigned while executing a plan, keyed by provisional reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAcknowledgement {
    #[serde(default)]
    pub nodes: BTreeMap<i64, i64>,
    #[serde(default)]
    pub relationships: BTreeMap<i64, i64>,
}

impl WriteAcknowledgement {
    /// Map a plan reference to a store id. Non-negative references are
    /// already store ids.
    pub fn node_id(&self, reference: i64) -> Option<i64> {
        if reference >= 0 {
            Some(reference)
        } else {
            self.nodes.get(&reference).copied()
        }
    }

    pub fn relationship_id(&self, reference: i64) -> Option<i64> {
        if reference >= 0 {
            Some(reference)
        } else {
            self.relationships.get(&reference).copied()
        }
    }
}
