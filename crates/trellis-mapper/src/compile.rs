//! Per-save bookkeeping for the differ.
//!
//! A `DifferContext` lives for exactly one save pass. It starts out believing
//! every relationship registered in the mapping context still exists; as the
//! differ re-examines relationship fields it provisionally deletes the edges
//! each field owns and re-registers the ones the field still references.
//! Whatever is left unregistered at the end of the pass is obsolete.

use std::collections::{BTreeSet, HashMap, HashSet};

use trellis_core::{Direction, EntitySchema, MappedRelationship, ObjectGraph, ObjectRef, RelationshipField};

use crate::context::MappingContext;
use crate::plan::{NodeBuilder, RelationshipBuilder};

/// An edge created in this pass whose endpoints are plan references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientRelationship {
    pub start: i64,
    pub rel_type: String,
    pub end: i64,
}

impl TransientRelationship {
    pub fn equals_ignore_direction(&self, a: i64, rel_type: &str, b: i64) -> bool {
        self.rel_type == rel_type
            && ((self.start == a && self.end == b) || (self.start == b && self.end == a))
    }
}

/// An edge the plan creates, with the objects it connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRelationship {
    pub reference: i64,
    pub start: ObjectRef,
    pub rel_type: String,
    pub end: ObjectRef,
    pub relationship_entity: Option<ObjectRef>,
}

#[derive(Debug, Default)]
pub struct DifferContext {
    visited: HashMap<ObjectRef, usize>,
    visited_relationship_entities: HashSet<ObjectRef>,
    pub(crate) nodes: Vec<NodeBuilder>,
    pub(crate) relationships: Vec<RelationshipBuilder>,
    pub(crate) registered: BTreeSet<MappedRelationship>,
    deleted: Vec<MappedRelationship>,
    transient: Vec<TransientRelationship>,
    pub(crate) new_nodes: Vec<ObjectRef>,
    pub(crate) created: Vec<CreatedRelationship>,
    pub(crate) id_resets: Vec<(ObjectRef, i64)>,
}

impl DifferContext {
    pub fn new(context: &MappingContext) -> Self {
        let registered: BTreeSet<MappedRelationship> = context.relationships().cloned().collect();
        tracing::debug!(
            relationships = registered.len(),
            "context initialised"
        );
        Self {
            registered,
            ..Self::default()
        }
    }

    // ── Visiting ─────────────────────────────────────────────────

    pub fn visited_node(&self, obj: ObjectRef) -> Option<&NodeBuilder> {
        self.visited.get(&obj).map(|&i| &self.nodes[i])
    }

    pub fn visit(&mut self, builder: NodeBuilder) {
        let obj = builder.object;
        if builder.is_new {
            self.new_nodes.push(obj);
        }
        self.nodes.push(builder);
        self.visited.insert(obj, self.nodes.len() - 1);
    }

    pub fn visited_relationship_entity(&self, obj: ObjectRef) -> bool {
        self.visited_relationship_entities.contains(&obj)
    }

    pub fn visit_relationship_entity(&mut self, obj: ObjectRef) {
        self.visited_relationship_entities.insert(obj);
    }

    /// Every object visited in this pass, nodes first.
    pub fn visited_objects(&self) -> Vec<ObjectRef> {
        let mut objects: Vec<ObjectRef> = self.nodes.iter().map(|n| n.object).collect();
        let mut entities: Vec<ObjectRef> = self.visited_relationship_entities.iter().copied().collect();
        entities.sort();
        objects.extend(entities);
        objects
    }

    pub fn is_visited(&self, obj: ObjectRef) -> bool {
        self.visited.contains_key(&obj)
    }

    // ── Relationship bookkeeping ─────────────────────────────────

    pub fn register_relationship(&mut self, rel: MappedRelationship) {
        tracing::debug!(%rel, "context-add");
        self.registered.insert(rel);
    }

    /// Provisionally delete the registered edges owned by `field` on node
    /// `id`. Returns `false` when every such edge had already been deleted
    /// by an earlier field: those edges are restored and the caller should
    /// treat the field as already managed. Returns `true` when edges were
    /// cleared or when there was nothing to clear.
    pub fn deregister(
        &mut self,
        context: &MappingContext,
        schema: &dyn EntitySchema,
        graph: &ObjectGraph,
        id: i64,
        field: &RelationshipField,
    ) -> bool {
        match field.direction {
            Direction::Undirected => {
                let incoming = self.deregister_direction(context, schema, graph, id, field, Direction::Incoming);
                let outgoing = self.deregister_direction(context, schema, graph, id, field, Direction::Outgoing);
                incoming || outgoing
            }
            direction => self.deregister_direction(context, schema, graph, id, field, direction),
        }
    }

    fn deregister_direction(
        &mut self,
        context: &MappingContext,
        schema: &dyn EntitySchema,
        graph: &ObjectGraph,
        id: i64,
        field: &RelationshipField,
        direction: Direction,
    ) -> bool {
        tracing::debug!(id, rel_type = %field.rel_type, %direction, "context-del");
        let mut cleared: Vec<MappedRelationship> = self
            .registered
            .iter()
            .filter(|rel| context.belongs_to_field(schema, graph, id, field, direction, rel))
            .cloned()
            .collect();
        if cleared.is_empty() {
            return true;
        }
        for rel in &cleared {
            self.registered.remove(rel);
        }

        cleared.retain(|rel| {
            if self.deleted.contains(rel) {
                self.registered.insert(rel.clone());
                false
            } else {
                true
            }
        });
        let managed = !cleared.is_empty();
        self.deleted.extend(cleared);
        managed
    }

    // ── New relationships ────────────────────────────────────────

    /// Whether an edge of this type between these plan references was
    /// already created in this pass, in either direction.
    pub fn has_transient_relationship(&self, a: i64, rel_type: &str, b: i64) -> bool {
        self.transient
            .iter()
            .any(|t| t.equals_ignore_direction(a, rel_type, b))
    }

    pub fn log_transient(&mut self, start: i64, rel_type: &str, end: i64) {
        self.transient.push(TransientRelationship {
            start,
            rel_type: rel_type.to_string(),
            end,
        });
    }

    pub fn add_relationship_builder(&mut self, builder: RelationshipBuilder) {
        self.relationships.push(builder);
    }

    pub fn created_count(&self) -> usize {
        self.created.len()
    }
}
