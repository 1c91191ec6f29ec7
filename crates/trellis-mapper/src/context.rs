//! Identity map and relationship registry shared by the save and load paths.
//!
//! A `MappingContext` belongs to one session. It records which object stands
//! for each store id, a fingerprint of every object as of its last sync, and
//! the set of edges known to exist in the store. The hydrator fills it; the
//! differ narrows and extends it; callers clear it when its state can no
//! longer be trusted (for example after an external rollback).
//!
//! The context performs no locking. Concurrent loads and saves against the
//! same context must be serialized by the caller.

use std::collections::{BTreeMap, BTreeSet};

use trellis_core::error::Result;
use trellis_core::{
    Direction, EntitySchema, MappedRelationship, ObjectGraph, ObjectRef, RelationshipField,
};

use crate::memo::EntityMemo;

#[derive(Debug, Clone, Default)]
pub struct MappingContext {
    node_entities: BTreeMap<i64, ObjectRef>,
    relationship_entities: BTreeMap<i64, ObjectRef>,
    types: BTreeMap<String, BTreeSet<ObjectRef>>,
    relationships: BTreeSet<MappedRelationship>,
    memo: EntityMemo,
}

impl MappingContext {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Identity map ─────────────────────────────────────────────

    /// Register `obj` as the node entity for `id`. If another object is
    /// already registered for that id, nothing changes and the cached
    /// object is returned instead.
    pub fn register(&mut self, graph: &ObjectGraph, obj: ObjectRef, id: i64) -> ObjectRef {
        if let Some(&existing) = self.node_entities.get(&id) {
            return existing;
        }
        self.node_entities.insert(id, obj);
        self.track(graph, obj);
        tracing::debug!(id, object = %obj, "context-init: node entity");
        obj
    }

    /// Register `obj` as the relationship entity for edge `id`. Idempotent
    /// in the same way as [`MappingContext::register`].
    pub fn register_relationship_entity(
        &mut self,
        graph: &ObjectGraph,
        obj: ObjectRef,
        id: i64,
    ) -> ObjectRef {
        if let Some(&existing) = self.relationship_entities.get(&id) {
            return existing;
        }
        self.relationship_entities.insert(id, obj);
        self.track(graph, obj);
        tracing::debug!(id, object = %obj, "context-init: relationship entity");
        obj
    }

    fn track(&mut self, graph: &ObjectGraph, obj: ObjectRef) {
        if let Some(entity) = graph.get(obj) {
            self.types
                .entry(entity.class.clone())
                .or_default()
                .insert(obj);
            self.memo.remember(obj, entity);
        }
    }

    fn untrack(&mut self, obj: ObjectRef) {
        self.memo.forget(obj);
        for objects in self.types.values_mut() {
            objects.remove(&obj);
        }
        self.types.retain(|_, objects| !objects.is_empty());
    }

    pub fn node_entity(&self, id: i64) -> Option<ObjectRef> {
        self.node_entities.get(&id).copied()
    }

    pub fn relationship_entity(&self, id: i64) -> Option<ObjectRef> {
        self.relationship_entities.get(&id).copied()
    }

    pub fn node_count(&self) -> usize {
        self.node_entities.len()
    }

    /// Registered objects whose class is `class` or one of its subclasses.
    pub fn entities_of_type(&self, schema: &dyn EntitySchema, class: &str) -> Vec<ObjectRef> {
        let mut found: Vec<ObjectRef> = self
            .types
            .iter()
            .filter(|(runtime, _)| schema.is_assignable(class, runtime))
            .flat_map(|(_, objects)| objects.iter().copied())
            .collect();
        found.sort();
        found
    }

    /// Drop a node from the identity map without touching its relationships.
    pub(crate) fn evict_node(&mut self, id: i64) -> Option<ObjectRef> {
        let obj = self.node_entities.remove(&id)?;
        self.untrack(obj);
        tracing::debug!(id, object = %obj, "flushing stale node entity");
        Some(obj)
    }

    pub(crate) fn evict_relationship_entity(&mut self, id: i64) -> Option<ObjectRef> {
        let obj = self.relationship_entities.remove(&id)?;
        self.untrack(obj);
        Some(obj)
    }

    // ── Relationship registry ────────────────────────────────────

    pub fn relationships(&self) -> impl Iterator<Item = &MappedRelationship> + '_ {
        self.relationships.iter()
    }

    pub fn contains_relationship(&self, rel: &MappedRelationship) -> bool {
        self.relationships.contains(rel)
    }

    /// Record an edge as existing in the store. The relationship id is kept
    /// only when it belongs to a registered relationship entity.
    pub fn add_relationship(&mut self, mut rel: MappedRelationship) -> bool {
        if let Some(rid) = rel.relationship_id {
            if !self.relationship_entities.contains_key(&rid) {
                rel.relationship_id = None;
            }
        }
        self.relationships.insert(rel)
    }

    pub fn remove_relationship(&mut self, rel: &MappedRelationship) -> bool {
        self.relationships.remove(rel)
    }

    pub fn has_relationships(&self, id: i64) -> bool {
        self.relationships.iter().any(|r| r.touches(id))
    }

    /// Whether `rel`, seen from node `id` in `direction`, is one of the
    /// edges managed by `field`.
    pub(crate) fn belongs_to_field(
        &self,
        schema: &dyn EntitySchema,
        graph: &ObjectGraph,
        id: i64,
        field: &RelationshipField,
        direction: Direction,
        rel: &MappedRelationship,
    ) -> bool {
        let oriented = match direction {
            Direction::Outgoing => rel.start_id == id,
            Direction::Incoming => rel.end_id == id,
            Direction::Undirected => rel.touches(id),
        };
        if !oriented || rel.rel_type != field.rel_type {
            return false;
        }

        if schema.is_relationship_entity(&field.target) {
            rel.relationship_id
                .and_then(|rid| self.relationship_entity(rid))
                .and_then(|obj| graph.get(obj))
                .is_some_and(|re| schema.is_assignable(&field.target, &re.class))
        } else {
            let counterpart = if direction == Direction::Incoming {
                &rel.start_type
            } else {
                &rel.end_type
            };
            rel.relationship_id.is_none() && schema.is_assignable(&field.target, counterpart)
        }
    }

    // ── Dirty tracking ───────────────────────────────────────────

    /// Re-snapshot an object after it has been synced.
    pub fn remember(&mut self, graph: &ObjectGraph, obj: ObjectRef) {
        if let Some(entity) = graph.get(obj) {
            self.memo.remember(obj, entity);
        }
    }

    /// Whether the object's properties or labels differ from the last sync.
    /// Objects without a store id always have changes.
    pub fn has_property_changes(&self, graph: &ObjectGraph, obj: ObjectRef) -> bool {
        match graph.get(obj) {
            Some(entity) if entity.id.is_some() => !self.memo.is_current(obj, entity),
            _ => true,
        }
    }

    /// Whether the object differs from its last-synced state, either in its
    /// properties or in the relationships its own fields describe.
    pub fn is_dirty(&self, schema: &dyn EntitySchema, graph: &ObjectGraph, obj: ObjectRef) -> bool {
        if self.has_property_changes(graph, obj) {
            return true;
        }
        match graph.get(obj) {
            Some(entity) if !entity.is_relationship_entity() => {
                self.relationships_changed(schema, graph, obj)
            }
            _ => false,
        }
    }

    fn relationships_changed(
        &self,
        schema: &dyn EntitySchema,
        graph: &ObjectGraph,
        obj: ObjectRef,
    ) -> bool {
        let Some(entity) = graph.get(obj) else {
            return true;
        };
        let Some(id) = entity.id else {
            return true;
        };
        let Some(class) = schema.class_info(&entity.class) else {
            return false;
        };

        for field in &class.relationships {
            let mut actual: BTreeSet<MappedRelationship> = self
                .relationships
                .iter()
                .filter(|rel| {
                    [Direction::Outgoing, Direction::Incoming]
                        .into_iter()
                        .filter(|d| field.direction.accepts(*d))
                        .any(|d| self.belongs_to_field(schema, graph, id, field, d, rel))
                })
                .cloned()
                .collect();

            let mut expected = BTreeSet::new();
            for target in entity.related_refs(&field.name) {
                let Some(related) = graph.get(target) else {
                    return true;
                };

                if related.is_relationship_entity() {
                    let start = related.start.and_then(|r| graph.id_of(r));
                    let end = related.end.and_then(|r| graph.id_of(r));
                    let (Some(start), Some(end), Some(rid)) = (start, end, related.id) else {
                        return true;
                    };
                    let rel_type = schema
                        .class_info(&related.class)
                        .and_then(|c| c.rel_type())
                        .unwrap_or(&field.rel_type);
                    expected.insert(MappedRelationship::new(start, rel_type, end, Some(rid), "", ""));
                    continue;
                }

                let Some(other) = related.id else {
                    return true;
                };
                let (start, end) = match field.direction {
                    Direction::Incoming => (other, id),
                    _ => (id, other),
                };
                let mut edge = MappedRelationship::new(start, &field.rel_type, end, None, "", "");
                if !self.relationships.contains(&edge) {
                    let reversed = edge.reversed();
                    let mirrored =
                        field.direction == Direction::Undirected || related.class == entity.class;
                    if mirrored && self.relationships.contains(&reversed) {
                        actual.insert(reversed.clone());
                        edge = reversed;
                    }
                }
                expected.insert(edge);
            }

            if expected != actual {
                return true;
            }
        }
        false
    }

    /// Dynamic labels node `id` carried when it was last synced.
    pub fn label_history(&self, id: i64) -> BTreeSet<String> {
        self.node_entity(id)
            .and_then(|obj| self.memo.labels(obj))
            .cloned()
            .unwrap_or_default()
    }

    // ── Detach / reset ───────────────────────────────────────────

    /// Remove node `id` from the identity map together with every
    /// relationship touching it. Relationship entities backing those edges
    /// are detached as well. Returns whether anything was removed.
    pub fn detach(&mut self, id: i64) -> bool {
        let mut removed = self.evict_node(id).is_some();

        let touching: Vec<MappedRelationship> = self
            .relationships
            .iter()
            .filter(|r| r.touches(id))
            .cloned()
            .collect();
        for rel in touching {
            tracing::debug!(%rel, "context-del");
            self.relationships.remove(&rel);
            if let Some(rid) = rel.relationship_id {
                self.evict_relationship_entity(rid);
            }
            removed = true;
        }
        removed
    }

    /// Remove relationship entity `id` and the edge it backs.
    pub fn detach_relationship_entity(&mut self, id: i64) -> bool {
        let mut removed = self.evict_relationship_entity(id).is_some();
        let before = self.relationships.len();
        self.relationships
            .retain(|r| r.relationship_id != Some(id));
        removed |= before != self.relationships.len();
        removed
    }

    /// Forget an object entirely and clear its store id, so that a later
    /// save treats it as new.
    pub fn reset(&mut self, graph: &mut ObjectGraph, obj: ObjectRef) -> Result<()> {
        let entity = graph.entity(obj)?;
        if let Some(id) = entity.id {
            if entity.is_relationship_entity() {
                self.detach_relationship_entity(id);
            } else {
                self.detach(id);
            }
        }
        self.untrack(obj);
        graph.entity_mut(obj)?.id = None;
        Ok(())
    }

    /// Objects linked to `obj` through a registered relationship. For a
    /// relationship entity these are its start and end nodes.
    pub fn neighbours(&self, graph: &ObjectGraph, obj: ObjectRef) -> Vec<ObjectRef> {
        let Some(entity) = graph.get(obj) else {
            return Vec::new();
        };
        if entity.is_relationship_entity() {
            return entity.start.into_iter().chain(entity.end).collect();
        }
        let Some(id) = entity.id else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for rel in self.relationships.iter() {
            let Some(other) = rel.other_end(id) else {
                continue;
            };
            if let Some(neighbour) = self.node_entity(other) {
                if neighbour != obj && !found.contains(&neighbour) {
                    found.push(neighbour);
                }
            }
        }
        found
    }

    pub fn clear(&mut self) {
        self.node_entities.clear();
        self.relationship_entities.clear();
        self.types.clear();
        self.relationships.clear();
        self.memo.clear();
    }
}
