//! Save path: diff a mutated object graph against the mapping context.
//!
//! The differ walks the object graph depth-first from one or more roots,
//! producing a node builder per visited object and a relationship builder
//! per edge that must be created or updated. Edges the mapping context
//! knows about but that no visited relationship field still references are
//! swept into deletes at the end of the pass.
//!
//! Traversal only reads the mapping context. The context is updated once
//! traversal has succeeded: obsolete edges are removed straight away, and
//! new identities and edges are registered when the resulting [`SavePlan`]
//! is committed.

use trellis_core::error::{MappingError, Result};
use trellis_core::{
    Direction, EntitySchema, MappedRelationship, ObjectGraph, ObjectRef, PropertyMap,
    RelationshipField, Value,
};

use crate::commit::SavePlan;
use crate::compile::{CreatedRelationship, DifferContext};
use crate::context::MappingContext;
use crate::plan::{NodeBuilder, RelationshipBuilder, WriteOperation, WritePlan};

pub struct ObjectGraphDiffer<'a> {
    schema: &'a dyn EntitySchema,
    context: &'a mut MappingContext,
}

impl<'a> ObjectGraphDiffer<'a> {
    pub fn new(schema: &'a dyn EntitySchema, context: &'a mut MappingContext) -> Self {
        Self { schema, context }
    }

    /// Diff everything reachable from `root` within `horizon` hops
    /// (`-1` unlimited, `0` properties only).
    pub fn diff(&mut self, graph: &ObjectGraph, root: ObjectRef, horizon: i32) -> Result<SavePlan> {
        self.diff_all(graph, &[root], horizon)
    }

    pub fn diff_all(
        &mut self,
        graph: &ObjectGraph,
        roots: &[ObjectRef],
        horizon: i32,
    ) -> Result<SavePlan> {
        let mut pass = Pass {
            schema: self.schema,
            context: &*self.context,
            graph,
            state: DifferContext::new(self.context),
        };
        for &root in roots {
            pass.map_root(root, horizon)?;
        }
        let state = pass.state;

        let deletes = sweep(self.context, &state);
        let plan = WritePlan::from_builders(&state.nodes, &state.relationships, deletes);
        tracing::debug!(
            operations = plan.len(),
            new_nodes = state.new_nodes.len(),
            "write plan compiled"
        );

        Ok(SavePlan {
            plan,
            visited: state.visited_objects(),
            new_nodes: state.new_nodes,
            created: state.created,
            id_resets: state.id_resets,
        })
    }
}

/// Remove every edge no longer registered in this pass from the mapping
/// context, returning the matching delete operations.
fn sweep(context: &mut MappingContext, state: &DifferContext) -> Vec<WriteOperation> {
    let obsolete: Vec<MappedRelationship> = context
        .relationships()
        .filter(|rel| !state.registered.contains(rel))
        .cloned()
        .collect();

    let mut deletes = Vec::with_capacity(obsolete.len());
    for rel in &obsolete {
        tracing::debug!(%rel, "context-del");
        deletes.push(WriteOperation::DeleteRel {
            start: rel.start_id,
            rel_type: rel.rel_type.clone(),
            end: rel.end_id,
            id: rel.relationship_id,
        });
        context.remove_relationship(rel);
        if let Some(rid) = rel.relationship_id {
            context.evict_relationship_entity(rid);
        }
    }

    // Endpoints we did not look at and that are no longer connected to
    // anything known may be stale.
    for rel in &obsolete {
        for id in [rel.start_id, rel.end_id] {
            let Some(obj) = context.node_entity(id) else {
                continue;
            };
            if !state.is_visited(obj) && !context.has_relationships(id) {
                context.evict_node(id);
            }
        }
    }
    deletes
}

fn next_horizon(horizon: i32) -> i32 {
    if horizon < 0 {
        horizon
    } else {
        horizon - 1
    }
}

// ── Traversal ────────────────────────────────────────────────────

struct Pass<'p> {
    schema: &'p dyn EntitySchema,
    context: &'p MappingContext,
    graph: &'p ObjectGraph,
    state: DifferContext,
}

impl<'p> Pass<'p> {
    fn map_root(&mut self, obj: ObjectRef, horizon: i32) -> Result<()> {
        let entity = self.graph.entity(obj)?;
        if !entity.is_relationship_entity() && !self.schema.is_relationship_entity(&entity.class) {
            self.map_entity(obj, horizon)?;
            return Ok(());
        }

        let (start, end) = self.endpoints(obj)?;
        self.map_entity(start, horizon)?;
        self.map_entity(end, horizon)?;

        if self.state.visited_relationship_entity(obj) {
            tracing::debug!(object = %obj, "relationship entity already visited");
            return Ok(());
        }
        let builder = self.relationship_entity_builder(obj)?;
        self.finish_relationship_entity(obj, builder, start, end)
    }

    /// Start and end of a relationship entity, both required.
    fn endpoints(&self, obj: ObjectRef) -> Result<(ObjectRef, ObjectRef)> {
        let entity = self.graph.entity(obj)?;
        if !self.schema.is_relationship_entity(&entity.class) {
            return Err(MappingError::NotARelationshipEntity(entity.class.clone()));
        }
        let missing = |side| MappingError::MissingEndpoint {
            class: entity.class.clone(),
            object: obj,
            side,
        };
        let start = entity.start.ok_or_else(|| missing("start"))?;
        let end = entity.end.ok_or_else(|| missing("end"))?;
        Ok((start, end))
    }

    /// Plan reference of an object: its store id, or its provisional id.
    fn reference(&self, obj: ObjectRef) -> i64 {
        self.state
            .visited_node(obj)
            .map(|b| b.reference)
            .or_else(|| self.graph.id_of(obj))
            .unwrap_or_else(|| obj.provisional_id())
    }

    fn class_name(&self, obj: ObjectRef) -> String {
        self.graph
            .get(obj)
            .map(|e| e.class.clone())
            .unwrap_or_default()
    }

    fn declared_properties(&self, obj: ObjectRef) -> Result<PropertyMap> {
        let entity = self.graph.entity(obj)?;
        let class = self.schema.require(&entity.class)?;
        Ok(class
            .properties
            .iter()
            .map(|name| {
                let value = entity.property(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect())
    }

    // ── Nodes ────────────────────────────────────────────────────

    fn map_entity(&mut self, obj: ObjectRef, horizon: i32) -> Result<i64> {
        if let Some(builder) = self.state.visited_node(obj) {
            tracing::debug!(object = %obj, "already visited");
            return Ok(builder.reference);
        }

        let graph = self.graph;
        let entity = graph.entity(obj)?;
        let class = self.schema.require(&entity.class)?;
        if class.is_relationship_entity() {
            return Err(MappingError::NotANodeEntity(entity.class.clone()));
        }
        tracing::debug!(object = %obj, class = %entity.class, "visiting");

        let mut labels = class.labels.clone();
        for label in &entity.labels {
            if !labels.contains(label) {
                labels.push(label.clone());
            }
        }

        let dirty = self.context.has_property_changes(graph, obj);
        let properties = if dirty {
            tracing::debug!(object = %obj, "has changed");
            self.declared_properties(obj)?
        } else {
            PropertyMap::new()
        };

        let (reference, is_new, removed_labels) = match entity.id {
            Some(id) => {
                let removed = self
                    .context
                    .label_history(id)
                    .into_iter()
                    .filter(|l| !entity.labels.contains(l))
                    .collect();
                (id, false, removed)
            }
            None => (obj.provisional_id(), true, Vec::new()),
        };

        self.state.visit(NodeBuilder {
            reference,
            object: obj,
            labels,
            removed_labels,
            properties,
            is_new,
            dirty,
        });

        if horizon != 0 {
            self.map_references(obj, next_horizon(horizon))?;
        } else {
            tracing::debug!(object = %obj, "at horizon");
        }
        Ok(reference)
    }

    fn map_references(&mut self, obj: ObjectRef, horizon: i32) -> Result<()> {
        let graph = self.graph;
        let schema = self.schema;
        let entity = graph.entity(obj)?;
        let class = schema.require(&entity.class)?;
        tracing::debug!(object = %obj, "mapping references");

        for field in &class.relationships {
            if let Some(id) = entity.id {
                if !self.state.deregister(self.context, schema, graph, id, field) {
                    tracing::debug!(
                        object = %obj,
                        field = %field.name,
                        "relationship is already being managed"
                    );
                    continue;
                }
            }

            let mut both_ways = None;
            for target in entity.related_refs(&field.name) {
                let bidirectional = *both_ways
                    .get_or_insert_with(|| self.both_way_mapping_required(obj, field, target));
                self.link(obj, field, target, horizon, bidirectional)?;
            }
        }
        Ok(())
    }

    /// Whether `target` holds `source` in a field of the same type and
    /// direction, so that the pair describes a single edge.
    fn both_way_mapping_required(
        &self,
        source: ObjectRef,
        field: &RelationshipField,
        target: ObjectRef,
    ) -> bool {
        if field.direction == Direction::Undirected {
            return false;
        }
        let (Some(src), Some(tgt)) = (self.graph.get(source), self.graph.get(target)) else {
            return false;
        };
        if src.class != tgt.class {
            return false;
        }
        let Some(tgt_class) = self.schema.class_info(&tgt.class) else {
            return false;
        };
        tgt_class.relationships.iter().any(|f| {
            f.direction == field.direction
                && f.rel_type == field.rel_type
                && tgt.related(&f.name).is_some_and(|v| v.contains(source))
        })
    }

    fn link(
        &mut self,
        source: ObjectRef,
        field: &RelationshipField,
        target: ObjectRef,
        horizon: i32,
        bidirectional: bool,
    ) -> Result<()> {
        tracing::debug!(
            source = %source,
            target = %target,
            direction = if bidirectional { "both" } else { "one" },
            "linking"
        );
        let target_entity = self.graph.entity(target)?;
        if target_entity.is_relationship_entity()
            || self.schema.is_relationship_entity(&target_entity.class)
        {
            if self.state.visited_relationship_entity(target) {
                tracing::debug!(object = %target, "relationship entity already visited");
                return Ok(());
            }
            return self.map_relationship_entity(source, target, horizon);
        }

        self.map_entity(target, horizon)?;
        let (start, end) = match field.direction {
            Direction::Incoming => (target, source),
            _ => (source, target),
        };
        self.update_relationship(start, end, &field.rel_type, field.direction, bidirectional);
        Ok(())
    }

    // ── Plain edges ──────────────────────────────────────────────

    fn update_relationship(
        &mut self,
        start: ObjectRef,
        end: ObjectRef,
        rel_type: &str,
        direction: Direction,
        bidirectional: bool,
    ) {
        if let (Some(s), Some(e)) = (self.graph.id_of(start), self.graph.id_of(end)) {
            let rel = MappedRelationship::new(
                s,
                rel_type,
                e,
                None,
                self.class_name(start),
                self.class_name(end),
            );
            if self.context.contains_relationship(&rel) {
                self.state.register_relationship(rel);
                return;
            }
            if direction == Direction::Undirected || bidirectional {
                let reversed = rel.reversed();
                if self.context.contains_relationship(&reversed) {
                    self.state.register_relationship(reversed);
                    return;
                }
            }
        }
        self.maybe_create_relationship(start, end, rel_type, bidirectional);
    }

    fn maybe_create_relationship(
        &mut self,
        start: ObjectRef,
        end: ObjectRef,
        rel_type: &str,
        bidirectional: bool,
    ) {
        let (s, e) = (self.reference(start), self.reference(end));
        if self.state.has_transient_relationship(s, rel_type, e) {
            tracing::debug!(start = s, rel_type, end = e, "new relationship is already registered");
            return;
        }

        let reference = -((self.graph.len() + 1 + self.state.created_count()) as i64);
        tracing::debug!(start = s, reference, rel_type, end = e, "context-new");
        self.state.log_transient(s, rel_type, e);
        self.state.created.push(CreatedRelationship {
            reference,
            start,
            rel_type: rel_type.to_string(),
            end,
            relationship_entity: None,
        });
        self.state.add_relationship_builder(RelationshipBuilder {
            reference,
            rel_type: rel_type.to_string(),
            start: s,
            end: e,
            singleton: true,
            is_new: true,
            relationship_entity: None,
            bidirectional,
            properties: PropertyMap::new(),
            dirty: true,
        });
    }

    // ── Relationship entities ────────────────────────────────────

    /// Whether the edge registered for relationship entity `id` no longer
    /// connects the entity's current endpoints.
    fn relationship_ends_changed(&self, id: i64, start: ObjectRef, end: ObjectRef) -> bool {
        let start_id = self.graph.id_of(start);
        let end_id = self.graph.id_of(end);
        self.context
            .relationships()
            .filter(|rel| rel.relationship_id == Some(id))
            .any(|rel| start_id != Some(rel.start_id) || end_id != Some(rel.end_id))
    }

    /// Builder for a relationship entity's edge. Marks the entity visited.
    fn relationship_entity_builder(&mut self, obj: ObjectRef) -> Result<RelationshipBuilder> {
        let (start, end) = self.endpoints(obj)?;
        let entity = self.graph.entity(obj)?;
        let class = self.schema.require(&entity.class)?;
        let rel_type = class
            .rel_type()
            .ok_or_else(|| MappingError::NotARelationshipEntity(entity.class.clone()))?
            .to_string();
        self.state.visit_relationship_entity(obj);

        let ends_changed = entity
            .id
            .is_some_and(|id| self.relationship_ends_changed(id, start, end));
        let (reference, is_new) = match entity.id {
            Some(id) if !ends_changed => (id, false),
            Some(id) => {
                tracing::debug!(object = %obj, id, "relationship entity endpoints changed");
                self.state.id_resets.push((obj, id));
                (obj.provisional_id(), true)
            }
            None => (obj.provisional_id(), true),
        };

        let dirty = is_new || self.context.has_property_changes(self.graph, obj);
        let properties = if dirty {
            self.declared_properties(obj)?
        } else {
            PropertyMap::new()
        };

        Ok(RelationshipBuilder {
            reference,
            rel_type,
            start: 0,
            end: 0,
            singleton: false,
            is_new,
            relationship_entity: Some(obj),
            bidirectional: false,
            properties,
            dirty,
        })
    }

    /// Reached a relationship entity through a field of `parent`: map the
    /// endpoint on the far side, then the edge itself.
    fn map_relationship_entity(
        &mut self,
        parent: ObjectRef,
        obj: ObjectRef,
        horizon: i32,
    ) -> Result<()> {
        tracing::debug!(object = %obj, "mapping relationship entity");
        let builder = self.relationship_entity_builder(obj)?;
        let (start, end) = self.endpoints(obj)?;

        let other = if parent == end { start } else { end };
        if !self.state.is_visited(other) {
            self.map_entity(other, horizon)?;
        }
        self.finish_relationship_entity(obj, builder, start, end)
    }

    fn finish_relationship_entity(
        &mut self,
        obj: ObjectRef,
        mut builder: RelationshipBuilder,
        start: ObjectRef,
        end: ObjectRef,
    ) -> Result<()> {
        builder.start = self.reference(start);
        builder.end = self.reference(end);

        if builder.is_new {
            tracing::debug!(
                start = builder.start,
                reference = builder.reference,
                rel_type = %builder.rel_type,
                end = builder.end,
                "context-new"
            );
            self.state.created.push(CreatedRelationship {
                reference: builder.reference,
                start,
                rel_type: builder.rel_type.clone(),
                end,
                relationship_entity: Some(obj),
            });
            self.state.add_relationship_builder(builder);
            return Ok(());
        }

        if let (Some(s), Some(e)) = (self.graph.id_of(start), self.graph.id_of(end)) {
            let rel = MappedRelationship::new(
                s,
                builder.rel_type.clone(),
                e,
                Some(builder.reference),
                self.class_name(start),
                self.class_name(end),
            );
            if self.context.contains_relationship(&rel) {
                self.state.register_relationship(rel);
            }
        }
        if builder.dirty {
            tracing::debug!(object = %obj, "relationship entity has changed");
            self.state.add_relationship_builder(builder);
        }
        Ok(())
    }
}
