//! Load path: turn node and relationship records into domain objects.
//!
//! Records are merged into the session's object graph. A record whose id is
//! already registered in the mapping context resolves to the cached object,
//! left as it is, so every store id maps to exactly one object no matter how
//! many queries returned it and unsaved edits survive a reload.
//!
//! Relationship records are written into the relationship fields of their
//! endpoints. Scalar fields are set immediately; collection fields are
//! accumulated and written once at the end, merged with whatever the field
//! already held.

use serde::Serialize;

use trellis_core::error::Result;
use trellis_core::{
    ClassInfo, DefaultInstantiator, Direction, Entity, EntityInstantiator, EntityKind,
    EntitySchema, GraphModel, MappedRelationship, NodeRecord, ObjectGraph, ObjectRef,
    PropertyMap, RelationshipRecord,
};

use crate::collector::{CollectorKey, EntityCollector};
use crate::context::MappingContext;

/// Counters describing one hydration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HydrationReport {
    pub nodes_mapped: u32,
    pub unmapped_nodes: u32,
    pub relationships_mapped: u32,
    pub skipped_relationships: u32,
}

/// Objects selected from a hydration, plus its report.
#[derive(Debug, Clone, Default)]
pub struct Hydration {
    pub objects: Vec<ObjectRef>,
    pub report: HydrationReport,
}

pub struct GraphHydrator<'a> {
    schema: &'a dyn EntitySchema,
    context: &'a mut MappingContext,
    instantiator: &'a dyn EntityInstantiator,
}

impl<'a> GraphHydrator<'a> {
    pub fn new(schema: &'a dyn EntitySchema, context: &'a mut MappingContext) -> Self {
        Self {
            schema,
            context,
            instantiator: &DefaultInstantiator,
        }
    }

    pub fn with_instantiator(mut self, instantiator: &'a dyn EntityInstantiator) -> Self {
        self.instantiator = instantiator;
        self
    }

    /// Merge `model` into `graph` and return the objects assignable to
    /// `requested`: nodes in result order, or, when no node qualifies,
    /// relationship entities in result order.
    pub fn hydrate(
        &mut self,
        graph: &mut ObjectGraph,
        model: &GraphModel,
        requested: &str,
    ) -> Result<Hydration> {
        let mut report = HydrationReport::default();

        for record in &model.nodes {
            if self.map_node(graph, record)?.is_some() {
                report.nodes_mapped += 1;
            } else {
                report.unmapped_nodes += 1;
            }
        }

        let mut collector = EntityCollector::default();
        let mut relationship_entities = Vec::new();
        for record in &model.relationships {
            let (Some(start), Some(end)) = (
                self.context.node_entity(record.start),
                self.context.node_entity(record.end),
            ) else {
                tracing::warn!(
                    id = record.id,
                    rel_type = %record.rel_type,
                    start = record.start,
                    end = record.end,
                    "relationship endpoint not loaded, skipping"
                );
                report.skipped_relationships += 1;
                continue;
            };

            if let Some(re) = self.map_relationship(graph, record, start, end, &mut collector)? {
                relationship_entities.push(re);
            }
            report.relationships_mapped += 1;
        }

        for (owner, field, values) in collector.into_groups() {
            let entity = graph.entity_mut(owner)?;
            let mut merged = entity.related_refs(&field);
            for value in values {
                if !merged.contains(&value) {
                    merged.push(value);
                }
            }
            entity.set_many(field, merged);
        }

        let objects = self.select(graph, model, &relationship_entities, requested);
        tracing::debug!(
            requested,
            selected = objects.len(),
            nodes = report.nodes_mapped,
            relationships = report.relationships_mapped,
            "hydrated graph model"
        );
        Ok(Hydration { objects, report })
    }

    // ── Nodes ────────────────────────────────────────────────────

    fn map_node(
        &mut self,
        graph: &mut ObjectGraph,
        record: &NodeRecord,
    ) -> Result<Option<ObjectRef>> {
        if let Some(obj) = self.context.node_entity(record.id) {
            return Ok(Some(obj));
        }
        let Some(class) = self.schema.class_for_labels(&record.labels) else {
            tracing::debug!(id = record.id, labels = ?record.labels, "no class mapped for labels");
            return Ok(None);
        };

        let mut entity = self.instantiator.new_instance(class, &record.properties);
        write_properties(class, &record.properties, &mut entity);
        entity.labels = record
            .labels
            .iter()
            .filter(|l| !class.labels.contains(l))
            .cloned()
            .collect();
        entity.id = Some(record.id);
        let obj = graph.insert(entity);

        let obj = self.context.register(graph, obj, record.id);
        self.context.remember(graph, obj);
        Ok(Some(obj))
    }

    // ── Relationships ────────────────────────────────────────────

    /// The relationship entity class mapped to `rel_type` whose endpoint
    /// types accept the given runtime classes.
    fn relationship_entity_class(
        &self,
        rel_type: &str,
        start_class: &str,
        end_class: &str,
    ) -> Option<&'a ClassInfo> {
        let schema = self.schema;
        schema
            .relationship_entity_classes(rel_type)
            .into_iter()
            .find(|class| match &class.kind {
                EntityKind::RelationshipEntity {
                    start_type,
                    end_type,
                    ..
                } => {
                    schema.is_assignable(start_type, start_class)
                        && schema.is_assignable(end_type, end_class)
                }
                EntityKind::Node => false,
            })
    }

    fn map_relationship(
        &mut self,
        graph: &mut ObjectGraph,
        record: &RelationshipRecord,
        start: ObjectRef,
        end: ObjectRef,
        collector: &mut EntityCollector,
    ) -> Result<Option<ObjectRef>> {
        let start_class = graph.entity(start)?.class.clone();
        let end_class = graph.entity(end)?.class.clone();

        let Some(class) = self.relationship_entity_class(&record.rel_type, &start_class, &end_class)
        else {
            let rel_type = record.rel_type.as_str();
            let outgoing =
                self.map_value(graph, start, rel_type, Direction::Outgoing, end, &end_class, collector)?;
            let incoming =
                self.map_value(graph, end, rel_type, Direction::Incoming, start, &start_class, collector)?;
            if outgoing || incoming {
                self.context.add_relationship(MappedRelationship::new(
                    record.start,
                    record.rel_type.clone(),
                    record.end,
                    None,
                    start_class,
                    end_class,
                ));
            }
            return Ok(None);
        };

        let re = match self.context.relationship_entity(record.id) {
            Some(re) => re,
            None => {
                let mut entity = self.instantiator.new_instance(class, &record.properties);
                write_properties(class, &record.properties, &mut entity);
                entity.id = Some(record.id);
                entity.start = Some(start);
                entity.end = Some(end);
                let re = graph.insert(entity);
                let re = self.context.register_relationship_entity(graph, re, record.id);
                self.context.remember(graph, re);
                re
            }
        };
        self.context.add_relationship(MappedRelationship::new(
            record.start,
            record.rel_type.clone(),
            record.end,
            Some(record.id),
            start_class,
            end_class,
        ));

        let rel_type = record.rel_type.as_str();
        self.map_value(graph, start, rel_type, Direction::Outgoing, re, &class.name, collector)?;
        self.map_value(graph, end, rel_type, Direction::Incoming, re, &class.name, collector)?;
        Ok(Some(re))
    }

    /// Write `value` into the field of `owner` that accepts it. Returns
    /// whether such a field exists.
    #[allow(clippy::too_many_arguments)]
    fn map_value(
        &self,
        graph: &mut ObjectGraph,
        owner: ObjectRef,
        rel_type: &str,
        direction: Direction,
        value: ObjectRef,
        value_class: &str,
        collector: &mut EntityCollector,
    ) -> Result<bool> {
        let owner_class = graph.entity(owner)?.class.clone();
        let Some(field) = self
            .schema
            .relationship_writer(&owner_class, rel_type, direction, value_class)?
        else {
            return Ok(false);
        };

        if field.is_scalar() {
            graph.entity_mut(owner)?.set_one(field.name.clone(), Some(value));
        } else {
            collector.collect(
                CollectorKey {
                    owner,
                    rel_type: rel_type.to_string(),
                    direction,
                    element_type: value_class.to_string(),
                },
                &field.name,
                value,
            );
        }
        Ok(true)
    }

    // ── Result selection ─────────────────────────────────────────

    fn select(
        &self,
        graph: &ObjectGraph,
        model: &GraphModel,
        relationship_entities: &[ObjectRef],
        requested: &str,
    ) -> Vec<ObjectRef> {
        let assignable = |obj: &ObjectRef| {
            graph
                .get(*obj)
                .is_some_and(|e| self.schema.is_assignable(requested, &e.class))
        };

        let mut objects = Vec::new();
        for obj in model
            .nodes
            .iter()
            .filter_map(|r| self.context.node_entity(r.id))
            .filter(assignable)
        {
            if !objects.contains(&obj) {
                objects.push(obj);
            }
        }
        if objects.is_empty() {
            for &obj in relationship_entities.iter().filter(|o| assignable(o)) {
                if !objects.contains(&obj) {
                    objects.push(obj);
                }
            }
        }
        objects
    }
}

/// Copy the class's declared properties from a record into an entity.
/// List values are merged with the entity's current list.
fn write_properties(class: &ClassInfo, properties: &PropertyMap, entity: &mut Entity) {
    for name in &class.properties {
        if let Some(value) = properties.get(name) {
            let merged = value.clone().merged_with(entity.properties.get(name));
            entity.properties.insert(name.clone(), merged);
        }
    }
}
