//! Applying a write acknowledgement to the object graph and mapping context.

use trellis_core::error::{MappingError, Result};
use trellis_core::{MappedRelationship, ObjectGraph, ObjectRef};

use crate::compile::CreatedRelationship;
use crate::context::MappingContext;
use crate::plan::{WriteAcknowledgement, WritePlan};

/// Output of one diff: the write plan plus what is needed to bring the
/// mapping context up to date once the plan has been executed.
#[derive(Debug, Clone)]
pub struct SavePlan {
    pub plan: WritePlan,
    /// Objects that get a store id when the plan runs, in visit order.
    pub new_nodes: Vec<ObjectRef>,
    pub created: Vec<CreatedRelationship>,
    /// Relationship entities re-created because their endpoints changed,
    /// with the id of the edge they replace.
    pub id_resets: Vec<(ObjectRef, i64)>,
    pub visited: Vec<ObjectRef>,
}

impl SavePlan {
    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Record the ids assigned by the store. Every reference is checked
    /// before anything is written, so a short acknowledgement changes
    /// nothing.
    pub fn commit(
        self,
        ack: &WriteAcknowledgement,
        graph: &mut ObjectGraph,
        context: &mut MappingContext,
    ) -> Result<()> {
        let mut node_ids = Vec::with_capacity(self.new_nodes.len());
        for &obj in &self.new_nodes {
            graph.entity(obj)?;
            let reference = obj.provisional_id();
            let id = ack
                .nodes
                .get(&reference)
                .ok_or(MappingError::MissingAcknowledgement(reference))?;
            node_ids.push((obj, *id));
        }

        let mut entity_ids = Vec::new();
        for created in &self.created {
            let Some(obj) = created.relationship_entity else {
                continue;
            };
            graph.entity(obj)?;
            let id = ack
                .relationships
                .get(&created.reference)
                .ok_or(MappingError::MissingAcknowledgement(created.reference))?;
            entity_ids.push((obj, *id));
        }

        for (obj, id) in node_ids {
            graph.entity_mut(obj)?.id = Some(id);
            context.register(graph, obj, id);
        }

        for (obj, old) in &self.id_resets {
            tracing::debug!(object = %obj, id = old, "dropping replaced relationship entity id");
            context.evict_relationship_entity(*old);
        }
        for (obj, id) in entity_ids {
            graph.entity_mut(obj)?.id = Some(id);
            context.register_relationship_entity(graph, obj, id);
        }

        for created in &self.created {
            let start = graph.entity(created.start)?;
            let end = graph.entity(created.end)?;
            let (Some(start_id), Some(end_id)) = (start.id, end.id) else {
                tracing::warn!(
                    start = %created.start,
                    end = %created.end,
                    rel_type = %created.rel_type,
                    "created relationship has an endpoint without an id"
                );
                continue;
            };
            let relationship_id = created.relationship_entity.and_then(|re| graph.id_of(re));
            let rel = MappedRelationship::new(
                start_id,
                created.rel_type.clone(),
                end_id,
                relationship_id,
                start.class.clone(),
                end.class.clone(),
            );
            tracing::debug!(%rel, "context-add");
            context.add_relationship(rel);
        }

        // Objects evicted by an earlier sweep keep their store id and come
        // back into the identity map once they are saved again.
        for &obj in &self.visited {
            let entity = graph.entity(obj)?;
            let Some(id) = entity.id else {
                continue;
            };
            if entity.is_relationship_entity() {
                if context.relationship_entity(id).is_none() {
                    context.register_relationship_entity(graph, obj, id);
                }
            } else if context.node_entity(id).is_none() {
                context.register(graph, obj, id);
            }
            context.remember(graph, obj);
        }
        Ok(())
    }
}
