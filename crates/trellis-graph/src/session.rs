//! A unit of work over one object graph and one graph store.
//!
//! The session owns the object arena and the mapping context. Every load
//! merges into the same arena, and every save diffs against the same
//! context, so identities stay stable for the lifetime of the session.

use std::sync::Arc;

use serde::Serialize;

use trellis_core::events::{EventKind, EventListener, PersistenceEvent};
use trellis_core::{Entity, EntitySchema, MetaData, ObjectGraph, ObjectRef};
use trellis_mapper::{
    GraphHydrator, HydrationReport, MappingContext, ObjectGraphDiffer, PlanSummary,
};

use crate::client::GraphError;
use crate::executor::{GraphRequestExecutor, LoadRequest, LoadRoot};

/// Outcome of a save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub operations: usize,
    pub summary: PlanSummary,
}

pub struct Session<E> {
    schema: Arc<MetaData>,
    graph: ObjectGraph,
    context: MappingContext,
    executor: E,
    listeners: Vec<Arc<dyn EventListener>>,
}

impl<E: GraphRequestExecutor> Session<E> {
    pub fn new(schema: Arc<MetaData>, executor: E) -> Self {
        Self {
            schema,
            graph: ObjectGraph::new(),
            context: MappingContext::new(),
            executor,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listeners.push(listener);
    }

    pub fn schema(&self) -> &MetaData {
        &self.schema
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ObjectGraph {
        &mut self.graph
    }

    pub fn context(&self) -> &MappingContext {
        &self.context
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Add a new object to the session. It is written on the next save that
    /// reaches it.
    pub fn insert(&mut self, entity: Entity) -> ObjectRef {
        self.graph.insert(entity)
    }

    // ── Loading ──────────────────────────────────────────────────

    /// Load every object of `class` plus whatever lies within `depth` hops.
    pub async fn load_all(&mut self, class: &str, depth: i32) -> Result<Vec<ObjectRef>, GraphError> {
        let schema = Arc::clone(&self.schema);
        let root = if schema.is_relationship_entity(class) {
            let rel_type = schema
                .require(class)?
                .rel_type()
                .map(|t| t.to_string())
                .unwrap_or_default();
            LoadRoot::RelationshipType(rel_type)
        } else {
            LoadRoot::Labels(schema.labels_or_type(class))
        };
        let (objects, _) = self.load_request(&LoadRequest { root, depth }, class).await?;
        Ok(objects)
    }

    /// Load node `id` plus whatever lies within `depth` hops.
    pub async fn load(&mut self, id: i64, depth: i32) -> Result<Option<ObjectRef>, GraphError> {
        self.load_request(&LoadRequest::id(id, depth), "").await?;
        Ok(self.context.node_entity(id))
    }

    /// Run an arbitrary load and return the objects assignable to `requested`.
    pub async fn load_request(
        &mut self,
        request: &LoadRequest,
        requested: &str,
    ) -> Result<(Vec<ObjectRef>, HydrationReport), GraphError> {
        let model = self.executor.load(request).await?;
        let hydration = GraphHydrator::new(&*self.schema, &mut self.context)
            .hydrate(&mut self.graph, &model, requested)?;

        let report = hydration.report;
        if report.skipped_relationships > 0 || report.unmapped_nodes > 0 {
            tracing::warn!(
                skipped_relationships = report.skipped_relationships,
                unmapped_nodes = report.unmapped_nodes,
                "load returned records that could not be mapped"
            );
        }
        tracing::info!(
            nodes = report.nodes_mapped,
            relationships = report.relationships_mapped,
            selected = hydration.objects.len(),
            "Loaded objects"
        );
        Ok((hydration.objects, report))
    }

    // ── Saving ───────────────────────────────────────────────────

    pub async fn save(&mut self, root: ObjectRef, horizon: i32) -> Result<SaveReport, GraphError> {
        self.save_all(&[root], horizon).await
    }

    /// Diff everything reachable from `roots`, write the changes, and record
    /// the new ids.
    pub async fn save_all(
        &mut self,
        roots: &[ObjectRef],
        horizon: i32,
    ) -> Result<SaveReport, GraphError> {
        let saved = ObjectGraphDiffer::new(&*self.schema, &mut self.context)
            .diff_all(&self.graph, roots, horizon)?;
        if saved.is_empty() {
            tracing::debug!("nothing to save");
            return Ok(SaveReport::default());
        }

        let visited = saved.visited.clone();
        self.notify(EventKind::PreSave, &visited);

        let ack = self.executor.execute_plan(&saved.plan).await?;
        let report = SaveReport {
            operations: saved.plan.len(),
            summary: saved.plan.summary(),
        };
        saved.commit(&ack, &mut self.graph, &mut self.context)?;

        self.notify(EventKind::PostSave, &visited);
        tracing::info!(
            operations = report.operations,
            nodes_created = report.summary.nodes_created,
            relationships_created = report.summary.relationships_created,
            relationships_deleted = report.summary.relationships_deleted,
            "Saved objects"
        );
        Ok(report)
    }

    // ── Deleting ─────────────────────────────────────────────────

    /// Delete an object from the store and forget it. Objects that were
    /// connected to it are notified as if saved.
    pub async fn delete(&mut self, obj: ObjectRef) -> Result<(), GraphError> {
        let entity = self.graph.entity(obj)?;
        let Some(id) = entity.id else {
            tracing::debug!(object = %obj, "object was never saved, nothing to delete");
            return Ok(());
        };
        let is_relationship_entity = entity.is_relationship_entity();
        let neighbours = self.context.neighbours(&self.graph, obj);

        self.notify(EventKind::PreSave, &neighbours);
        self.notify(EventKind::PreDelete, &[obj]);

        if is_relationship_entity {
            self.executor.delete_relationship(id).await?;
        } else {
            self.executor.delete_node(id).await?;
        }
        self.context.reset(&mut self.graph, obj)?;

        self.notify(EventKind::PostDelete, &[obj]);
        self.notify(EventKind::PostSave, &neighbours);
        tracing::info!(object = %obj, id, "Deleted object");
        Ok(())
    }

    /// Forget every object and identity. The store is not touched.
    pub fn clear(&mut self) {
        self.context.clear();
        self.graph = ObjectGraph::new();
    }

    fn notify(&self, kind: EventKind, objects: &[ObjectRef]) {
        if self.listeners.is_empty() {
            return;
        }
        for &obj in objects {
            let class = self
                .graph
                .get(obj)
                .map(|e| e.class.clone())
                .unwrap_or_default();
            let event = PersistenceEvent::new(kind, obj, class);
            for listener in &self.listeners {
                listener.on_event(&event);
            }
        }
    }
}
