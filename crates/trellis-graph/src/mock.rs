//! In-memory graph store implementing [`GraphRequestExecutor`].
//!
//! Used by tests and for dry runs. Write plans are applied to a copy of the
//! store which replaces the original only once every operation succeeded.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use trellis_core::{GraphModel, NodeRecord, PropertyMap, RelationshipRecord, Value};
use trellis_mapper::{WriteAcknowledgement, WriteOperation, WritePlan};

use crate::client::GraphError;
use crate::executor::{GraphRequestExecutor, LoadRequest, LoadRoot};

#[derive(Debug, Clone, Default)]
struct Store {
    next_id: i64,
    nodes: BTreeMap<i64, NodeRecord>,
    relationships: BTreeMap<i64, RelationshipRecord>,
}

impl Store {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn node_mut(&mut self, id: i64) -> Result<&mut NodeRecord, GraphError> {
        self.nodes
            .get_mut(&id)
            .ok_or(GraphError::NotFound { kind: "node", id })
    }

    fn relationship_mut(&mut self, id: i64) -> Result<&mut RelationshipRecord, GraphError> {
        self.relationships
            .get_mut(&id)
            .ok_or(GraphError::NotFound { kind: "relationship", id })
    }

    fn apply(&mut self, op: &WriteOperation, ack: &mut WriteAcknowledgement) -> Result<(), GraphError> {
        let resolve = |r: i64| ack.node_id(r).ok_or(GraphError::UnresolvedReference(r));
        match op {
            WriteOperation::CreateNode {
                reference,
                labels,
                properties,
            } => {
                let id = self.allocate();
                self.nodes.insert(
                    id,
                    NodeRecord {
                        id,
                        labels: labels.clone(),
                        properties: PropertyMap::new(),
                    },
                );
                merge_properties(&mut self.node_mut(id)?.properties, properties);
                ack.nodes.insert(*reference, id);
            }
            WriteOperation::MatchNode {
                id,
                labels,
                removed_labels,
                properties,
            } => {
                let node = self.node_mut(*id)?;
                for label in labels {
                    if !node.labels.contains(label) {
                        node.labels.push(label.clone());
                    }
                }
                node.labels.retain(|l| !removed_labels.contains(l));
                merge_properties(&mut node.properties, properties);
            }
            WriteOperation::CreateRel {
                reference,
                rel_type,
                start,
                end,
                properties,
                singleton,
            } => {
                let (start, end) = (resolve(*start)?, resolve(*end)?);
                for id in [start, end] {
                    if !self.nodes.contains_key(&id) {
                        return Err(GraphError::NotFound { kind: "node", id });
                    }
                }
                let existing = singleton
                    .then(|| {
                        self.relationships
                            .values()
                            .find(|r| r.start == start && r.end == end && &r.rel_type == rel_type)
                            .map(|r| r.id)
                    })
                    .flatten();
                let id = match existing {
                    Some(id) => id,
                    None => {
                        let id = self.allocate();
                        self.relationships.insert(
                            id,
                            RelationshipRecord {
                                id,
                                rel_type: rel_type.clone(),
                                start,
                                end,
                                properties: PropertyMap::new(),
                            },
                        );
                        id
                    }
                };
                merge_properties(&mut self.relationship_mut(id)?.properties, properties);
                ack.relationships.insert(*reference, id);
            }
            WriteOperation::MatchRel { id, properties, .. } => {
                merge_properties(&mut self.relationship_mut(*id)?.properties, properties);
            }
            WriteOperation::DeleteRel { id: Some(id), .. } => {
                self.relationships.remove(id);
            }
            WriteOperation::DeleteRel {
                start,
                rel_type,
                end,
                id: None,
            } => {
                self.relationships
                    .retain(|_, r| !(r.start == *start && r.end == *end && &r.rel_type == rel_type));
            }
        }
        Ok(())
    }

    fn roots(&self, root: &LoadRoot) -> Vec<i64> {
        match root {
            LoadRoot::Labels(labels) => self
                .nodes
                .values()
                .filter(|n| labels.iter().all(|l| n.labels.contains(l)))
                .map(|n| n.id)
                .collect(),
            LoadRoot::RelationshipType(rel_type) => {
                let mut roots = Vec::new();
                for r in self.relationships.values().filter(|r| &r.rel_type == rel_type) {
                    for id in [r.start, r.end] {
                        if !roots.contains(&id) {
                            roots.push(id);
                        }
                    }
                }
                roots
            }
            LoadRoot::Id(id) => self.nodes.contains_key(id).then_some(*id).into_iter().collect(),
        }
    }

    /// Breadth-first expansion over edges in either direction.
    fn load(&self, request: &LoadRequest) -> GraphModel {
        let mut found: Vec<i64> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        for id in self.roots(&request.root) {
            if seen.insert(id) {
                found.push(id);
                queue.push_back((id, 0));
            }
        }

        while let Some((id, hops)) = queue.pop_front() {
            if request.depth >= 0 && hops >= request.depth {
                continue;
            }
            for r in self.relationships.values() {
                let Some(other) = (if r.start == id {
                    Some(r.end)
                } else if r.end == id {
                    Some(r.start)
                } else {
                    None
                }) else {
                    continue;
                };
                if seen.insert(other) {
                    found.push(other);
                    queue.push_back((other, hops + 1));
                }
            }
        }

        GraphModel {
            nodes: found.iter().filter_map(|id| self.nodes.get(id).cloned()).collect(),
            relationships: self
                .relationships
                .values()
                .filter(|r| seen.contains(&r.start) && seen.contains(&r.end))
                .cloned()
                .collect(),
        }
    }
}

/// `SET x += map` semantics: null removes the property.
fn merge_properties(target: &mut PropertyMap, changes: &PropertyMap) {
    for (key, value) in changes {
        if matches!(value, Value::Null) {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// A shared in-memory graph. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutor {
    store: Arc<RwLock<Store>>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn nodes(&self) -> Vec<NodeRecord> {
        self.store.read().await.nodes.values().cloned().collect()
    }

    pub async fn relationships(&self) -> Vec<RelationshipRecord> {
        self.store.read().await.relationships.values().cloned().collect()
    }

    /// Seed a node directly, bypassing the write path.
    pub async fn insert_node(&self, labels: &[&str], properties: PropertyMap) -> i64 {
        let mut store = self.store.write().await;
        let id = store.allocate();
        store.nodes.insert(
            id,
            NodeRecord {
                id,
                labels: labels.iter().map(|l| l.to_string()).collect(),
                properties,
            },
        );
        id
    }

    pub async fn insert_relationship(
        &self,
        rel_type: &str,
        start: i64,
        end: i64,
        properties: PropertyMap,
    ) -> i64 {
        let mut store = self.store.write().await;
        let id = store.allocate();
        store.relationships.insert(
            id,
            RelationshipRecord {
                id,
                rel_type: rel_type.to_string(),
                start,
                end,
                properties,
            },
        );
        id
    }
}

#[async_trait]
impl GraphRequestExecutor for InMemoryExecutor {
    async fn execute_plan(&self, plan: &WritePlan) -> Result<WriteAcknowledgement, GraphError> {
        let mut store = self.store.write().await;
        let mut staged = store.clone();
        let mut ack = WriteAcknowledgement::default();
        for op in &plan.operations {
            staged.apply(op, &mut ack)?;
        }
        *store = staged;
        tracing::debug!(operations = plan.len(), "in-memory plan applied");
        Ok(ack)
    }

    async fn load(&self, request: &LoadRequest) -> Result<GraphModel, GraphError> {
        Ok(self.store.read().await.load(request))
    }

    async fn delete_node(&self, id: i64) -> Result<(), GraphError> {
        let mut store = self.store.write().await;
        if store.nodes.remove(&id).is_none() {
            return Err(GraphError::NotFound { kind: "node", id });
        }
        store.relationships.retain(|_, r| r.start != id && r.end != id);
        Ok(())
    }

    async fn delete_relationship(&self, id: i64) -> Result<(), GraphError> {
        let mut store = self.store.write().await;
        store
            .relationships
            .remove(&id)
            .map(|_| ())
            .ok_or(GraphError::NotFound { kind: "relationship", id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_rel(reference: i64, start: i64, end: i64, singleton: bool) -> WriteOperation {
        WriteOperation::CreateRel {
            reference,
            rel_type: "FRIEND".into(),
            start,
            end,
            properties: PropertyMap::new(),
            singleton,
        }
    }

    #[tokio::test]
    async fn provisional_references_resolve_within_a_plan() {
        let executor = InMemoryExecutor::new();
        let plan = WritePlan {
            operations: vec![
                WriteOperation::CreateNode {
                    reference: -1,
                    labels: vec!["Person".into()],
                    properties: PropertyMap::new(),
                },
                WriteOperation::CreateNode {
                    reference: -2,
                    labels: vec!["Person".into()],
                    properties: PropertyMap::new(),
                },
                create_rel(-3, -1, -2, true),
            ],
        };

        let ack = executor.execute_plan(&plan).await.unwrap();
        let relationships = executor.relationships().await;
        assert_eq!(relationships.len(), 1);
        assert_eq!(Some(relationships[0].start), ack.node_id(-1));
        assert_eq!(Some(relationships[0].end), ack.node_id(-2));
        assert_eq!(ack.relationship_id(-3), Some(relationships[0].id));
    }

    #[tokio::test]
    async fn singleton_edges_are_merged() {
        let executor = InMemoryExecutor::new();
        let a = executor.insert_node(&["Person"], PropertyMap::new()).await;
        let b = executor.insert_node(&["Person"], PropertyMap::new()).await;
        let existing = executor.insert_relationship("FRIEND", a, b, PropertyMap::new()).await;

        let plan = WritePlan {
            operations: vec![create_rel(-1, a, b, true), create_rel(-2, a, b, false)],
        };
        let ack = executor.execute_plan(&plan).await.unwrap();
        assert_eq!(ack.relationship_id(-1), Some(existing));
        assert_ne!(ack.relationship_id(-2), Some(existing));
        assert_eq!(executor.relationships().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_plan_changes_nothing() {
        let executor = InMemoryExecutor::new();
        let plan = WritePlan {
            operations: vec![
                WriteOperation::CreateNode {
                    reference: -1,
                    labels: vec!["Person".into()],
                    properties: PropertyMap::new(),
                },
                create_rel(-2, -1, 99, true),
            ],
        };

        let err = executor.execute_plan(&plan).await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound { kind: "node", id: 99 }));
        assert!(executor.nodes().await.is_empty());
    }

    #[tokio::test]
    async fn load_follows_edges_up_to_depth() {
        let executor = InMemoryExecutor::new();
        let a = executor.insert_node(&["Person"], PropertyMap::new()).await;
        let b = executor.insert_node(&["Person"], PropertyMap::new()).await;
        let c = executor.insert_node(&["Company"], PropertyMap::new()).await;
        executor.insert_relationship("FRIEND", b, a, PropertyMap::new()).await;
        executor.insert_relationship("WORKS_AT", b, c, PropertyMap::new()).await;

        let model = executor.load(&LoadRequest::id(a, 1)).await.unwrap();
        let ids: Vec<i64> = model.nodes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(model.relationships.len(), 1);

        let model = executor.load(&LoadRequest::id(a, -1)).await.unwrap();
        assert_eq!(model.nodes.len(), 3);
        assert_eq!(model.relationships.len(), 2);

        let model = executor
            .load(&LoadRequest::labels(vec!["Company".into()], 0))
            .await
            .unwrap();
        assert_eq!(model.nodes.len(), 1);
        assert!(model.relationships.is_empty());
    }

    #[test]
    fn null_removes_a_property() {
        let mut target = PropertyMap::new();
        target.insert("name".into(), Value::from("Ada"));
        let mut changes = PropertyMap::new();
        changes.insert("name".into(), Value::Null);
        changes.insert("age".into(), Value::from(36));
        merge_properties(&mut target, &changes);
        assert_eq!(target.get("name"), None);
        assert_eq!(target.get("age"), Some(&Value::Integer(36)));
    }
}
