//! The seam between sessions and the graph store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use trellis_core::GraphModel;
use trellis_mapper::{WriteAcknowledgement, WritePlan};

use crate::client::{GraphClient, GraphError};

/// Where a load starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadRoot {
    /// Every node carrying all of these labels.
    Labels(Vec<String>),
    /// Both endpoints of every edge of this type.
    RelationshipType(String),
    /// A single node.
    Id(i64),
}

/// A load: roots plus the number of relationship hops to follow from them
/// (`-1` unlimited, `0` roots only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub root: LoadRoot,
    pub depth: i32,
}

impl LoadRequest {
    pub fn labels(labels: Vec<String>, depth: i32) -> Self {
        Self {
            root: LoadRoot::Labels(labels),
            depth,
        }
    }

    pub fn id(id: i64, depth: i32) -> Self {
        Self {
            root: LoadRoot::Id(id),
            depth,
        }
    }
}

/// Executes write plans and loads against a graph store.
///
/// A plan is applied atomically: either every operation takes effect and an
/// acknowledgement with the new ids comes back, or none does.
#[async_trait]
pub trait GraphRequestExecutor: Send + Sync {
    async fn execute_plan(&self, plan: &WritePlan) -> Result<WriteAcknowledgement, GraphError>;

    async fn load(&self, request: &LoadRequest) -> Result<GraphModel, GraphError>;

    /// Delete a node and every edge touching it.
    async fn delete_node(&self, id: i64) -> Result<(), GraphError>;

    async fn delete_relationship(&self, id: i64) -> Result<(), GraphError>;
}

#[async_trait]
impl GraphRequestExecutor for GraphClient {
    async fn execute_plan(&self, plan: &WritePlan) -> Result<WriteAcknowledgement, GraphError> {
        self.apply_plan(plan).await
    }

    async fn load(&self, request: &LoadRequest) -> Result<GraphModel, GraphError> {
        self.load_model(request).await
    }

    async fn delete_node(&self, id: i64) -> Result<(), GraphError> {
        self.detach_delete_node(id).await
    }

    async fn delete_relationship(&self, id: i64) -> Result<(), GraphError> {
        self.delete_edge(id).await
    }
}
