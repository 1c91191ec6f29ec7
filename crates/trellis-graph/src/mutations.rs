//! Write operations against Neo4j.
//!
//! A write plan is applied inside one transaction. Node and edge creates
//! return the id Neo4j assigned, which later operations in the same plan
//! use in place of the provisional reference.

use neo4rs::{query, Txn};

use trellis_mapper::{WriteAcknowledgement, WriteOperation, WritePlan};

use crate::client::{GraphClient, GraphError};
use crate::cypher::render;

impl GraphClient {
    /// Apply a write plan atomically and return the ids of everything it
    /// created.
    pub async fn apply_plan(&self, plan: &WritePlan) -> Result<WriteAcknowledgement, GraphError> {
        let mut ack = WriteAcknowledgement::default();
        if plan.is_empty() {
            return Ok(ack);
        }

        let mut txn = self.start_txn().await?;
        match apply_operations(&mut txn, plan, &mut ack).await {
            Ok(()) => txn.commit().await?,
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                return Err(e);
            }
        }

        let summary = plan.summary();
        tracing::info!(
            nodes_created = summary.nodes_created,
            nodes_updated = summary.nodes_updated,
            relationships_created = summary.relationships_created,
            relationships_updated = summary.relationships_updated,
            relationships_deleted = summary.relationships_deleted,
            "Write plan executed"
        );
        Ok(ack)
    }

    /// Delete a node and every edge touching it.
    pub async fn detach_delete_node(&self, id: i64) -> Result<(), GraphError> {
        let q = query(
            "MATCH (n) WHERE id(n) = $id
             DETACH DELETE n",
        )
        .param("id", id);
        self.run(q).await
    }

    pub async fn delete_edge(&self, id: i64) -> Result<(), GraphError> {
        let q = query(
            "MATCH ()-[r]->() WHERE id(r) = $id
             DELETE r",
        )
        .param("id", id);
        self.run(q).await
    }
}

async fn apply_operations(
    txn: &mut Txn,
    plan: &WritePlan,
    ack: &mut WriteAcknowledgement,
) -> Result<(), GraphError> {
    for op in &plan.operations {
        let statement = render(op, |r| {
            ack.node_id(r).ok_or(GraphError::UnresolvedReference(r))
        })?;
        tracing::debug!(cypher = %statement.cypher, "executing");
        let q = statement.to_query();

        if !statement.returns_id {
            txn.run(q).await?;
            continue;
        }

        let mut stream = txn.execute(q).await?;
        let row = stream.next(txn.handle()).await?;
        while stream.next(txn.handle()).await?.is_some() {}

        match op {
            WriteOperation::CreateNode { reference, .. } => {
                let id = returned_id(row, *reference)?;
                ack.nodes.insert(*reference, id);
            }
            WriteOperation::CreateRel { reference, .. } => {
                let id = returned_id(row, *reference)?;
                ack.relationships.insert(*reference, id);
            }
            _ => {}
        }
    }
    Ok(())
}

fn returned_id(row: Option<neo4rs::Row>, reference: i64) -> Result<i64, GraphError> {
    // No row back means a MATCH on an endpoint found nothing.
    let row = row.ok_or(GraphError::NotFound {
        kind: "endpoint for reference",
        id: reference,
    })?;
    row.get::<i64>("id")
        .map_err(|e| GraphError::Serialization(format!("Failed to read created id: {e}")))
}
