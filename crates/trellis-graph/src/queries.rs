//! Read queries: load a neighbourhood of the graph as a [`GraphModel`].
//!
//! Loading is two round trips. The first collects the root nodes and
//! everything within the requested number of hops; the second fetches every
//! edge between the nodes found.

use neo4rs::query;

use trellis_core::{GraphModel, NodeRecord, PropertyMap, RelationshipRecord};

use crate::client::{GraphClient, GraphError};
use crate::cypher::{escape, label_expression, CypherStatement, Param};
use crate::executor::{LoadRequest, LoadRoot};

const RELATIONSHIPS_BETWEEN: &str = "MATCH (a)-[r]->(b)
             WHERE id(a) IN $ids AND id(b) IN $ids
             RETURN id(r) AS id, type(r) AS rel_type, id(a) AS start, id(b) AS end,
                    apoc.convert.toJson(properties(r)) AS props
             ORDER BY id(r)";

impl GraphClient {
    pub async fn load_model(&self, request: &LoadRequest) -> Result<GraphModel, GraphError> {
        let rows = self.query_rows(node_query(request).to_query()).await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in &rows {
            nodes.push(node_from_row(row)?);
        }
        if nodes.is_empty() {
            tracing::debug!(?request, "load matched no nodes");
            return Ok(GraphModel::default());
        }

        let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        let rows = self
            .query_rows(query(RELATIONSHIPS_BETWEEN).param("ids", ids))
            .await?;
        let mut relationships = Vec::with_capacity(rows.len());
        for row in &rows {
            relationships.push(relationship_from_row(row)?);
        }

        tracing::debug!(
            nodes = nodes.len(),
            relationships = relationships.len(),
            "graph model loaded"
        );
        Ok(GraphModel {
            nodes,
            relationships,
        })
    }
}

/// Variable-length pattern for `depth` hops (`None` when only roots are wanted).
fn hops(depth: i32) -> Option<String> {
    match depth {
        0 => None,
        d if d < 0 => Some("*1..".to_string()),
        d => Some(format!("*1..{d}")),
    }
}

/// Statement returning the nodes of a load, roots first.
pub fn node_query(request: &LoadRequest) -> CypherStatement {
    let mut params = std::collections::BTreeMap::new();
    let roots = match &request.root {
        LoadRoot::Labels(labels) => format!("MATCH (root{})", label_expression(labels)),
        LoadRoot::RelationshipType(rel_type) => format!(
            "MATCH (a)-[:{}]->(b)
             UNWIND [a, b] AS endpoint
             WITH DISTINCT endpoint AS root",
            escape(rel_type)
        ),
        LoadRoot::Id(id) => {
            params.insert("id", Param::Int(*id));
            "MATCH (root) WHERE id(root) = $id".to_string()
        }
    };

    let expand = match hops(request.depth) {
        Some(pattern) => format!(
            "
             OPTIONAL MATCH (root)-[{pattern}]-(m)
             WITH collect(DISTINCT root) + collect(DISTINCT m) AS found
             UNWIND found AS n"
        ),
        None => "
             WITH root AS n"
            .to_string(),
    };

    CypherStatement {
        cypher: format!(
            "{roots}{expand}
             RETURN DISTINCT id(n) AS id, labels(n) AS labels,
                    apoc.convert.toJson(properties(n)) AS props"
        ),
        params,
        returns_id: false,
    }
}

fn properties(row: &neo4rs::Row) -> Result<PropertyMap, GraphError> {
    let json: String = row
        .get("props")
        .map_err(|e| GraphError::Serialization(format!("Failed to read properties: {e}")))?;
    Ok(serde_json::from_str(&json)?)
}

fn node_from_row(row: &neo4rs::Row) -> Result<NodeRecord, GraphError> {
    let id: i64 = row
        .get("id")
        .map_err(|e| GraphError::Serialization(format!("Failed to read node id: {e}")))?;
    let labels: Vec<String> = row.get("labels").unwrap_or_default();
    Ok(NodeRecord {
        id,
        labels,
        properties: properties(row)?,
    })
}

fn relationship_from_row(row: &neo4rs::Row) -> Result<RelationshipRecord, GraphError> {
    let read = |key: &str| {
        row.get::<i64>(key)
            .map_err(|e| GraphError::Serialization(format!("Failed to read {key}: {e}")))
    };
    let rel_type: String = row
        .get("rel_type")
        .map_err(|e| GraphError::Serialization(format!("Failed to read rel_type: {e}")))?;
    Ok(RelationshipRecord {
        id: read("id")?,
        rel_type,
        start: read("start")?,
        end: read("end")?,
        properties: properties(row)?,
    })
}
