//! Cypher rendering for write operations.
//!
//! Properties travel as a single JSON parameter and are applied with
//! `apoc.convert.fromJsonMap`, so one statement shape covers every class.
//! Labels and relationship types cannot be parameterised and are escaped
//! into the statement text instead.

use std::collections::BTreeMap;

use neo4rs::{query, Query};

use trellis_core::PropertyMap;
use trellis_mapper::WriteOperation;

use crate::client::GraphError;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Int(i64),
    Str(String),
    Ints(Vec<i64>),
}

/// A rendered statement. `returns_id` is set when the statement yields the
/// id of the node or edge it created in an `id` column.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherStatement {
    pub cypher: String,
    pub params: BTreeMap<&'static str, Param>,
    pub returns_id: bool,
}

impl CypherStatement {
    fn new(cypher: String) -> Self {
        Self {
            cypher,
            params: BTreeMap::new(),
            returns_id: false,
        }
    }

    fn param(mut self, key: &'static str, value: Param) -> Self {
        self.params.insert(key, value);
        self
    }

    fn props(self, properties: &PropertyMap) -> Result<Self, GraphError> {
        let json = serde_json::to_string(properties)?;
        Ok(self.param("props", Param::Str(json)))
    }

    fn returning_id(mut self) -> Self {
        self.returns_id = true;
        self
    }

    pub fn to_query(&self) -> Query {
        let mut q = query(&self.cypher);
        for (key, value) in &self.params {
            q = match value {
                Param::Int(v) => q.param(key, *v),
                Param::Str(v) => q.param(key, v.clone()),
                Param::Ints(v) => q.param(key, v.clone()),
            };
        }
        q
    }
}

/// Backtick-quote a label or relationship type.
pub fn escape(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

pub fn label_expression(labels: &[String]) -> String {
    labels.iter().map(|l| format!(":{}", escape(l))).collect()
}

/// Render one operation. `resolve` maps a node reference that may be
/// provisional onto the store id it was given earlier in the same plan.
pub fn render(
    op: &WriteOperation,
    resolve: impl Fn(i64) -> Result<i64, GraphError>,
) -> Result<CypherStatement, GraphError> {
    let statement = match op {
        WriteOperation::CreateNode {
            labels, properties, ..
        } => CypherStatement::new(format!(
            "CREATE (n{})
             SET n += apoc.convert.fromJsonMap($props)
             RETURN id(n) AS id",
            label_expression(labels)
        ))
        .props(properties)?
        .returning_id(),

        WriteOperation::MatchNode {
            id,
            labels,
            removed_labels,
            properties,
        } => {
            let mut cypher = String::from(
                "MATCH (n) WHERE id(n) = $id
             SET n += apoc.convert.fromJsonMap($props)",
            );
            if !labels.is_empty() {
                cypher.push_str(&format!("\n             SET n{}", label_expression(labels)));
            }
            if !removed_labels.is_empty() {
                cypher.push_str(&format!(
                    "\n             REMOVE n{}",
                    label_expression(removed_labels)
                ));
            }
            CypherStatement::new(cypher)
                .param("id", Param::Int(*id))
                .props(properties)?
        }

        WriteOperation::CreateRel {
            rel_type,
            start,
            end,
            properties,
            singleton,
            ..
        } => {
            let verb = if *singleton { "MERGE" } else { "CREATE" };
            CypherStatement::new(format!(
                "MATCH (a) WHERE id(a) = $start
             MATCH (b) WHERE id(b) = $end
             {verb} (a)-[r:{}]->(b)
             SET r += apoc.convert.fromJsonMap($props)
             RETURN id(r) AS id",
                escape(rel_type)
            ))
            .param("start", Param::Int(resolve(*start)?))
            .param("end", Param::Int(resolve(*end)?))
            .props(properties)?
            .returning_id()
        }

        WriteOperation::MatchRel { id, properties, .. } => CypherStatement::new(
            "MATCH ()-[r]->() WHERE id(r) = $id
             SET r += apoc.convert.fromJsonMap($props)"
                .to_string(),
        )
        .param("id", Param::Int(*id))
        .props(properties)?,

        WriteOperation::DeleteRel { id: Some(id), .. } => CypherStatement::new(
            "MATCH ()-[r]->() WHERE id(r) = $id
             DELETE r"
                .to_string(),
        )
        .param("id", Param::Int(*id)),

        WriteOperation::DeleteRel {
            start,
            rel_type,
            end,
            id: None,
        } => CypherStatement::new(format!(
            "MATCH (a)-[r:{}]->(b) WHERE id(a) = $start AND id(b) = $end
             DELETE r",
            escape(rel_type)
        ))
        .param("start", Param::Int(*start))
        .param("end", Param::Int(*end)),
    };
    Ok(statement)
}
