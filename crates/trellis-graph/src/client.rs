//! Bolt connection to Neo4j.
//!
//! Property maps cross the wire as JSON strings and are unpacked server-side
//! with APOC (`apoc.convert.fromJsonMap` / `apoc.convert.toJson`), so the
//! target database must have the APOC core procedures installed.
//! [`GraphClient::connect`] checks for them once and logs the version found.

use neo4rs::{query, ConfigBuilder, Graph, Query, Row, Txn};

use trellis_core::config::Neo4jSettings;
use trellis_core::MappingError;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("{kind} {id} does not exist in the store")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Write plan uses reference {0} before the operation creating it")]
    UnresolvedReference(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Bolt connection parameters. Built from the `[neo4j]` config section.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl From<&Neo4jSettings> for GraphConfig {
    fn from(settings: &Neo4jSettings) -> Self {
        Self {
            uri: settings.uri.clone(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            max_connections: settings.max_connections,
            fetch_size: settings.fetch_size,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from(&Neo4jSettings::default())
    }
}

/// Pooled Neo4j client. Cloning shares the pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let bolt = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        let graph = Graph::connect(bolt)
            .await
            .map_err(|e| GraphError::Connection(format!("{}: {e}", config.uri)))?;

        let client = Self { graph };
        let apoc = client.apoc_version().await?;
        tracing::info!(uri = %config.uri, %apoc, "Connected to Neo4j");
        Ok(client)
    }

    /// Version of the installed APOC procedures.
    pub async fn apoc_version(&self) -> Result<String, GraphError> {
        let row = self
            .query_one(query("RETURN apoc.version() AS version"))
            .await
            .map_err(|e| GraphError::Connection(format!("APOC is not available: {e}")))?;
        Ok(row
            .and_then(|r| r.get::<String>("version").ok())
            .unwrap_or_default())
    }

    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Run a statement and discard its result.
    pub async fn run(&self, q: Query) -> Result<(), GraphError> {
        self.graph.run(q).await?;
        Ok(())
    }

    pub async fn query_rows(&self, q: Query) -> Result<Vec<Row>, GraphError> {
        let mut rows = Vec::new();
        let mut stream = self.graph.execute(q).await?;
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn query_one(&self, q: Query) -> Result<Option<Row>, GraphError> {
        Ok(self.graph.execute(q).await?.next().await?)
    }

    pub async fn start_txn(&self) -> Result<Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_follows_settings() {
        let settings = Neo4jSettings {
            uri: "bolt://graph:7687".into(),
            max_connections: 4,
            ..Default::default()
        };
        let config = GraphConfig::from(&settings);
        assert_eq!(config.uri, "bolt://graph:7687");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.fetch_size, 256);
    }

    #[test]
    fn missing_endpoint_message_names_the_id() {
        let err = GraphError::NotFound { kind: "node", id: 12 };
        assert_eq!(err.to_string(), "node 12 does not exist in the store");
    }
}
