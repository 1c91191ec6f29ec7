//! Configuration management for Trellis.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`TRELLIS__` prefix, `__` separator)
//! 2. Config file (`trellis.toml`, or any prefix passed to [`TrellisConfig::load`])
//! 3. Defaults

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub mapping: MappingSettings,
}

/// Connection settings for the graph store.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Defaults for load and save traversal.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingSettings {
    /// Relationship hops followed when loading (`-1` = unlimited).
    #[serde(default = "default_load_depth")]
    pub load_depth: i32,

    /// Relationship hops followed when saving (`-1` = unlimited, `0` = properties only).
    #[serde(default = "default_save_horizon")]
    pub save_horizon: i32,

    /// Path to a JSON entity schema.
    #[serde(default)]
    pub schema_path: Option<String>,
}

impl TrellisConfig {
    /// Load configuration from `<file_prefix>.{toml,json,yaml}` (optional) and
    /// `TRELLIS__*` environment variables.
    pub fn load(file_prefix: &str) -> Result<Self, config::ConfigError> {
        Self::load_with_env_prefix(file_prefix, "TRELLIS")
    }

    pub fn load_with_env_prefix(
        file_prefix: &str,
        env_prefix: &str,
    ) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: TrellisConfig = cfg.try_deserialize()?;
        tracing::debug!(
            uri = %loaded.neo4j.uri,
            load_depth = loaded.mapping.load_depth,
            save_horizon = loaded.mapping.save_horizon,
            "Configuration loaded"
        );
        Ok(loaded)
    }
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "trellis-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_load_depth() -> i32 {
    1
}

fn default_save_horizon() -> i32 {
    -1
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            load_depth: default_load_depth(),
            save_horizon: default_save_horizon(),
            schema_path: None,
        }
    }
}
