//! CLI entry point for trellis-sync.
//!
//! `load` reads objects from Neo4j and prints them as a JSON document;
//! `plan` prints the write plan a save of a JSON document would issue.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use trellis_core::config::TrellisConfig;
use trellis_core::MetaData;
use trellis_graph::{GraphClient, GraphConfig, Session};
use trellis_sync::{plan_document, GraphDocument};

#[derive(Parser)]
#[command(name = "trellis-sync")]
#[command(about = "Load and plan Trellis object graphs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: trellis).
    #[arg(short, long, default_value = "trellis", global = true)]
    config: String,

    /// Entity schema file (overrides mapping.schema_path).
    #[arg(long, global = true)]
    schema: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Load objects from Neo4j and print them as JSON.
    Load {
        /// Class to load.
        #[arg(long, conflicts_with = "id", required_unless_present = "id")]
        label: Option<String>,
        /// Store id of a single node to load.
        #[arg(long)]
        id: Option<i64>,
        /// Relationship hops to follow (-1 = unlimited).
        #[arg(long, allow_negative_numbers = true)]
        depth: Option<i32>,
    },
    /// Print the write plan for a JSON object graph against an empty context.
    Plan {
        /// Object graph document.
        #[arg(long)]
        input: PathBuf,
        /// Relationship hops to follow (-1 = unlimited, 0 = properties only).
        #[arg(long, allow_negative_numbers = true)]
        horizon: Option<i32>,
        /// Keys of the objects to save (default: every object).
        #[arg(long = "root")]
        roots: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();

    let cli = Cli::parse();
    let config = TrellisConfig::load(&cli.config)?;
    let schema = Arc::new(load_schema(&cli, &config)?);

    match cli.command {
        Command::Load { label, id, depth } => {
            let depth = depth.unwrap_or(config.mapping.load_depth);
            let client = GraphClient::connect(&GraphConfig::from(&config.neo4j)).await?;
            let mut session = Session::new(schema, client);

            let objects = match (label, id) {
                (Some(class), _) => session.load_all(&class, depth).await?,
                (None, Some(id)) => session.load(id, depth).await?.into_iter().collect(),
                (None, None) => anyhow::bail!("either --label or --id is required"),
            };
            let document = GraphDocument::export(session.graph(), &objects);
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        Command::Plan {
            input,
            horizon,
            roots,
        } => {
            let horizon = horizon.unwrap_or(config.mapping.save_horizon);
            let document = GraphDocument::load(&input)?;
            let output = plan_document(&*schema, &document, &roots, horizon)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn load_schema(cli: &Cli, config: &TrellisConfig) -> anyhow::Result<MetaData> {
    let path = cli
        .schema
        .clone()
        .or_else(|| config.mapping.schema_path.as_ref().map(PathBuf::from))
        .ok_or_else(|| anyhow::anyhow!("no schema given: pass --schema or set mapping.schema_path"))?;
    let schema = MetaData::load(&path)?;
    tracing::debug!(path = %path.display(), "schema loaded");
    Ok(schema)
}
