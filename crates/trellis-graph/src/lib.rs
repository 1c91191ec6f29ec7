//! trellis-graph: Runs Trellis write plans and loads against a graph store.
//!
//! [`GraphClient`] talks to Neo4j over Bolt; [`InMemoryExecutor`] keeps the
//! graph in process for tests and dry runs. Both implement
//! [`GraphRequestExecutor`], which [`Session`] uses to save and load object
//! graphs.

pub mod client;
pub mod cypher;
pub mod executor;
pub mod mock;
pub mod mutations;
pub mod queries;
pub mod session;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use executor::{GraphRequestExecutor, LoadRequest, LoadRoot};
pub use mock::InMemoryExecutor;
pub use session::{SaveReport, Session};
