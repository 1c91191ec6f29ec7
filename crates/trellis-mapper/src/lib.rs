//! trellis-mapper: Keeps an in-memory object graph in step with a property graph.
//!
//! Two algorithms share one identity and relationship registry:
//! - [`ObjectGraphDiffer`] walks mutated objects and compiles a [`WritePlan`]
//!   of node and edge creates, updates, and deletes (save path)
//! - [`GraphHydrator`] merges query results into identity-consistent domain
//!   objects (load path)
//! - [`MappingContext`] records what the store held as of the last sync

pub mod collector;
pub mod commit;
pub mod compile;
pub mod context;
pub mod differ;
pub mod hydrator;
pub mod memo;
pub mod plan;

pub use commit::SavePlan;
pub use context::MappingContext;
pub use differ::ObjectGraphDiffer;
pub use hydrator::{GraphHydrator, Hydration, HydrationReport};
pub use plan::{PlanSummary, WriteAcknowledgement, WriteOperation, WritePlan};
