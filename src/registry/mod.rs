//! Record ↔ simulation identity registries
//!
//! The registries are the arena of the simulation: the stage owns them exclusively and
//! layout engines borrow them for the duration of a call.

mod link_registry;
mod node_registry;

pub use link_registry::{LinkRegistry, LinkResolution};
pub use node_registry::{NodeBatch, NodeRegistry};
