//! Incremental force-directed layout for the Composable Information Machine
//!
//! A dataflow stage that keeps a force simulation synchronised with a stream of node and
//! link records. Records are added and removed incrementally without resetting the
//! simulation; coordinates are written back onto the node records after every run.

pub mod bridge;
pub mod components;
pub mod dataflow;
pub mod errors;
pub mod events;
pub mod infrastructure;
pub mod layout;
pub mod registry;
pub mod systems;
pub mod transform;
pub mod value_objects;

// Re-export the stage and its configuration
pub use transform::{ForceConfig, ForceTransform, LayoutPhase, TransformOutput};

// Re-export records and changesets
pub use components::{ChangeSet, Field, Record, SimLink, SimNode};

// Re-export errors
pub use errors::{
    ChangesetError, ConfigError, Diagnostic, EngineError, ForceError, ForceResult,
    ResolutionError,
};

// Re-export events
pub use events::{Reflow, TickCompleted, TickEvent};

// Re-export the engine seam
pub use layout::{ForceLayout, LayoutEngine, TickListener};

// Re-export dataflow contracts and the in-memory implementation
pub use dataflow::{DataSource, Dataflow, Signal};
pub use infrastructure::{InMemoryDataflow, MemorySignal, MemorySource};

pub use registry::LinkResolution;
pub use value_objects::{ActiveNode, OutputFields, RecordId, Scalar, Vec2};
