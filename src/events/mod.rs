//! Layout events
//!
//! Engines report each completed step with a [`TickEvent`]. The stage forwards those as
//! [`TickCompleted`] messages across the tick bridge and turns every one of them into a
//! [`Reflow`] for the host scheduler to propagate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::components::ChangeSet;

/// One simulation step finished inside an engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
    /// Temperature after the step
    pub alpha: f64,
    /// Steps taken since the engine was created
    pub tick: u64,
}

/// Tick notification sent from the periodic driver to the stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickCompleted {
    /// The stage whose simulation stepped
    pub stage_id: Uuid,
    pub tick: u64,
    pub alpha: f64,
    /// When the step finished
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl TickCompleted {
    pub fn new(stage_id: Uuid, event: &TickEvent) -> Self {
        Self {
            stage_id,
            tick: event.tick,
            alpha: event.alpha,
            completed_at: chrono::Utc::now(),
        }
    }
}

/// Pulses the host must propagate after an interactive tick
#[derive(Debug, Clone)]
pub struct Reflow {
    /// Reflow of this stage's node output, coordinate fields marked modified
    pub nodes: ChangeSet,
    /// Reflow of the link data source, so link consumers re-read endpoint positions
    pub links: ChangeSet,
    /// Name of the link data source the `links` pulse belongs to
    pub link_source: String,
    pub tick: u64,
    pub alpha: f64,
}
