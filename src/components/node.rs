//! Simulation node wrapper

use crate::components::Record;
use crate::value_objects::{RecordId, Vec2};

/// Simulation state attached to one node record
#[derive(Debug, Clone)]
pub struct SimNode {
    record: Record,
    /// Current position; `None` until the engine first places the node
    pub position: Option<Vec2>,
    /// Position before the last step, carries the node's velocity
    pub previous: Option<Vec2>,
    /// Excluded from force-driven displacement
    pub pinned: bool,
}

impl SimNode {
    pub fn new(record: Record) -> Self {
        Self {
            record,
            position: None,
            previous: None,
            pinned: false,
        }
    }

    pub fn id(&self) -> RecordId {
        self.record.id()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn is_positioned(&self) -> bool {
        self.position.is_some()
    }

    /// Move the node and zero its velocity
    pub fn place_at(&mut self, position: Vec2) {
        self.position = Some(position);
        self.previous = Some(position);
    }
}
