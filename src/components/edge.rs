//! Simulation link wrapper

use crate::components::Record;
use crate::value_objects::RecordId;

/// A spring between two live simulation nodes, keyed by their record identities
#[derive(Debug, Clone)]
pub struct SimLink {
    record: Record,
    source: RecordId,
    target: RecordId,
}

impl SimLink {
    pub fn new(record: Record, source: RecordId, target: RecordId) -> Self {
        Self {
            record,
            source,
            target,
        }
    }

    pub fn id(&self) -> RecordId {
        self.record.id()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn source(&self) -> RecordId {
        self.source
    }

    pub fn target(&self) -> RecordId {
        self.target
    }

    pub fn touches(&self, node: RecordId) -> bool {
        self.source == node || self.target == node
    }
}
