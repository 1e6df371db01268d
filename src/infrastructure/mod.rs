//! In-memory dataflow implementation
//!
//! Concrete implementations of the [`Dataflow`] contracts that keep data sets and
//! signals in process memory. Used by the command-line tool, tests and hosts that
//! embed the stage without a full scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::components::{ChangeSet, Record};
use crate::dataflow::{DataSource, Dataflow, Signal};
use crate::value_objects::RecordId;

/// Registry of named in-memory data sources and signals
pub struct InMemoryDataflow {
    sources: RwLock<HashMap<String, Arc<MemorySource>>>,
    signals: RwLock<HashMap<String, Arc<MemorySignal>>>,
    next_id: AtomicU64,
}

impl InMemoryDataflow {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            signals: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Get or create the data source `name`
    pub fn source(&self, name: &str) -> Arc<MemorySource> {
        self.sources
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemorySource::new(name)))
            .clone()
    }

    /// Get or create the signal `name`; `initial` is only used on creation
    pub fn define_signal(&self, name: &str, initial: Value) -> Arc<MemorySignal> {
        self.signals
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemorySignal::new(name, initial)))
            .clone()
    }

    /// Wrap JSON values into records with fresh identities
    pub fn records(&self, values: &[Value]) -> Vec<Record> {
        values
            .iter()
            .map(|value| {
                let id = RecordId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
                Record::from_json(id, value.clone())
            })
            .collect()
    }

    /// Append `values` to the data source `name` as one pulse and return that pulse
    pub fn ingest(&self, name: &str, values: &[Value]) -> ChangeSet {
        let records = self.records(values);
        self.source(name).apply(ChangeSet::new().with_add(records))
    }
}

impl Default for InMemoryDataflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataflow for InMemoryDataflow {
    fn data(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources
            .read()
            .get(name)
            .map(|source| source.clone() as Arc<dyn DataSource>)
    }

    fn signal(&self, name: &str) -> Option<Arc<dyn Signal>> {
        self.signals
            .read()
            .get(name)
            .map(|signal| signal.clone() as Arc<dyn Signal>)
    }
}

struct SourceState {
    values: IndexMap<RecordId, Record>,
    last: ChangeSet,
    stamp: u64,
}

/// In-memory data set that remembers its latest pulse
pub struct MemorySource {
    name: String,
    state: RwLock<SourceState>,
}

impl MemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(SourceState {
                values: IndexMap::new(),
                last: ChangeSet::new(),
                stamp: 0,
            }),
        }
    }

    /// Apply a pulse: additions are appended, removals dropped by identity. The pulse
    /// becomes `last()` with a fresh stamp, which is also returned.
    pub fn apply(&self, mut changeset: ChangeSet) -> ChangeSet {
        let mut state = self.state.write();
        for record in &changeset.add {
            state.values.insert(record.id(), record.clone());
        }
        for record in &changeset.rem {
            state.values.shift_remove(&record.id());
        }
        state.stamp += 1;
        changeset.stamp = state.stamp;
        state.last = changeset.clone();
        changeset
    }

    /// Remove the records with the given identities in one pulse
    pub fn remove(&self, ids: &[RecordId]) -> ChangeSet {
        let doomed: Vec<Record> = {
            let state = self.state.read();
            ids.iter()
                .filter_map(|id| state.values.get(id).cloned())
                .collect()
        };
        self.apply(ChangeSet::new().with_rem(doomed))
    }

    pub fn len(&self) -> usize {
        self.state.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn values(&self) -> Vec<Record> {
        self.state.read().values.values().cloned().collect()
    }

    fn last(&self) -> ChangeSet {
        self.state.read().last.clone()
    }
}

/// In-memory signal
pub struct MemorySignal {
    name: String,
    value: RwLock<Value>,
}

impl MemorySignal {
    pub fn new(name: &str, initial: Value) -> Self {
        Self {
            name: name.to_string(),
            value: RwLock::new(initial),
        }
    }

    pub fn set(&self, value: Value) {
        *self.value.write() = value;
    }
}

impl Signal for MemorySignal {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self) -> Value {
        self.value.read().clone()
    }
}
