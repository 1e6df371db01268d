//! Changesets exchanged with the dataflow framework

use indexmap::IndexSet;

use crate::components::Record;
use crate::value_objects::RecordId;

/// Records added, removed and modified on one stream during one pulse
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub add: Vec<Record>,
    pub rem: Vec<Record>,
    pub modified: Vec<Record>,
    /// Names of the fields modified by this pulse
    pub fields: IndexSet<String>,
    /// Ask downstream stages to re-read current values
    pub reflow: bool,
    /// Pulse stamp assigned by the source; 0 means unstamped
    pub stamp: u64,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty changeset flagged as a reflow
    pub fn reflow() -> Self {
        Self {
            reflow: true,
            ..Self::default()
        }
    }

    pub fn with_add(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.add.extend(records);
        self
    }

    pub fn with_rem(mut self, records: impl IntoIterator<Item = Record>) -> Self {
        self.rem.extend(records);
        self
    }

    pub fn with_modified(
        mut self,
        records: impl IntoIterator<Item = Record>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.modified.extend(records);
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.rem.is_empty() && self.modified.is_empty()
    }

    pub fn has_additions(&self) -> bool {
        !self.add.is_empty()
    }

    pub fn mark_modified(&mut self, field: &str) {
        self.fields.insert(field.to_string());
    }

    pub fn touches(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn added_ids(&self) -> Vec<RecordId> {
        self.add.iter().map(Record::id).collect()
    }

    pub fn removed_ids(&self) -> Vec<RecordId> {
        self.rem.iter().map(Record::id).collect()
    }
}
