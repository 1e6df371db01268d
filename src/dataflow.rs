//! Contracts of the host dataflow framework
//!
//! The stage never talks to a scheduler directly. It looks up the data sets and signals
//! named in its definition through [`Dataflow`] and reads them on every invocation.

use std::sync::Arc;

use serde_json::Value;

use crate::components::{ChangeSet, Record};

/// A named data set maintained by the host
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Current records of the data set
    fn values(&self) -> Vec<Record>;

    /// The changeset of the most recent pulse on this data set
    fn last(&self) -> ChangeSet;
}

/// A named signal holding one JSON value
pub trait Signal: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self) -> Value;
}

/// Name-based lookup of data sources and signals
pub trait Dataflow: Send + Sync {
    fn data(&self, name: &str) -> Option<Arc<dyn DataSource>>;

    fn signal(&self, name: &str) -> Option<Arc<dyn Signal>>;
}
