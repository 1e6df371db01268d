//! Error types for the force layout stage
//!
//! Configuration problems are fatal and surface when the stage is built. Inconsistent
//! changesets fail a single invocation before any state is touched. Link resolution
//! problems are per-record and reported as diagnostics alongside the output.

use std::fmt;

use crate::value_objects::RecordId;

/// Problems with the stage definition or its signal values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required `links` data reference")]
    MissingLinks,

    #[error("Unknown data source: {0}")]
    UnknownData(String),

    #[error("Unknown signal: {0}")]
    UnknownSignal(String),

    #[error("Malformed active signal: {0}")]
    MalformedActive(String),

    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Unsupported transform type: {0}")]
    UnsupportedType(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Changesets that contradict the stage's current record set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangesetError {
    #[error("Node {0} is already part of the layout")]
    DuplicateNode(RecordId),

    #[error("Link {0} is already part of the layout")]
    DuplicateLink(RecordId),

    #[error("Cannot remove node {0}: it is not part of the layout")]
    UnknownNode(RecordId),

    #[error("Cannot remove link {0}: it is not part of the layout")]
    UnknownLink(RecordId),
}

/// Which end of a link failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Target,
}

impl Endpoint {
    pub fn field(&self) -> &'static str {
        match self {
            Endpoint::Source => "source",
            Endpoint::Target => "target",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// A link record whose endpoint cannot be mapped to a live node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("Link {link} has no usable `{endpoint}` field")]
    MissingEndpoint { link: RecordId, endpoint: Endpoint },

    #[error("Link {link} `{endpoint}` index {index} is outside its batch of {batch_len}")]
    IndexOutOfBatch {
        link: RecordId,
        endpoint: Endpoint,
        index: u64,
        batch_len: usize,
    },

    #[error("Link {link} `{endpoint}` names node {node} which is not part of the layout")]
    UnknownNode {
        link: RecordId,
        endpoint: Endpoint,
        node: RecordId,
    },
}

impl ResolutionError {
    pub fn link(&self) -> RecordId {
        match self {
            ResolutionError::MissingEndpoint { link, .. }
            | ResolutionError::IndexOutOfBatch { link, .. }
            | ResolutionError::UnknownNode { link, .. } => *link,
        }
    }
}

/// Faults raised by a layout engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Simulation diverged: node {node} has non-finite coordinates")]
    Diverged { node: RecordId },

    #[error("Node {node} was never placed; start() must run before tick()")]
    Unpositioned { node: RecordId },

    #[error("Engine topology is stale: prepared for {expected} nodes, given {actual}")]
    StaleTopology { expected: usize, actual: usize },
}

/// Non-fatal problems found while processing one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A link was skipped because an endpoint did not resolve
    Unresolved(ResolutionError),
    /// A live link's `source` or `target` field was modified; the edit is ignored
    UnsupportedLinkEdit { link: RecordId, field: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Unresolved(error) => write!(f, "{error}"),
            Diagnostic::UnsupportedLinkEdit { link, field } => {
                write!(f, "Link {link}: edits to `{field}` after creation are not supported")
            }
        }
    }
}

/// Top-level error of the force layout stage
#[derive(Debug, thiserror::Error)]
pub enum ForceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Inconsistent changeset: {0}")]
    Changeset(#[from] ChangesetError),

    #[error("Layout engine fault: {0}")]
    Engine(#[from] EngineError),

    #[error("The layout stage has been shut down")]
    ShutDown,
}

/// Result type for stage operations
pub type ForceResult<T> = Result<T, ForceError>;
