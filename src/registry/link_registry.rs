//! Live simulation links keyed by record identity

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::components::{Record, SimLink, SimNode};
use crate::errors::{ChangesetError, Endpoint, ResolutionError};
use crate::registry::{NodeBatch, NodeRegistry};
use crate::value_objects::{OutputFields, RecordId};

/// How link records name their endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkResolution {
    /// `source` / `target` are positions in the batch of nodes added in the same
    /// invocation. Order-dependent; kept for compatibility with existing pipelines.
    #[default]
    Batch,
    /// `source` / `target` hold node record ids
    Identity,
}

/// Owns the simulation link for every live link record
#[derive(Debug, Default)]
pub struct LinkRegistry {
    links: IndexMap<RecordId, SimLink>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.links.contains_key(&id)
    }

    pub fn get(&self, id: RecordId) -> Option<&SimLink> {
        self.links.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimLink> {
        self.links.values()
    }

    /// Map a link record's declared endpoints onto live node identities
    pub fn resolve_endpoints(
        record: &Record,
        batch: &NodeBatch,
        nodes: &NodeRegistry,
        resolution: LinkResolution,
    ) -> Result<(RecordId, RecordId), ResolutionError> {
        let source = Self::resolve_endpoint(record, Endpoint::Source, batch, nodes, resolution)?;
        let target = Self::resolve_endpoint(record, Endpoint::Target, batch, nodes, resolution)?;
        Ok((source, target))
    }

    fn resolve_endpoint(
        record: &Record,
        endpoint: Endpoint,
        batch: &NodeBatch,
        nodes: &NodeRegistry,
        resolution: LinkResolution,
    ) -> Result<RecordId, ResolutionError> {
        let link = record.id();
        let raw = record
            .get_u64(endpoint.field())
            .ok_or(ResolutionError::MissingEndpoint { link, endpoint })?;

        let node = match resolution {
            LinkResolution::Batch => usize::try_from(raw)
                .ok()
                .and_then(|index| batch.get(index))
                .ok_or(ResolutionError::IndexOutOfBatch {
                    link,
                    endpoint,
                    index: raw,
                    batch_len: batch.len(),
                })?,
            LinkResolution::Identity => RecordId::new(raw),
        };

        if !nodes.contains(node) {
            return Err(ResolutionError::UnknownNode {
                link,
                endpoint,
                node,
            });
        }
        Ok(node)
    }

    /// Register a resolved link and mirror its endpoint records onto the link record
    pub fn add_link(
        &mut self,
        record: Record,
        source: &SimNode,
        target: &SimNode,
        output: &OutputFields,
    ) -> Result<&SimLink, ChangesetError> {
        let id = record.id();
        if self.links.contains_key(&id) {
            return Err(ChangesetError::DuplicateLink(id));
        }
        record.set(&output.source, source.record().clone());
        record.set(&output.target, target.record().clone());

        let (index, _) = self
            .links
            .insert_full(id, SimLink::new(record, source.id(), target.id()));
        Ok(&self.links[index])
    }

    /// Reject duplicates within the batch and against the live set
    pub fn check_additions(&self, records: &[Record]) -> Result<(), ChangesetError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            let id = record.id();
            if self.links.contains_key(&id) || !seen.insert(id) {
                return Err(ChangesetError::DuplicateLink(id));
            }
        }
        Ok(())
    }

    /// Drop the given link identities; returns the ones that were live
    pub fn remove_links(&mut self, ids: &[RecordId]) -> Vec<RecordId> {
        let doomed: HashSet<RecordId> = ids.iter().copied().collect();
        self.retain_reporting(|link| !doomed.contains(&link.id()))
    }

    /// Drop every link attached to one of the removed nodes
    pub fn cascade(&mut self, removed_nodes: &[RecordId]) -> Vec<RecordId> {
        if removed_nodes.is_empty() {
            return Vec::new();
        }
        let gone: HashSet<RecordId> = removed_nodes.iter().copied().collect();
        self.retain_reporting(|link| {
            !gone.contains(&link.source()) && !gone.contains(&link.target())
        })
    }

    fn retain_reporting(&mut self, mut keep: impl FnMut(&SimLink) -> bool) -> Vec<RecordId> {
        let mut removed = Vec::new();
        self.links.retain(|id, link| {
            let kept = keep(link);
            if !kept {
                removed.push(*id);
            }
            kept
        });
        removed
    }
}
