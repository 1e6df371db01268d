//! Live simulation nodes keyed by record identity

use indexmap::IndexMap;
use std::collections::HashSet;

use crate::components::{Record, SimNode};
use crate::errors::ChangesetError;
use crate::value_objects::RecordId;

/// Identities of the nodes added by one invocation, in arrival order.
///
/// Links added in the same invocation address their endpoints by position in this batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeBatch {
    ids: Vec<RecordId>,
}

impl NodeBatch {
    pub fn get(&self, index: usize) -> Option<RecordId> {
        self.ids.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Owns the simulation node for every live node record.
///
/// Insertion order is preserved and doubles as the dense index engines use for their
/// per-node caches.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: IndexMap<RecordId, SimNode>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: RecordId) -> Option<&SimNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut SimNode> {
        self.nodes.get_mut(&id)
    }

    /// Dense index of a node, stable until the next removal
    pub fn index_of(&self, id: RecordId) -> Option<usize> {
        self.nodes.get_index_of(&id)
    }

    pub fn get_index(&self, index: usize) -> Option<&SimNode> {
        self.nodes.get_index(index).map(|(_, node)| node)
    }

    pub fn get_index_mut(&mut self, index: usize) -> Option<&mut SimNode> {
        self.nodes.get_index_mut(index).map(|(_, node)| node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimNode> {
        self.nodes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SimNode> {
        self.nodes.values_mut()
    }

    /// Wrap a node record and append it to the live set
    pub fn add_node(&mut self, record: Record) -> Result<&mut SimNode, ChangesetError> {
        let id = record.id();
        if self.nodes.contains_key(&id) {
            return Err(ChangesetError::DuplicateNode(id));
        }
        let (index, _) = self.nodes.insert_full(id, SimNode::new(record));
        Ok(&mut self.nodes[index])
    }

    /// Add a whole batch, all or nothing
    pub fn add_batch(&mut self, records: &[Record]) -> Result<NodeBatch, ChangesetError> {
        self.check_additions(records)?;
        let ids = records
            .iter()
            .map(|record| {
                self.nodes.insert(record.id(), SimNode::new(record.clone()));
                record.id()
            })
            .collect();
        Ok(NodeBatch { ids })
    }

    /// Reject duplicates within the batch and against the live set
    pub fn check_additions(&self, records: &[Record]) -> Result<(), ChangesetError> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            let id = record.id();
            if self.nodes.contains_key(&id) || !seen.insert(id) {
                return Err(ChangesetError::DuplicateNode(id));
            }
        }
        Ok(())
    }

    /// Drop the given identities, keeping the order of the survivors.
    ///
    /// Returns the identities that were actually live.
    pub fn remove_nodes(&mut self, ids: &[RecordId]) -> Vec<RecordId> {
        let doomed: HashSet<RecordId> = ids.iter().copied().collect();
        let mut removed = Vec::new();
        self.nodes.retain(|id, _| {
            let keep = !doomed.contains(id);
            if !keep {
                removed.push(*id);
            }
            keep
        });
        removed
    }
}
