//! Constraint handling around the simulation
//!
//! Before stepping, fixed nodes and the active node are pinned and a dragged node is
//! moved onto the pointer. After stepping, coordinates are clamped to the canvas (when
//! bounded) and written back to the node records.

use std::collections::HashSet;

use crate::registry::NodeRegistry;
use crate::value_objects::{ActiveNode, OutputFields, RecordId, Vec2};

/// Canvas clamping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub enabled: bool,
    pub size: [f64; 2],
}

impl Bounds {
    pub fn new(enabled: bool, size: [f64; 2]) -> Self {
        Self { enabled, size }
    }

    /// Restrict `value` to `[0, max]`
    pub fn clamp(value: f64, max: f64) -> f64 {
        value.min(max).max(0.0)
    }

    pub fn apply(&self, position: Vec2) -> Vec2 {
        if !self.enabled {
            return position;
        }
        Vec2::new(
            Self::clamp(position.x, self.size[0]),
            Self::clamp(position.y, self.size[1]),
        )
    }
}

/// Applies the pinning and output rules of one invocation or tick
pub struct ConstraintResolver<'a> {
    fixed: &'a HashSet<RecordId>,
    active: Option<&'a ActiveNode>,
    bounds: Bounds,
    output: &'a OutputFields,
}

impl<'a> ConstraintResolver<'a> {
    pub fn new(
        fixed: &'a HashSet<RecordId>,
        active: Option<&'a ActiveNode>,
        bounds: Bounds,
        output: &'a OutputFields,
    ) -> Self {
        Self {
            fixed,
            active,
            bounds,
            output,
        }
    }

    fn dragged(&self) -> Option<&'a ActiveNode> {
        self.active.filter(|active| active.is_drag())
    }

    /// Pin fixed and active nodes; unpin everything else.
    ///
    /// Pinned nodes lose their velocity, so the integrator holds them where they are.
    /// The dragged node is moved onto the pointer.
    pub fn prepare(&self, nodes: &mut NodeRegistry) {
        let dragged = self.dragged();
        for node in nodes.iter_mut() {
            let id = node.id();
            node.pinned = self.active.map(|a| a.id) == Some(id) || self.fixed.contains(&id);
            if let Some(active) = dragged.filter(|a| a.id == id) {
                node.place_at(active.position());
            } else if node.pinned {
                node.previous = node.position;
            }
        }
    }

    /// Re-apply the pins, then write the coordinate fields of every placed node.
    ///
    /// Output coordinates are clamped to the canvas when bounding is on; the simulated
    /// positions are left as they are. Returns the number of records written.
    pub fn apply(&self, nodes: &mut NodeRegistry) -> usize {
        self.prepare(nodes);

        let mut written = 0;
        for node in nodes.iter() {
            let Some(position) = node.position else {
                continue;
            };
            let position = self.bounds.apply(position);
            let record = node.record();
            record.set(&self.output.x, position.x);
            record.set(&self.output.y, position.y);
            written += 1;
        }
        written
    }
}
