//! Force-directed layout algorithms
//!
//! [`LayoutEngine`] is the seam the stage drives; [`ForceLayout`] is the default
//! Barnes-Hut/Verlet implementation.

pub mod engine;
pub mod force;
pub mod quadtree;

pub use engine::{LayoutEngine, TickListener};
pub use force::{ForceLayout, ALPHA_DECAY, ALPHA_MIN, DEFAULT_ALPHA};
pub use quadtree::QuadTree;
