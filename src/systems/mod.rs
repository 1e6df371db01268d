//! Systems that run around each simulation step

pub mod constraints;

pub use constraints::{Bounds, ConstraintResolver};
