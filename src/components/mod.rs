//! Records, changesets and the simulation wrappers built around them

mod changeset;
mod edge;
mod node;
mod record;

pub use changeset::ChangeSet;
pub use edge::SimLink;
pub use node::SimNode;
pub use record::{Field, Record};
