//! The layout engine seam
//!
//! The stage drives physics only through this trait, so the integrator can be replaced
//! without touching registry or scheduling code. Engines never own nodes or links: the
//! registries are passed in on every call and engines keep index-based caches that are
//! rebuilt by `set_nodes` / `set_links` / `start`.

use crate::events::TickEvent;
use crate::registry::{LinkRegistry, NodeRegistry};
use crate::errors::EngineError;
use crate::value_objects::Scalar;

/// Callback invoked synchronously after every completed step
pub type TickListener = Box<dyn FnMut(&TickEvent) + Send>;

/// Operations a force simulation must offer to the layout stage
pub trait LayoutEngine: Send {
    /// Canvas `[width, height]`; gravity pulls toward its center
    fn set_size(&mut self, size: [f64; 2]);

    fn set_link_strength(&mut self, strength: Scalar);

    /// Rest length of each link
    fn set_link_distance(&mut self, distance: Scalar);

    /// Charge per node; negative values repel
    fn set_charge(&mut self, charge: Scalar);

    /// Maximum distance over which a node feels charge forces
    fn set_charge_distance(&mut self, distance: Scalar);

    /// Barnes-Hut approximation criterion
    fn set_theta(&mut self, theta: f64);

    /// Velocity retained per step
    fn set_friction(&mut self, friction: f64);

    fn set_gravity(&mut self, gravity: f64);

    /// Node membership changed; positions of surviving nodes are kept
    fn set_nodes(&mut self, nodes: &NodeRegistry);

    /// Link membership changed
    fn set_links(&mut self, nodes: &NodeRegistry, links: &LinkRegistry);

    fn on_tick(&mut self, listener: Option<TickListener>);

    /// Prepare force terms for the current sets, place unplaced nodes and warm up.
    /// Repeated calls never move nodes that already have a position.
    fn start(&mut self, nodes: &mut NodeRegistry, links: &LinkRegistry);

    fn alpha(&self) -> f64;

    /// Set the temperature; a positive value restarts a cooled simulation, zero stops it
    fn set_alpha(&mut self, alpha: f64);

    /// Advance one step. Returns `true` once the simulation has cooled down.
    fn tick(&mut self, nodes: &mut NodeRegistry) -> Result<bool, EngineError>;

    /// Cool the simulation to zero; self-driven loops stop on the next check
    fn stop(&mut self);

    fn is_running(&self) -> bool {
        self.alpha() > 0.0
    }
}
