//! Default force simulation
//!
//! Position-Verlet integration of three forces: springs along links (relaxed in place,
//! Gauss-Seidel style), a weak gravity toward the canvas center and pairwise charge
//! approximated with a Barnes-Hut quadtree. Each step cools `alpha` geometrically; once it
//! drops below [`ALPHA_MIN`] the simulation reports convergence and stands still.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::errors::EngineError;
use crate::events::TickEvent;
use crate::layout::engine::{LayoutEngine, TickListener};
use crate::layout::quadtree::QuadTree;
use crate::registry::{LinkRegistry, NodeRegistry};
use crate::value_objects::{Scalar, Vec2};

/// Temperature set by `start()`
pub const DEFAULT_ALPHA: f64 = 0.1;
/// Cooling factor applied on every step
pub const ALPHA_DECAY: f64 = 0.99;
/// Below this temperature the simulation is considered converged
pub const ALPHA_MIN: f64 = 0.005;

pub const DEFAULT_LINK_STRENGTH: f64 = 1.0;
pub const DEFAULT_LINK_DISTANCE: f64 = 20.0;
pub const DEFAULT_CHARGE: f64 = -30.0;
pub const DEFAULT_FRICTION: f64 = 0.9;
pub const DEFAULT_THETA: f64 = 0.8;
pub const DEFAULT_GRAVITY: f64 = 0.1;

/// Spring term of one link, resolved to dense node indices
#[derive(Debug, Clone, Copy)]
struct Spring {
    source: usize,
    target: usize,
    strength: f64,
    distance: f64,
}

/// Per-step working copy of a node
#[derive(Debug, Clone, Copy)]
struct Body {
    position: Vec2,
    previous: Vec2,
    pinned: bool,
}

/// Barnes-Hut force simulation
pub struct ForceLayout {
    size: [f64; 2],
    link_strength: Scalar,
    link_distance: Scalar,
    charge: Scalar,
    charge_distance: Scalar,
    theta: f64,
    friction: f64,
    gravity: f64,
    alpha: f64,
    ticks: u64,
    charges: Vec<f64>,
    charge_distances2: Vec<f64>,
    weights: Vec<f64>,
    springs: Vec<Spring>,
    listener: Option<TickListener>,
    rng: StdRng,
}

impl Default for ForceLayout {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl ForceLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulation whose random placement and jitter are reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            size: [1.0, 1.0],
            link_strength: Scalar::Value(DEFAULT_LINK_STRENGTH),
            link_distance: Scalar::Value(DEFAULT_LINK_DISTANCE),
            charge: Scalar::Value(DEFAULT_CHARGE),
            charge_distance: Scalar::Value(f64::INFINITY),
            theta: DEFAULT_THETA,
            friction: DEFAULT_FRICTION,
            gravity: DEFAULT_GRAVITY,
            alpha: 0.0,
            ticks: 0,
            charges: Vec::new(),
            charge_distances2: Vec::new(),
            weights: Vec::new(),
            springs: Vec::new(),
            listener: None,
            rng,
        }
    }

    /// Steps taken since creation, converged no-op steps excluded
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Place a node that has no position yet: copy the coordinate of the first placed
    /// neighbour, otherwise pick uniformly inside the canvas. Each axis is chosen
    /// independently.
    fn place(&mut self, nodes: &mut NodeRegistry, neighbors: &[Vec<usize>], index: usize) {
        let Some(node) = nodes.get_index(index) else {
            return;
        };
        if node.is_positioned() {
            if node.previous.is_none() {
                let position = node.position;
                if let Some(node) = nodes.get_index_mut(index) {
                    node.previous = position;
                }
            }
            return;
        }

        let placed_neighbor = neighbors[index]
            .iter()
            .filter_map(|&other| nodes.get_index(other).and_then(|n| n.position))
            .next();
        let position = match placed_neighbor {
            Some(neighbor) => neighbor,
            None => Vec2::new(
                self.rng.gen::<f64>() * self.size[0],
                self.rng.gen::<f64>() * self.size[1],
            ),
        };

        if let Some(node) = nodes.get_index_mut(index) {
            node.place_at(position);
        }
    }

    fn bodies(&self, nodes: &NodeRegistry) -> Result<Vec<Body>, EngineError> {
        nodes
            .iter()
            .map(|node| match node.position {
                Some(position) => Ok(Body {
                    position,
                    previous: node.previous.unwrap_or(position),
                    pinned: node.pinned,
                }),
                None => Err(EngineError::Unpositioned { node: node.id() }),
            })
            .collect()
    }

    fn relax_springs(&self, bodies: &mut [Body], alpha: f64) {
        for spring in &self.springs {
            let source = bodies[spring.source].position;
            let target = bodies[spring.target].position;
            let delta = target - source;
            let length2 = delta.length_squared();
            if length2 == 0.0 {
                continue;
            }
            let length = length2.sqrt();
            let stretch = alpha * spring.strength * (length - spring.distance) / length;
            let correction = delta * stretch;

            let (ws, wt) = (self.weights[spring.source], self.weights[spring.target]);
            let share = if ws + wt > 0.0 { ws / (ws + wt) } else { 0.5 };
            bodies[spring.target].position -= correction * share;
            bodies[spring.source].position += correction * (1.0 - share);
        }
    }

    fn apply_gravity(&self, bodies: &mut [Body], alpha: f64) {
        let k = alpha * self.gravity;
        if k == 0.0 {
            return;
        }
        let center = Vec2::new(self.size[0] / 2.0, self.size[1] / 2.0);
        for body in bodies.iter_mut() {
            body.position += (center - body.position) * k;
        }
    }

    fn apply_charge(&mut self, bodies: &mut [Body], alpha: f64) {
        if self.charges.iter().all(|charge| *charge == 0.0) {
            return;
        }
        let mut positions: Vec<Vec2> = bodies.iter().map(|b| b.position).collect();
        let mut tree = QuadTree::build(&positions);
        tree.accumulate(alpha, &self.charges, &mut positions, &mut self.rng);

        for (index, body) in bodies.iter_mut().enumerate() {
            body.position = positions[index];
            if body.pinned {
                continue;
            }
            let max_distance2 = self.charge_distances2[index];
            let push = tree.repulse(index, body.position, self.theta, max_distance2);
            body.previous -= push;
        }
    }

    fn integrate(&self, bodies: &mut [Body]) {
        for body in bodies.iter_mut() {
            if body.pinned {
                body.position = body.previous;
            } else {
                let current = body.position;
                body.position -= (body.previous - current) * self.friction;
                body.previous = current;
            }
        }
    }
}

impl LayoutEngine for ForceLayout {
    fn set_size(&mut self, size: [f64; 2]) {
        self.size = size;
    }

    fn set_link_strength(&mut self, strength: Scalar) {
        self.link_strength = strength;
    }

    fn set_link_distance(&mut self, distance: Scalar) {
        self.link_distance = distance;
    }

    fn set_charge(&mut self, charge: Scalar) {
        self.charge = charge;
    }

    fn set_charge_distance(&mut self, distance: Scalar) {
        self.charge_distance = distance;
    }

    fn set_theta(&mut self, theta: f64) {
        self.theta = theta;
    }

    fn set_friction(&mut self, friction: f64) {
        self.friction = friction;
    }

    fn set_gravity(&mut self, gravity: f64) {
        self.gravity = gravity;
    }

    fn set_nodes(&mut self, nodes: &NodeRegistry) {
        self.charges = nodes
            .iter()
            .map(|node| self.charge.resolve(node.record(), DEFAULT_CHARGE))
            .collect();
        self.charge_distances2 = nodes
            .iter()
            .map(|node| {
                let distance = self.charge_distance.resolve(node.record(), f64::INFINITY);
                distance * distance
            })
            .collect();
    }

    fn set_links(&mut self, nodes: &NodeRegistry, links: &LinkRegistry) {
        self.weights = vec![0.0; nodes.len()];
        self.springs = links
            .iter()
            .filter_map(|link| {
                let (Some(source), Some(target)) =
                    (nodes.index_of(link.source()), nodes.index_of(link.target()))
                else {
                    tracing::warn!(
                        link = %link.id(),
                        "link endpoint is not a live node, spring skipped"
                    );
                    return None;
                };
                self.weights[source] += 1.0;
                self.weights[target] += 1.0;
                Some(Spring {
                    source,
                    target,
                    strength: self
                        .link_strength
                        .resolve(link.record(), DEFAULT_LINK_STRENGTH),
                    distance: self
                        .link_distance
                        .resolve(link.record(), DEFAULT_LINK_DISTANCE),
                })
            })
            .collect();
    }

    fn on_tick(&mut self, listener: Option<TickListener>) {
        self.listener = listener;
    }

    fn start(&mut self, nodes: &mut NodeRegistry, links: &LinkRegistry) {
        self.set_nodes(nodes);
        self.set_links(nodes, links);

        let mut neighbors = vec![Vec::new(); nodes.len()];
        for spring in &self.springs {
            neighbors[spring.source].push(spring.target);
            neighbors[spring.target].push(spring.source);
        }
        for index in 0..nodes.len() {
            self.place(nodes, &neighbors, index);
        }

        tracing::debug!(
            nodes = nodes.len(),
            links = self.springs.len(),
            "force simulation started"
        );
        self.set_alpha(DEFAULT_ALPHA);
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.alpha = if alpha > 0.0 { alpha } else { 0.0 };
    }

    fn tick(&mut self, nodes: &mut NodeRegistry) -> Result<bool, EngineError> {
        if nodes.len() != self.charges.len() || nodes.len() != self.weights.len() {
            return Err(EngineError::StaleTopology {
                expected: self.charges.len(),
                actual: nodes.len(),
            });
        }

        self.alpha *= ALPHA_DECAY;
        if self.alpha < ALPHA_MIN {
            self.alpha = 0.0;
            return Ok(true);
        }
        let alpha = self.alpha;

        let mut bodies = self.bodies(nodes)?;
        self.relax_springs(&mut bodies, alpha);
        self.apply_gravity(&mut bodies, alpha);
        self.apply_charge(&mut bodies, alpha);
        self.integrate(&mut bodies);

        let diverged = bodies
            .iter()
            .zip(nodes.iter())
            .find(|(b, _)| !b.position.is_finite() || !b.previous.is_finite())
            .map(|(_, node)| node.id());
        if let Some(node) = diverged {
            self.alpha = 0.0;
            return Err(EngineError::Diverged { node });
        }

        for (node, body) in nodes.iter_mut().zip(&bodies) {
            node.position = Some(body.position);
            node.previous = Some(body.previous);
        }

        self.ticks += 1;
        if let Some(listener) = self.listener.as_mut() {
            listener(&TickEvent {
                alpha,
                tick: self.ticks,
            });
        }
        Ok(false)
    }

    fn stop(&mut self) {
        self.set_alpha(0.0);
    }
}
