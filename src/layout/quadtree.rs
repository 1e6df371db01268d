//! Barnes-Hut quadtree for charge forces
//!
//! Space is recursively split into quadrants and every cell accumulates the charge and
//! charge-weighted center of the points below it. Distant cells are treated as a single
//! body, reducing the pairwise repulsion from O(n²) to O(n log n).

use rand::Rng;

use crate::value_objects::Vec2;

/// Points closer than this (L1 distance) are stored in separate cells along one branch
const COINCIDENT: f64 = 0.01;

/// Barnes-Hut quadtree over the positions of one simulation step
pub struct QuadTree {
    root: Quad,
    bounds: Bounds2D,
}

/// Cell of the tree. A cell stops being a leaf once anything is inserted below it; it
/// can still hold a point of its own when coincident points were pushed down.
struct Quad {
    leaf: bool,
    point: Option<(usize, Vec2)>,
    children: [Option<Box<Quad>>; 4],
    charge: f64,
    point_charge: f64,
    center: Vec2,
}

/// Square bounding box
#[derive(Debug, Clone, Copy)]
struct Bounds2D {
    min: Vec2,
    max: Vec2,
}

impl Bounds2D {
    fn center(&self) -> Vec2 {
        Vec2::new((self.min.x + self.max.x) * 0.5, (self.min.y + self.max.y) * 0.5)
    }

    fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    fn quadrant(&self, position: Vec2) -> usize {
        let center = self.center();
        let right = position.x >= center.x;
        let below = position.y >= center.y;
        (usize::from(below) << 1) | usize::from(right)
    }

    fn child_bounds(&self, quadrant: usize) -> Bounds2D {
        let center = self.center();
        let (min_x, max_x) = if quadrant & 1 == 0 {
            (self.min.x, center.x)
        } else {
            (center.x, self.max.x)
        };
        let (min_y, max_y) = if quadrant & 2 == 0 {
            (self.min.y, center.y)
        } else {
            (center.y, self.max.y)
        };
        Bounds2D {
            min: Vec2::new(min_x, min_y),
            max: Vec2::new(max_x, max_y),
        }
    }
}

impl Quad {
    fn new() -> Self {
        Self {
            leaf: true,
            point: None,
            children: Default::default(),
            charge: 0.0,
            point_charge: 0.0,
            center: Vec2::ZERO,
        }
    }

    fn insert(&mut self, index: usize, position: Vec2, bounds: Bounds2D) {
        if !position.is_finite() {
            return;
        }
        if !self.leaf {
            self.insert_child(index, position, bounds);
            return;
        }
        match self.point {
            Some((_, existing))
                if (existing.x - position.x).abs() + (existing.y - position.y).abs() < COINCIDENT =>
            {
                self.insert_child(index, position, bounds);
            }
            Some((other, existing)) => {
                // Push the resident point down, then the newcomer
                self.point = None;
                self.insert_child(other, existing, bounds);
                self.insert_child(index, position, bounds);
            }
            None => self.point = Some((index, position)),
        }
    }

    fn insert_child(&mut self, index: usize, position: Vec2, bounds: Bounds2D) {
        let quadrant = bounds.quadrant(position);
        self.leaf = false;
        self.children[quadrant]
            .get_or_insert_with(|| Box::new(Quad::new()))
            .insert(index, position, bounds.child_bounds(quadrant));
    }

    fn accumulate<R: Rng>(
        &mut self,
        alpha: f64,
        charges: &[f64],
        positions: &mut [Vec2],
        rng: &mut R,
    ) {
        let mut weighted = Vec2::ZERO;
        self.charge = 0.0;

        if !self.leaf {
            for child in self.children.iter_mut().flatten() {
                child.accumulate(alpha, charges, positions, rng);
                self.charge += child.charge;
                weighted += child.center * child.charge;
            }
        }

        if let Some((index, _)) = self.point {
            if !self.leaf {
                // Coincident points would never separate without a nudge
                positions[index].x += rng.gen::<f64>() - 0.5;
                positions[index].y += rng.gen::<f64>() - 0.5;
            }
            let k = alpha * charges[index];
            self.point_charge = k;
            self.charge += k;
            weighted += positions[index] * k;
        }

        self.center = if self.charge != 0.0 {
            weighted * (1.0 / self.charge)
        } else {
            Vec2::ZERO
        };
    }

    fn repulse(
        &self,
        index: usize,
        position: Vec2,
        width: f64,
        theta2: f64,
        max_distance2: f64,
        push: &mut Vec2,
    ) {
        if self.charge == 0.0 {
            return;
        }

        if self.point.map(|(i, _)| i) != Some(index) {
            let delta = self.center - position;
            let dn = delta.length_squared();

            if width * width / theta2 < dn {
                if dn < max_distance2 {
                    *push += delta * (self.charge / dn);
                }
                return;
            }

            if self.point.is_some() && dn > 0.0 && dn < max_distance2 {
                *push += delta * (self.point_charge / dn);
            }
        }

        for child in self.children.iter().flatten() {
            child.repulse(index, position, width * 0.5, theta2, max_distance2, push);
        }
    }
}

impl QuadTree {
    /// Build a tree over `positions`; non-finite positions are left out
    pub fn build(positions: &[Vec2]) -> Self {
        let mut min = Vec2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Vec2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);

        for position in positions.iter().filter(|p| p.is_finite()) {
            min.x = min.x.min(position.x);
            min.y = min.y.min(position.y);
            max.x = max.x.max(position.x);
            max.y = max.y.max(position.y);
        }

        if !min.is_finite() {
            return Self {
                root: Quad::new(),
                bounds: Bounds2D {
                    min: Vec2::ZERO,
                    max: Vec2::ZERO,
                },
            };
        }

        // Make it square
        let dx = max.x - min.x;
        let dy = max.y - min.y;
        if dx > dy {
            max.y = min.y + dx;
        } else {
            max.x = min.x + dy;
        }

        let bounds = Bounds2D { min, max };
        let mut root = Quad::new();
        for (index, position) in positions.iter().enumerate() {
            root.insert(index, *position, bounds);
        }

        Self { root, bounds }
    }

    /// Compute the charge of every cell for this step.
    ///
    /// Points sharing a cell with points below them are jittered in `positions`.
    pub fn accumulate<R: Rng>(
        &mut self,
        alpha: f64,
        charges: &[f64],
        positions: &mut [Vec2],
        rng: &mut R,
    ) {
        self.root.accumulate(alpha, charges, positions, rng);
    }

    /// Total accumulated charge
    pub fn total_charge(&self) -> f64 {
        self.root.charge
    }

    /// Charge-weighted center of all points
    pub fn center_of_charge(&self) -> Vec2 {
        self.root.center
    }

    /// Displacement the charges of all other points apply to the previous position of
    /// point `index`; subtract it from the previous position.
    pub fn repulse(&self, index: usize, position: Vec2, theta: f64, max_distance2: f64) -> Vec2 {
        let mut push = Vec2::ZERO;
        self.root.repulse(
            index,
            position,
            self.bounds.width(),
            theta * theta,
            max_distance2,
            &mut push,
        );
        push
    }
}
