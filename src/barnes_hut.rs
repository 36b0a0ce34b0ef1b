//! Barnes-Hut quadtree for approximate pairwise repulsion
//!
//! The plane is recursively split into four quadrants. Every tree node keeps the
//! total mass and the mass-weighted position sum of the bodies below it, so a
//! distant cluster can stand in for all of its members as a single
//! pseudo-body located at its center of mass.
//!
//! Nodes live in an arena (`Vec<QuadNode>`) and refer to their children by
//! index. Bodies are copied in on insertion, which leaves the caller free to
//! mutate its particles while the tree is queried.

use rand::Rng;

use crate::vector::{Bounds, Vector};

/// Subdivision stops at this depth; bodies that still share a quadrant are
/// kept together in one leaf and interact pairwise.
const MAX_DEPTH: usize = 48;

/// Minimum distance used by the repulsion law
pub const MIN_DISTANCE: f64 = 1.0;

/// A point mass stored in the tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub position: Vector,
    pub mass: f64,
}

#[derive(Debug, Clone)]
struct QuadNode {
    origin: Vector,
    size: Vector,
    mass: f64,
    /// Sum of `position * mass` over every body in the subtree
    weighted: Vector,
    children: Option<[usize; 4]>,
    bodies: Vec<usize>,
}

impl QuadNode {
    fn new(origin: Vector, size: Vector) -> Self {
        Self {
            origin,
            size,
            mass: 0.0,
            weighted: Vector::ZERO,
            children: None,
            bodies: Vec::new(),
        }
    }

    fn center_of_mass(&self) -> Vector {
        if self.mass > 0.0 {
            self.weighted / self.mass
        } else {
            self.origin + self.size / 2.0
        }
    }

    /// Quadrant index for a point: bit 0 is east, bit 1 is south
    fn quadrant(&self, p: Vector) -> usize {
        let half = self.size / 2.0;
        let rel = p - self.origin;
        let mut idx = 0;
        if rel.x >= half.x {
            idx |= 1;
        }
        if rel.y >= half.y {
            idx |= 2;
        }
        idx
    }

    /// Width used by the opening criterion
    fn width(&self) -> f64 {
        self.size.x.max(self.size.y)
    }
}

/// Quadtree over a fixed region with accuracy parameter `theta`
#[derive(Debug, Clone)]
pub struct BarnesHutTree {
    nodes: Vec<QuadNode>,
    bodies: Vec<Body>,
    theta: f64,
}

impl BarnesHutTree {
    /// Create an empty tree covering `top_left..bottom_right`
    ///
    /// The region is widened to a square around its center so quadrant widths
    /// are the same on both axes. Bodies outside the region are still accepted;
    /// they settle into the boundary quadrant nearest to them.
    pub fn new(top_left: Vector, bottom_right: Vector, theta: f64) -> Self {
        let dims = bottom_right - top_left;
        let side = dims.x.abs().max(dims.y.abs()).max(f64::EPSILON);
        let center = top_left + dims / 2.0;
        let origin = center - Vector::new(side, side) / 2.0;

        Self {
            nodes: vec![QuadNode::new(origin, Vector::new(side, side))],
            bodies: Vec::new(),
            theta,
        }
    }

    /// Build a tree sized to fit the given bodies
    pub fn from_bodies(bodies: &[Body], theta: f64) -> Self {
        let region = Bounds::enclosing(bodies.iter().map(|b| b.position))
            .unwrap_or_default();
        let mut tree = Self::new(region.top_left, region.bottom_right, theta);
        for body in bodies {
            tree.insert(*body);
        }
        tree
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Total mass held by the tree
    pub fn total_mass(&self) -> f64 {
        self.nodes[0].mass
    }

    /// Mass-weighted centroid of every inserted body
    pub fn center_of_mass(&self) -> Vector {
        self.nodes[0].center_of_mass()
    }

    /// Insert a body and return its index for later queries
    ///
    /// Aggregates are updated along the insertion path. A leaf that already
    /// holds a body is split into four children and its occupant is pushed
    /// down before the new body continues its descent.
    pub fn insert(&mut self, body: Body) -> usize {
        let index = self.bodies.len();
        self.bodies.push(body);
        self.insert_into(0, index, 0);
        index
    }

    fn insert_into(&mut self, mut node_idx: usize, body_idx: usize, mut depth: usize) {
        let body = self.bodies[body_idx];

        loop {
            let node = &mut self.nodes[node_idx];
            node.mass += body.mass;
            node.weighted += body.position * body.mass;

            if let Some(children) = node.children {
                node_idx = children[node.quadrant(body.position)];
                depth += 1;
                continue;
            }

            if node.bodies.is_empty() || depth >= MAX_DEPTH {
                node.bodies.push(body_idx);
                return;
            }

            // occupied leaf: split and push the occupants down one level
            let occupants = std::mem::take(&mut node.bodies);
            let children = self.subdivide(node_idx);
            for occupant in occupants {
                let pos = self.bodies[occupant].position;
                let child = children[self.nodes[node_idx].quadrant(pos)];
                self.insert_into(child, occupant, depth + 1);
            }

            node_idx = children[self.nodes[node_idx].quadrant(body.position)];
            depth += 1;
        }
    }

    fn subdivide(&mut self, node_idx: usize) -> [usize; 4] {
        let origin = self.nodes[node_idx].origin;
        let half = self.nodes[node_idx].size / 2.0;

        let mut children = [0; 4];
        for (quadrant, slot) in children.iter_mut().enumerate() {
            let mut child_origin = origin;
            if quadrant & 1 != 0 {
                child_origin.x += half.x;
            }
            if quadrant & 2 != 0 {
                child_origin.y += half.y;
            }
            *slot = self.nodes.len();
            self.nodes.push(QuadNode::new(child_origin, half));
        }

        self.nodes[node_idx].children = Some(children);
        children
    }

    /// Net repulsion acting on the body at `body_idx`
    ///
    /// Walks the tree from the root. Leaves interact directly. An internal node
    /// whose `width / distance` ratio is below `theta` is treated as a single
    /// pseudo-body; otherwise its children are visited. With `theta == 0` no
    /// node is ever summarized and the result equals the all-pairs sum.
    pub fn apply_forces<R: Rng + ?Sized>(
        &self,
        body_idx: usize,
        repulsion: f64,
        rng: &mut R,
    ) -> Vector {
        let target = self.bodies[body_idx].position;
        let mut force = Vector::ZERO;
        let mut stack = vec![0usize];

        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            if node.mass <= 0.0 {
                continue;
            }

            match node.children {
                None => {
                    for &other in &node.bodies {
                        if other == body_idx {
                            continue;
                        }
                        let source = self.bodies[other];
                        force +=
                            repulsion_between(target, source.position, source.mass, repulsion, rng);
                    }
                }
                Some(children) => {
                    let com = node.center_of_mass();
                    let distance = (target - com).magnitude();
                    if distance > 0.0 && node.width() / distance < self.theta {
                        force += repulsion_between(target, com, node.mass, repulsion, rng);
                    } else {
                        stack.extend(children.iter().rev());
                    }
                }
            }
        }

        force
    }
}

/// Inverse-square push on `target` away from a source of mass `mass`
///
/// Distance is clamped to [`MIN_DISTANCE`]; coincident points push along a
/// random unit direction.
pub fn repulsion_between<R: Rng + ?Sized>(
    target: Vector,
    source: Vector,
    mass: f64,
    repulsion: f64,
    rng: &mut R,
) -> Vector {
    let d = target - source;
    let distance = d.magnitude().max(MIN_DISTANCE);
    let direction = d.direction_or_random(rng);
    direction * (repulsion * mass) / (distance * distance)
}
