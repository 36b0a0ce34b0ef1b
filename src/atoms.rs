//! Simulation-internal physical primitives
//!
//! A `Particle` backs every node of the graph and a `Spring` backs every edge.
//! Both are owned exclusively by [`crate::physics::Physics`].

use crate::protocol::EntityId;
use crate::vector::Vector;

/// Temporary mass overrides shrink by this factor each tick
pub const TEMP_MASS_DECAY: f64 = 0.98;

/// A point mass moved by the integrator
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Vector,
    pub velocity: Vector,
    /// Force accumulated this tick, already divided by the effective mass
    pub force: Vector,
    /// Snapshot of `force` taken between the two Verlet evaluations
    pub prev_force: Option<Vector>,
    /// Effective mass (the temporary override while one is active)
    pub mass: f64,
    /// True mass saved while a temporary override is active
    rest_mass: Option<f64>,
    pub fixed: bool,
    /// Number of springs attached to this particle
    pub connections: usize,
}

impl Particle {
    pub fn new(position: Vector, mass: f64) -> Self {
        Self {
            position,
            velocity: Vector::ZERO,
            force: Vector::ZERO,
            prev_force: None,
            mass,
            rest_mass: None,
            fixed: false,
            connections: 0,
        }
    }

    /// Accumulate a force, scaled by the effective mass
    pub fn apply_force(&mut self, force: Vector) {
        self.force += force / self.mass;
    }

    /// Mass ignoring any temporary override
    pub fn true_mass(&self) -> f64 {
        self.rest_mass.unwrap_or(self.mass)
    }

    pub fn has_temp_mass(&self) -> bool {
        self.rest_mass.is_some()
    }

    /// Replace the true mass; an active override keeps running and now
    /// decays toward the new value
    pub fn set_mass(&mut self, mass: f64) {
        match self.rest_mass {
            Some(_) => self.rest_mass = Some(mass),
            None => self.mass = mass,
        }
    }

    /// Override the effective mass until it decays back to the true mass
    pub fn set_temp_mass(&mut self, mass: f64) {
        if self.rest_mass.is_none() {
            self.rest_mass = Some(self.mass);
        }
        self.mass = mass;
    }

    /// Step an active override 2% toward the true mass, dropping it once
    /// within one unit
    pub fn decay_temp_mass(&mut self) {
        let Some(rest) = self.rest_mass else {
            return;
        };

        if (self.mass - rest).abs() < 1.0 {
            self.mass = rest;
            self.rest_mass = None;
        } else if self.mass > rest {
            self.mass *= TEMP_MASS_DECAY;
        } else {
            self.mass /= TEMP_MASS_DECAY;
        }
    }
}

/// An elastic link between two particles
#[derive(Debug, Clone, PartialEq)]
pub struct Spring {
    pub from: EntityId,
    pub to: EntityId,
    /// Rest length
    pub length: f64,
    /// Stiffness coefficient
    pub k: f64,
}

impl Spring {
    pub fn new(from: EntityId, to: EntityId, length: f64, k: f64) -> Self {
        Self { from, to, length, k }
    }
}
