//! Numerical integration of particle state
//!
//! Forces are accumulated by [`crate::forces`]; the functions here turn them
//! into new velocities and positions. Fixed particles are pinned: their
//! velocity and force are zeroed and their position is never touched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::atoms::Particle;
use crate::protocol::{Energy, EntityId};
use crate::vector::Vector;

/// Speed above which the velocity is rescaled
pub const MAX_SPEED: f64 = 1000.0;

/// Integration scheme
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrator {
    /// Velocity Verlet: two force evaluations per tick
    #[default]
    Verlet,
    /// Explicit Euler: one force evaluation per tick
    Euler,
}

/// Move the first-stage forces into `prev_force` and clear the accumulators
/// for the second evaluation
pub fn cache_forces(particles: &mut BTreeMap<EntityId, Particle>) {
    for p in particles.values_mut() {
        p.prev_force = Some(p.force);
        p.force = Vector::ZERO;
    }
}

pub fn clear_forces(particles: &mut BTreeMap<EntityId, Particle>) {
    for p in particles.values_mut() {
        p.force = Vector::ZERO;
        p.prev_force = None;
    }
}

/// Advance positions by one timestep
pub fn update_position(
    particles: &mut BTreeMap<EntityId, Particle>,
    dt: f64,
    integrator: Integrator,
) {
    for p in particles.values_mut().filter(|p| !p.fixed) {
        match integrator {
            Integrator::Euler => {
                p.position += p.velocity * dt;
            }
            Integrator::Verlet => {
                let accel = p.prev_force.unwrap_or(p.force);
                p.position += p.velocity * dt + accel * (0.5 * dt * dt / p.mass);
            }
        }
    }
}

/// Advance velocities by one timestep and return the resulting energy
///
/// Fixed particles are zeroed and left out of the statistics.
pub fn update_velocity(
    particles: &mut BTreeMap<EntityId, Particle>,
    dt: f64,
    friction: f64,
    integrator: Integrator,
) -> Energy {
    let mut energy = Energy::default();
    let damping = 1.0 - friction;

    for p in particles.values_mut() {
        if p.fixed {
            p.velocity = Vector::ZERO;
            p.force = Vector::ZERO;
            continue;
        }

        let velocity = match integrator {
            Integrator::Euler => (p.velocity + p.force * dt) * damping,
            Integrator::Verlet => {
                let prev = p.prev_force.unwrap_or(Vector::ZERO);
                (p.velocity + (p.force + prev) * (0.5 * dt / p.mass)) * damping
            }
        };
        p.velocity = clamp_speed(velocity);

        let e = p.velocity.magnitude_squared();
        energy.sum += e;
        energy.max = energy.max.max(e);
        energy.n += 1;
    }

    if energy.n > 0 {
        energy.mean = energy.sum / energy.n as f64;
    }
    energy
}

/// Divide by the squared speed once the speed exceeds [`MAX_SPEED`]
fn clamp_speed(velocity: Vector) -> Vector {
    let speed = velocity.magnitude();
    if speed > MAX_SPEED {
        velocity / (speed * speed)
    } else {
        velocity
    }
}
