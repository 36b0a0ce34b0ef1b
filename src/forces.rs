//! Force accumulation for one evaluation
//!
//! Four independent contributions feed each particle's accumulator:
//! pairwise repulsion, springs, center drift and the optional center gravity.
//! Every function adds to `Particle::force` through `apply_force` and never
//! clears it.

use std::collections::BTreeMap;

use rand::Rng;

use crate::atoms::{Particle, Spring};
use crate::barnes_hut::{BarnesHutTree, Body, MIN_DISTANCE};
use crate::config::Parameters;
use crate::protocol::EntityId;
use crate::vector::Vector;

/// Run every enabled contribution
pub fn accumulate<R: Rng + ?Sized>(
    particles: &mut BTreeMap<EntityId, Particle>,
    springs: &BTreeMap<EntityId, Spring>,
    params: &Parameters,
    rng: &mut R,
) {
    apply_repulsion(particles, params.repulsion, params.theta(), rng);
    if params.stiffness > 0.0 {
        apply_springs(particles, springs, rng);
    }
    apply_center_drift(particles);
    if params.gravity {
        apply_center_gravity(particles, params.repulsion);
    }
}

/// Inverse-square repulsion between every pair of particles
///
/// Uses a Barnes-Hut tree when `theta > 0`, the exact pairwise sum otherwise.
/// Source masses are true masses; temporary overrides only change how a
/// particle responds.
pub fn apply_repulsion<R: Rng + ?Sized>(
    particles: &mut BTreeMap<EntityId, Particle>,
    repulsion: f64,
    theta: f64,
    rng: &mut R,
) {
    if repulsion <= 0.0 || particles.len() < 2 {
        return;
    }

    let bodies: Vec<Body> = particles
        .values()
        .map(|p| Body {
            position: p.position,
            mass: p.true_mass(),
        })
        .collect();

    let forces = if theta > 0.0 {
        let tree = BarnesHutTree::from_bodies(&bodies, theta);
        (0..bodies.len())
            .map(|i| tree.apply_forces(i, repulsion, rng))
            .collect()
    } else {
        pairwise_repulsion(&bodies, repulsion, rng)
    };

    for (p, force) in particles.values_mut().zip(forces) {
        p.apply_force(force);
    }
}

/// Exact all-pairs repulsion, visiting each unordered pair once
fn pairwise_repulsion<R: Rng + ?Sized>(
    bodies: &[Body],
    repulsion: f64,
    rng: &mut R,
) -> Vec<Vector> {
    let mut forces = vec![Vector::ZERO; bodies.len()];

    for i in 0..bodies.len() {
        for j in (i + 1)..bodies.len() {
            let d = bodies[i].position - bodies[j].position;
            let distance = d.magnitude().max(MIN_DISTANCE);
            let direction = d.direction_or_random(rng);
            let scale = repulsion / (distance * distance);

            forces[i] += direction * (scale * bodies[j].mass);
            forces[j] += -direction * (scale * bodies[i].mass);
        }
    }

    forces
}

/// Hooke's law along every spring
///
/// Each endpoint receives half of `k * (length - distance)`, pushing apart
/// when compressed and pulling together when stretched. The force is not
/// normalized by degree, so heavily connected particles feel the sum of all
/// their springs. Springs with a missing endpoint are skipped.
pub fn apply_springs<R: Rng + ?Sized>(
    particles: &mut BTreeMap<EntityId, Particle>,
    springs: &BTreeMap<EntityId, Spring>,
    rng: &mut R,
) {
    for spring in springs.values() {
        if spring.from == spring.to {
            continue;
        }
        let (Some(p1), Some(p2)) = (particles.get(&spring.from), particles.get(&spring.to)) else {
            continue;
        };

        let d = p2.position - p1.position;
        let displacement = spring.length - d.magnitude();
        let direction = d.direction_or_random(rng);
        let force = direction * (spring.k * displacement * 0.5);

        if let Some(p1) = particles.get_mut(&spring.from) {
            p1.apply_force(-force);
        }
        if let Some(p2) = particles.get_mut(&spring.to) {
            p2.apply_force(force);
        }
    }
}

/// Pull every particle by the negated centroid so the cloud stays around the
/// origin
pub fn apply_center_drift(particles: &mut BTreeMap<EntityId, Particle>) {
    if particles.is_empty() {
        return;
    }

    let sum = particles
        .values()
        .fold(Vector::ZERO, |acc, p| acc + p.position);
    let drift = -(sum / particles.len() as f64);

    for p in particles.values_mut() {
        p.apply_force(drift);
    }
}

/// Attraction toward the origin scaled by `repulsion / 100`
pub fn apply_center_gravity(particles: &mut BTreeMap<EntityId, Particle>, repulsion: f64) {
    for p in particles.values_mut() {
        let toward_origin = -p.position;
        p.apply_force(toward_origin * (repulsion / 100.0));
    }
}
