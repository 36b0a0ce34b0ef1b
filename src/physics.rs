//! The particle system core
//!
//! `Physics` owns every particle and spring, applies changesets, and advances
//! the simulation one tick at a time. It has no notion of time or scheduling;
//! see [`crate::engine::Engine`] for the run-state machine built on top.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::atoms::{Particle, Spring};
use crate::config::{ParamUpdate, Parameters};
use crate::forces;
use crate::integrator::{self, Integrator};
use crate::protocol::{Change, Energy, EntityId, ParticleMods, Snapshot};
use crate::vector::{Bounds, Vector};

/// Mass used when a changeset supplies an unusable one
const FALLBACK_MASS: f64 = 1.0;

/// Particles, springs and the coefficients that move them
#[derive(Debug, Clone)]
pub struct Physics {
    particles: BTreeMap<EntityId, Particle>,
    springs: BTreeMap<EntityId, Spring>,
    params: Parameters,
    rng: StdRng,
    epoch: u64,
    energy: Energy,
    bounds: Bounds,
}

impl Physics {
    pub fn new(params: Parameters) -> Self {
        let params = params.sanitized();
        Self {
            particles: BTreeMap::new(),
            springs: BTreeMap::new(),
            rng: StdRng::seed_from_u64(params.seed),
            params,
            epoch: 0,
            energy: Energy::default(),
            bounds: Bounds::default(),
        }
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Number of changesets applied so far
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn particle(&self, id: EntityId) -> Option<&Particle> {
        self.particles.get(&id)
    }

    pub fn particles(&self) -> impl Iterator<Item = (EntityId, &Particle)> {
        self.particles.iter().map(|(id, p)| (*id, p))
    }

    pub fn spring(&self, id: EntityId) -> Option<&Spring> {
        self.springs.get(&id)
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn spring_count(&self) -> usize {
        self.springs.len()
    }

    /// Energy computed by the most recent tick
    pub fn system_energy(&self) -> Energy {
        self.energy
    }

    /// Extent of particle positions after the most recent tick
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Apply a changeset in order and advance the epoch
    ///
    /// Entries referencing unknown ids do nothing.
    pub fn apply_changeset(&mut self, changes: &[Change]) {
        self.epoch += 1;
        for change in changes {
            self.apply_change(change);
        }
        tracing::trace!(
            epoch = self.epoch,
            entries = changes.len(),
            particles = self.particles.len(),
            springs = self.springs.len(),
            "changeset applied"
        );
    }

    fn apply_change(&mut self, change: &Change) {
        match change {
            Change::AddNode {
                id,
                mass,
                x,
                y,
                fixed,
            } => self.add_particle(*id, *mass, *x, *y, *fixed),
            Change::DropNode { id } => self.drop_particle(*id),
            Change::AddSpring {
                id,
                from,
                to,
                length,
            } => self.add_spring(*id, *from, *to, *length),
            Change::DropSpring { id } => self.drop_spring(*id),
            Change::Modify { id, mods } => self.modify_particle(*id, mods),
            Change::Unknown => {}
        }
    }

    fn add_particle(
        &mut self,
        id: EntityId,
        mass: f64,
        x: Option<f64>,
        y: Option<f64>,
        fixed: bool,
    ) {
        if self.particles.contains_key(&id) {
            tracing::debug!(id, "particle already exists");
            return;
        }

        let mass = if mass.is_finite() && mass > 0.0 {
            mass
        } else {
            FALLBACK_MASS
        };
        let size = self.bounds.size();
        let origin = self.bounds.top_left;
        let position = Vector::new(
            x.filter(|v| v.is_finite())
                .unwrap_or_else(|| origin.x + size.x * self.rng.random::<f64>()),
            y.filter(|v| v.is_finite())
                .unwrap_or_else(|| origin.y + size.y * self.rng.random::<f64>()),
        );

        let mut particle = Particle::new(position, mass);
        particle.fixed = fixed;
        self.particles.insert(id, particle);
    }

    /// Remove a particle together with every spring attached to it
    fn drop_particle(&mut self, id: EntityId) {
        if self.particles.remove(&id).is_none() {
            return;
        }

        let incident: Vec<EntityId> = self
            .springs
            .iter()
            .filter(|(_, s)| s.from == id || s.to == id)
            .map(|(spring_id, _)| *spring_id)
            .collect();
        for spring_id in incident {
            self.drop_spring(spring_id);
        }
    }

    fn add_spring(&mut self, id: EntityId, from: EntityId, to: EntityId, length: f64) {
        if self.springs.contains_key(&id)
            || !self.particles.contains_key(&from)
            || !self.particles.contains_key(&to)
        {
            return;
        }

        let length = if length.is_finite() { length.max(0.0) } else { 1.0 };
        self.springs
            .insert(id, Spring::new(from, to, length, self.params.stiffness));
        for end in [from, to] {
            if let Some(p) = self.particles.get_mut(&end) {
                p.connections += 1;
            }
        }
    }

    fn drop_spring(&mut self, id: EntityId) {
        let Some(spring) = self.springs.remove(&id) else {
            return;
        };
        for end in [spring.from, spring.to] {
            if let Some(p) = self.particles.get_mut(&end) {
                p.connections = p.connections.saturating_sub(1);
            }
        }
    }

    /// Change a particle in place; unknown ids and unusable masses are ignored
    pub fn modify_particle(&mut self, id: EntityId, mods: &ParticleMods) {
        let Some(p) = self.particles.get_mut(&id) else {
            return;
        };

        if let Some(x) = mods.x.filter(|v| v.is_finite()) {
            p.position.x = x;
        }
        if let Some(y) = mods.y.filter(|v| v.is_finite()) {
            p.position.y = y;
        }
        if let Some(mass) = mods.mass.filter(|m| m.is_finite() && *m > 0.0) {
            p.set_mass(mass);
        }
        if let Some(fixed) = mods.fixed {
            p.fixed = fixed;
        }
        if let Some(mass) = mods.temp_mass.filter(|m| m.is_finite() && *m > 0.0) {
            p.set_temp_mass(mass);
        }
    }

    /// Update coefficients between ticks
    ///
    /// A new stiffness is pushed into every existing spring.
    pub fn modify_parameters(&mut self, update: &ParamUpdate) {
        self.params.apply(update);
        if update.stiffness.is_some() {
            let k = self.params.stiffness;
            for spring in self.springs.values_mut() {
                spring.k = k;
            }
        }
    }

    /// Advance the simulation by one step
    pub fn tick(&mut self) -> Snapshot {
        for p in self.particles.values_mut() {
            p.decay_temp_mass();
            p.velocity = Vector::ZERO;
        }

        let dt = self.params.dt;
        let friction = self.params.friction;
        match self.params.integrator {
            Integrator::Euler => {
                self.update_forces();
                self.energy = integrator::update_velocity(
                    &mut self.particles,
                    dt,
                    friction,
                    Integrator::Euler,
                );
                integrator::update_position(&mut self.particles, dt, Integrator::Euler);
            }
            Integrator::Verlet => {
                self.update_forces();
                integrator::cache_forces(&mut self.particles);
                integrator::update_position(&mut self.particles, dt, Integrator::Verlet);
                self.update_forces();
                self.energy = integrator::update_velocity(
                    &mut self.particles,
                    dt,
                    friction,
                    Integrator::Verlet,
                );
            }
        }
        integrator::clear_forces(&mut self.particles);

        self.bounds = Bounds::enclosing(self.particles.values().map(|p| p.position))
            .unwrap_or_default();
        self.snapshot()
    }

    fn update_forces(&mut self) {
        forces::accumulate(&mut self.particles, &self.springs, &self.params, &mut self.rng);
    }

    /// Current positions tagged with the epoch, energy and bounds
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            geometry: self
                .particles
                .iter()
                .map(|(id, p)| (*id, p.position.x, p.position.y))
                .collect(),
            epoch: self.epoch,
            energy: self.energy,
            bounds: self.bounds,
        }
    }
}
