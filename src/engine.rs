//! Simulation engine: physics plus a run state
//!
//! The engine is either `Running` (its owner should tick it at the frame
//! interval) or `Stopped`. Every mutation kicks it back to `Running` unless it
//! was stopped explicitly; only an explicit start clears that soft stop. While
//! running, the engine watches its own energy and stops itself once the
//! system has stayed at rest for the configured settle timeout.
//!
//! The engine does not know how it is driven. [`crate::transport`] wraps it
//! either in-process or on a worker task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::Parameters;
use crate::physics::Physics;
use crate::protocol::{Command, Energy, Snapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

#[derive(Debug)]
pub struct Engine {
    physics: Physics,
    state: RunState,
    /// Set by `stop`; implicit kicks leave the engine stopped while it holds
    paused: bool,
    /// First tick of the current low-energy streak
    settling_since: Option<Instant>,
    clock: Arc<dyn Clock>,
}

impl Engine {
    pub fn new(params: Parameters, clock: Arc<dyn Clock>) -> Self {
        Self {
            physics: Physics::new(params),
            state: RunState::Stopped,
            paused: false,
            settling_since: None,
            clock,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn physics(&self) -> &Physics {
        &self.physics
    }

    pub fn system_energy(&self) -> Energy {
        self.physics.system_energy()
    }

    /// Time between ticks at the configured frame rate
    pub fn interval(&self) -> Duration {
        self.physics.parameters().frame_interval()
    }

    /// Apply one command
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Init(params) => {
                tracing::debug!("engine initialized");
                self.physics = Physics::new(params);
                self.state = RunState::Stopped;
                self.paused = false;
                self.settling_since = None;
            }
            Command::Changes(changes) => {
                self.physics.apply_changeset(&changes);
                self.start(false);
            }
            Command::Modify { id, mods } => {
                self.physics.modify_particle(id, &mods);
                self.start(false);
            }
            Command::Sys(update) => {
                self.physics.modify_parameters(&update);
                self.start(false);
            }
            Command::Start => self.start(true),
            Command::Stop => self.stop(),
        }
    }

    /// Move to `Running`
    ///
    /// After a `stop` this only takes effect with `unpause` set.
    pub fn start(&mut self, unpause: bool) {
        if self.is_running() {
            return;
        }
        if self.paused && !unpause {
            return;
        }

        self.paused = false;
        self.settling_since = None;
        self.state = RunState::Running;
        tracing::debug!(unpause, "engine started");
    }

    pub fn stop(&mut self) {
        self.paused = true;
        if self.is_running() {
            self.state = RunState::Stopped;
            tracing::debug!("engine stopped");
        }
    }

    /// Tick if running
    pub fn step(&mut self) -> Option<Snapshot> {
        self.is_running().then(|| self.tick())
    }

    /// Tick unconditionally, then check for auto-stop
    pub fn tick(&mut self) -> Snapshot {
        let snapshot = self.physics.tick();
        self.check_settled(snapshot.energy);
        snapshot
    }

    fn check_settled(&mut self, energy: Energy) {
        let params = self.physics.parameters();
        if energy.settle_measure() >= params.energy_threshold {
            self.settling_since = None;
            return;
        }

        let now = self.clock.now();
        let since = *self.settling_since.get_or_insert(now);
        if now.duration_since(since) > params.settle_timeout() && self.is_running() {
            self.state = RunState::Stopped;
            self.settling_since = None;
            tracing::debug!(
                energy = energy.settle_measure(),
                epoch = self.physics.epoch(),
                "simulation settled"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ParamUpdate;
    use crate::protocol::Change;

    fn engine(params: Parameters) -> (Engine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (Engine::new(params, clock.clone()), clock)
    }

    fn resting_pair() -> Vec<Change> {
        vec![
            Change::AddNode {
                id: 1,
                mass: 1.0,
                x: Some(-1.0),
                y: Some(0.0),
                fixed: false,
            },
            Change::AddNode {
                id: 2,
                mass: 1.0,
                x: Some(1.0),
                y: Some(0.0),
                fixed: false,
            },
            Change::AddSpring {
                id: -1,
                from: 1,
                to: 2,
                length: 2.0,
            },
        ]
    }

    #[test]
    fn starts_stopped_and_changes_kick_it() {
        let (mut engine, _) = engine(Parameters::default());
        assert_eq!(engine.state(), RunState::Stopped);
        assert!(engine.step().is_none());

        engine.handle(Command::Changes(resting_pair()));

        assert_eq!(engine.state(), RunState::Running);
        assert!(engine.step().is_some());
    }

    #[test]
    fn soft_stop_needs_explicit_start() {
        let (mut engine, _) = engine(Parameters::default());
        engine.handle(Command::Changes(resting_pair()));
        engine.handle(Command::Stop);
        assert!(!engine.is_running());

        engine.handle(Command::Sys(ParamUpdate {
            friction: Some(0.3),
            ..Default::default()
        }));
        assert!(!engine.is_running());
        assert_eq!(engine.physics().parameters().friction, 0.3);

        engine.handle(Command::Start);
        assert!(engine.is_running());
    }

    // Zero energy does not short-cut the timeout: even a system that starts
    // at rest keeps ticking until the first check strictly past it.
    #[test]
    fn resting_system_waits_out_settle_timeout_before_stopping() {
        let (mut engine, clock) = engine(Parameters {
            repulsion: 0.0,
            ..Default::default()
        });
        engine.handle(Command::Changes(resting_pair()));

        let first = engine.step().unwrap();
        assert_eq!(first.energy.max, 0.0);
        assert!(engine.is_running());

        clock.advance(Duration::from_millis(1000));
        engine.step();
        assert!(engine.is_running());

        clock.advance(Duration::from_millis(1));
        engine.step();

        assert_eq!(engine.state(), RunState::Stopped);
        assert!(engine.step().is_none());
    }

    #[test]
    fn energy_above_threshold_keeps_running() {
        let (mut engine, clock) = engine(Parameters {
            repulsion: 0.0,
            energy_threshold: 0.0,
            ..Default::default()
        });
        engine.handle(Command::Changes(resting_pair()));

        for _ in 0..5 {
            engine.step();
            clock.advance(Duration::from_secs(2));
        }

        assert!(engine.is_running());
    }

    #[test]
    fn auto_stop_does_not_set_soft_stop() {
        let (mut engine, clock) = engine(Parameters {
            repulsion: 0.0,
            ..Default::default()
        });
        engine.handle(Command::Changes(resting_pair()));
        engine.step();
        clock.advance(Duration::from_secs(2));
        engine.step();
        assert!(!engine.is_running());

        engine.handle(Command::Modify {
            id: 1,
            mods: crate::protocol::ParticleMods::position(-3.0, 0.0),
        });

        assert!(engine.is_running());
    }

    #[test]
    fn init_replaces_physics() {
        let (mut engine, _) = engine(Parameters::default());
        engine.handle(Command::Changes(resting_pair()));
        engine.handle(Command::Init(Parameters {
            fps: 10.0,
            ..Default::default()
        }));

        assert_eq!(engine.physics().particle_count(), 0);
        assert_eq!(engine.interval(), Duration::from_millis(100));
        assert!(!engine.is_running());
    }
}
