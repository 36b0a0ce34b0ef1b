//! Consumer-side run-loop manager
//!
//! The kernel sits between the graph model and its transport. It routes
//! commands, hands back the latest snapshot, and measures the frame rate the
//! consumer actually achieves.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::{ParamUpdate, Parameters};
use crate::protocol::{Change, Command, EntityId, ParticleMods, Snapshot};
use crate::transport::Transport;

/// Number of frame intervals averaged by [`Kernel::fps`]
pub const FPS_WINDOW: usize = 50;

pub struct Kernel {
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    frame_times: VecDeque<Duration>,
    last_frame: Option<Instant>,
}

impl Kernel {
    /// Wrap a transport and initialize its engine
    pub fn new(transport: Box<dyn Transport>, clock: Arc<dyn Clock>, params: &Parameters) -> Self {
        let mut kernel = Self {
            transport,
            clock,
            frame_times: VecDeque::with_capacity(FPS_WINDOW + 1),
            last_frame: None,
        };
        kernel.transport.send(Command::Init(params.clone()));
        kernel
    }

    /// A node or edge was added or removed
    pub fn graph_changed(&mut self, changes: Vec<Change>) {
        tracing::trace!(entries = changes.len(), "flushing changeset");
        self.transport.send(Command::Changes(changes));
    }

    /// A particle was moved or reweighted interactively
    pub fn particle_modified(&mut self, id: EntityId, mods: ParticleMods) {
        self.transport.send(Command::Modify { id, mods });
    }

    pub fn physics_modified(&mut self, update: ParamUpdate) {
        self.transport.send(Command::Sys(update));
    }

    /// Explicit start, clearing an earlier stop
    pub fn start(&mut self) {
        self.transport.send(Command::Start);
    }

    pub fn stop(&mut self) {
        self.transport.send(Command::Stop);
    }

    pub fn poll(&mut self) -> Option<Snapshot> {
        self.transport.poll()
    }

    /// Note that a frame was drawn
    pub fn record_frame(&mut self) {
        let now = self.clock.now();
        if let Some(last) = self.last_frame.replace(now) {
            self.frame_times.push_back(now.duration_since(last));
            if self.frame_times.len() > FPS_WINDOW {
                self.frame_times.pop_front();
            }
        }
    }

    /// Measured frames per second, rounded; 0 before two frames were drawn
    pub fn fps(&self) -> f64 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        let total: Duration = self.frame_times.iter().sum();
        let mean = total.as_secs_f64() / self.frame_times.len() as f64;
        if mean > 0.0 { (1.0 / mean).round() } else { 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::transport::InlineTransport;

    fn kernel() -> (Kernel, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let params = Parameters::default();
        let transport = InlineTransport::new(params.clone(), clock.clone());
        (Kernel::new(Box::new(transport), clock.clone(), &params), clock)
    }

    #[test]
    fn fps_is_zero_without_frames() {
        let (mut kernel, _) = kernel();
        assert_eq!(kernel.fps(), 0.0);
        kernel.record_frame();
        assert_eq!(kernel.fps(), 0.0);
    }

    #[test]
    fn fps_averages_recent_frames() {
        let (mut kernel, clock) = kernel();
        kernel.record_frame();
        for _ in 0..10 {
            clock.advance(Duration::from_millis(20));
            kernel.record_frame();
        }
        assert_eq!(kernel.fps(), 50.0);

        // old samples fall out of the window
        for _ in 0..FPS_WINDOW {
            clock.advance(Duration::from_millis(40));
            kernel.record_frame();
        }
        assert_eq!(kernel.fps(), 25.0);
    }

    #[test]
    fn graph_changes_reach_the_engine() {
        let (mut kernel, _) = kernel();
        kernel.graph_changed(vec![Change::AddNode {
            id: 1,
            mass: 1.0,
            x: Some(0.0),
            y: Some(0.0),
            fixed: false,
        }]);

        let snapshot = kernel.poll().unwrap();
        assert_eq!(snapshot.geometry.len(), 1);

        kernel.stop();
        assert!(kernel.poll().is_none());
        kernel.start();
        assert!(kernel.poll().is_some());
    }
}
