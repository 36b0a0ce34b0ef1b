//! Carriers between the graph model and the engine
//!
//! A [`Transport`] accepts [`Command`]s and hands back [`Snapshot`]s. The
//! graph model only ever talks to this trait, so it behaves the same whether
//! the engine lives in the same call stack ([`InlineTransport`]) or on its
//! own tokio task ([`WorkerTransport`]).

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::clock::Clock;
use crate::config::Parameters;
use crate::engine::Engine;
use crate::protocol::{Command, Snapshot};
use crate::scheduler::MIN_INTERVAL;

pub trait Transport: Send {
    /// Queue a command; never blocks
    fn send(&mut self, command: Command);

    /// Most recent snapshot produced since the previous poll, if any
    fn poll(&mut self) -> Option<Snapshot>;
}

/// Engine owned by the caller and ticked on every poll
#[derive(Debug)]
pub struct InlineTransport {
    engine: Engine,
}

impl InlineTransport {
    pub fn new(params: Parameters, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: Engine::new(params, clock),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Transport for InlineTransport {
    fn send(&mut self, command: Command) {
        self.engine.handle(command);
    }

    /// Steps the engine once while it is running
    fn poll(&mut self) -> Option<Snapshot> {
        self.engine.step()
    }
}

/// Engine running on a spawned tokio task
///
/// The task ticks on its own interval and publishes each snapshot over a
/// `watch` channel, overwriting the previous one, so at most one snapshot
/// is ever buffered. Dropping the transport ends the task.
#[derive(Debug)]
pub struct WorkerTransport {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Option<Snapshot>>,
    task: JoinHandle<()>,
}

impl WorkerTransport {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(params: Parameters, clock: Arc<dyn Clock>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let engine = Engine::new(params, clock);
        let task = tokio::spawn(run_worker(engine, command_rx, snapshot_tx));

        Self {
            commands: command_tx,
            snapshots: snapshot_rx,
            task,
        }
    }
}

impl Transport for WorkerTransport {
    fn send(&mut self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("physics worker is gone, dropping command");
        }
    }

    fn poll(&mut self) -> Option<Snapshot> {
        if !self.snapshots.has_changed().unwrap_or(false) {
            return None;
        }
        self.snapshots.borrow_and_update().clone()
    }
}

impl Drop for WorkerTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn ticker(engine: &Engine) -> Interval {
    let mut interval = tokio::time::interval(engine.interval().max(MIN_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn run_worker(
    mut engine: Engine,
    mut commands: mpsc::UnboundedReceiver<Command>,
    snapshots: watch::Sender<Option<Snapshot>>,
) {
    let mut interval = ticker(&engine);
    tracing::debug!(interval = ?engine.interval(), "physics worker started");

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                let before = engine.interval();
                engine.handle(command);
                if engine.interval() != before {
                    interval = ticker(&engine);
                }
            }
            _ = interval.tick(), if engine.is_running() => {
                if snapshots.send(Some(engine.tick())).is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("physics worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::clock::{ManualClock, SystemClock};
    use crate::config::ParamUpdate;
    use crate::protocol::Change;

    fn pair() -> Command {
        Command::Changes(vec![
            Change::AddNode {
                id: 1,
                mass: 1.0,
                x: Some(0.0),
                y: Some(0.0),
                fixed: false,
            },
            Change::AddNode {
                id: 2,
                mass: 1.0,
                x: Some(3.0),
                y: Some(0.0),
                fixed: false,
            },
            Change::AddSpring {
                id: -1,
                from: 1,
                to: 2,
                length: 1.0,
            },
        ])
    }

    #[test]
    fn inline_ticks_on_poll_only_while_running() {
        let clock = Arc::new(ManualClock::new());
        let mut transport = InlineTransport::new(Parameters::default(), clock);
        assert!(transport.poll().is_none());

        transport.send(pair());
        let snapshot = transport.poll().unwrap();
        assert_eq!(snapshot.geometry.len(), 2);
        assert_eq!(snapshot.epoch, 1);

        transport.send(Command::Stop);
        assert!(transport.poll().is_none());
        assert!(!transport.engine().is_running());
    }

    #[tokio::test]
    async fn worker_streams_snapshots() {
        let params = Parameters {
            fps: 200.0,
            ..Default::default()
        };
        let mut transport = WorkerTransport::spawn(params, Arc::new(SystemClock));
        transport.send(pair());

        tokio::time::sleep(Duration::from_millis(100)).await;

        let snapshot = transport.poll().expect("worker should have ticked");
        assert_eq!(snapshot.geometry.len(), 2);
        assert_eq!(snapshot.epoch, 1);
    }

    #[tokio::test]
    async fn worker_goes_quiet_after_stop() {
        let params = Parameters {
            fps: 200.0,
            ..Default::default()
        };
        let mut transport = WorkerTransport::spawn(params, Arc::new(SystemClock));
        transport.send(pair());
        tokio::time::sleep(Duration::from_millis(50)).await;

        transport.send(Command::Stop);
        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.poll();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(transport.poll().is_none());
    }

    #[tokio::test]
    async fn worker_buffers_only_the_newest_snapshot() {
        let params = Parameters {
            fps: 500.0,
            energy_threshold: 0.0,
            ..Default::default()
        };
        let mut transport = WorkerTransport::spawn(params, Arc::new(SystemClock));
        transport.send(pair());

        // many ticks go by without anyone polling
        tokio::time::sleep(Duration::from_millis(100)).await;
        transport.send(Command::Stop);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(transport.snapshots.has_changed().unwrap());
        let latest = transport.poll().expect("newest snapshot kept");
        assert_eq!(latest.geometry.len(), 2);
        assert!(transport.poll().is_none(), "older snapshots were queued");
    }

    #[tokio::test]
    async fn worker_survives_extreme_frame_rates() {
        for fps in [1e12, 1e-30] {
            let params = Parameters {
                fps,
                ..Default::default()
            };
            let mut transport = WorkerTransport::spawn(params, Arc::new(SystemClock));
            transport.send(pair());
            transport.send(Command::Sys(ParamUpdate {
                fps: Some(fps),
                ..Default::default()
            }));
            tokio::time::sleep(Duration::from_millis(50)).await;

            // the first tick of a tokio interval fires immediately
            assert!(transport.poll().is_some(), "worker died at fps {fps}");
        }
    }
}
