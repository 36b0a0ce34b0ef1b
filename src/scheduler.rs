//! Repeating timers behind an injectable interface
//!
//! A [`Scheduler`] runs a callback at a fixed interval until its
//! [`ScheduleHandle`] is cancelled. Cancellation is cooperative: a callback
//! already running finishes, and no further call is made.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;

use crate::system::ParticleSystem;

pub type Callback = Box<dyn FnMut() + Send>;

/// Shortest period a timer will run at; tokio rejects a zero period
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub trait Scheduler {
    fn schedule_repeating(&self, interval: Duration, callback: Callback) -> ScheduleHandle;
}

/// Cancellation handle for a scheduled callback
#[derive(Debug, Clone, Default)]
pub struct ScheduleHandle {
    cancelled: Arc<AtomicBool>,
}

impl ScheduleHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Scheduler backed by tokio intervals
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Use the runtime of the calling task
    ///
    /// Panics outside a tokio runtime, like `Handle::current`.
    pub fn current() -> Self {
        Self {
            runtime: Handle::current(),
        }
    }

    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, interval: Duration, mut callback: Callback) -> ScheduleHandle {
        let handle = ScheduleHandle::new();
        let token = handle.clone();

        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if token.is_cancelled() {
                    break;
                }
                callback();
            }
        });

        handle
    }
}

/// Scheduler that only fires when told to; for headless runs and tests
#[derive(Default)]
pub struct ManualScheduler {
    tasks: Mutex<Vec<(ScheduleHandle, Duration, Callback)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every live callback once and forget cancelled ones
    pub fn fire(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|(handle, _, _)| !handle.is_cancelled());
        for (_, _, callback) in tasks.iter_mut() {
            callback();
        }
    }

    /// Intervals of the live callbacks
    pub fn intervals(&self) -> Vec<Duration> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks
            .iter()
            .filter(|(handle, _, _)| !handle.is_cancelled())
            .map(|(_, interval, _)| *interval)
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, interval: Duration, callback: Callback) -> ScheduleHandle {
        let handle = ScheduleHandle::new();
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((handle.clone(), interval, callback));
        handle
    }
}

/// Calls [`ParticleSystem::frame`] at the system's target frame rate
///
/// The interval is read when the loop is scheduled; call
/// [`FrameLoop::restart`] after changing the frame rate.
pub struct FrameLoop {
    system: Arc<Mutex<ParticleSystem>>,
    handle: Option<ScheduleHandle>,
}

impl FrameLoop {
    pub fn start<S: Scheduler + ?Sized>(system: Arc<Mutex<ParticleSystem>>, scheduler: &S) -> Self {
        let mut frame_loop = Self {
            system,
            handle: None,
        };
        frame_loop.schedule(scheduler);
        frame_loop
    }

    /// Cancel the current timer and schedule a new one at the current rate
    pub fn restart<S: Scheduler + ?Sized>(&mut self, scheduler: &S) {
        self.stop();
        self.schedule(scheduler);
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.handle.is_some()
    }

    fn schedule<S: Scheduler + ?Sized>(&mut self, scheduler: &S) {
        let interval = match self.system.lock() {
            Ok(system) => system.frame_interval(),
            Err(poisoned) => poisoned.into_inner().frame_interval(),
        };

        let system = Arc::clone(&self.system);
        let handle = scheduler.schedule_repeating(
            interval,
            Box::new(move || match system.lock() {
                Ok(mut system) => {
                    system.frame();
                }
                Err(_) => tracing::error!("particle system lock poisoned, skipping frame"),
            }),
        );
        self.handle = Some(handle);
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
