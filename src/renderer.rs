//! Drawing collaborator
//!
//! The core never draws. A [`Renderer`] attached to a
//! [`ParticleSystem`](crate::system::ParticleSystem) is initialized once and
//! then asked to redraw on every frame in which geometry or the view moved.

use crate::system::ParticleSystem;

pub trait Renderer: Send {
    /// Called once, before the first redraw after being attached
    fn init(&mut self, system: &ParticleSystem);

    fn redraw(&mut self, system: &ParticleSystem);
}

/// Renderer that reports progress through `tracing` instead of drawing
#[derive(Debug, Default)]
pub struct LogRenderer {
    frames: u64,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for LogRenderer {
    fn init(&mut self, system: &ParticleSystem) {
        tracing::info!(
            nodes = system.node_count(),
            edges = system.edge_count(),
            "renderer attached"
        );
    }

    fn redraw(&mut self, system: &ParticleSystem) {
        self.frames += 1;
        let energy = system.energy();
        let bounds = system.bounds();
        tracing::trace!(
            frame = self.frames,
            energy = energy.settle_measure(),
            width = bounds.size().x,
            height = bounds.size().y,
            "redraw"
        );
    }
}
