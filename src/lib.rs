//! forcelayout - force-directed layout for graphs.
//!
//! A [`system::ParticleSystem`] holds the graph a caller edits. Edits are
//! batched into changesets for an [`engine::Engine`] that runs a 2D
//! mass-spring simulation with Barnes-Hut repulsion, either inline or on its
//! own tokio task, and streams positions back.

pub mod atoms;
pub mod barnes_hut;
pub mod clock;
pub mod config;
pub mod engine;
pub mod forces;
pub mod graph;
pub mod integrator;
pub mod io;
pub mod kernel;
pub mod physics;
pub mod protocol;
pub mod renderer;
pub mod scheduler;
pub mod screen;
pub mod system;
pub mod transport;
pub mod vector;
