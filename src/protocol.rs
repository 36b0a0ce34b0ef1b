//! Messages exchanged between the graph model and the simulation engine
//!
//! The same types travel in-process and across the worker boundary. Everything
//! is `serde`-serializable so a transport can also ship them as JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ParamUpdate, Parameters};
use crate::vector::Bounds;

/// Identifier shared by nodes (positive, counting up from 1) and edges
/// (negative, counting down from -1)
pub type EntityId = i64;

/// One structural edit in a changeset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Change {
    AddNode {
        id: EntityId,
        mass: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default)]
        fixed: bool,
    },
    DropNode {
        id: EntityId,
    },
    AddSpring {
        id: EntityId,
        from: EntityId,
        to: EntityId,
        length: f64,
    },
    DropSpring {
        id: EntityId,
    },
    Modify {
        id: EntityId,
        #[serde(flatten)]
        mods: ParticleMods,
    },
    /// Any tag this version does not know; applying it does nothing
    #[serde(other)]
    Unknown,
}

/// Partial update of a single particle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticleMods {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_mass: Option<f64>,
}

impl ParticleMods {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Decode a changeset entry by entry, dropping malformed entries
///
/// Unknown tags survive as [`Change::Unknown`]; entries with missing or
/// mistyped fields are skipped.
pub fn decode_changeset(entries: &[Value]) -> Vec<Change> {
    entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Change>(entry.clone()) {
            Ok(change) => Some(change),
            Err(err) => {
                tracing::debug!(%err, "skipping malformed changeset entry");
                None
            }
        })
        .collect()
}

/// Statistics over squared particle speeds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Energy {
    pub sum: f64,
    pub max: f64,
    pub mean: f64,
    pub n: usize,
}

impl Energy {
    /// The quantity compared against the auto-stop threshold
    pub fn settle_measure(&self) -> f64 {
        (self.mean + self.max) / 2.0
    }
}

/// Engine output after every tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// `(id, x, y)` for every live particle
    pub geometry: Vec<(EntityId, f64, f64)>,
    /// Number of changesets the engine had applied when this was taken
    pub epoch: u64,
    pub energy: Energy,
    pub bounds: Bounds,
}

/// Commands accepted by the engine, whatever carries them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Command {
    /// Replace the engine with a fresh one using these parameters
    Init(Parameters),
    /// Apply a changeset, in order
    Changes(Vec<Change>),
    /// Modify one particle immediately
    Modify { id: EntityId, mods: ParticleMods },
    /// Update simulation parameters
    Sys(ParamUpdate),
    /// Explicit start; clears a previous stop
    Start,
    Stop,
}
