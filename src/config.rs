//! Simulation parameters
//!
//! `Parameters` is the complete, validated configuration of an engine.
//! `ParamUpdate` carries a partial change to it, as sent by
//! `modify_parameters`. Invalid numbers never reach the simulation: they are
//! replaced by the documented defaults (or clamped, for `precision`).
//!
//! # YAML format
//!
//! ```yaml
//! repulsion: 1000.0
//! stiffness: 600.0
//! friction: 0.5
//! gravity: false
//! dt: 0.02
//! precision: 0.6
//! integrator: verlet   # or euler
//! fps: 55.0
//! ```
//!
//! Every key is optional.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::integrator::Integrator;

pub const DEFAULT_REPULSION: f64 = 1000.0;
pub const DEFAULT_STIFFNESS: f64 = 600.0;
pub const DEFAULT_FRICTION: f64 = 0.5;
pub const DEFAULT_DT: f64 = 0.02;
pub const DEFAULT_PRECISION: f64 = 0.6;
pub const DEFAULT_FPS: f64 = 55.0;

/// Accepted frame rates; anything outside is clamped so the frame interval
/// stays between 1ms and 1000s
pub const MIN_FPS: f64 = 1e-3;
pub const MAX_FPS: f64 = 1e3;

/// Settle measure below which the engine counts as at rest
pub const DEFAULT_ENERGY_THRESHOLD: f64 = 0.05;

/// How long the engine must stay at rest before it stops itself
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 1000;

/// Window in which graph edits are coalesced into one changeset
pub const DEFAULT_DEBOUNCE_MS: u64 = 20;

pub const DEFAULT_SEED: u64 = 0x5eed_f0ce;

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Repulsion coefficient; 0 disables repulsion
    pub repulsion: f64,
    /// Spring stiffness; 0 disables springs
    pub stiffness: f64,
    /// Fraction of velocity removed every tick, in `[0, 1]`
    pub friction: f64,
    /// Pull every particle toward the origin
    pub gravity: bool,
    /// Integration timestep
    pub dt: f64,
    /// Barnes-Hut accuracy in `[0, 1]`; 1 means exact all-pairs repulsion
    pub precision: f64,
    pub integrator: Integrator,
    /// Target ticks per second
    pub fps: f64,
    pub energy_threshold: f64,
    pub settle_timeout_ms: u64,
    pub debounce_ms: u64,
    /// Seed for random placement and degenerate directions
    pub seed: u64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            repulsion: DEFAULT_REPULSION,
            stiffness: DEFAULT_STIFFNESS,
            friction: DEFAULT_FRICTION,
            gravity: false,
            dt: DEFAULT_DT,
            precision: DEFAULT_PRECISION,
            integrator: Integrator::default(),
            fps: DEFAULT_FPS,
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            seed: DEFAULT_SEED,
        }
    }
}

/// Partial parameter change; `None` leaves a value untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repulsion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stiffness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrator: Option<Integrator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
}

impl ParamUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl Parameters {
    /// Copy with every invalid value replaced
    pub fn sanitized(mut self) -> Self {
        self.repulsion = checked("repulsion", self.repulsion, DEFAULT_REPULSION, |v| v >= 0.0);
        self.stiffness = checked("stiffness", self.stiffness, DEFAULT_STIFFNESS, |v| v >= 0.0);
        self.friction = checked("friction", self.friction, DEFAULT_FRICTION, |v| {
            (0.0..=1.0).contains(&v)
        });
        self.dt = checked("dt", self.dt, DEFAULT_DT, |v| v > 0.0);
        self.precision = clamp_precision(self.precision);
        self.fps = clamp_fps(self.fps);
        self.energy_threshold = checked(
            "energy_threshold",
            self.energy_threshold,
            DEFAULT_ENERGY_THRESHOLD,
            |v| v >= 0.0,
        );
        self
    }

    /// Merge a partial update, validating each supplied value
    pub fn apply(&mut self, update: &ParamUpdate) {
        if let Some(v) = update.repulsion {
            self.repulsion = checked("repulsion", v, DEFAULT_REPULSION, |v| v >= 0.0);
        }
        if let Some(v) = update.stiffness {
            self.stiffness = checked("stiffness", v, DEFAULT_STIFFNESS, |v| v >= 0.0);
        }
        if let Some(v) = update.friction {
            self.friction = checked("friction", v, DEFAULT_FRICTION, |v| (0.0..=1.0).contains(&v));
        }
        if let Some(v) = update.gravity {
            self.gravity = v;
        }
        if let Some(v) = update.dt {
            self.dt = checked("dt", v, DEFAULT_DT, |v| v > 0.0);
        }
        if let Some(v) = update.precision {
            self.precision = clamp_precision(v);
        }
        if let Some(v) = update.integrator {
            self.integrator = v;
        }
        if let Some(v) = update.fps {
            self.fps = clamp_fps(v);
        }
        if let Some(v) = update.energy_threshold {
            self.energy_threshold =
                checked("energy_threshold", v, DEFAULT_ENERGY_THRESHOLD, |v| v >= 0.0);
        }
        if let Some(v) = update.settle_timeout_ms {
            self.settle_timeout_ms = v;
        }
        if let Some(v) = update.debounce_ms {
            self.debounce_ms = v;
        }
    }

    /// Barnes-Hut opening threshold, `1 - precision`
    pub fn theta(&self) -> f64 {
        (1.0 - self.precision).clamp(0.0, 1.0)
    }

    /// Time between ticks at the target frame rate
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.fps.is_finite() && self.fps > 0.0 {
            self.fps.clamp(MIN_FPS, MAX_FPS)
        } else {
            DEFAULT_FPS
        };
        Duration::from_secs_f64(1.0 / fps)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn checked(name: &str, value: f64, default: f64, valid: impl Fn(f64) -> bool) -> f64 {
    if value.is_finite() && valid(value) {
        value
    } else {
        tracing::warn!(parameter = name, value, default, "invalid parameter, using default");
        default
    }
}

fn clamp_fps(value: f64) -> f64 {
    let fps = checked("fps", value, DEFAULT_FPS, |v| v > 0.0);
    if (MIN_FPS..=MAX_FPS).contains(&fps) {
        return fps;
    }
    let clamped = fps.clamp(MIN_FPS, MAX_FPS);
    tracing::warn!(
        parameter = "fps",
        value = fps,
        clamped,
        "frame rate out of range, clamping"
    );
    clamped
}

fn clamp_precision(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_PRECISION
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let p = Parameters::default();
        assert_eq!(p.friction, 0.5);
        assert_eq!(p.repulsion, 1000.0);
        assert_eq!(p.fps, 55.0);
        assert_eq!(p.stiffness, 600.0);
        assert_eq!(p.dt, 0.02);
        assert_eq!(p.precision, 0.6);
        assert_eq!(p.integrator, Integrator::Verlet);
        assert!(!p.gravity);
        assert!((p.theta() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let p = Parameters {
            friction: f64::NAN,
            repulsion: -3.0,
            fps: 0.0,
            dt: f64::INFINITY,
            precision: 7.0,
            ..Default::default()
        }
        .sanitized();

        assert_eq!(p.friction, DEFAULT_FRICTION);
        assert_eq!(p.repulsion, DEFAULT_REPULSION);
        assert_eq!(p.fps, DEFAULT_FPS);
        assert_eq!(p.dt, DEFAULT_DT);
        assert_eq!(p.precision, 1.0);
        assert_eq!(p.theta(), 0.0);
    }

    #[test]
    fn apply_touches_only_supplied_fields() {
        let mut p = Parameters::default();
        p.apply(&ParamUpdate {
            stiffness: Some(50.0),
            precision: Some(-1.0),
            gravity: Some(true),
            ..Default::default()
        });

        assert_eq!(p.stiffness, 50.0);
        assert_eq!(p.precision, 0.0);
        assert_eq!(p.theta(), 1.0);
        assert!(p.gravity);
        assert_eq!(p.repulsion, DEFAULT_REPULSION);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let p: Parameters = serde_yaml::from_str("repulsion: 10\nintegrator: euler\n").unwrap();
        assert_eq!(p.repulsion, 10.0);
        assert_eq!(p.integrator, Integrator::Euler);
        assert_eq!(p.stiffness, DEFAULT_STIFFNESS);
    }

    #[test]
    fn frame_interval_follows_fps() {
        let p = Parameters {
            fps: 50.0,
            ..Default::default()
        };
        assert_eq!(p.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn extreme_fps_is_clamped() {
        let slow = Parameters {
            fps: 1e-30,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(slow.fps, MIN_FPS);
        assert_eq!(slow.frame_interval(), Duration::from_secs(1000));

        let mut fast = Parameters::default();
        fast.apply(&ParamUpdate {
            fps: Some(1e12),
            ..Default::default()
        });
        assert_eq!(fast.fps, MAX_FPS);
        assert_eq!(fast.frame_interval(), Duration::from_millis(1));
    }

    #[test]
    fn frame_interval_never_panics_on_unsanitized_fps() {
        for fps in [1e-30, 1e12, 0.0, -5.0, f64::NAN, f64::INFINITY] {
            let p = Parameters {
                fps,
                ..Default::default()
            };
            let interval = p.frame_interval();
            assert!(interval >= Duration::from_millis(1), "{fps} gave {interval:?}");
        }
    }
}
