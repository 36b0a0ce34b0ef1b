//! 2D vector primitive and axis-aligned bounds
//!
//! `Vector` is a plain `Copy` value: every operation returns a new instance and
//! never mutates its operands.

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// A point or displacement in simulation space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn magnitude(self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    pub fn magnitude_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Unit vector in the same direction, or zero for the zero vector
    pub fn normalize(self) -> Self {
        let m = self.magnitude();
        if m > 0.0 { self / m } else { Vector::ZERO }
    }

    /// The vector rotated a quarter turn counter-clockwise
    pub fn normal(self) -> Self {
        Vector::new(-self.y, self.x)
    }

    /// True if either coordinate is NaN
    pub fn exploded(self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }

    /// Uniformly distributed point in the square `[-radius, radius]²`
    pub fn random<R: Rng + ?Sized>(radius: f64, rng: &mut R) -> Self {
        Vector::new(
            2.0 * radius * (rng.random::<f64>() - 0.5),
            2.0 * radius * (rng.random::<f64>() - 0.5),
        )
    }

    /// Random direction of length 1
    ///
    /// Used wherever two points coincide and the line between them is undefined.
    pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let angle = rng.random::<f64>() * std::f64::consts::TAU;
        Vector::new(angle.cos(), angle.sin())
    }

    /// Direction of `self`, falling back to a random unit vector when `self` is zero
    pub fn direction_or_random<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        if self.magnitude_squared() > 0.0 {
            self.normalize()
        } else {
            Vector::random_unit(rng)
        }
    }
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vector {
    fn add_assign(&mut self, rhs: Vector) {
        *self = *self + rhs;
    }
}

impl Sub for Vector {
    type Output = Vector;

    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;

    fn mul(self, rhs: f64) -> Vector {
        Vector::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vector {
    type Output = Vector;

    fn div(self, rhs: f64) -> Vector {
        Vector::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vector {
    type Output = Vector;

    fn neg(self) -> Vector {
        Vector::new(-self.x, -self.y)
    }
}

impl From<(f64, f64)> for Vector {
    fn from((x, y): (f64, f64)) -> Self {
        Vector::new(x, y)
    }
}

/// Axis-aligned bounding box in simulation space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub top_left: Vector,
    pub bottom_right: Vector,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            top_left: Vector::new(-1.0, -1.0),
            bottom_right: Vector::new(1.0, 1.0),
        }
    }
}

impl Bounds {
    pub fn new(top_left: Vector, bottom_right: Vector) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    /// Smallest box containing every point, or `None` for an empty iterator
    pub fn enclosing<I: IntoIterator<Item = Vector>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter().filter(|p| !p.exploded());
        let first = iter.next()?;
        let mut bounds = Bounds::new(first, first);
        for p in iter {
            bounds.top_left.x = bounds.top_left.x.min(p.x);
            bounds.top_left.y = bounds.top_left.y.min(p.y);
            bounds.bottom_right.x = bounds.bottom_right.x.max(p.x);
            bounds.bottom_right.y = bounds.bottom_right.y.max(p.y);
        }
        Some(bounds)
    }

    pub fn size(&self) -> Vector {
        self.bottom_right - self.top_left
    }

    pub fn center(&self) -> Vector {
        self.top_left + self.size() / 2.0
    }
}
