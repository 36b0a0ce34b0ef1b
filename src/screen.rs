//! Mapping between simulation space and a padded pixel rectangle
//!
//! The displayed bounds are not snapped to the particle extent. Each frame
//! they move a fraction `step` of the way toward it, which keeps the picture
//! from jittering as the layout breathes.

use crate::vector::{Bounds, Vector};

/// Smallest side of the target box, in simulation units
pub const MIN_SIZE: f64 = 4.0;
pub const DEFAULT_STEP: f64 = 0.04;
pub const DEFAULT_PADDING: f64 = 20.0;

/// Pixel margins around the drawing area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Padding {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Padding {
    pub const fn new(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub const fn uniform(all: f64) -> Self {
        Self::new(all, all, all, all)
    }

    pub const fn symmetric(vertical: f64, horizontal: f64) -> Self {
        Self::new(vertical, horizontal, vertical, horizontal)
    }
}

impl Default for Padding {
    fn default() -> Self {
        Self::uniform(DEFAULT_PADDING)
    }
}

impl From<f64> for Padding {
    fn from(all: f64) -> Self {
        Self::uniform(all)
    }
}

impl From<[f64; 2]> for Padding {
    fn from([vertical, horizontal]: [f64; 2]) -> Self {
        Self::symmetric(vertical, horizontal)
    }
}

impl From<[f64; 4]> for Padding {
    fn from([top, right, bottom, left]: [f64; 4]) -> Self {
        Self::new(top, right, bottom, left)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Screen {
    size: Option<ScreenSize>,
    padding: Padding,
    step: f64,
    /// What is currently displayed
    bounds: Option<Bounds>,
    /// What `bounds` is moving toward
    target: Option<Bounds>,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            size: None,
            padding: Padding::default(),
            step: DEFAULT_STEP,
            bounds: None,
            target: None,
        }
    }
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> Option<ScreenSize> {
        self.size
    }

    /// Negative or non-finite sides are taken as zero
    pub fn set_size(&mut self, width: f64, height: f64) {
        let side = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
        self.size = Some(ScreenSize {
            width: side(width),
            height: side(height),
        });
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn set_padding(&mut self, padding: impl Into<Padding>) {
        self.padding = padding.into();
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Fraction of the remaining distance covered per update, clamped to
    /// `[0, 1]`; 1 snaps immediately and 0 freezes the view
    pub fn set_step(&mut self, step: f64) {
        self.step = if step.is_nan() {
            DEFAULT_STEP
        } else {
            step.clamp(0.0, 1.0)
        };
    }

    /// Displayed bounds, once established
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    pub fn target(&self) -> Option<Bounds> {
        self.target
    }

    /// Move the displayed bounds one step toward `extent`
    ///
    /// Returns `true` while the view is still visibly moving. Once a step
    /// would shift both corners by no more than one pixel the view is
    /// settled: the step is not taken and `false` is returned. Does nothing
    /// until a screen size is set; the first update with `has_nodes` adopts
    /// the target outright.
    pub fn update_bounds(&mut self, extent: Bounds, has_nodes: bool) -> bool {
        let Some(size) = self.size else {
            return false;
        };

        let target = with_min_size(extent);
        self.target = Some(target);

        let Some(current) = self.bounds else {
            if !has_nodes {
                return false;
            }
            self.bounds = Some(target);
            return true;
        };

        let next = Bounds::new(
            current.top_left + (target.top_left - current.top_left) * self.step,
            current.bottom_right + (target.bottom_right - current.bottom_right) * self.step,
        );

        let moved_tl = (current.top_left - next.top_left).magnitude();
        let moved_br = (current.bottom_right - next.bottom_right).magnitude();
        if moved_tl * size.width > 1.0 || moved_br * size.height > 1.0 {
            self.bounds = Some(next);
            true
        } else {
            false
        }
    }

    /// Pixel size of the area inside the padding, if it has any
    fn drawable(&self) -> Option<Vector> {
        let size = self.size?;
        let pad = self.padding;
        let span = Vector::new(
            size.width - (pad.right + pad.left),
            size.height - (pad.top + pad.bottom),
        );
        (span.x > 0.0 && span.y > 0.0).then_some(span)
    }

    /// Simulation point to pixels; `None` until size and bounds are known,
    /// or while the padding leaves no room to draw
    pub fn to_screen(&self, p: Vector) -> Option<Vector> {
        let (span, bounds) = self.drawable().zip(self.bounds)?;
        let pad = self.padding;
        let extent = bounds.size();
        let rel = p - bounds.top_left;

        Some(Vector::new(
            pad.left + rel.x / extent.x * span.x,
            pad.top + rel.y / extent.y * span.y,
        ))
    }

    /// Pixels to a simulation point; inverse of [`Screen::to_screen`]
    pub fn from_screen(&self, s: Vector) -> Option<Vector> {
        let (span, bounds) = self.drawable().zip(self.bounds)?;
        let pad = self.padding;
        let extent = bounds.size();

        Some(Vector::new(
            (s.x - pad.left) / span.x * extent.x + bounds.top_left.x,
            (s.y - pad.top) / span.y * extent.y + bounds.top_left.y,
        ))
    }
}

/// Grow a box around its center so neither side is below [`MIN_SIZE`]
fn with_min_size(bounds: Bounds) -> Bounds {
    let dims = bounds.size();
    let center = bounds.top_left + dims / 2.0;
    let half = Vector::new(dims.x.max(MIN_SIZE), dims.y.max(MIN_SIZE)) / 2.0;
    Bounds::new(center - half, center + half)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized() -> Screen {
        let mut screen = Screen::new();
        screen.set_size(800.0, 600.0);
        screen
    }

    fn distance(a: Bounds, b: Bounds) -> f64 {
        (a.top_left - b.top_left).magnitude() + (a.bottom_right - b.bottom_right).magnitude()
    }

    #[test]
    fn padding_forms() {
        assert_eq!(Padding::from(5.0), Padding::new(5.0, 5.0, 5.0, 5.0));
        assert_eq!(Padding::from([1.0, 2.0]), Padding::new(1.0, 2.0, 1.0, 2.0));
        assert_eq!(
            Padding::from([1.0, 2.0, 3.0, 4.0]),
            Padding::new(1.0, 2.0, 3.0, 4.0)
        );
        assert_eq!(Screen::new().padding(), Padding::uniform(20.0));
    }

    #[test]
    fn nothing_happens_without_a_size() {
        let mut screen = Screen::new();
        assert!(!screen.update_bounds(Bounds::default(), true));
        assert!(screen.bounds().is_none());
        assert!(screen.to_screen(Vector::ZERO).is_none());
    }

    #[test]
    fn first_update_adopts_target_when_nodes_exist() {
        let mut screen = sized();
        assert!(!screen.update_bounds(Bounds::default(), false));
        assert!(screen.bounds().is_none());

        assert!(screen.update_bounds(Bounds::default(), true));
        // (-1,-1)..(1,1) grows to the minimum size
        assert_eq!(
            screen.bounds(),
            Some(Bounds::new(Vector::new(-2.0, -2.0), Vector::new(2.0, 2.0)))
        );
    }

    #[test]
    fn bounds_converge_monotonically_then_settle() {
        let mut screen = sized();
        screen.update_bounds(Bounds::default(), true);

        let extent = Bounds::new(Vector::new(-30.0, -10.0), Vector::new(50.0, 25.0));
        let mut last = distance(screen.bounds().unwrap(), extent);
        let mut updates = 0;

        while screen.update_bounds(extent, true) {
            let now = distance(screen.bounds().unwrap(), extent);
            assert!(now < last, "distance grew from {last} to {now}");
            last = now;
            updates += 1;
            assert!(updates < 10_000, "never settled");
        }

        assert!(updates > 1);
        // settled means the next step would move less than a pixel
        let remaining = distance(screen.bounds().unwrap(), extent);
        assert!(remaining * DEFAULT_STEP * 600.0 <= 2.0, "remaining {remaining}");
        assert!(!screen.update_bounds(extent, true));
    }

    #[test]
    fn step_of_one_snaps() {
        let mut screen = sized();
        screen.set_step(1.0);
        screen.update_bounds(Bounds::default(), true);

        let extent = Bounds::new(Vector::new(0.0, 0.0), Vector::new(10.0, 10.0));
        assert!(screen.update_bounds(extent, true));
        assert_eq!(screen.bounds(), Some(extent));
        assert!(!screen.update_bounds(extent, true));
    }

    #[test]
    fn screen_round_trip() {
        let mut screen = sized();
        screen.set_padding([10.0, 30.0]);
        screen.update_bounds(
            Bounds::new(Vector::new(-5.0, -5.0), Vector::new(5.0, 5.0)),
            true,
        );

        let top_left = screen.to_screen(Vector::new(-5.0, -5.0)).unwrap();
        assert_eq!(top_left, Vector::new(30.0, 10.0));
        let bottom_right = screen.to_screen(Vector::new(5.0, 5.0)).unwrap();
        assert_eq!(bottom_right, Vector::new(770.0, 590.0));

        let p = Vector::new(1.25, -3.5);
        let back = screen.from_screen(screen.to_screen(p).unwrap()).unwrap();
        assert!((back - p).magnitude() < 1e-9);
    }

    #[test]
    fn padding_wider_than_screen_maps_nothing() {
        let mut screen = Screen::new();
        screen.set_size(30.0, 30.0);
        screen.update_bounds(Bounds::default(), true);
        assert!(screen.bounds().is_some());

        // 20px on each side of a 30px screen
        assert!(screen.to_screen(Vector::ZERO).is_none());
        assert!(screen.from_screen(Vector::new(15.0, 15.0)).is_none());

        screen.set_padding(5.0);
        let back = screen.from_screen(Vector::new(15.0, 15.0)).unwrap();
        assert!(back.x.is_finite() && back.y.is_finite());
    }

    #[test]
    fn invalid_sizes_are_zeroed() {
        let mut screen = Screen::new();
        screen.set_size(f64::NAN, -10.0);
        assert_eq!(
            screen.size(),
            Some(ScreenSize {
                width: 0.0,
                height: 0.0
            })
        );
        screen.update_bounds(Bounds::default(), true);
        assert!(screen.from_screen(Vector::ZERO).is_none());
    }
}
