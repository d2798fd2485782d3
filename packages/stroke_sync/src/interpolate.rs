//! Turns sparse per-frame pointer samples into a dense stroke.
//!
//! The pointer is sampled once per rendered frame, so a fast drag can jump
//! tens of pixels between samples. Filling the segment with one point per
//! whole step (half a brush radius) keeps the rendered line free of gaps.

use crate::point::Point;

/// Upper bound on points emitted for a single segment.
///
/// Only reachable with coordinates far outside any canvas; keeps a corrupt
/// sample from allocating without bound.
pub const MAX_SEGMENT_POINTS: usize = 1 << 16;

/// Spacing between emitted points for a brush of radius `radius`.
pub fn step_for_radius(radius: f32) -> f32 {
    (radius * 0.5).max(1.0)
}

/// Points to append when the pointer moved from `from` to `to` with the
/// primary button held.
///
/// Always emits at least one point, and the last point is exactly `to`.
pub fn interpolate(from: Point, to: Point, radius: f32) -> Vec<Point> {
    let delta = to - from;
    let distance = delta.length();
    if !distance.is_finite() {
        return vec![to];
    }

    // Whole steps only: a partial step stretches the spacing, up to just
    // under two steps.
    let steps =
        ((distance / step_for_radius(radius)).floor() as usize).clamp(1, MAX_SEGMENT_POINTS);

    let mut points = Vec::with_capacity(steps);
    for i in 1..steps {
        let t = i as f32 / steps as f32;
        points.push(from + delta * t);
    }
    points.push(to);
    points
}

/// Per-session interpolation state: the last pointer position and the brush.
#[derive(Clone, Debug)]
pub struct StrokeInterpolator {
    last: Point,
    radius: f32,
}

impl StrokeInterpolator {
    pub fn new(radius: f32) -> Self {
        Self {
            last: Point::default(),
            radius,
        }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    /// Most recent pointer sample.
    pub fn last(&self) -> Point {
        self.last
    }

    /// Move the stroke anchor without drawing.
    pub fn anchor(&mut self, pointer: Point) {
        self.last = pointer;
    }

    /// Feed this frame's pointer sample.
    ///
    /// With the button held, returns the points to append; otherwise returns
    /// nothing and only re-anchors so the next press starts where the pointer
    /// is, not where the last stroke ended.
    pub fn track(&mut self, pointer: Point, primary_down: bool) -> Vec<Point> {
        let points = if primary_down {
            interpolate(self.last, pointer, self.radius)
        } else {
            Vec::new()
        };
        self.last = pointer;
        points
    }
}
