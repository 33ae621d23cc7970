//! Relative crop areas and their persisted wire encoding.
//!
//! An area is serialized as exactly 12 lowercase hex characters, 3 per
//! field in X,Y,W,H order, each field scaled by 1000. This format is
//! persisted and must stay byte-stable for existing stored data.

use serde::{Deserialize, Serialize};

/// A relative crop area within a file, all fields in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Area {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// Forces a relative coordinate into the valid range.
fn clip_val(f: f32) -> f32 {
    if f > 1.0 {
        1.0
    } else if f < 0.0 {
        0.0
    } else {
        f
    }
}

impl Area {
    /// Returns a new relative area with all components clamped into `[0, 1]`.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x: clip_val(x),
            y: clip_val(y),
            w: clip_val(w),
            h: clip_val(h),
        }
    }

    /// Encodes the area as a fixed 12-character hex string.
    pub fn encode(&self) -> String {
        format!(
            "{:03x}{:03x}{:03x}{:03x}",
            (self.x * 1000.0).round() as u32,
            (self.y * 1000.0).round() as u32,
            (self.w * 1000.0).round() as u32,
            (self.h * 1000.0).round() as u32,
        )
    }

    /// Decodes a 12-character hex string. Fails closed: anything that is not
    /// exactly 12 hex characters yields the zero area.
    pub fn decode(s: &str) -> Area {
        if s.len() != 12 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Area::default();
        }

        let field = |r: &str| u32::from_str_radix(r, 16).unwrap_or(0) as f32 / 1000.0;

        Area::new(field(&s[0..3]), field(&s[3..6]), field(&s[6..9]), field(&s[9..12]))
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// Absolute pixel bounds `(x_min, y_min, x_max, y_max)` within an image
    /// of the given dimensions.
    pub fn bounds(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let w = width as f32;
        let h = height as f32;

        (
            (w * self.x) as u32,
            (h * self.y) as u32,
            (w * (self.x + self.w)) as u32,
            (h * (self.y + self.h)) as u32,
        )
    }

    pub fn left(&self) -> f64 {
        self.x as f64
    }

    pub fn right(&self) -> f64 {
        (self.x + self.w) as f64
    }

    pub fn top(&self) -> f64 {
        self.y as f64
    }

    pub fn bottom(&self) -> f64 {
        (self.y + self.h) as f64
    }

    /// Horizontal and vertical overlap with another area.
    pub fn overlap(&self, other: &Area) -> (f64, f64) {
        let x = (self.right().min(other.right()) - self.left().max(other.left())).max(0.0);
        let y = (self.bottom().min(other.bottom()) - self.top().max(other.top())).max(0.0);

        (x, y)
    }

    /// Overlapping surface with another area.
    pub fn overlap_area(&self, other: &Area) -> f64 {
        let (x, y) = self.overlap(other);

        x * y
    }
}
