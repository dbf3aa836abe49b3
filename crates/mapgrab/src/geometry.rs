//! Screen and geographic geometry shared by the locator and the controller.
//!
//! All transforms consume the box and return the transformed copy, so a box
//! handed out by a locator is never mutated behind the caller's back.

use serde::{Deserialize, Serialize};

/// A point in screen space (CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl ScreenPoint {
    /// Create a new point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Translate the point
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// A geographic coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LngLat {
    /// Longitude in degrees
    pub lng: f64,
    /// Latitude in degrees
    pub lat: f64,
}

impl LngLat {
    /// Create a new coordinate
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// `[lng, lat]` form accepted by the map as a center
    #[must_use]
    pub const fn to_array(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

/// Padding around a box, in the forms the locator API accepts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Padding {
    /// Same padding on every side
    Uniform(f64),
    /// Horizontal and vertical padding
    Symmetric {
        /// Left and right padding
        x: f64,
        /// Top and bottom padding
        y: f64,
    },
    /// Explicit padding per side
    Sides {
        /// Top padding
        top: f64,
        /// Right padding
        right: f64,
        /// Bottom padding
        bottom: f64,
        /// Left padding
        left: f64,
    },
}

impl Padding {
    /// Same padding on every side
    #[must_use]
    pub const fn uniform(value: f64) -> Self {
        Self::Uniform(value)
    }

    /// Horizontal and vertical padding
    #[must_use]
    pub const fn symmetric(x: f64, y: f64) -> Self {
        Self::Symmetric { x, y }
    }

    /// Explicit padding per side, clockwise from the top
    #[must_use]
    pub const fn sides(top: f64, right: f64, bottom: f64, left: f64) -> Self {
        Self::Sides {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Expand to `(top, right, bottom, left)`
    #[must_use]
    pub const fn edges(&self) -> (f64, f64, f64, f64) {
        match *self {
            Self::Uniform(p) => (p, p, p, p),
            Self::Symmetric { x, y } => (y, x, y, x),
            Self::Sides {
                top,
                right,
                bottom,
                left,
            } => (top, right, bottom, left),
        }
    }
}

impl From<f64> for Padding {
    fn from(value: f64) -> Self {
        Self::Uniform(value)
    }
}

/// Axis-aligned rectangle in screen space.
///
/// `right - x == width` and `bottom - y == height` hold for every box produced
/// by this type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawRect")]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
    /// Right edge
    pub right: f64,
    /// Bottom edge
    pub bottom: f64,
}

impl BoundingBox {
    /// Create a box from its origin and size
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            right: x + width,
            bottom: y + height,
        }
    }

    /// Create a box from its corner coordinates
    #[must_use]
    pub fn from_edges(x: f64, y: f64, right: f64, bottom: f64) -> Self {
        Self {
            x,
            y,
            width: right - x,
            height: bottom - y,
            right,
            bottom,
        }
    }

    /// Grow the box by `padding`.
    ///
    /// The origin moves up/left by the top/left padding and the far edges move
    /// by the sum of both paddings on that axis.
    #[must_use]
    pub fn apply_padding(self, padding: impl Into<Padding>) -> Self {
        let (top, right, bottom, left) = padding.into().edges();
        let x = self.x - left;
        let y = self.y - top;
        let far_right = self.right + left + right;
        let far_bottom = self.bottom + top + bottom;
        Self::from_edges(x, y, far_right, far_bottom)
    }

    /// Translate the box; width and height are unchanged
    #[must_use]
    pub fn apply_offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
            ..self
        }
    }

    /// Translate the box by the same amount on both axes
    #[must_use]
    pub fn apply_uniform_offset(self, offset: f64) -> Self {
        self.apply_offset(offset, offset)
    }

    /// Smallest box containing both boxes
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Get the center point
    #[must_use]
    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Check if a point is inside this bounding box (edges included)
    #[must_use]
    pub fn contains(&self, point: &ScreenPoint) -> bool {
        point.x >= self.x && point.x <= self.right && point.y >= self.y && point.y <= self.bottom
    }

    /// Check if another box lies entirely inside this one
    #[must_use]
    pub fn contains_box(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

/// Wire form of a rectangle; the backend sends corners, sizes, or both.
#[derive(Deserialize)]
struct RawRect {
    x: f64,
    y: f64,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
    #[serde(default)]
    right: Option<f64>,
    #[serde(default)]
    bottom: Option<f64>,
}

impl From<RawRect> for BoundingBox {
    fn from(raw: RawRect) -> Self {
        let right = raw
            .right
            .unwrap_or_else(|| raw.x + raw.width.unwrap_or_default());
        let bottom = raw
            .bottom
            .unwrap_or_else(|| raw.y + raw.height.unwrap_or_default());
        Self::from_edges(raw.x, raw.y, right, bottom)
    }
}
