//! Sparse view options sent to the map controller.
//!
//! Every field is optional; unset fields are left out of the payload so the
//! map keeps its current value for them.

use serde::{Serialize, Serializer};

use crate::geometry::{LngLat, ScreenPoint};

/// Per-side padding in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PaddingOptions {
    /// Top padding
    pub top: f64,
    /// Bottom padding
    pub bottom: f64,
    /// Left padding
    pub left: f64,
    /// Right padding
    pub right: f64,
}

impl PaddingOptions {
    /// Same padding on every side
    #[must_use]
    pub const fn uniform(value: f64) -> Self {
        Self {
            top: value,
            bottom: value,
            left: value,
            right: value,
        }
    }
}

/// View change expressed in geographic coordinates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetViewOptions {
    /// New center as `[lng, lat]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,
    /// Zoom level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// Bearing in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    /// Pitch in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    /// Anchor kept fixed while zooming/rotating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub around: Option<LngLat>,
    /// Viewport padding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<PaddingOptions>,
}

impl SetViewOptions {
    /// Create empty options (a no-op view change)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the center
    #[must_use]
    pub const fn with_center(mut self, center: LngLat) -> Self {
        self.center = Some(center.to_array());
        self
    }

    /// Set the zoom level
    #[must_use]
    pub const fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// Set the bearing
    #[must_use]
    pub const fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    /// Set the pitch
    #[must_use]
    pub const fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }

    /// Set the anchor point
    #[must_use]
    pub const fn with_around(mut self, around: LngLat) -> Self {
        self.around = Some(around);
        self
    }

    /// Set the viewport padding
    #[must_use]
    pub const fn with_padding(mut self, padding: PaddingOptions) -> Self {
        self.padding = Some(padding);
        self
    }
}

/// View change whose center is given in screen pixels
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetAbsoluteViewOptions {
    /// Screen point that becomes the new center
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<ScreenPoint>,
    /// Zoom level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// Bearing in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    /// Pitch in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    /// Anchor kept fixed while zooming/rotating
    #[serde(skip_serializing_if = "Option::is_none")]
    pub around: Option<LngLat>,
    /// Viewport padding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<PaddingOptions>,
}

impl SetAbsoluteViewOptions {
    /// Create empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the screen-space center
    #[must_use]
    pub const fn with_center(mut self, center: ScreenPoint) -> Self {
        self.center = Some(center);
        self
    }

    /// Set the zoom level
    #[must_use]
    pub const fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// Set the bearing
    #[must_use]
    pub const fn with_bearing(mut self, bearing: f64) -> Self {
        self.bearing = Some(bearing);
        self
    }

    /// Set the pitch
    #[must_use]
    pub const fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }
}

/// Padding accepted by `fitBounds`: a single number or per side
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FitPadding {
    /// Same padding on every side
    Uniform(f64),
    /// Per-side padding
    Sides(PaddingOptions),
}

/// Options for fitting the map to bounds or a pixel box
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FitBoundsOptions {
    /// Zoom level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// Bearing in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    /// Pitch in degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    /// Use `easeTo` instead of `flyTo`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear: Option<bool>,
    /// Pixel offset of the fitted center
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<[f64; 2]>,
    /// Maximum zoom level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    /// Minimum zoom level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    /// Zooming curve of the flight path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<f64>,
    /// Average flight speed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Average flight speed in screenfuls per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screen_speed: Option<f64>,
    /// Maximum animation duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<f64>,
    /// Padding around the fitted area
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<FitPadding>,
    /// Animation duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Whether to animate at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animate: Option<bool>,
    /// Animate even when the user prefers reduced motion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,
    /// Keep terrain elevation fixed during the animation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeze_elevation: Option<bool>,
}

impl FitBoundsOptions {
    /// Create empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pad the fitted area uniformly
    #[must_use]
    pub const fn with_padding(mut self, padding: f64) -> Self {
        self.padding = Some(FitPadding::Uniform(padding));
        self
    }

    /// Pad the fitted area per side
    #[must_use]
    pub const fn with_padding_sides(mut self, padding: PaddingOptions) -> Self {
        self.padding = Some(FitPadding::Sides(padding));
        self
    }

    /// Cap the zoom level
    #[must_use]
    pub const fn with_max_zoom(mut self, max_zoom: f64) -> Self {
        self.max_zoom = Some(max_zoom);
        self
    }

    /// Enable or disable animation
    #[must_use]
    pub const fn with_animate(mut self, animate: bool) -> Self {
        self.animate = Some(animate);
        self
    }

    /// Set the animation duration in milliseconds
    #[must_use]
    pub const fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    /// Set the center offset
    #[must_use]
    pub const fn with_offset(mut self, dx: f64, dy: f64) -> Self {
        self.offset = Some([dx, dy]);
        self
    }

    /// Use linear easing
    #[must_use]
    pub const fn with_linear(mut self, linear: bool) -> Self {
        self.linear = Some(linear);
        self
    }
}

/// Geographic bounds given by their south-west and north-east corners.
///
/// Encoded on the wire as `[[swLng, swLat], [neLng, neLat]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapBounds {
    /// South-west corner
    pub sw: LngLat,
    /// North-east corner
    pub ne: LngLat,
}

impl MapBounds {
    /// Create bounds from corners
    #[must_use]
    pub const fn new(sw: LngLat, ne: LngLat) -> Self {
        Self { sw, ne }
    }

    /// Create bounds from `[[swLng, swLat], [neLng, neLat]]`
    #[must_use]
    pub const fn from_array(bounds: [[f64; 2]; 2]) -> Self {
        Self {
            sw: LngLat::new(bounds[0][0], bounds[0][1]),
            ne: LngLat::new(bounds[1][0], bounds[1][1]),
        }
    }

    /// Bounds-like array accepted by the map
    #[must_use]
    pub const fn to_bounds_like(&self) -> [[f64; 2]; 2] {
        [self.sw.to_array(), self.ne.to_array()]
    }
}

impl Serialize for MapBounds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_bounds_like().serialize(serializer)
    }
}
