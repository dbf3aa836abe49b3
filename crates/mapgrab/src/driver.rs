//! MapDriver - the seam between mapgrab and the browser.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  MapDriver (async trait)                                             │
//! ├─────────────────────────┬───────────────────────────┬────────────────┤
//! │  query backend          │  map interface            │  native input  │
//! │  __MAPGRAB__.query()    │  getMapInterface(id)      │  pointer move  │
//! │  waitMapStableFor...()  │    .controller.<cmd>()    │  press/release │
//! │  frameAbsolutePosition  │  enable/disableInspector  │  screenshots   │
//! ├─────────────────────────┴───────────────────────────┴────────────────┤
//! │  ChromiumDriver (CDP, feature "browser")  MockMapDriver (in memory)  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every backend call takes the [`FrameContext`] naming the window it runs in.
//! Native input and screenshots always act on the root window.

use async_trait::async_trait;
use serde_json::Value;

use crate::frame::FrameContext;
use crate::geometry::{BoundingBox, LngLat, ScreenPoint};
use crate::model::{FeatureMatch, LayersToHide, MutationLedger};
use crate::options::{FitBoundsOptions, MapBounds, SetAbsoluteViewOptions, SetViewOptions};
use crate::result::MapGrabResult;

/// Event dispatched once `window.__MAPGRAB__` is installed
pub const INTERFACE_INIT_EVENT: &str = "__MAPGRAB__::INTERFACE_INIT";

/// Event dispatched whenever a map registers its interface
pub const MAP_INTERFACE_INIT_EVENT: &str = "__MAPGRAB__::MAP_INTERFACE_INIT";

/// Pointer gesture performed at the current pointer position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    /// Primary button click
    Click,
    /// Secondary button click
    ContextClick,
    /// Two primary clicks
    DoubleClick,
    /// No button; the move alone is the gesture
    Hover,
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Click => "click",
            Self::ContextClick => "context_click",
            Self::DoubleClick => "double_click",
            Self::Hover => "hover",
        };
        write!(f, "{name}")
    }
}

/// Command executed on a registered map's controller
#[derive(Debug, Clone, PartialEq)]
pub enum MapCommand {
    /// Resolve once the map has loaded
    WaitToMapLoaded,
    /// Resolve once the map has no pending work
    WaitToMapStable,
    /// Resolve after the next repaint settles
    WaitToMapRepaint,
    /// Jump to a geographic view
    SetView(SetViewOptions),
    /// Jump to a view whose center is a screen point
    SetViewAbsolute(SetAbsoluteViewOptions),
    /// Fit the viewport to geographic bounds
    FitMapToBounds {
        /// Target bounds
        bounds: MapBounds,
        /// Fit options
        options: FitBoundsOptions,
    },
    /// Fit the viewport to a screen rectangle
    FitMapToBoundingBox {
        /// Target rectangle in page coordinates
        bbox: BoundingBox,
        /// Fit options
        options: FitBoundsOptions,
    },
    /// Insert a solid background layer below every style layer
    SetBackgroundColor(String),
    /// Remove the inserted background layer
    RemoveBackground,
    /// Geographic coordinate to page pixel
    ProjectLngLatToScreenPoint(LngLat),
    /// Page pixel to geographic coordinate
    UnprojectScreenPointToLngLat(ScreenPoint),
    /// Show some layers and hide others, returning the mutation ledger
    ExposeLayers {
        /// Layers forced visible
        expose: Vec<String>,
        /// Layers forced hidden
        hide: LayersToHide,
    },
    /// Restore the `from` side of a ledger
    RevertExposeLayers(MutationLedger),
}

impl MapCommand {
    /// Name of the controller method in the page
    #[must_use]
    pub const fn method_name(&self) -> &'static str {
        match self {
            Self::WaitToMapLoaded => "waitToMapLoaded",
            Self::WaitToMapStable => "waitToMapStable",
            Self::WaitToMapRepaint => "waitToMapRepaint",
            Self::SetView(_) => "setView",
            Self::SetViewAbsolute(_) => "setViewAbsolute",
            Self::FitMapToBounds { .. } => "fitMapToBounds",
            Self::FitMapToBoundingBox { .. } => "fitMapToBoundingBox",
            Self::SetBackgroundColor(_) => "setBackgroundColor",
            Self::RemoveBackground => "removeBackground",
            Self::ProjectLngLatToScreenPoint(_) => "projectLngLatToScreenPoint",
            Self::UnprojectScreenPointToLngLat(_) => "unprojectScreenPointToLngLat",
            Self::ExposeLayers { .. } => "exposeLayers",
            Self::RevertExposeLayers(_) => "revertExposeLayers",
        }
    }

    /// Positional JSON arguments for the controller method
    pub fn args(&self) -> MapGrabResult<Vec<Value>> {
        let args = match self {
            Self::WaitToMapLoaded
            | Self::WaitToMapStable
            | Self::WaitToMapRepaint
            | Self::RemoveBackground => Vec::new(),
            Self::SetView(options) => vec![serde_json::to_value(options)?],
            Self::SetViewAbsolute(options) => vec![serde_json::to_value(options)?],
            Self::FitMapToBounds { bounds, options } => {
                vec![serde_json::to_value(bounds)?, serde_json::to_value(options)?]
            }
            Self::FitMapToBoundingBox { bbox, options } => {
                vec![serde_json::to_value(bbox)?, serde_json::to_value(options)?]
            }
            Self::SetBackgroundColor(color) => vec![Value::String(color.clone())],
            Self::ProjectLngLatToScreenPoint(lng_lat) => vec![serde_json::to_value(lng_lat)?],
            Self::UnprojectScreenPointToLngLat(point) => vec![serde_json::to_value(point)?],
            Self::ExposeLayers { expose, hide } => {
                vec![serde_json::to_value(expose)?, serde_json::to_value(hide)?]
            }
            Self::RevertExposeLayers(ledger) => vec![serde_json::to_value(ledger)?],
        };
        Ok(args)
    }
}

/// Browser-side operations mapgrab needs.
///
/// Implementations: `MockMapDriver` for tests, `ChromiumDriver` with the
/// `browser` feature.
#[async_trait]
pub trait MapDriver: Send + Sync {
    /// Whether `window.__MAPGRAB__` exists in `frame`
    async fn interface_present(&self, frame: &FrameContext) -> MapGrabResult<bool>;

    /// Suspend until `window.__MAPGRAB__` is installed in `frame`
    async fn wait_interface_init(&self, frame: &FrameContext) -> MapGrabResult<()>;

    /// Whether a map with `map_id` has registered its interface
    async fn map_registered(&self, frame: &FrameContext, map_id: &str) -> MapGrabResult<bool>;

    /// Suspend until a map with `map_id` registers its interface
    async fn wait_map_registered(&self, frame: &FrameContext, map_id: &str) -> MapGrabResult<()>;

    /// Run a feature query; an empty result is not an error
    async fn query_features(
        &self,
        frame: &FrameContext,
        selector: &str,
    ) -> MapGrabResult<Vec<FeatureMatch>>;

    /// Suspend until every map the selector targets is stable
    async fn wait_stable_for_selector(
        &self,
        frame: &FrameContext,
        selector: &str,
    ) -> MapGrabResult<()>;

    /// Absolute position of `frame` within the root window
    async fn frame_absolute_position(&self, frame: &FrameContext) -> MapGrabResult<ScreenPoint>;

    /// Execute a command on a registered map's controller
    async fn execute_map_command(
        &self,
        frame: &FrameContext,
        map_id: &str,
        command: &MapCommand,
    ) -> MapGrabResult<Value>;

    /// Toggle the in-page inspector overlay
    async fn set_inspector(&self, frame: &FrameContext, enabled: bool) -> MapGrabResult<()>;

    /// Bounding rectangle of a root-document element
    async fn element_rect(&self, css: &str) -> MapGrabResult<BoundingBox>;

    /// Move the pointer to an element's center shifted by `(dx, dy)`
    async fn pointer_move_to_element(&self, css: &str, dx: f64, dy: f64) -> MapGrabResult<()>;

    /// Move the pointer relative to its current position
    async fn pointer_move_by(&self, dx: f64, dy: f64) -> MapGrabResult<()>;

    /// Perform a gesture at the current pointer position
    async fn pointer_gesture(&self, gesture: Gesture) -> MapGrabResult<()>;

    /// Capture a PNG of the root-window region `clip`
    async fn capture_screenshot(&self, clip: &BoundingBox) -> MapGrabResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LayerVisibility, MutationState};
    use serde_json::json;

    mod command_tests {
        use super::*;

        #[test]
        fn test_method_names() {
            assert_eq!(MapCommand::WaitToMapStable.method_name(), "waitToMapStable");
            assert_eq!(
                MapCommand::UnprojectScreenPointToLngLat(ScreenPoint::default()).method_name(),
                "unprojectScreenPointToLngLat"
            );
            assert_eq!(
                MapCommand::RevertExposeLayers(MutationLedger::new()).method_name(),
                "revertExposeLayers"
            );
        }

        #[test]
        fn test_wait_commands_take_no_args() {
            assert!(MapCommand::WaitToMapLoaded.args().unwrap().is_empty());
            assert!(MapCommand::RemoveBackground.args().unwrap().is_empty());
        }

        #[test]
        fn test_expose_args() {
            let cmd = MapCommand::ExposeLayers {
                expose: vec!["poi".to_string()],
                hide: LayersToHide::AllOther,
            };
            assert_eq!(cmd.args().unwrap(), vec![json!(["poi"]), json!("allOther")]);
        }

        #[test]
        fn test_revert_args_carry_ledger() {
            let ledger: MutationLedger = [(
                "roads".to_string(),
                MutationState::new(LayerVisibility::Visible, LayerVisibility::None),
            )]
            .into_iter()
            .collect();
            let args = MapCommand::RevertExposeLayers(ledger).args().unwrap();
            assert_eq!(args[0]["roads"]["from"], json!("visible"));
        }

        #[test]
        fn test_fit_bounds_args() {
            let cmd = MapCommand::FitMapToBounds {
                bounds: MapBounds::from_array([[0.0, 1.0], [2.0, 3.0]]),
                options: FitBoundsOptions::new().with_padding(10.0),
            };
            assert_eq!(
                cmd.args().unwrap(),
                vec![json!([[0.0, 1.0], [2.0, 3.0]]), json!({"padding": 10.0})]
            );
        }
    }

    mod gesture_tests {
        use super::*;

        #[test]
        fn test_display() {
            assert_eq!(Gesture::ContextClick.to_string(), "context_click");
            assert_eq!(Gesture::Hover.to_string(), "hover");
        }
    }
}
