//! Window targeting and frame-relative to root-window conversion.

use serde_json::Value;
use tracing::trace;

use crate::driver::MapDriver;
use crate::geometry::BoundingBox;
use crate::result::MapGrabResult;

/// The window a locator or controller talks to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FrameContext {
    /// The top-level page
    #[default]
    Root,
    /// An embedded iframe, by CSS selector in the root document
    Iframe(String),
}

impl FrameContext {
    /// Target the iframe matched by `css`
    #[must_use]
    pub fn iframe(css: impl Into<String>) -> Self {
        Self::Iframe(css.into())
    }

    /// Whether this is an embedded frame
    #[must_use]
    pub const fn is_nested(&self) -> bool {
        matches!(self, Self::Iframe(_))
    }

    /// JavaScript expression evaluating to the target window
    #[must_use]
    pub fn window_expr(&self) -> String {
        match self {
            Self::Root => "window".to_string(),
            Self::Iframe(css) => format!(
                "document.querySelector({}).contentWindow",
                Value::String(css.clone())
            ),
        }
    }
}

impl std::fmt::Display for FrameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Iframe(css) => write!(f, "iframe('{css}')"),
        }
    }
}

/// Coordinate space of a returned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativeTo {
    /// The window that renders the map
    #[default]
    ParentWindow,
    /// The top-level browser window
    RootWindow,
}

/// Shift `bbox` from `frame` coordinates into root-window coordinates.
///
/// The frame position is queried on every call; in the root frame the
/// driver reports `(0, 0)` and the box comes back unchanged.
pub async fn to_root_window(
    driver: &dyn MapDriver,
    frame: &FrameContext,
    bbox: BoundingBox,
) -> MapGrabResult<BoundingBox> {
    let offset = driver.frame_absolute_position(frame).await?;
    trace!(%frame, x = offset.x, y = offset.y, "frame offset");
    Ok(bbox.apply_offset(offset.x, offset.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ScreenPoint;
    use crate::mock::MockMapDriver;

    mod frame_context_tests {
        use super::*;

        #[test]
        fn test_root_window_expr() {
            assert_eq!(FrameContext::Root.window_expr(), "window");
            assert!(!FrameContext::default().is_nested());
        }

        #[test]
        fn test_iframe_window_expr_quotes_selector() {
            let frame = FrameContext::iframe("iframe[name=\"map\"]");
            assert!(frame.is_nested());
            assert_eq!(
                frame.window_expr(),
                r#"document.querySelector("iframe[name=\"map\"]").contentWindow"#
            );
        }

        #[test]
        fn test_display() {
            assert_eq!(FrameContext::iframe("#map").to_string(), "iframe('#map')");
        }
    }

    mod conversion_tests {
        use super::*;

        #[tokio::test]
        async fn test_root_frame_is_identity() {
            let driver = MockMapDriver::new();
            let bbox = BoundingBox::new(11.0, 12.0, 189.0, 288.0);
            let out = to_root_window(&driver, &FrameContext::Root, bbox)
                .await
                .unwrap();
            assert_eq!(out, bbox);
        }

        #[tokio::test]
        async fn test_iframe_offset_is_added() {
            let driver = MockMapDriver::new();
            driver.set_frame_offset("#embed", ScreenPoint::new(100.0, 50.0));
            let bbox = BoundingBox::new(10.0, 10.0, 20.0, 20.0);

            let out = to_root_window(&driver, &FrameContext::iframe("#embed"), bbox)
                .await
                .unwrap();
            assert_eq!(out, BoundingBox::new(110.0, 60.0, 20.0, 20.0));
        }

        #[tokio::test]
        async fn test_offset_is_requeried_each_call() {
            let driver = MockMapDriver::new();
            let frame = FrameContext::iframe("#embed");
            let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);

            driver.set_frame_offset("#embed", ScreenPoint::new(5.0, 5.0));
            let first = to_root_window(&driver, &frame, bbox).await.unwrap();
            driver.set_frame_offset("#embed", ScreenPoint::new(7.0, 9.0));
            let second = to_root_window(&driver, &frame, bbox).await.unwrap();

            assert_eq!(first.x, 5.0);
            assert_eq!(second.x, 7.0);
            assert_eq!(second.y, 9.0);
        }
    }
}
