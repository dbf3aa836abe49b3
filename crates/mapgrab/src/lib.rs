//! MapGrab: Map-Feature Locators for Browser Tests
//!
//! Locate rendered map features (layers, feature ids, properties) the way a
//! DOM testing library locates elements, then click them, fit the camera to
//! them, or screenshot them with the rest of the map hidden.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      MAPGRAB Architecture                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌──────────────────────┐   │
//! │   │ MapLocator │    │ MapDriver  │    │ page-side interface  │   │
//! │   │ MapExpect  │───►│  (trait)   │───►│ window.__MAPGRAB__   │   │
//! │   │ Controller │    │            │    │ (maplibre / mapbox)  │   │
//! │   └────────────┘    └─────┬──────┘    └──────────────────────┘   │
//! │                           │                                      │
//! │              ┌────────────┴─────────────┐                        │
//! │              │                          │                        │
//! │       ┌──────┴────────┐         ┌───────┴───────┐                │
//! │       │ ChromiumDriver│         │ MockMapDriver │                │
//! │       │ (browser)     │         │ (tests)       │                │
//! │       └───────────────┘         └───────────────┘                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mapgrab::prelude::*;
//!
//! let browser = MapBrowser::launch(BrowserConfig::from_env()).await?;
//! let grab = MapGrab::new(browser.new_page("http://localhost:8080").await?);
//!
//! let poi = grab.locator("layer[id=poi] filter[\"==\", [\"get\", \"name\"], \"Cafe\"]").first();
//! poi.click().await?;
//! expect_map(poi).to_be_visible_on_map().await?;
//! ```

#![warn(missing_docs)]

mod assertion;
mod browser;
mod controller;
mod driver;
mod frame;
mod geometry;
/// Tracing subscriber helpers
pub mod logging;
mod locator;
/// In-memory driver for tests without a browser
pub mod mock;
mod model;
mod options;
mod result;
mod wait;

use std::sync::Arc;

pub use assertion::{expect_map, MapExpect};
#[cfg(feature = "browser")]
pub use browser::{ChromiumDriver, MapBrowser};
pub use browser::{BrowserConfig, CHROMIUM_PATH_ENV};
pub use controller::{MapController, DEFAULT_MAP_ID};
pub use driver::{Gesture, MapCommand, MapDriver, INTERFACE_INIT_EVENT, MAP_INTERFACE_INIT_EVENT};
pub use frame::{to_root_window, FrameContext, RelativeTo};
pub use geometry::{BoundingBox, LngLat, Padding, ScreenPoint};
pub use locator::{
    BoundingBoxOptions, ExposeOptions, LocatorOptions, MapLocator, MergeKeyFn, MergeStrategy,
    ScreenshotOptions, DEFAULT_REFERENCE_ELEMENT,
};
pub use model::{
    FeatureMatch, LayerVisibility, LayersToHide, LocatorMatch, MatchShape, MergedMatch,
    MutationLedger, MutationState,
};
pub use options::{
    FitBoundsOptions, FitPadding, MapBounds, PaddingOptions, SetAbsoluteViewOptions,
    SetViewOptions,
};
pub use result::{MapGrabError, MapGrabResult};
pub use wait::{
    bounded, WaitOptions, DEFAULT_ASSERTION_POLL_INTERVAL_MS, DEFAULT_ASSERTION_TIMEOUT_MS,
    DEFAULT_QUERY_POLL_INTERVAL_MS,
};

/// Entry point bound to one page (or one iframe of it)
#[derive(Clone)]
pub struct MapGrab {
    driver: Arc<dyn MapDriver>,
    frame: FrameContext,
}

impl std::fmt::Debug for MapGrab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapGrab")
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl MapGrab {
    /// Wrap a driver
    #[must_use]
    pub fn new(driver: impl MapDriver + 'static) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    /// Wrap a shared driver
    #[must_use]
    pub fn from_arc(driver: Arc<dyn MapDriver>) -> Self {
        Self {
            driver,
            frame: FrameContext::Root,
        }
    }

    /// The shared driver
    #[must_use]
    pub fn driver(&self) -> Arc<dyn MapDriver> {
        Arc::clone(&self.driver)
    }

    /// Window that produced locators and controllers target
    #[must_use]
    pub const fn frame(&self) -> &FrameContext {
        &self.frame
    }

    /// Scope everything produced from here to the iframe matched by `css`
    #[must_use]
    pub fn on_iframe(&self, css: impl Into<String>) -> Self {
        Self {
            driver: self.driver(),
            frame: FrameContext::iframe(css),
        }
    }

    /// Locate map features matching `selector`
    #[must_use]
    pub fn locator(&self, selector: impl Into<String>) -> MapLocator {
        let locator = MapLocator::new(self.driver(), selector);
        match &self.frame {
            FrameContext::Root => locator,
            FrameContext::Iframe(css) => locator.on_iframe(css.clone()),
        }
    }

    /// Controller for the map registered as `map_id`
    #[must_use]
    pub fn controller(&self, map_id: impl Into<String>) -> MapController {
        MapController::new(self.driver(), map_id).with_frame(self.frame.clone())
    }

    /// Controller for [`DEFAULT_MAP_ID`]
    #[must_use]
    pub fn default_controller(&self) -> MapController {
        self.controller(DEFAULT_MAP_ID)
    }
}

/// Common imports
pub mod prelude {
    pub use super::browser::*;
    pub use super::{
        expect_map, BoundingBox, BoundingBoxOptions, ExposeOptions, FeatureMatch,
        FitBoundsOptions, FrameContext, LayersToHide, LngLat, LocatorMatch, MapBounds,
        MapController, MapDriver, MapExpect, MapGrab, MapGrabError, MapGrabResult, MapLocator,
        MatchShape, MutationLedger, Padding, RelativeTo, ScreenPoint, ScreenshotOptions,
        SetViewOptions, WaitOptions,
    };
}
