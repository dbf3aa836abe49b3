//! In-memory [`MapDriver`] for tests.
//!
//! Maps, style layers and query responses are scripted up front; every call
//! is appended to a history that tests can inspect with [`MockMapDriver::was_called`].
//! Registration and interface installation can happen late, after a locator or
//! controller has started waiting.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::trace;

use crate::driver::{Gesture, MapCommand, MapDriver};
use crate::frame::FrameContext;
use crate::geometry::{BoundingBox, LngLat, ScreenPoint};
use crate::model::{FeatureMatch, LayerVisibility, LayersToHide, MutationLedger, MutationState};
use crate::result::{MapGrabError, MapGrabResult};

/// Linear projection used by [`MockMap`]: `x = origin.x + lng * scale`,
/// `y = origin.y - lat * scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MockProjection {
    /// Page pixel of `(0, 0)`
    pub origin: ScreenPoint,
    /// Pixels per degree
    pub scale: f64,
}

impl Default for MockProjection {
    fn default() -> Self {
        Self {
            origin: ScreenPoint::new(400.0, 300.0),
            scale: 10.0,
        }
    }
}

impl MockProjection {
    fn project(&self, lng_lat: LngLat) -> ScreenPoint {
        ScreenPoint::new(
            (self.origin.x + lng_lat.lng * self.scale).round(),
            (self.origin.y - lng_lat.lat * self.scale).round(),
        )
    }

    fn unproject(&self, point: ScreenPoint) -> LngLat {
        LngLat::new(
            (point.x - self.origin.x) / self.scale,
            (self.origin.y - point.y) / self.scale,
        )
    }
}

/// A scripted map with an ordered style
#[derive(Debug, Clone, Default)]
pub struct MockMap {
    /// Style layers in draw order; `None` means no layout visibility set
    layers: Vec<(String, Option<LayerVisibility>)>,
    background: Option<String>,
    views: Vec<Value>,
    fits: Vec<Value>,
    projection: MockProjection,
}

impl MockMap {
    /// Create a map with no layers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer with no explicit visibility (drawn)
    #[must_use]
    pub fn with_layer(mut self, id: impl Into<String>) -> Self {
        self.layers.push((id.into(), None));
        self
    }

    /// Add a layer with an explicit visibility
    #[must_use]
    pub fn with_layer_visibility(mut self, id: impl Into<String>, visibility: LayerVisibility) -> Self {
        self.layers.push((id.into(), Some(visibility)));
        self
    }

    /// Replace the projection
    #[must_use]
    pub const fn with_projection(mut self, projection: MockProjection) -> Self {
        self.projection = projection;
        self
    }

    fn visibility(&self, layer_id: &str) -> Option<LayerVisibility> {
        self.layers
            .iter()
            .find(|(id, _)| id == layer_id)
            .map(|(_, vis)| vis.unwrap_or_default())
    }

    fn set_visibility(&mut self, layer_id: &str, visibility: LayerVisibility) {
        if let Some((_, vis)) = self.layers.iter_mut().find(|(id, _)| id == layer_id) {
            *vis = Some(visibility);
        }
    }

    fn expose(&mut self, expose: &[String], hide: &LayersToHide) -> MutationLedger {
        let mut ledger = MutationLedger::new();
        for (id, vis) in &mut self.layers {
            let target = if expose.contains(id) || !hide.hides(id) {
                LayerVisibility::Visible
            } else {
                LayerVisibility::None
            };
            let current = vis.unwrap_or_default();
            if current != target {
                ledger.record(id.clone(), MutationState::new(current, target));
                *vis = Some(target);
            }
        }
        ledger
    }

    fn apply(&mut self, command: &MapCommand) -> MapGrabResult<Value> {
        let out = match command {
            MapCommand::WaitToMapLoaded => Value::Bool(true),
            MapCommand::WaitToMapStable | MapCommand::WaitToMapRepaint => Value::Null,
            MapCommand::SetView(options) => {
                self.views.push(serde_json::to_value(options)?);
                Value::Null
            }
            MapCommand::SetViewAbsolute(options) => {
                self.views.push(serde_json::to_value(options)?);
                Value::Null
            }
            MapCommand::FitMapToBounds { bounds, options } => {
                self.fits.push(serde_json::json!({ "bounds": bounds, "options": options }));
                Value::Null
            }
            MapCommand::FitMapToBoundingBox { bbox, options } => {
                self.fits.push(serde_json::json!({ "bbox": bbox, "options": options }));
                Value::Null
            }
            MapCommand::SetBackgroundColor(color) => {
                if self.background.is_none() {
                    self.background = Some(color.clone());
                }
                Value::Null
            }
            MapCommand::RemoveBackground => {
                self.background = None;
                Value::Null
            }
            MapCommand::ProjectLngLatToScreenPoint(lng_lat) => {
                serde_json::to_value(self.projection.project(*lng_lat))?
            }
            MapCommand::UnprojectScreenPointToLngLat(point) => {
                serde_json::to_value(self.projection.unproject(*point))?
            }
            MapCommand::ExposeLayers { expose, hide } => {
                serde_json::to_value(self.expose(expose, hide))?
            }
            MapCommand::RevertExposeLayers(ledger) => {
                for (layer_id, state) in ledger.iter() {
                    self.set_visibility(layer_id, state.inverse().to);
                }
                Value::Null
            }
        };
        Ok(out)
    }
}

#[derive(Debug, Default)]
struct MockState {
    interface_ready: bool,
    maps: BTreeMap<String, MockMap>,
    responses: HashMap<String, VecDeque<Vec<FeatureMatch>>>,
    frame_offsets: HashMap<String, ScreenPoint>,
    element_rects: HashMap<String, BoundingBox>,
    pointer: ScreenPoint,
    gestures: Vec<(Gesture, ScreenPoint)>,
    screenshot: Vec<u8>,
    fail_screenshots: bool,
    failing_commands: HashSet<String>,
    captures: Vec<BoundingBox>,
    inspector: bool,
    call_history: Vec<String>,
}

/// Mock driver for unit and integration testing
#[derive(Debug, Default)]
pub struct MockMapDriver {
    state: Mutex<MockState>,
    registered: Notify,
}

/// Viewport used for the `html` element when no rect was scripted
const DEFAULT_VIEWPORT: BoundingBox = BoundingBox {
    x: 0.0,
    y: 0.0,
    width: 1280.0,
    height: 720.0,
    right: 1280.0,
    bottom: 720.0,
};

impl MockMapDriver {
    /// Create a driver with no interface installed and no maps
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver with the interface installed and `map_id` registered
    #[must_use]
    pub fn with_map(map_id: impl Into<String>, map: MockMap) -> Self {
        let driver = Self::new();
        driver.register_map(map_id, map);
        driver
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) {
        self.state().call_history.push(call);
    }

    /// Install `window.__MAPGRAB__` and wake anything waiting for it
    pub fn init_interface(&self) {
        self.state().interface_ready = true;
        self.registered.notify_waiters();
    }

    /// Register a map (installing the interface if needed) and wake waiters
    pub fn register_map(&self, map_id: impl Into<String>, map: MockMap) {
        {
            let mut state = self.state();
            state.interface_ready = true;
            state.maps.insert(map_id.into(), map);
        }
        self.registered.notify_waiters();
    }

    /// Queue a response for `selector`; the last queued response repeats
    pub fn push_response(&self, selector: impl Into<String>, matches: Vec<FeatureMatch>) {
        self.state()
            .responses
            .entry(selector.into())
            .or_default()
            .push_back(matches);
    }

    /// Replace every queued response for `selector`
    pub fn set_response(&self, selector: impl Into<String>, matches: Vec<FeatureMatch>) {
        self.state()
            .responses
            .insert(selector.into(), VecDeque::from([matches]));
    }

    /// Position an iframe within the root window
    pub fn set_frame_offset(&self, iframe_css: impl Into<String>, offset: ScreenPoint) {
        self.state().frame_offsets.insert(iframe_css.into(), offset);
    }

    /// Script the rectangle of a root-document element
    pub fn set_element_rect(&self, css: impl Into<String>, rect: BoundingBox) {
        self.state().element_rects.insert(css.into(), rect);
    }

    /// Bytes returned by screenshot captures
    pub fn set_screenshot(&self, png: Vec<u8>) {
        self.state().screenshot = png;
    }

    /// Make every screenshot capture fail
    pub fn fail_screenshots(&self, fail: bool) {
        self.state().fail_screenshots = fail;
    }

    /// Make every map command with page method name `method` fail
    /// (for example `"setBackgroundColor"`)
    pub fn fail_command(&self, method: impl Into<String>) {
        self.state().failing_commands.insert(method.into());
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().call_history.clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.state()
            .call_history
            .iter()
            .any(|c| c.starts_with(method))
    }

    /// Number of recorded calls starting with `method`
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_history
            .iter()
            .filter(|c| c.starts_with(method))
            .count()
    }

    /// Effective visibility of a layer, `None` if the map or layer is unknown
    #[must_use]
    pub fn layer_visibility(&self, map_id: &str, layer_id: &str) -> Option<LayerVisibility> {
        self.state().maps.get(map_id)?.visibility(layer_id)
    }

    /// Background colour currently inserted into a map
    #[must_use]
    pub fn background(&self, map_id: &str) -> Option<String> {
        self.state().maps.get(map_id)?.background.clone()
    }

    /// View payloads received by a map, oldest first
    #[must_use]
    pub fn views(&self, map_id: &str) -> Vec<Value> {
        self.state()
            .maps
            .get(map_id)
            .map(|m| m.views.clone())
            .unwrap_or_default()
    }

    /// Fit payloads received by a map, oldest first
    #[must_use]
    pub fn fits(&self, map_id: &str) -> Vec<Value> {
        self.state()
            .maps
            .get(map_id)
            .map(|m| m.fits.clone())
            .unwrap_or_default()
    }

    /// Gestures performed and where the pointer was at the time
    #[must_use]
    pub fn gestures(&self) -> Vec<(Gesture, ScreenPoint)> {
        self.state().gestures.clone()
    }

    /// Current pointer position
    #[must_use]
    pub fn pointer_position(&self) -> ScreenPoint {
        self.state().pointer
    }

    /// Clip rectangles of every screenshot attempt
    #[must_use]
    pub fn captures(&self) -> Vec<BoundingBox> {
        self.state().captures.clone()
    }

    /// Whether the inspector overlay is enabled
    #[must_use]
    pub fn inspector_enabled(&self) -> bool {
        self.state().inspector
    }

    fn rect_of(&self, css: &str) -> BoundingBox {
        self.state()
            .element_rects
            .get(css)
            .copied()
            .unwrap_or(DEFAULT_VIEWPORT)
    }
}

#[async_trait]
impl MapDriver for MockMapDriver {
    async fn interface_present(&self, frame: &FrameContext) -> MapGrabResult<bool> {
        self.record(format!("interface_present:{frame}"));
        Ok(self.state().interface_ready)
    }

    async fn wait_interface_init(&self, frame: &FrameContext) -> MapGrabResult<()> {
        self.record(format!("wait_interface_init:{frame}"));
        loop {
            let notified = self.registered.notified();
            let ready = self.state().interface_ready;
            if ready {
                return Ok(());
            }
            notified.await;
        }
    }

    async fn map_registered(&self, frame: &FrameContext, map_id: &str) -> MapGrabResult<bool> {
        self.record(format!("map_registered:{frame}:{map_id}"));
        Ok(self.state().maps.contains_key(map_id))
    }

    async fn wait_map_registered(&self, frame: &FrameContext, map_id: &str) -> MapGrabResult<()> {
        self.record(format!("wait_map_registered:{frame}:{map_id}"));
        loop {
            let notified = self.registered.notified();
            let registered = self.state().maps.contains_key(map_id);
            if registered {
                return Ok(());
            }
            notified.await;
        }
    }

    async fn query_features(
        &self,
        frame: &FrameContext,
        selector: &str,
    ) -> MapGrabResult<Vec<FeatureMatch>> {
        let mut state = self.state();
        state.call_history.push(format!("query:{frame}:{selector}"));
        let Some(queue) = state.responses.get_mut(selector) else {
            return Ok(Vec::new());
        };
        let matches = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(matches)
    }

    async fn wait_stable_for_selector(
        &self,
        frame: &FrameContext,
        selector: &str,
    ) -> MapGrabResult<()> {
        self.record(format!("wait_stable_for_selector:{frame}:{selector}"));
        Ok(())
    }

    async fn frame_absolute_position(&self, frame: &FrameContext) -> MapGrabResult<ScreenPoint> {
        self.record(format!("frame_absolute_position:{frame}"));
        Ok(match frame {
            FrameContext::Root => ScreenPoint::default(),
            FrameContext::Iframe(css) => self
                .state()
                .frame_offsets
                .get(css)
                .copied()
                .unwrap_or_default(),
        })
    }

    async fn execute_map_command(
        &self,
        frame: &FrameContext,
        map_id: &str,
        command: &MapCommand,
    ) -> MapGrabResult<Value> {
        let mut state = self.state();
        state
            .call_history
            .push(format!("command:{map_id}:{}", command.method_name()));
        trace!(%frame, map_id, method = command.method_name(), "mock command");
        if state.failing_commands.contains(command.method_name()) {
            return Err(MapGrabError::Script {
                message: format!("mock {} failure", command.method_name()),
            });
        }
        let map = state
            .maps
            .get_mut(map_id)
            .ok_or_else(|| MapGrabError::Script {
                message: format!("map interface '{map_id}' is not registered"),
            })?;
        map.apply(command)
    }

    async fn set_inspector(&self, frame: &FrameContext, enabled: bool) -> MapGrabResult<()> {
        let mut state = self.state();
        state
            .call_history
            .push(format!("set_inspector:{frame}:{enabled}"));
        state.inspector = enabled;
        Ok(())
    }

    async fn element_rect(&self, css: &str) -> MapGrabResult<BoundingBox> {
        self.record(format!("element_rect:{css}"));
        Ok(self.rect_of(css))
    }

    async fn pointer_move_to_element(&self, css: &str, dx: f64, dy: f64) -> MapGrabResult<()> {
        let target = self.rect_of(css).center().offset(dx, dy);
        let mut state = self.state();
        state
            .call_history
            .push(format!("pointer_move_to_element:{css}"));
        state.pointer = target;
        Ok(())
    }

    async fn pointer_move_by(&self, dx: f64, dy: f64) -> MapGrabResult<()> {
        let mut state = self.state();
        state.call_history.push("pointer_move_by".to_string());
        state.pointer = state.pointer.offset(dx, dy);
        Ok(())
    }

    async fn pointer_gesture(&self, gesture: Gesture) -> MapGrabResult<()> {
        let mut state = self.state();
        state.call_history.push(format!("gesture:{gesture}"));
        let at = state.pointer;
        state.gestures.push((gesture, at));
        Ok(())
    }

    async fn capture_screenshot(&self, clip: &BoundingBox) -> MapGrabResult<Vec<u8>> {
        let mut state = self.state();
        state.call_history.push("capture_screenshot".to_string());
        state.captures.push(*clip);
        if state.fail_screenshots {
            return Err(MapGrabError::Screenshot {
                message: "mock capture failure".to_string(),
            });
        }
        Ok(state.screenshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn feature(layer: &str) -> FeatureMatch {
        FeatureMatch::new(layer, "mainMap", BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    mod response_tests {
        use super::*;

        #[tokio::test]
        async fn test_unknown_selector_returns_empty() {
            let driver = MockMapDriver::new();
            let found = driver
                .query_features(&FrameContext::Root, "layer[id=x]")
                .await
                .unwrap();
            assert!(found.is_empty());
            assert!(driver.was_called("query"));
        }

        #[tokio::test]
        async fn test_last_response_repeats() {
            let driver = MockMapDriver::new();
            driver.push_response("s", vec![]);
            driver.push_response("s", vec![feature("a"), feature("b")]);

            let root = FrameContext::Root;
            assert_eq!(driver.query_features(&root, "s").await.unwrap().len(), 0);
            assert_eq!(driver.query_features(&root, "s").await.unwrap().len(), 2);
            assert_eq!(driver.query_features(&root, "s").await.unwrap().len(), 2);
            assert_eq!(driver.call_count("query"), 3);
        }
    }

    mod map_tests {
        use super::*;

        fn styled() -> MockMap {
            MockMap::new()
                .with_layer("water")
                .with_layer_visibility("roads", LayerVisibility::Visible)
                .with_layer_visibility("labels", LayerVisibility::None)
                .with_layer("poi")
        }

        #[test]
        fn test_expose_all_other_records_changed_layers_only() {
            let mut map = styled();
            let ledger = map.expose(&["labels".to_string()], &LayersToHide::AllOther);

            assert_eq!(ledger.len(), 4);
            assert_eq!(
                ledger.get("labels"),
                Some(&MutationState::new(LayerVisibility::None, LayerVisibility::Visible))
            );
            assert_eq!(map.visibility("water"), Some(LayerVisibility::None));
        }

        #[test]
        fn test_expose_explicit_hide_set() {
            let mut map = styled();
            let ledger = map.expose(&["poi".to_string()], &LayersToHide::only(["roads"]));

            // poi already visible; labels is not in the hide set so it is shown
            assert_eq!(ledger.len(), 2);
            assert!(ledger.get("roads").is_some());
            assert!(ledger.get("labels").is_some());
            assert_eq!(map.visibility("labels"), Some(LayerVisibility::Visible));
            assert_eq!(map.visibility("water"), Some(LayerVisibility::Visible));
        }

        #[test]
        fn test_revert_applies_inverse_of_each_entry() {
            let mut map = styled();
            let ledger = map.expose(&["labels".to_string()], &LayersToHide::AllOther);
            map.apply(&MapCommand::RevertExposeLayers(ledger)).unwrap();

            assert_eq!(map.visibility("water"), Some(LayerVisibility::Visible));
            assert_eq!(map.visibility("roads"), Some(LayerVisibility::Visible));
            assert_eq!(map.visibility("labels"), Some(LayerVisibility::None));
            assert_eq!(map.visibility("poi"), Some(LayerVisibility::Visible));
        }

        #[tokio::test]
        async fn test_failing_command_is_rejected_and_recorded() {
            let driver = MockMapDriver::with_map("mainMap", MockMap::new());
            driver.fail_command("setBackgroundColor");

            let err = driver
                .execute_map_command(
                    &FrameContext::Root,
                    "mainMap",
                    &MapCommand::SetBackgroundColor("#fff".into()),
                )
                .await
                .unwrap_err();

            assert!(matches!(err, MapGrabError::Script { .. }));
            assert!(driver.was_called("command:mainMap:setBackgroundColor"));
            assert_eq!(driver.background("mainMap"), None);
        }

        #[test]
        fn test_background_is_set_once() {
            let mut map = MockMap::new();
            map.apply(&MapCommand::SetBackgroundColor("#fff".into())).unwrap();
            map.apply(&MapCommand::SetBackgroundColor("#000".into())).unwrap();
            assert_eq!(map.background.as_deref(), Some("#fff"));
            map.apply(&MapCommand::RemoveBackground).unwrap();
            assert!(map.background.is_none());
        }

        #[test]
        fn test_projection_round_trip() {
            let projection = MockProjection::default();
            let point = projection.project(LngLat::new(2.0, 3.0));
            assert_eq!(point, ScreenPoint::new(420.0, 270.0));
            assert_eq!(projection.unproject(point), LngLat::new(2.0, 3.0));
        }
    }

    mod registration_tests {
        use super::*;

        #[tokio::test]
        async fn test_command_on_unknown_map_fails() {
            let driver = MockMapDriver::new();
            let err = driver
                .execute_map_command(&FrameContext::Root, "nope", &MapCommand::WaitToMapStable)
                .await
                .unwrap_err();
            assert!(matches!(err, MapGrabError::Script { .. }));
        }

        #[tokio::test]
        async fn test_late_registration_wakes_waiter() {
            let driver = Arc::new(MockMapDriver::new());
            let waiter = {
                let driver = Arc::clone(&driver);
                tokio::spawn(async move {
                    driver
                        .wait_map_registered(&FrameContext::Root, "late")
                        .await
                })
            };

            tokio::time::sleep(Duration::from_millis(10)).await;
            driver.register_map("late", MockMap::new());

            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
        }
    }

    mod pointer_tests {
        use super::*;

        #[tokio::test]
        async fn test_move_to_viewport_origin_then_by() {
            let driver = MockMapDriver::new();
            driver
                .pointer_move_to_element("html", -640.0, -360.0)
                .await
                .unwrap();
            assert_eq!(driver.pointer_position(), ScreenPoint::new(0.0, 0.0));

            driver.pointer_move_by(15.0, 25.0).await.unwrap();
            driver.pointer_gesture(Gesture::Click).await.unwrap();
            assert_eq!(
                driver.gestures(),
                vec![(Gesture::Click, ScreenPoint::new(15.0, 25.0))]
            );
        }

        #[tokio::test]
        async fn test_failed_capture_is_still_recorded() {
            let driver = MockMapDriver::new();
            driver.fail_screenshots(true);
            let clip = BoundingBox::new(0.0, 0.0, 5.0, 5.0);
            assert!(driver.capture_screenshot(&clip).await.is_err());
            assert_eq!(driver.captures(), vec![clip]);
        }
    }
}
