//! Locator engine for rendered map features.
//!
//! A [`MapLocator`] is an immutable description of a query: a selector plus
//! optional refinements (merge, index, frame). Nothing is cached; every
//! operation resolves from scratch.
//!
//! # Resolution
//!
//! 1. wait for `window.__MAPGRAB__` in the target frame
//! 2. wait until the maps the selector targets are stable
//! 3. query, retrying every `poll_interval` while the result is empty
//! 4. drop invisible matches
//! 5. merge matches that share a key, keeping first-encounter order
//! 6. apply the index when more than one match remains
//!
//! Step 3 never gives up on its own; bound it with [`crate::wait::bounded`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::controller::{MapController, DEFAULT_MAP_ID};
use crate::driver::{Gesture, MapDriver};
use crate::frame::{to_root_window, FrameContext, RelativeTo};
use crate::geometry::{BoundingBox, Padding};
use crate::model::{FeatureMatch, LayersToHide, LocatorMatch, MatchShape, MutationLedger};
use crate::options::FitBoundsOptions;
use crate::result::{MapGrabError, MapGrabResult};
use crate::wait::DEFAULT_QUERY_POLL_INTERVAL_MS;

/// Element whose top-left corner is the pointer reference origin
pub const DEFAULT_REFERENCE_ELEMENT: &str = "html";

/// Caller-supplied merge key; `None` keeps the match out of every group
pub type MergeKeyFn = Arc<dyn Fn(&FeatureMatch) -> Option<String> + Send + Sync>;

/// How matches are grouped before merging
#[derive(Clone)]
pub enum MergeStrategy {
    /// Every visible match collapses into one
    All,
    /// Matches with equal values of a property collapse together
    Property(String),
    /// Matches with equal keys collapse together
    Key(MergeKeyFn),
}

impl MergeStrategy {
    fn key_of(&self, feature: &FeatureMatch) -> Option<String> {
        match self {
            Self::All => Some(String::new()),
            Self::Property(name) => feature.property(name).map(str::to_string),
            Self::Key(key) => key(feature),
        }
    }

    fn breadcrumb(&self) -> String {
        match self {
            Self::All => "merge()".to_string(),
            Self::Property(name) => format!("merge('{name}')"),
            Self::Key(_) => "merge(fn)".to_string(),
        }
    }
}

impl std::fmt::Debug for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "All"),
            Self::Property(name) => f.debug_tuple("Property").field(name).finish(),
            Self::Key(_) => write!(f, "Key(<fn>)"),
        }
    }
}

/// Locator options for customizing behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorOptions {
    /// Delay between queries while the result is empty
    pub poll_interval: Duration,
    /// Root-document element used as the pointer reference origin
    pub reference_element: String,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_QUERY_POLL_INTERVAL_MS),
            reference_element: DEFAULT_REFERENCE_ELEMENT.to_string(),
        }
    }
}

impl LocatorOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the empty-result polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the pointer reference element
    #[must_use]
    pub fn with_reference_element(mut self, css: impl Into<String>) -> Self {
        self.reference_element = css.into();
        self
    }
}

/// Options for [`MapLocator::bounding_box`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBoxOptions {
    /// Coordinate space of the result
    pub relative_to: RelativeTo,
    /// Padding applied after frame conversion
    pub padding: Option<Padding>,
    /// `(dx, dy)` offset applied after padding
    pub offset: Option<(f64, f64)>,
}

impl BoundingBoxOptions {
    /// Create options with defaults (parent window, no padding, no offset)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the coordinate space
    #[must_use]
    pub const fn with_relative_to(mut self, relative_to: RelativeTo) -> Self {
        self.relative_to = relative_to;
        self
    }

    /// Report the box in root-window coordinates
    #[must_use]
    pub const fn relative_to_root(self) -> Self {
        self.with_relative_to(RelativeTo::RootWindow)
    }

    /// Pad the box
    #[must_use]
    pub fn with_padding(mut self, padding: impl Into<Padding>) -> Self {
        self.padding = Some(padding.into());
        self
    }

    /// Translate the box
    #[must_use]
    pub const fn with_offset(mut self, dx: f64, dy: f64) -> Self {
        self.offset = Some((dx, dy));
        self
    }
}

/// Layer exposure performed around a locator screenshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExposeOptions {
    /// Layers shown in addition to the match's own layers
    pub additional_layers: Vec<String>,
    /// Layers hidden while capturing
    pub hidden_layers: LayersToHide,
    /// Background colour inserted below every layer while capturing
    pub background_color: Option<String>,
}

impl ExposeOptions {
    /// Expose only the match's layers, hiding everything else
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep more layers visible
    #[must_use]
    pub fn with_additional_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_layers = layers.into_iter().map(Into::into).collect();
        self
    }

    /// Hide only the given set instead of every other layer
    #[must_use]
    pub fn with_hidden_layers(mut self, hidden: LayersToHide) -> Self {
        self.hidden_layers = hidden;
        self
    }

    /// Paint a solid background behind the exposed layers
    #[must_use]
    pub fn with_background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }
}

/// Options for [`MapLocator::screenshot`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScreenshotOptions {
    /// Layer exposure to apply while capturing
    pub expose: Option<ExposeOptions>,
    /// Padding around the captured box
    pub padding: Option<Padding>,
    /// `(dx, dy)` offset of the captured box
    pub offset: Option<(f64, f64)>,
}

impl ScreenshotOptions {
    /// Capture the match as currently rendered
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose the match's layers while capturing
    #[must_use]
    pub fn with_expose(mut self, expose: ExposeOptions) -> Self {
        self.expose = Some(expose);
        self
    }

    /// Pad the captured box
    #[must_use]
    pub fn with_padding(mut self, padding: impl Into<Padding>) -> Self {
        self.padding = Some(padding.into());
        self
    }

    /// Translate the captured box
    #[must_use]
    pub const fn with_offset(mut self, dx: f64, dy: f64) -> Self {
        self.offset = Some((dx, dy));
        self
    }
}

/// A locator for rendered map features.
///
/// Refinements return a new locator and leave `self` untouched.
#[derive(Clone)]
pub struct MapLocator {
    driver: Arc<dyn MapDriver>,
    selector: String,
    frame: FrameContext,
    merge: Option<MergeStrategy>,
    index: Option<isize>,
    breadcrumbs: Vec<String>,
    options: LocatorOptions,
}

impl std::fmt::Debug for MapLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapLocator")
            .field("selector", &self.selector)
            .field("frame", &self.frame)
            .field("merge", &self.merge)
            .field("index", &self.index)
            .field("breadcrumbs", &self.breadcrumbs)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for MapLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "locator('{}')", self.selector)?;
        for crumb in &self.breadcrumbs {
            write!(f, ".{crumb}")?;
        }
        Ok(())
    }
}

impl MapLocator {
    /// Create a locator for `selector` in the root window
    #[must_use]
    pub fn new(driver: Arc<dyn MapDriver>, selector: impl Into<String>) -> Self {
        Self {
            driver,
            selector: selector.into(),
            frame: FrameContext::Root,
            merge: None,
            index: None,
            breadcrumbs: Vec::new(),
            options: LocatorOptions::default(),
        }
    }

    /// Replace the locator options
    #[must_use]
    pub fn with_options(mut self, options: LocatorOptions) -> Self {
        self.options = options;
        self
    }

    /// The selector handed to the query backend
    #[must_use]
    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Window the locator queries
    #[must_use]
    pub const fn frame(&self) -> &FrameContext {
        &self.frame
    }

    /// Get the options
    #[must_use]
    pub const fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// Index applied after merging, if any
    #[must_use]
    pub const fn index(&self) -> Option<isize> {
        self.index
    }

    // =========================================================================
    // REFINEMENTS
    // =========================================================================

    /// Select the first match
    #[must_use]
    pub fn first(&self) -> Self {
        self.with_index(0, "first()".to_string())
    }

    /// Select the last match
    #[must_use]
    pub fn last(&self) -> Self {
        self.with_index(-1, "last()".to_string())
    }

    /// Select the match at `index`; negative values count from the end
    #[must_use]
    pub fn nth(&self, index: isize) -> Self {
        self.with_index(index, format!("nth({index})"))
    }

    /// Collapse every visible match into one
    #[must_use]
    pub fn merge_all(&self) -> Self {
        self.with_merge(MergeStrategy::All)
    }

    /// Collapse matches sharing a value of `property`
    #[must_use]
    pub fn merge_by_property(&self, property: impl Into<String>) -> Self {
        self.with_merge(MergeStrategy::Property(property.into()))
    }

    /// Collapse matches sharing the key returned by `key`
    #[must_use]
    pub fn merge_by<F>(&self, key: F) -> Self
    where
        F: Fn(&FeatureMatch) -> Option<String> + Send + Sync + 'static,
    {
        self.with_merge(MergeStrategy::Key(Arc::new(key)))
    }

    /// Query the iframe matched by `css` instead of the root window
    #[must_use]
    pub fn on_iframe(&self, css: impl Into<String>) -> Self {
        let css = css.into();
        let mut next = self.clone();
        next.breadcrumbs.push(format!("on_iframe('{css}')"));
        next.frame = FrameContext::Iframe(css);
        next
    }

    fn with_index(&self, index: isize, crumb: String) -> Self {
        let mut next = self.clone();
        next.index = Some(index);
        next.breadcrumbs.push(crumb);
        next
    }

    fn with_merge(&self, strategy: MergeStrategy) -> Self {
        let mut next = self.clone();
        next.breadcrumbs.push(strategy.breadcrumb());
        next.merge = Some(strategy);
        next
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// Resolve to the refined, ordered list of matches.
    ///
    /// Suspends until the backend returns at least one raw match. The result
    /// can still be empty when every match is invisible or the index points
    /// past the end.
    pub async fn resolve(&self) -> MapGrabResult<Vec<LocatorMatch>> {
        self.wait_backend().await?;
        let raw = self.poll_until_found().await?;
        Ok(self.refine(raw))
    }

    /// Apply visibility filtering, merging and indexing to raw matches
    #[must_use]
    pub fn refine(&self, raw: Vec<FeatureMatch>) -> Vec<LocatorMatch> {
        let visible: Vec<FeatureMatch> = raw.into_iter().filter(|m| m.is_visible).collect();
        let matches = match &self.merge {
            Some(strategy) => merge_matches(visible, strategy),
            None => visible.into_iter().map(LocatorMatch::from).collect(),
        };
        match self.index {
            Some(index) if matches.len() > 1 => select_index(matches, index),
            _ => matches,
        }
    }

    /// Resolve to exactly one match.
    ///
    /// # Errors
    ///
    /// [`MapGrabError::ElementNotExist`] when nothing remains after
    /// refinement, [`MapGrabError::TooManyElements`] when several remain.
    pub async fn single(&self) -> MapGrabResult<LocatorMatch> {
        let mut matches = self.resolve().await?;
        match matches.len() {
            0 => Err(MapGrabError::ElementNotExist {
                locator: self.to_string(),
            }),
            1 => matches.pop().ok_or_else(|| MapGrabError::ElementNotExist {
                locator: self.to_string(),
            }),
            count => Err(MapGrabError::TooManyElements {
                locator: self.to_string(),
                count,
            }),
        }
    }

    /// Number of matches; waits until the backend finds something
    pub async fn count(&self) -> MapGrabResult<usize> {
        Ok(self.resolve().await?.len())
    }

    /// Number of matches right now, possibly zero; never polls
    pub async fn count_now(&self) -> MapGrabResult<usize> {
        self.wait_backend().await?;
        let raw = self
            .driver
            .query_features(&self.frame, &self.selector)
            .await?;
        Ok(self.refine(raw).len())
    }

    /// One indexed locator per current match
    pub async fn all(&self) -> MapGrabResult<Vec<Self>> {
        let count = self.count().await?;
        if self.index.is_some() {
            return Ok(if count == 0 { Vec::new() } else { vec![self.clone()] });
        }
        Ok((0..count)
            .filter_map(|i| isize::try_from(i).ok())
            .map(|i| self.nth(i))
            .collect())
    }

    async fn wait_backend(&self) -> MapGrabResult<()> {
        if !self.driver.interface_present(&self.frame).await? {
            debug!(frame = %self.frame, "waiting for query interface");
            self.driver.wait_interface_init(&self.frame).await?;
        }
        self.driver
            .wait_stable_for_selector(&self.frame, &self.selector)
            .await
    }

    async fn poll_until_found(&self) -> MapGrabResult<Vec<FeatureMatch>> {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            let raw = self
                .driver
                .query_features(&self.frame, &self.selector)
                .await?;
            if !raw.is_empty() {
                debug!(locator = %self, found = raw.len(), attempts, "resolved");
                return Ok(raw);
            }
            trace!(locator = %self, attempts, "empty result, retrying");
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    // =========================================================================
    // GEOMETRY
    // =========================================================================

    /// Display rectangle of the single match.
    ///
    /// Converted to root-window space first (when requested), then padded,
    /// then offset.
    pub async fn bounding_box(&self, options: BoundingBoxOptions) -> MapGrabResult<BoundingBox> {
        let found = self.single().await?;
        let mut bbox = *found.rect();
        if options.relative_to == RelativeTo::RootWindow {
            bbox = to_root_window(self.driver.as_ref(), &self.frame, bbox).await?;
        }
        if let Some(padding) = options.padding {
            bbox = bbox.apply_padding(padding);
        }
        if let Some((dx, dy)) = options.offset {
            bbox = bbox.apply_offset(dx, dy);
        }
        Ok(bbox)
    }

    // =========================================================================
    // POINTER ACTIONS
    // =========================================================================

    /// Click the first interaction point
    pub async fn click(&self) -> MapGrabResult<()> {
        self.pointer_action(Gesture::Click).await
    }

    /// Right-click the first interaction point
    pub async fn context_click(&self) -> MapGrabResult<()> {
        self.pointer_action(Gesture::ContextClick).await
    }

    /// Double-click the first interaction point
    pub async fn double_click(&self) -> MapGrabResult<()> {
        self.pointer_action(Gesture::DoubleClick).await
    }

    /// Move the pointer over the first interaction point
    pub async fn hover(&self) -> MapGrabResult<()> {
        self.pointer_action(Gesture::Hover).await
    }

    async fn pointer_action(&self, gesture: Gesture) -> MapGrabResult<()> {
        let found = self.single().await?;
        let Some(point) = found.interaction_points().first().copied() else {
            debug!(locator = %self, %gesture, "no interaction point, skipping gesture");
            return Ok(());
        };
        let target = if self.frame.is_nested() {
            let offset = self.driver.frame_absolute_position(&self.frame).await?;
            point.offset(offset.x, offset.y)
        } else {
            point
        };

        let reference = &self.options.reference_element;
        let size = self.driver.element_rect(reference).await?;
        self.driver
            .pointer_move_to_element(reference, -size.width / 2.0, -size.height / 2.0)
            .await?;
        self.driver.pointer_move_by(target.x, target.y).await?;
        debug!(locator = %self, %gesture, x = target.x, y = target.y, "pointer gesture");
        self.driver.pointer_gesture(gesture).await
    }

    // =========================================================================
    // MAP ACTIONS
    // =========================================================================

    /// Fit the owning map's viewport to the single match
    pub async fn fit_map(&self, options: FitBoundsOptions) -> MapGrabResult<()> {
        let found = self.single().await?;
        let map_id = found
            .map_ids()
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_MAP_ID.to_string());
        self.controller_for(map_id)
            .fit_to_bounding_box(*found.rect(), options)
            .await
    }

    /// Capture a PNG of the single match.
    ///
    /// With exposure enabled, every map the match spans shows only the
    /// match's layers (plus any additional ones) while capturing. Every map
    /// mutated so far is reverted when exposure or the capture fails.
    pub async fn screenshot(&self, options: ScreenshotOptions) -> MapGrabResult<Vec<u8>> {
        let found = self.single().await?;
        let with_background = options
            .expose
            .as_ref()
            .is_some_and(|e| e.background_color.is_some());

        let mut exposed = Vec::new();
        if let Some(expose) = &options.expose {
            if let Err(err) = self.expose_for_capture(&found, expose, &mut exposed).await {
                // exposure error wins over a restore error
                let _ = self.restore_after_capture(&exposed, with_background).await;
                return Err(err);
            }
        }

        let captured = self.capture(&options).await;
        let restored = self.restore_after_capture(&exposed, with_background).await;

        let png = captured?;
        restored?;
        Ok(png)
    }

    /// Expose every map the match spans, recording each ledger in `exposed`
    /// as soon as the map has been mutated.
    async fn expose_for_capture(
        &self,
        found: &LocatorMatch,
        expose: &ExposeOptions,
        exposed: &mut Vec<(MapController, MutationLedger)>,
    ) -> MapGrabResult<()> {
        let mut layers = found.layer_ids();
        for extra in &expose.additional_layers {
            if !layers.contains(extra) {
                layers.push(extra.clone());
            }
        }

        for map_id in found.map_ids() {
            let controller = self.controller_for(map_id);
            let ledger = controller
                .expose_layers(layers.iter().cloned(), expose.hidden_layers.clone())
                .await?;
            exposed.push((controller.clone(), ledger));
            if let Some(color) = &expose.background_color {
                controller.set_background_color(color.clone()).await?;
            }
        }
        debug!(locator = %self, maps = exposed.len(), layers = layers.len(), "exposed for capture");
        Ok(())
    }

    async fn capture(&self, options: &ScreenshotOptions) -> MapGrabResult<Vec<u8>> {
        self.driver
            .wait_stable_for_selector(&self.frame, &self.selector)
            .await?;
        let bbox = self
            .bounding_box(BoundingBoxOptions {
                relative_to: RelativeTo::RootWindow,
                padding: options.padding,
                offset: options.offset,
            })
            .await?;
        self.driver.capture_screenshot(&bbox).await
    }

    async fn restore_after_capture(
        &self,
        exposed: &[(MapController, MutationLedger)],
        with_background: bool,
    ) -> MapGrabResult<()> {
        let mut first_error = None;
        for (controller, ledger) in exposed {
            if with_background {
                if let Err(err) = controller.remove_background().await {
                    first_error.get_or_insert(err);
                }
            }
            if let Err(err) = controller.revert_expose_layers(ledger).await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn controller_for(&self, map_id: String) -> MapController {
        MapController::new(Arc::clone(&self.driver), map_id).with_frame(self.frame.clone())
    }
}

/// Group by key in first-encounter order and fold each group with `merge`
fn merge_matches(matches: Vec<FeatureMatch>, strategy: &MergeStrategy) -> Vec<LocatorMatch> {
    let mut groups: Vec<Vec<FeatureMatch>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for feature in matches {
        if let Some(key) = strategy.key_of(&feature) {
            if let Some(&pos) = positions.get(&key) {
                groups[pos].push(feature);
                continue;
            }
            positions.insert(key, groups.len());
        }
        groups.push(vec![feature]);
    }

    let merged: Vec<LocatorMatch> = groups
        .into_iter()
        .filter_map(|group| {
            group
                .into_iter()
                .map(LocatorMatch::from)
                .reduce(LocatorMatch::merge)
        })
        .collect();
    debug!(?strategy, groups = merged.len(), "merged matches");
    merged
}

/// Pick one match; negative indexes count from the end
fn select_index(matches: Vec<LocatorMatch>, index: isize) -> Vec<LocatorMatch> {
    let len = matches.len() as isize;
    let position = if index < 0 { len + index } else { index };
    usize::try_from(position)
        .ok()
        .and_then(|pos| matches.into_iter().nth(pos))
        .into_iter()
        .collect()
}
