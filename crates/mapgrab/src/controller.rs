//! Map-level commands: readiness, view changes, projection and the
//! reversible layer exposure protocol.
//!
//! ```text
//! NotRegistered ──register──► Registered ──load──► Loaded ◄──► Stable
//! ```
//!
//! Every mutating call waits for the map to be stable before it reads
//! state and again after the command has been issued.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

use crate::driver::{MapCommand, MapDriver};
use crate::frame::FrameContext;
use crate::geometry::{BoundingBox, LngLat, ScreenPoint};
use crate::model::{LayersToHide, MutationLedger};
use crate::options::{FitBoundsOptions, MapBounds, SetAbsoluteViewOptions, SetViewOptions};
use crate::result::MapGrabResult;

/// Map id used when a page registers a single map without naming it
pub const DEFAULT_MAP_ID: &str = "mainMap";

/// Controller bound to one registered map
#[derive(Clone)]
pub struct MapController {
    driver: Arc<dyn MapDriver>,
    map_id: String,
    frame: FrameContext,
}

impl std::fmt::Debug for MapController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapController")
            .field("map_id", &self.map_id)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl MapController {
    /// Create a controller for `map_id` in the root window
    #[must_use]
    pub fn new(driver: Arc<dyn MapDriver>, map_id: impl Into<String>) -> Self {
        Self {
            driver,
            map_id: map_id.into(),
            frame: FrameContext::Root,
        }
    }

    /// Target the map inside the iframe matched by `css`
    #[must_use]
    pub fn on_iframe(self, css: impl Into<String>) -> Self {
        self.with_frame(FrameContext::iframe(css))
    }

    /// Target the map inside `frame`
    #[must_use]
    pub fn with_frame(mut self, frame: FrameContext) -> Self {
        self.frame = frame;
        self
    }

    /// Map identifier
    #[must_use]
    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    /// Window the controller talks to
    #[must_use]
    pub const fn frame(&self) -> &FrameContext {
        &self.frame
    }

    /// Suspend until the map has registered its interface. No timeout.
    pub async fn wait_ready(&self) -> MapGrabResult<()> {
        if self.driver.map_registered(&self.frame, &self.map_id).await? {
            return Ok(());
        }
        debug!(map_id = %self.map_id, frame = %self.frame, "waiting for map registration");
        self.driver
            .wait_map_registered(&self.frame, &self.map_id)
            .await
    }

    /// Suspend until the map has loaded
    pub async fn wait_loaded(&self) -> MapGrabResult<()> {
        self.command(MapCommand::WaitToMapLoaded).await.map(drop)
    }

    /// Suspend until the map has no pending animation, transition or load
    pub async fn wait_stable(&self) -> MapGrabResult<()> {
        self.command(MapCommand::WaitToMapStable).await.map(drop)
    }

    /// Suspend until the map has repainted and settled again
    pub async fn wait_repaint(&self) -> MapGrabResult<()> {
        self.command(MapCommand::WaitToMapRepaint).await.map(drop)
    }

    /// Jump to a geographic view; unset fields keep their current value
    pub async fn set_view(&self, options: SetViewOptions) -> MapGrabResult<()> {
        self.mutate(MapCommand::SetView(options)).await.map(drop)
    }

    /// Jump to a view whose center is given in page pixels
    pub async fn set_view_absolute(&self, options: SetAbsoluteViewOptions) -> MapGrabResult<()> {
        self.mutate(MapCommand::SetViewAbsolute(options))
            .await
            .map(drop)
    }

    /// Fit the viewport to geographic bounds
    pub async fn fit_to_bounds(
        &self,
        bounds: MapBounds,
        options: FitBoundsOptions,
    ) -> MapGrabResult<()> {
        self.wait_loaded().await?;
        self.mutate(MapCommand::FitMapToBounds { bounds, options })
            .await
            .map(drop)
    }

    /// Fit the viewport to a page-space rectangle
    pub async fn fit_to_bounding_box(
        &self,
        bbox: BoundingBox,
        options: FitBoundsOptions,
    ) -> MapGrabResult<()> {
        debug!(map_id = %self.map_id, x = bbox.x, y = bbox.y, w = bbox.width, h = bbox.height, "fit to box");
        self.mutate(MapCommand::FitMapToBoundingBox { bbox, options })
            .await
            .map(drop)
    }

    /// Insert a solid background below every style layer.
    ///
    /// Only the first colour sticks until [`Self::remove_background`] is called.
    pub async fn set_background_color(&self, color: impl Into<String>) -> MapGrabResult<()> {
        self.mutate(MapCommand::SetBackgroundColor(color.into()))
            .await
            .map(drop)
    }

    /// Remove the inserted background, if any
    pub async fn remove_background(&self) -> MapGrabResult<()> {
        self.mutate(MapCommand::RemoveBackground).await.map(drop)
    }

    /// Page pixel of a geographic coordinate
    pub async fn project(&self, lng_lat: LngLat) -> MapGrabResult<ScreenPoint> {
        self.wait_stable().await?;
        self.query(MapCommand::ProjectLngLatToScreenPoint(lng_lat))
            .await
    }

    /// Geographic coordinate under a page pixel
    pub async fn unproject(&self, point: ScreenPoint) -> MapGrabResult<LngLat> {
        self.wait_stable().await?;
        self.query(MapCommand::UnprojectScreenPointToLngLat(point))
            .await
    }

    /// Show `expose`, hide per `hide`, and return what changed.
    ///
    /// Layers already in their target state are left out of the ledger.
    /// Hand the ledger to [`Self::revert_expose_layers`] to undo the change.
    pub async fn expose_layers<I, S>(
        &self,
        expose: I,
        hide: LayersToHide,
    ) -> MapGrabResult<MutationLedger>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expose: Vec<String> = expose.into_iter().map(Into::into).collect();
        self.wait_stable().await?;
        let raw = self
            .command(MapCommand::ExposeLayers { expose, hide })
            .await?;
        self.wait_stable().await?;
        let ledger: MutationLedger = serde_json::from_value(raw)?;
        debug!(map_id = %self.map_id, mutated = ledger.len(), "exposed layers");
        Ok(ledger)
    }

    /// Restore the visibility each ledger entry had before exposure
    pub async fn revert_expose_layers(&self, ledger: &MutationLedger) -> MapGrabResult<()> {
        debug!(map_id = %self.map_id, layers = ledger.len(), "reverting exposed layers");
        self.mutate(MapCommand::RevertExposeLayers(ledger.clone()))
            .await
            .map(drop)
    }

    /// Turn on the in-page inspector overlay
    pub async fn enable_inspector(&self) -> MapGrabResult<()> {
        self.wait_ready().await?;
        self.driver.set_inspector(&self.frame, true).await
    }

    /// Turn off the in-page inspector overlay
    pub async fn disable_inspector(&self) -> MapGrabResult<()> {
        self.wait_ready().await?;
        self.driver.set_inspector(&self.frame, false).await
    }

    async fn command(&self, command: MapCommand) -> MapGrabResult<serde_json::Value> {
        self.wait_ready().await?;
        self.driver
            .execute_map_command(&self.frame, &self.map_id, &command)
            .await
    }

    async fn mutate(&self, command: MapCommand) -> MapGrabResult<serde_json::Value> {
        self.wait_stable().await?;
        let out = self.command(command).await?;
        self.wait_stable().await?;
        Ok(out)
    }

    async fn query<T: DeserializeOwned>(&self, command: MapCommand) -> MapGrabResult<T> {
        let raw = self.command(command).await?;
        Ok(serde_json::from_value(raw)?)
    }
}
