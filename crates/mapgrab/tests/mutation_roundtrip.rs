//! Layer exposure, screenshots and camera control against the in-memory driver.
//!
//! Exposure must be reversible: whatever a capture changes on the map is
//! restored afterwards, including when the capture itself fails.

use std::sync::Arc;

use mapgrab::mock::{MockMap, MockMapDriver};
use mapgrab::prelude::*;
use mapgrab::{LayerVisibility, DEFAULT_MAP_ID};

const POI: &str = "layer[id=poi]";

fn styled_map() -> MockMap {
    MockMap::new()
        .with_layer("background")
        .with_layer("roads")
        .with_layer_visibility("labels", LayerVisibility::None)
        .with_layer("poi")
}

fn page() -> (Arc<MockMapDriver>, MapGrab) {
    let driver = Arc::new(MockMapDriver::with_map(DEFAULT_MAP_ID, styled_map()));
    driver.set_response(
        POI,
        vec![FeatureMatch::new("poi", DEFAULT_MAP_ID, BoundingBox::new(10.0, 20.0, 30.0, 40.0))],
    );
    driver.set_screenshot(vec![0x89, b'P', b'N', b'G']);
    let grab = MapGrab::from_arc(driver.clone());
    (driver, grab)
}

fn visibility(driver: &MockMapDriver, layer: &str) -> Option<LayerVisibility> {
    driver.layer_visibility(DEFAULT_MAP_ID, layer)
}

fn position(history: &[String], prefix: &str) -> usize {
    history
        .iter()
        .position(|c| c.starts_with(prefix))
        .unwrap_or_else(|| panic!("{prefix} was never called"))
}

// ============================================================================
// Controller exposure
// ============================================================================

#[tokio::test]
async fn expose_then_revert_restores_every_layer() {
    let (driver, grab) = page();
    let controller = grab.default_controller();

    let ledger = controller
        .expose_layers(["poi"], LayersToHide::AllOther)
        .await
        .unwrap();

    // labels was already hidden and poi already shown
    assert_eq!(ledger.len(), 2);
    assert!(ledger.get("labels").is_none());
    assert_eq!(visibility(&driver, "roads"), Some(LayerVisibility::None));
    assert_eq!(visibility(&driver, "poi"), Some(LayerVisibility::Visible));

    controller.revert_expose_layers(&ledger).await.unwrap();

    assert_eq!(visibility(&driver, "background"), Some(LayerVisibility::Visible));
    assert_eq!(visibility(&driver, "roads"), Some(LayerVisibility::Visible));
    assert_eq!(visibility(&driver, "labels"), Some(LayerVisibility::None));
}

#[tokio::test]
async fn hiding_an_explicit_set_leaves_other_layers_alone() {
    let (driver, grab) = page();
    let controller = grab.default_controller();

    let ledger = controller
        .expose_layers(["labels"], LayersToHide::only(["roads"]))
        .await
        .unwrap();

    assert_eq!(ledger.len(), 2);
    assert_eq!(visibility(&driver, "labels"), Some(LayerVisibility::Visible));
    assert_eq!(visibility(&driver, "roads"), Some(LayerVisibility::None));
    assert_eq!(visibility(&driver, "background"), Some(LayerVisibility::Visible));
}

#[tokio::test]
async fn reverting_an_empty_ledger_changes_nothing() {
    let (driver, grab) = page();
    let controller = grab.default_controller();

    controller
        .revert_expose_layers(&MutationLedger::new())
        .await
        .unwrap();
    assert_eq!(visibility(&driver, "labels"), Some(LayerVisibility::None));
}

// ============================================================================
// Screenshots
// ============================================================================

#[tokio::test]
async fn screenshot_without_exposure_captures_root_box() {
    let (driver, grab) = page();

    let png = grab
        .locator(POI)
        .screenshot(ScreenshotOptions::new().with_padding(5.0))
        .await
        .unwrap();

    assert_eq!(png, vec![0x89, b'P', b'N', b'G']);
    assert_eq!(
        driver.captures(),
        vec![BoundingBox::from_edges(5.0, 15.0, 50.0, 70.0)]
    );
    assert!(!driver.was_called("command:mainMap:exposeLayers"));
}

#[tokio::test]
async fn screenshot_exposes_then_restores_map() {
    let (driver, grab) = page();
    let options = ScreenshotOptions::new()
        .with_expose(ExposeOptions::new().with_background_color("#ffffff"));

    grab.locator(POI).screenshot(options).await.unwrap();

    let history = driver.history();
    let expose = position(&history, "command:mainMap:exposeLayers");
    let background = position(&history, "command:mainMap:setBackgroundColor");
    let capture = position(&history, "capture_screenshot");
    let remove = position(&history, "command:mainMap:removeBackground");
    let revert = position(&history, "command:mainMap:revertExposeLayers");
    assert!(expose < background && background < capture);
    assert!(capture < remove && remove < revert);

    assert_eq!(driver.background(DEFAULT_MAP_ID), None);
    assert_eq!(visibility(&driver, "roads"), Some(LayerVisibility::Visible));
    assert_eq!(visibility(&driver, "labels"), Some(LayerVisibility::None));
}

#[tokio::test]
async fn failed_capture_still_reverts_exposure() {
    let (driver, grab) = page();
    driver.fail_screenshots(true);

    let err = grab
        .locator(POI)
        .screenshot(ScreenshotOptions::new().with_expose(ExposeOptions::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, MapGrabError::Screenshot { .. }));
    assert!(driver.was_called("command:mainMap:revertExposeLayers"));
    assert_eq!(visibility(&driver, "background"), Some(LayerVisibility::Visible));
}

#[tokio::test]
async fn failed_exposure_step_rolls_back_mutated_map() {
    let (driver, grab) = page();
    driver.fail_command("setBackgroundColor");

    let err = grab
        .locator(POI)
        .screenshot(
            ScreenshotOptions::new()
                .with_expose(ExposeOptions::new().with_background_color("#ffffff")),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, MapGrabError::Script { .. }));
    assert!(!driver.was_called("capture_screenshot"));

    let history = driver.history();
    let expose = position(&history, "command:mainMap:exposeLayers");
    let revert = position(&history, "command:mainMap:revertExposeLayers");
    assert!(expose < revert);
    assert_eq!(visibility(&driver, "background"), Some(LayerVisibility::Visible));
    assert_eq!(visibility(&driver, "roads"), Some(LayerVisibility::Visible));
    assert_eq!(visibility(&driver, "labels"), Some(LayerVisibility::None));
}

#[tokio::test]
async fn iframe_screenshot_is_clipped_in_page_space() {
    let (driver, grab) = page();
    driver.set_frame_offset("#embedded", ScreenPoint::new(100.0, 50.0));

    grab.on_iframe("#embedded")
        .locator(POI)
        .screenshot(ScreenshotOptions::new())
        .await
        .unwrap();

    assert_eq!(driver.captures(), vec![BoundingBox::new(110.0, 70.0, 30.0, 40.0)]);
}

// ============================================================================
// Camera
// ============================================================================

#[tokio::test]
async fn fit_map_targets_owning_map() {
    let (driver, grab) = page();

    grab.locator(POI)
        .fit_map(FitBoundsOptions::default().with_padding(8.0))
        .await
        .unwrap();

    let fits = driver.fits(DEFAULT_MAP_ID);
    assert_eq!(fits.len(), 1);
    assert_eq!(fits[0]["bbox"]["x"], 10.0);
    assert_eq!(fits[0]["options"]["padding"], 8.0);
    assert!(driver.was_called("command:mainMap:waitToMapStable"));
}

#[tokio::test]
async fn project_and_unproject_are_inverse() {
    let (_driver, grab) = page();
    let controller = grab.default_controller();

    let point = controller.project(LngLat::new(2.0, 1.0)).await.unwrap();
    assert_eq!(point, ScreenPoint::new(420.0, 290.0));

    let lng_lat = controller.unproject(point).await.unwrap();
    assert_eq!(lng_lat, LngLat::new(2.0, 1.0));
}

#[tokio::test]
async fn background_keeps_first_colour_until_removed() {
    let (driver, grab) = page();
    let controller = grab.default_controller();

    controller.set_background_color("#000000").await.unwrap();
    controller.set_background_color("#ff0000").await.unwrap();
    assert_eq!(driver.background(DEFAULT_MAP_ID).as_deref(), Some("#000000"));

    controller.remove_background().await.unwrap();
    assert_eq!(driver.background(DEFAULT_MAP_ID), None);
}
