//! Retrying assertions on map locators (Playwright's `expect()` for maps).
//!
//! ```ignore
//! expect_map(grab.locator("layer[id=poi]")).to_be_visible_on_map().await?;
//! ```

use tokio::time::Instant;
use tracing::debug;

use crate::locator::MapLocator;
use crate::result::{MapGrabError, MapGrabResult};
use crate::wait::WaitOptions;

/// Assertion builder for a [`MapLocator`]
#[derive(Debug, Clone)]
pub struct MapExpect {
    locator: MapLocator,
    options: WaitOptions,
}

impl MapExpect {
    /// Create a new expectation with default wait options
    #[must_use]
    pub fn new(locator: MapLocator) -> Self {
        Self {
            locator,
            options: WaitOptions::default(),
        }
    }

    /// Override the timeout and polling cadence
    #[must_use]
    pub const fn with_options(mut self, options: WaitOptions) -> Self {
        self.options = options;
        self
    }

    /// Pass once the locator matches at least one visible feature
    pub async fn to_be_visible_on_map(&self) -> MapGrabResult<()> {
        self.poll(|count| count > 0, "to be visible on map").await
    }

    /// Pass once the locator matches no visible feature
    pub async fn to_be_hidden_on_map(&self) -> MapGrabResult<()> {
        self.poll(|count| count == 0, "to be hidden on map").await
    }

    /// Pass once the locator matches exactly `expected` visible features
    pub async fn to_have_count_on_map(&self, expected: usize) -> MapGrabResult<()> {
        self.poll(
            |count| count == expected,
            &format!("to have count {expected} on map"),
        )
        .await
    }

    /// Pass once the number of visible matches differs from `unexpected`
    pub async fn not_to_have_count_on_map(&self, unexpected: usize) -> MapGrabResult<()> {
        self.poll(
            |count| count != unexpected,
            &format!("not to have count {unexpected} on map"),
        )
        .await
    }

    async fn poll(&self, pass: impl Fn(usize) -> bool, expectation: &str) -> MapGrabResult<()> {
        let deadline = Instant::now() + self.options.timeout();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let count = self.locator.count_now().await?;
            if pass(count) {
                debug!(locator = %self.locator, attempts, "assertion passed: {expectation}");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MapGrabError::AssertionFailed {
                    message: format!(
                        "expected {} {expectation}, found {count} match(es) after {}ms",
                        self.locator, self.options.timeout_ms
                    ),
                });
            }
            tokio::time::sleep(self.options.poll_interval()).await;
        }
    }
}

/// Create an expectation for a map locator
#[must_use]
pub fn expect_map(locator: MapLocator) -> MapExpect {
    MapExpect::new(locator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::DEFAULT_MAP_ID;
    use crate::geometry::BoundingBox;
    use crate::mock::{MockMap, MockMapDriver};
    use crate::model::FeatureMatch;
    use std::sync::Arc;

    const SEL: &str = "layer[id=poi]";

    fn poi(visible: bool) -> FeatureMatch {
        FeatureMatch::new("poi", DEFAULT_MAP_ID, BoundingBox::new(0.0, 0.0, 4.0, 4.0))
            .with_visible(visible)
    }

    fn setup() -> (Arc<MockMapDriver>, MapLocator) {
        let driver = Arc::new(MockMapDriver::with_map(DEFAULT_MAP_ID, MockMap::new()));
        let locator = MapLocator::new(driver.clone(), SEL);
        (driver, locator)
    }

    mod visible_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_passes_once_feature_appears() {
            let (driver, locator) = setup();
            driver.push_response(SEL, vec![]);
            driver.push_response(SEL, vec![]);
            driver.push_response(SEL, vec![poi(true)]);

            expect_map(locator).to_be_visible_on_map().await.unwrap();
            assert_eq!(driver.call_count("query:"), 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_fails_after_timeout() {
            let (driver, locator) = setup();
            driver.set_response(SEL, vec![poi(false)]);

            let err = expect_map(locator)
                .with_options(WaitOptions::new().with_timeout(900).with_poll_interval(300))
                .to_be_visible_on_map()
                .await
                .unwrap_err();
            match err {
                MapGrabError::AssertionFailed { message } => {
                    assert!(message.contains("locator('layer[id=poi]')"));
                    assert!(message.contains("to be visible on map"));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(driver.call_count("query:"), 4);
        }
    }

    mod count_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_passes_once_count_matches() {
            let (driver, locator) = setup();
            driver.push_response(SEL, vec![poi(true)]);
            driver.push_response(SEL, vec![poi(true), poi(false), poi(true)]);

            expect_map(locator).to_have_count_on_map(2).await.unwrap();
            assert_eq!(driver.call_count("query:"), 2);
        }

        #[tokio::test(start_paused = true)]
        async fn test_failure_reports_expected_and_received() {
            let (driver, locator) = setup();
            driver.set_response(SEL, vec![poi(true)]);

            let err = expect_map(locator)
                .with_options(WaitOptions::new().with_timeout(600).with_poll_interval(300))
                .to_have_count_on_map(3)
                .await
                .unwrap_err();
            match err {
                MapGrabError::AssertionFailed { message } => {
                    assert!(message.contains("to have count 3 on map"));
                    assert!(message.contains("found 1 match(es)"));
                }
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(driver.call_count("query:"), 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_negated_count_waits_for_change() {
            let (driver, locator) = setup();
            driver.push_response(SEL, vec![poi(true)]);
            driver.push_response(SEL, vec![poi(true)]);
            driver.push_response(SEL, vec![poi(true), poi(true)]);

            expect_map(locator).not_to_have_count_on_map(1).await.unwrap();
            assert_eq!(driver.call_count("query:"), 3);
        }

        #[tokio::test(start_paused = true)]
        async fn test_negated_count_fails_when_count_never_changes() {
            let (_driver, locator) = setup();
            let err = expect_map(locator)
                .with_options(WaitOptions::new().with_timeout(300).with_poll_interval(300))
                .not_to_have_count_on_map(0)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("not to have count 0 on map"));
        }
    }

    mod hidden_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_passes_immediately_when_nothing_matches() {
            let (driver, locator) = setup();
            expect_map(locator).to_be_hidden_on_map().await.unwrap();
            assert_eq!(driver.call_count("query:"), 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_passes_once_feature_is_hidden() {
            let (driver, locator) = setup();
            driver.push_response(SEL, vec![poi(true)]);
            driver.push_response(SEL, vec![poi(false)]);
            expect_map(locator).to_be_hidden_on_map().await.unwrap();
        }
    }
}
