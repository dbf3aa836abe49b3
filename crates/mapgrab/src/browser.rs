//! Real browser control over the Chrome `DevTools` Protocol.
//!
//! [`BrowserConfig`] is always available. With the `browser` feature,
//! [`MapBrowser`] launches Chromium through chromiumoxide and hands out
//! [`ChromiumDriver`]s, one per page, implementing [`crate::MapDriver`].

/// Environment variable naming the Chromium executable
pub const CHROMIUM_PATH_ENV: &str = "CHROMIUM_PATH";

/// Browser configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to the Chromium executable (auto-detected when `None`)
    pub chromium_path: Option<String>,
    /// Enable the Chromium sandbox
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Defaults, with `chromium_path` taken from `CHROMIUM_PATH` when set
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(CHROMIUM_PATH_ENV) {
            Ok(path) if !path.is_empty() => config.with_chromium_path(path),
            _ => config,
        }
    }

    /// Set viewport size
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set the Chromium executable
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable the sandbox (needed in most containers)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

#[cfg(feature = "browser")]
#[allow(clippy::significant_drop_tightening, clippy::missing_errors_doc)]
mod cdp {
    use super::BrowserConfig;
    use crate::driver::{Gesture, MapCommand, MapDriver, INTERFACE_INIT_EVENT, MAP_INTERFACE_INIT_EVENT};
    use crate::frame::FrameContext;
    use crate::geometry::{BoundingBox, ScreenPoint};
    use crate::model::FeatureMatch;
    use crate::result::{MapGrabError, MapGrabResult};
    use async_trait::async_trait;
    use base64::Engine;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::input::{
        DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
    };
    use chromiumoxide::cdp::browser_protocol::page::{
        CaptureScreenshotFormat, CaptureScreenshotParams, Viewport,
    };
    use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;
    use serde::de::DeserializeOwned;
    use serde_json::Value;
    use std::sync::{Arc, Mutex as StdMutex, PoisonError};
    use tokio::sync::Mutex;
    use tracing::{debug, trace};

    /// A running Chromium instance
    #[derive(Debug)]
    pub struct MapBrowser {
        config: BrowserConfig,
        inner: Arc<Mutex<CdpBrowser>>,
        handle: tokio::task::JoinHandle<()>,
    }

    impl MapBrowser {
        /// Launch Chromium
        pub async fn launch(config: BrowserConfig) -> MapGrabResult<Self> {
            let mut builder = CdpConfig::builder()
                .window_size(config.viewport_width, config.viewport_height);

            if !config.headless {
                builder = builder.with_head();
            }

            if !config.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = config.chromium_path {
                builder = builder.chrome_executable(path);
            }

            let cdp_config = builder
                .build()
                .map_err(|message| MapGrabError::BrowserLaunch { message })?;

            let (browser, mut handler) =
                CdpBrowser::launch(cdp_config)
                    .await
                    .map_err(|e| MapGrabError::BrowserLaunch {
                        message: e.to_string(),
                    })?;

            let handle = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            debug!(headless = config.headless, "browser launched");
            Ok(Self {
                config,
                inner: Arc::new(Mutex::new(browser)),
                handle,
            })
        }

        /// Open `url` in a new page and return a driver bound to it
        pub async fn new_page(&self, url: &str) -> MapGrabResult<ChromiumDriver> {
            let browser = self.inner.lock().await;
            let page = browser
                .new_page(url)
                .await
                .map_err(|e| MapGrabError::Page {
                    message: e.to_string(),
                })?;
            debug!(url, "page opened");
            Ok(ChromiumDriver::new(page))
        }

        /// Get the launch configuration
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            &self.config
        }

        /// Close the browser
        pub async fn close(self) -> MapGrabResult<()> {
            {
                let mut browser = self.inner.lock().await;
                browser.close().await.map_err(|e| MapGrabError::BrowserLaunch {
                    message: e.to_string(),
                })?;
            }
            self.handle.abort();
            Ok(())
        }
    }

    /// [`MapDriver`] over one Chromium page
    #[derive(Debug)]
    pub struct ChromiumDriver {
        page: CdpPage,
        pointer: StdMutex<ScreenPoint>,
    }

    impl ChromiumDriver {
        /// Wrap an existing chromiumoxide page
        #[must_use]
        pub fn new(page: CdpPage) -> Self {
            Self {
                page,
                pointer: StdMutex::new(ScreenPoint::default()),
            }
        }

        /// The underlying page
        #[must_use]
        pub const fn page(&self) -> &CdpPage {
            &self.page
        }

        async fn eval_value(&self, expression: String) -> MapGrabResult<Value> {
            trace!(%expression, "evaluate");
            let params = EvaluateParams::builder()
                .expression(expression)
                .await_promise(true)
                .return_by_value(true)
                .build()
                .map_err(|message| MapGrabError::Script { message })?;
            let result = self
                .page
                .evaluate_expression(params)
                .await
                .map_err(|e| MapGrabError::Script {
                    message: e.to_string(),
                })?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        }

        async fn eval<T: DeserializeOwned>(&self, expression: String) -> MapGrabResult<T> {
            let value = self.eval_value(expression).await?;
            Ok(serde_json::from_value(value)?)
        }

        fn pointer(&self) -> ScreenPoint {
            *self.pointer.lock().unwrap_or_else(PoisonError::into_inner)
        }

        async fn move_pointer(&self, to: ScreenPoint) -> MapGrabResult<()> {
            self.dispatch_mouse(DispatchMouseEventType::MouseMoved, to, None, 0)
                .await?;
            *self.pointer.lock().unwrap_or_else(PoisonError::into_inner) = to;
            Ok(())
        }

        async fn dispatch_mouse(
            &self,
            kind: DispatchMouseEventType,
            at: ScreenPoint,
            button: Option<MouseButton>,
            click_count: i64,
        ) -> MapGrabResult<()> {
            let mut builder = DispatchMouseEventParams::builder()
                .r#type(kind)
                .x(at.x)
                .y(at.y);
            if let Some(button) = button {
                builder = builder.button(button).click_count(click_count);
            }
            let params = builder
                .build()
                .map_err(|message| MapGrabError::Input { message })?;
            self.page
                .execute(params)
                .await
                .map_err(|e| MapGrabError::Input {
                    message: e.to_string(),
                })?;
            Ok(())
        }

        async fn press(&self, button: MouseButton, click_count: i64) -> MapGrabResult<()> {
            let at = self.pointer();
            self.dispatch_mouse(
                DispatchMouseEventType::MousePressed,
                at,
                Some(button.clone()),
                click_count,
            )
            .await?;
            self.dispatch_mouse(
                DispatchMouseEventType::MouseReleased,
                at,
                Some(button),
                click_count,
            )
            .await
        }
    }

    /// JSON-quote a string for embedding in a script
    fn js(value: &str) -> String {
        Value::String(value.to_string()).to_string()
    }

    fn wait_for_event(window: &str, event: &str, ready: &str) -> String {
        format!(
            "(() => {{ const w = {window}; return new Promise((resolve) => {{ \
             const ready = () => {ready}; \
             if (ready()) {{ resolve(true); return; }} \
             const handler = () => {{ if (ready()) {{ w.removeEventListener({event}, handler); resolve(true); }} }}; \
             w.addEventListener({event}, handler); }}); }})()",
            event = js(event),
        )
    }

    #[async_trait]
    impl MapDriver for ChromiumDriver {
        async fn interface_present(&self, frame: &FrameContext) -> MapGrabResult<bool> {
            self.eval(format!("!!({}).__MAPGRAB__", frame.window_expr()))
                .await
        }

        async fn wait_interface_init(&self, frame: &FrameContext) -> MapGrabResult<()> {
            self.eval_value(wait_for_event(
                &frame.window_expr(),
                INTERFACE_INIT_EVENT,
                "!!w.__MAPGRAB__",
            ))
            .await
            .map(drop)
        }

        async fn map_registered(&self, frame: &FrameContext, map_id: &str) -> MapGrabResult<bool> {
            self.eval(format!(
                "(() => {{ const w = {}; return !!(w.__MAPGRAB__ && w.__MAPGRAB__.getMapInterface({})); }})()",
                frame.window_expr(),
                js(map_id)
            ))
            .await
        }

        async fn wait_map_registered(&self, frame: &FrameContext, map_id: &str) -> MapGrabResult<()> {
            let ready = format!(
                "!!(w.__MAPGRAB__ && w.__MAPGRAB__.getMapInterface({}))",
                js(map_id)
            );
            self.eval_value(wait_for_event(
                &frame.window_expr(),
                MAP_INTERFACE_INIT_EVENT,
                &ready,
            ))
            .await
            .map(drop)
        }

        async fn query_features(
            &self,
            frame: &FrameContext,
            selector: &str,
        ) -> MapGrabResult<Vec<FeatureMatch>> {
            self.eval(format!(
                "({}).__MAPGRAB__.query({})",
                frame.window_expr(),
                js(selector)
            ))
            .await
        }

        async fn wait_stable_for_selector(
            &self,
            frame: &FrameContext,
            selector: &str,
        ) -> MapGrabResult<()> {
            self.eval_value(format!(
                "({}).__MAPGRAB__.waitMapStableForLocator({})",
                frame.window_expr(),
                js(selector)
            ))
            .await
            .map(drop)
        }

        async fn frame_absolute_position(&self, frame: &FrameContext) -> MapGrabResult<ScreenPoint> {
            if !frame.is_nested() {
                return Ok(ScreenPoint::default());
            }
            self.eval(format!(
                "(() => {{ const w = {}; return w.__MAPGRAB__.utils.frameAbsolutePosition(w); }})()",
                frame.window_expr()
            ))
            .await
        }

        async fn execute_map_command(
            &self,
            frame: &FrameContext,
            map_id: &str,
            command: &MapCommand,
        ) -> MapGrabResult<Value> {
            let args = Value::Array(command.args()?);
            debug!(map_id, method = command.method_name(), "map command");
            self.eval_value(format!(
                "(async () => {{ const c = ({}).__MAPGRAB__.getMapInterface({}).controller; \
                 return await c.{}(...{}); }})()",
                frame.window_expr(),
                js(map_id),
                command.method_name(),
                args
            ))
            .await
        }

        async fn set_inspector(&self, frame: &FrameContext, enabled: bool) -> MapGrabResult<()> {
            let method = if enabled {
                "enableInspector"
            } else {
                "disableInspector"
            };
            self.eval_value(format!(
                "({}).__MAPGRAB__.{method}()",
                frame.window_expr()
            ))
            .await
            .map(drop)
        }

        async fn element_rect(&self, css: &str) -> MapGrabResult<BoundingBox> {
            self.eval(format!(
                "(() => {{ const r = document.querySelector({}).getBoundingClientRect(); \
                 return {{ x: r.x, y: r.y, width: r.width, height: r.height }}; }})()",
                js(css)
            ))
            .await
        }

        async fn pointer_move_to_element(&self, css: &str, dx: f64, dy: f64) -> MapGrabResult<()> {
            let rect = self.element_rect(css).await?;
            self.move_pointer(rect.center().offset(dx, dy)).await
        }

        async fn pointer_move_by(&self, dx: f64, dy: f64) -> MapGrabResult<()> {
            let to = self.pointer().offset(dx, dy);
            self.move_pointer(to).await
        }

        async fn pointer_gesture(&self, gesture: Gesture) -> MapGrabResult<()> {
            match gesture {
                Gesture::Hover => Ok(()),
                Gesture::Click => self.press(MouseButton::Left, 1).await,
                Gesture::ContextClick => self.press(MouseButton::Right, 1).await,
                Gesture::DoubleClick => {
                    self.press(MouseButton::Left, 1).await?;
                    self.press(MouseButton::Left, 2).await
                }
            }
        }

        async fn capture_screenshot(&self, clip: &BoundingBox) -> MapGrabResult<Vec<u8>> {
            let viewport = Viewport::builder()
                .x(clip.x)
                .y(clip.y)
                .width(clip.width)
                .height(clip.height)
                .scale(1.0)
                .build()
                .map_err(|message| MapGrabError::Screenshot { message })?;
            let params = CaptureScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .clip(viewport)
                .capture_beyond_viewport(true)
                .build();

            let screenshot =
                self.page
                    .execute(params)
                    .await
                    .map_err(|e| MapGrabError::Screenshot {
                        message: e.to_string(),
                    })?;

            base64::engine::general_purpose::STANDARD
                .decode(&screenshot.data)
                .map_err(|e| MapGrabError::Screenshot {
                    message: e.to_string(),
                })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_js_quoting() {
            assert_eq!(js("a\"b"), r#""a\"b""#);
        }

        #[test]
        fn test_wait_script_mentions_event() {
            let script = wait_for_event("window", INTERFACE_INIT_EVENT, "!!w.__MAPGRAB__");
            assert!(script.contains("\"__MAPGRAB__::INTERFACE_INIT\""));
            assert!(script.contains("const w = window;"));
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::{ChromiumDriver, MapBrowser};

#[cfg(test)]
mod tests {
    use super::*;

    mod browser_config_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let config = BrowserConfig::default();
            assert!(config.headless);
            assert!(config.sandbox);
            assert_eq!(config.viewport_width, 1280);
            assert!(config.chromium_path.is_none());
        }

        #[test]
        fn test_builder() {
            let config = BrowserConfig::default()
                .with_viewport(800, 600)
                .with_headless(false)
                .with_no_sandbox()
                .with_chromium_path("/usr/bin/chromium");
            assert_eq!(config.viewport_height, 600);
            assert!(!config.headless);
            assert!(!config.sandbox);
            assert_eq!(config.chromium_path.as_deref(), Some("/usr/bin/chromium"));
        }
    }
}
