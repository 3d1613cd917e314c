//! Headless Chrome render sessions.
//!
//! This module is only available when the `headless` Cargo feature is enabled.
//! It launches Chrome/Chromium via the Chrome DevTools Protocol, installs the
//! session's network policy through request interception, and exposes the
//! browser as a [`RenderSession`] for the pool.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExceptionDetails};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::network::{RequestPolicy, ResourceKind, Verdict};
use crate::session::{RenderSession, SessionConfig, SessionLauncher};
use crate::{Result, SearchError};

/// Default desktop user agent. Headless Chrome otherwise advertises
/// "HeadlessChrome", which many sources block.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Launch settings for the Chrome process.
#[derive(Debug, Clone)]
pub struct BrowserLaunchConfig {
    /// Whether to run the browser in headless mode.
    pub headless: bool,
    /// Path to the Chrome/Chromium executable. If `None`, auto-detected.
    pub chrome_path: Option<PathBuf>,
    /// Proxy URL for the browser to use.
    pub proxy_url: Option<String>,
    /// User agent presented to sources.
    pub user_agent: String,
    /// Additional launch arguments for Chrome.
    pub launch_args: Vec<String>,
}

impl Default for BrowserLaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            proxy_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            launch_args: Vec::new(),
        }
    }
}

/// Launches one Chrome process per render session.
pub struct ChromiumLauncher {
    config: BrowserLaunchConfig,
}

impl ChromiumLauncher {
    /// Creates a launcher with the given configuration.
    pub fn new(config: BrowserLaunchConfig) -> Self {
        Self { config }
    }

    fn browser_config(&self, session: SessionConfig) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder().window_size(1920, 1080);

        if self.config.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        // Resolve Chrome executable: explicit path > auto-detect
        let chrome_path = match self.config.chrome_path {
            Some(ref path) => path.clone(),
            None => crate::browser_setup::detect_chrome().ok_or_else(|| {
                SearchError::RenderSession(
                    "No Chrome/Chromium installation found; set browser.chrome_path or CHROME"
                        .to_string(),
                )
            })?,
        };
        debug!("Using Chrome at: {}", chrome_path.display());
        builder = builder.chrome_executable(chrome_path);

        builder = builder
            .arg(format!("--user-agent={}", self.config.user_agent))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-default-apps")
            .arg("--disable-sync")
            .arg("--mute-audio")
            .arg("--no-first-run");

        if !session.load_images {
            builder = builder.arg("--blink-settings=imagesEnabled=false");
        }

        if let Some(ref proxy) = self.config.proxy_url {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        for arg in &self.config.launch_args {
            builder = builder.arg(arg);
        }

        builder
            .build()
            .map_err(|e| SearchError::RenderSession(format!("Failed to build browser config: {}", e)))
    }
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self::new(BrowserLaunchConfig::default())
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self, config: SessionConfig) -> Result<Box<dyn RenderSession>> {
        let browser_config = self.browser_config(config)?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SearchError::RenderSession(format!("Failed to launch browser: {}", e)))?;

        // Spawn the CDP event handler as a background task. When it exits
        // the process is gone and every later command fails.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser CDP handler error: {}", e);
                }
            }
            debug!("Browser CDP handler exited");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                let _ = browser.close().await;
                return Err(SearchError::RenderSession(format!("Failed to open tab: {}", e)));
            }
        };

        let filter_task = match install_request_filter(&page, config.policy()).await {
            Ok(task) => task,
            Err(e) => {
                handler_task.abort();
                let _ = browser.close().await;
                return Err(e);
            }
        };

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            tasks: vec![handler_task.abort_handle(), filter_task],
        }))
    }
}

/// Pauses every request and continues or fails it according to `policy`.
async fn install_request_filter(page: &Page, policy: RequestPolicy) -> Result<AbortHandle> {
    // Listen before enabling interception so no paused request is missed.
    let mut paused = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| SearchError::RenderSession(format!("Failed to listen for requests: {}", e)))?;

    let pattern = RequestPattern::builder()
        .url_pattern("*")
        .request_stage(RequestStage::Request)
        .build();
    page.execute(EnableParams::builder().patterns(vec![pattern]).build())
        .await
        .map_err(|e| {
            SearchError::RenderSession(format!("Failed to enable request interception: {}", e))
        })?;

    let page = page.clone();
    let task = tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let kind = resource_kind(&event.resource_type);
            let outcome = match policy.decide(&event.request.url, kind) {
                Verdict::Allow => page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ()),
                Verdict::Block(reason) => {
                    debug!("Blocked {:?} request to {} ({:?})", kind, event.request.url, reason);
                    page.execute(FailRequestParams::new(
                        event.request_id.clone(),
                        ErrorReason::BlockedByClient,
                    ))
                    .await
                    .map(|_| ())
                }
            };
            if let Err(e) = outcome {
                debug!("Request interception reply failed: {}", e);
            }
        }
    });

    Ok(task.abort_handle())
}

fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::WebSocket => ResourceKind::WebSocket,
        ResourceType::Manifest => ResourceKind::Manifest,
        _ => ResourceKind::Other,
    }
}

fn describe_exception(details: &ExceptionDetails) -> String {
    details
        .exception
        .as_ref()
        .and_then(|exception| exception.description.clone())
        .unwrap_or_else(|| details.text.clone())
}

/// One Chrome process with a single tab.
struct ChromiumSession {
    browser: Browser,
    page: Page,
    tasks: Vec<AbortHandle>,
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| SearchError::RenderSession(format!("Navigation to {} failed: {}", url, e)))?;
        Ok(())
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let mut params = EvaluateParams::new(expression);
        params.await_promise = Some(true);
        params.return_by_value = Some(true);

        match self.page.evaluate_expression(params).await {
            Ok(result) => Ok(result.value().cloned().unwrap_or(Value::Null)),
            Err(CdpError::JavascriptException(details)) => {
                Err(SearchError::ExtractionScript(describe_exception(&details)))
            }
            Err(e) => Err(SearchError::RenderSession(format!("Evaluation failed: {}", e))),
        }
    }

    async fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Err(e) = self.browser.close().await {
            debug!("Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser wait failed: {}", e);
        }
    }
}
