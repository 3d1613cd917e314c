//! Scrape script executor.
//!
//! Drives the shared render session through navigation, an optional
//! readiness wait, optional scroll stabilization and an optional render
//! delay, then runs an extraction function inside the document.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::session::{SessionConfig, SessionLease, SessionPool};
use crate::{Result, SearchError};

/// Interval between readiness probes for `wait_selector`.
pub const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Interval between document height samples while scrolling.
pub const SCROLL_SAMPLE_INTERVAL: Duration = Duration::from_millis(20);
/// Consecutive unchanged height samples that end scrolling.
pub const SCROLL_STABLE_SAMPLES: u32 = 5;
/// Upper bound on height samples for pages that never settle.
pub const SCROLL_MAX_SAMPLES: u32 = 500;

const SCROLL_STEP_SCRIPT: &str = "(() => { \
    const body = document.body; \
    const height = body ? body.scrollHeight : 0; \
    window.scrollTo(0, height); \
    return height; \
})()";

/// Per-call scrape options.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOptions {
    /// CSS selector to wait for before extracting. Best-effort.
    pub wait_selector: Option<String>,
    /// Budget for `wait_selector`.
    pub timeout: Duration,
    /// Arguments applied to the extraction function.
    pub args: Vec<Value>,
    /// Scroll until the document height stops changing.
    pub scroll_to_bottom: bool,
    /// Extra pause before extraction for asynchronous rendering.
    pub render_wait: Duration,
    /// Whether the session loads images.
    pub load_images: bool,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            wait_selector: None,
            timeout: Duration::from_millis(10_000),
            args: Vec::new(),
            scroll_to_bottom: false,
            render_wait: Duration::ZERO,
            load_images: true,
        }
    }
}

impl ScrapeOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for `selector` before extracting.
    pub fn with_wait_selector(mut self, selector: impl Into<String>) -> Self {
        self.wait_selector = Some(selector.into());
        self
    }

    /// Sets the selector wait budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the extraction function arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Enables scroll stabilization.
    pub fn with_scroll_to_bottom(mut self, scroll: bool) -> Self {
        self.scroll_to_bottom = scroll;
        self
    }

    /// Sets the render delay.
    pub fn with_render_wait(mut self, wait: Duration) -> Self {
        self.render_wait = wait;
        self
    }

    /// Sets whether images load.
    pub fn with_load_images(mut self, load_images: bool) -> Self {
        self.load_images = load_images;
        self
    }
}

/// Runs extraction functions against pages rendered by the shared session.
pub struct ScrapeExecutor {
    pool: Arc<SessionPool>,
    call_timeout: Option<Duration>,
}

impl ScrapeExecutor {
    /// Creates an executor over `pool`.
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self {
            pool,
            call_timeout: None,
        }
    }

    /// Bounds each whole scrape call. On expiry the session is destroyed.
    pub fn with_call_timeout(mut self, budget: Duration) -> Self {
        self.call_timeout = Some(budget);
        self
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Scrapes `url` with the JavaScript function source `extract` and
    /// deserializes its result.
    pub async fn scrape<T: DeserializeOwned>(
        &self,
        url: &str,
        extract: &str,
        options: &ScrapeOptions,
    ) -> Result<T> {
        let value = match self.call_timeout {
            Some(budget) => match timeout(budget, self.run(url, extract, options)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        "Scrape of {} exceeded {}ms, resetting render session",
                        url,
                        budget.as_millis()
                    );
                    self.pool.reset().await;
                    return Err(SearchError::RenderSession(format!(
                        "scrape of {} exceeded {}ms",
                        url,
                        budget.as_millis()
                    )));
                }
            },
            None => self.run(url, extract, options).await?,
        };

        serde_json::from_value(value).map_err(|e| {
            SearchError::Parse(format!("Unexpected extraction result from {}: {}", url, e))
        })
    }

    async fn run(&self, url: &str, extract: &str, options: &ScrapeOptions) -> Result<Value> {
        let invocation = invocation(extract, &options.args)?;
        let mut lease = self
            .pool
            .get_session(SessionConfig::new(options.load_images))
            .await?;

        debug!("Scraping {}", url);
        lease.navigate(url).await?;

        if let Some(ref selector) = options.wait_selector {
            wait_for_selector(&mut lease, selector, options.timeout).await?;
        }

        if options.scroll_to_bottom {
            let samples = scroll_to_bottom(&mut lease).await?;
            debug!("Scrolling settled after {} samples", samples);
        }

        if !options.render_wait.is_zero() {
            sleep(options.render_wait).await;
        }

        lease.evaluate(&invocation).await
    }
}

/// Expression applying the extraction function to its JSON arguments.
fn invocation(extract: &str, args: &[Value]) -> Result<String> {
    Ok(format!(
        "({}).apply(null, {})",
        extract.trim(),
        serde_json::to_string(args)?
    ))
}

/// Polls for `selector` until found or `budget` elapses. A timeout is
/// logged and swallowed; only session faults propagate.
async fn wait_for_selector(
    lease: &mut SessionLease<'_>,
    selector: &str,
    budget: Duration,
) -> Result<()> {
    let probe = format!(
        "document.querySelector({}) !== null",
        serde_json::to_string(selector)?
    );

    let poll = async {
        loop {
            match lease.evaluate(&probe).await {
                Ok(Value::Bool(true)) => return Ok(true),
                Ok(_) => {}
                Err(e) if e.is_session_fault() => return Err(e),
                Err(e) => {
                    warn!("Selector probe for '{}' failed: {}", selector, e);
                    return Ok(false);
                }
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    };

    match timeout(budget, poll).await {
        Ok(Ok(true)) => debug!("Selector '{}' ready", selector),
        Ok(Ok(false)) => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            let soft = SearchError::ExtractionTimeout {
                selector: selector.to_string(),
                timeout_ms: budget.as_millis() as u64,
            };
            warn!("{}, proceeding anyway", soft);
        }
    }
    Ok(())
}

/// Scrolls to the bottom until the height is unchanged for
/// [`SCROLL_STABLE_SAMPLES`] consecutive samples. Returns samples taken.
async fn scroll_to_bottom(lease: &mut SessionLease<'_>) -> Result<u32> {
    let mut last_height = None;
    let mut stable = 0;

    for sample in 1..=SCROLL_MAX_SAMPLES {
        let value = lease.evaluate(SCROLL_STEP_SCRIPT).await?;
        let height = value
            .as_u64()
            .or_else(|| value.as_f64().map(|h| h as u64))
            .unwrap_or(0);

        if last_height == Some(height) {
            stable += 1;
            if stable >= SCROLL_STABLE_SAMPLES {
                return Ok(sample);
            }
        } else {
            stable = 0;
            last_height = Some(height);
        }
        sleep(SCROLL_SAMPLE_INTERVAL).await;
    }

    warn!(
        "Document height never settled after {} samples",
        SCROLL_MAX_SAMPLES
    );
    Ok(SCROLL_MAX_SAMPLES)
}
