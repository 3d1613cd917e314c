//! Single-slot render session pool.
//!
//! At most one headless session exists at a time. It is keyed by its
//! [`SessionConfig`]: asking for a different configuration tears the live
//! session down and launches a replacement. A session fault (the browser
//! died, navigation threw) destroys the session and empties the slot; the
//! next [`SessionPool::get_session`] call launches a fresh one.
//!
//! Callers hold the slot exclusively through a [`SessionLease`], so two
//! navigations can never interleave on the same session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::network::RequestPolicy;
use crate::{Result, SearchError};

/// Neutral page a fresh session parks on.
pub const BLANK_PAGE: &str = "about:blank";

/// Resource-loading configuration a session is launched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionConfig {
    /// Whether images are fetched.
    pub load_images: bool,
}

impl SessionConfig {
    /// Creates a configuration.
    pub fn new(load_images: bool) -> Self {
        Self { load_images }
    }

    /// Network policy matching this configuration.
    pub fn policy(&self) -> RequestPolicy {
        RequestPolicy::new(self.load_images)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { load_images: true }
    }
}

/// A live browser-automation handle.
///
/// Implementations report transport and process failures as
/// [`SearchError::RenderSession`] and exceptions thrown by evaluated code as
/// [`SearchError::ExtractionScript`].
#[async_trait]
pub trait RenderSession: Send {
    /// Navigates to `url` and waits for the load event.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Evaluates a JavaScript expression, awaiting promises, and returns its
    /// JSON value (`null` for `undefined`).
    async fn evaluate(&mut self, expression: &str) -> Result<Value>;

    /// Releases the session. Best-effort.
    async fn close(&mut self);
}

/// Launches render sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Launches a session applying `config` and its network policy.
    async fn launch(&self, config: SessionConfig) -> Result<Box<dyn RenderSession>>;
}

/// Launcher used when headless support is compiled out.
#[derive(Debug, Default)]
pub struct UnavailableLauncher;

#[async_trait]
impl SessionLauncher for UnavailableLauncher {
    async fn launch(&self, _config: SessionConfig) -> Result<Box<dyn RenderSession>> {
        Err(SearchError::RenderSession(
            "headless rendering is not available in this build".to_string(),
        ))
    }
}

struct LiveSession {
    id: u64,
    config: SessionConfig,
    session: Box<dyn RenderSession>,
}

/// Owner of the single render session.
pub struct SessionPool {
    launcher: Arc<dyn SessionLauncher>,
    slot: Mutex<Option<LiveSession>>,
    launches: AtomicU64,
}

impl SessionPool {
    /// Creates an empty pool. Nothing is launched until first use.
    pub fn new(launcher: Arc<dyn SessionLauncher>) -> Self {
        Self {
            launcher,
            slot: Mutex::new(None),
            launches: AtomicU64::new(0),
        }
    }

    /// Creates a pool whose every launch fails.
    pub fn unavailable() -> Self {
        Self::new(Arc::new(UnavailableLauncher))
    }

    /// Acquires the session for `config`, launching or replacing as needed.
    ///
    /// The returned lease holds the pool exclusively until dropped.
    pub async fn get_session(&self, config: SessionConfig) -> Result<SessionLease<'_>> {
        let mut guard = self.slot.lock().await;

        if let Some(live) = guard.as_ref() {
            if live.config == config {
                debug!("Reusing render session {}", live.id);
                return Ok(SessionLease { guard });
            }
        }

        if let Some(mut stale) = guard.take() {
            debug!(
                "Replacing render session {} (load_images {} -> {})",
                stale.id, stale.config.load_images, config.load_images
            );
            stale.session.close().await;
        }

        let id = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Launching render session {} (load_images={})",
            id, config.load_images
        );

        let mut session = self.launcher.launch(config).await?;
        if let Err(e) = session.navigate(BLANK_PAGE).await {
            warn!("Render session {} failed to park on blank page: {}", id, e);
            session.close().await;
            return Err(e);
        }

        *guard = Some(LiveSession {
            id,
            config,
            session,
        });
        Ok(SessionLease { guard })
    }

    /// Returns `true` if a session is currently live.
    pub async fn is_live(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Number of sessions launched over the pool's lifetime.
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Destroys the live session, if any. The next use relaunches.
    pub async fn reset(&self) {
        let mut guard = self.slot.lock().await;
        if let Some(mut live) = guard.take() {
            debug!("Render session {} reset", live.id);
            live.session.close().await;
        }
    }

    /// Shuts down the browser process.
    pub async fn shutdown(&self) {
        self.reset().await;
        debug!("Render session pool shut down");
    }
}

/// Exclusive access to the live session.
///
/// Session faults raised through the lease destroy the session before the
/// error is returned.
pub struct SessionLease<'a> {
    guard: MutexGuard<'a, Option<LiveSession>>,
}

impl SessionLease<'_> {
    /// Identifier of the leased session, `None` once invalidated.
    pub fn id(&self) -> Option<u64> {
        self.guard.as_ref().map(|live| live.id)
    }

    /// Configuration of the leased session, `None` once invalidated.
    pub fn config(&self) -> Option<SessionConfig> {
        self.guard.as_ref().map(|live| live.config)
    }

    /// Navigates the session to `url`.
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        let result = self.live()?.session.navigate(url).await;
        self.check(result).await
    }

    /// Evaluates a JavaScript expression in the current document.
    pub async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        let result = self.live()?.session.evaluate(expression).await;
        self.check(result).await
    }

    /// Destroys the session and empties the pool slot.
    pub async fn invalidate(&mut self) {
        if let Some(mut live) = self.guard.take() {
            warn!("Destroying render session {}", live.id);
            live.session.close().await;
        }
    }

    fn live(&mut self) -> Result<&mut LiveSession> {
        self.guard
            .as_mut()
            .ok_or_else(|| SearchError::RenderSession("session was invalidated".to_string()))
    }

    async fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if e.is_session_fault() {
                self.invalidate().await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Log {
        navigations: Vec<(u64, String)>,
        closed: Vec<u64>,
        launches: u64,
    }

    struct FakeSession {
        id: u64,
        log: Arc<StdMutex<Log>>,
    }

    #[async_trait]
    impl RenderSession for FakeSession {
        async fn navigate(&mut self, url: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .navigations
                .push((self.id, url.to_string()));
            if url.contains("crash") {
                return Err(SearchError::RenderSession("renderer crashed".into()));
            }
            Ok(())
        }

        async fn evaluate(&mut self, expression: &str) -> Result<Value> {
            if expression.contains("throw") {
                return Err(SearchError::ExtractionScript("Error: boom".into()));
            }
            Ok(Value::from(self.id))
        }

        async fn close(&mut self) {
            self.log.lock().unwrap().closed.push(self.id);
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        log: Arc<StdMutex<Log>>,
        fail: bool,
    }

    #[async_trait]
    impl SessionLauncher for FakeLauncher {
        async fn launch(&self, _config: SessionConfig) -> Result<Box<dyn RenderSession>> {
            if self.fail {
                return Err(SearchError::RenderSession("no chrome".into()));
            }
            let mut log = self.log.lock().unwrap();
            log.launches += 1;
            Ok(Box::new(FakeSession {
                id: log.launches,
                log: Arc::clone(&self.log),
            }))
        }
    }

    fn pool() -> (SessionPool, Arc<StdMutex<Log>>) {
        let launcher = FakeLauncher::default();
        let log = Arc::clone(&launcher.log);
        (SessionPool::new(Arc::new(launcher)), log)
    }

    #[test]
    fn test_session_config_default_loads_images() {
        assert!(SessionConfig::default().load_images);
        assert_eq!(SessionConfig::new(false).policy(), RequestPolicy::new(false));
    }

    #[tokio::test]
    async fn test_same_config_reuses_session() {
        let (pool, log) = pool();
        let first = pool.get_session(SessionConfig::new(true)).await.unwrap().id();
        let second = pool.get_session(SessionConfig::new(true)).await.unwrap().id();
        assert_eq!(first, second);
        assert_eq!(pool.launch_count(), 1);
        assert!(log.lock().unwrap().closed.is_empty());
    }

    #[tokio::test]
    async fn test_config_change_replaces_session() {
        let (pool, log) = pool();
        let with_images = pool.get_session(SessionConfig::new(true)).await.unwrap().id();
        let without = pool.get_session(SessionConfig::new(false)).await.unwrap();
        assert_ne!(with_images, without.id());
        assert_eq!(without.config(), Some(SessionConfig::new(false)));
        drop(without);
        assert_eq!(log.lock().unwrap().closed, vec![1]);
    }

    #[tokio::test]
    async fn test_new_session_parks_on_blank_page() {
        let (pool, log) = pool();
        drop(pool.get_session(SessionConfig::default()).await.unwrap());
        assert_eq!(
            log.lock().unwrap().navigations,
            vec![(1, BLANK_PAGE.to_string())]
        );
    }

    #[tokio::test]
    async fn test_navigation_fault_destroys_session_and_next_use_rebuilds() {
        let (pool, log) = pool();
        {
            let mut lease = pool.get_session(SessionConfig::default()).await.unwrap();
            let err = lease.navigate("https://site.example/crash").await.unwrap_err();
            assert!(err.is_session_fault());
            assert!(lease.id().is_none());
        }
        assert!(!pool.is_live().await);
        assert_eq!(log.lock().unwrap().closed, vec![1]);

        let lease = pool.get_session(SessionConfig::default()).await.unwrap();
        assert_eq!(lease.id(), Some(2));
    }

    #[tokio::test]
    async fn test_script_error_keeps_session() {
        let (pool, _log) = pool();
        let mut lease = pool.get_session(SessionConfig::default()).await.unwrap();
        let err = lease.evaluate("throw new Error('boom')").await.unwrap_err();
        assert!(matches!(err, SearchError::ExtractionScript(_)));
        assert_eq!(lease.id(), Some(1));
    }

    #[tokio::test]
    async fn test_invalidated_lease_rejects_further_use() {
        let (pool, _log) = pool();
        let mut lease = pool.get_session(SessionConfig::default()).await.unwrap();
        lease.invalidate().await;
        let err = lease.evaluate("1").await.unwrap_err();
        assert!(err.is_session_fault());
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_slot_empty() {
        let pool = SessionPool::new(Arc::new(FakeLauncher {
            fail: true,
            ..Default::default()
        }));
        assert!(pool.get_session(SessionConfig::default()).await.is_err());
        assert!(!pool.is_live().await);
    }

    #[tokio::test]
    async fn test_unavailable_pool() {
        let pool = SessionPool::unavailable();
        let err = pool.get_session(SessionConfig::default()).await.err().unwrap();
        assert!(err.is_session_fault());
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let (pool, _log) = pool();
        let held = pool.get_session(SessionConfig::default()).await.unwrap();
        let waiting = tokio::time::timeout(
            Duration::from_millis(50),
            pool.get_session(SessionConfig::default()),
        )
        .await;
        assert!(waiting.is_err(), "second caller must wait for the lease");
        drop(held);
        assert!(pool.get_session(SessionConfig::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_reset_and_shutdown() {
        let (pool, log) = pool();
        drop(pool.get_session(SessionConfig::default()).await.unwrap());
        pool.reset().await;
        assert!(!pool.is_live().await);
        pool.shutdown().await;
        pool.shutdown().await;
        assert_eq!(log.lock().unwrap().closed, vec![1]);
    }
}
