use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::automation::locator::{ElementHandle, Locator};

/// Capability interface over one isolated browser session.
///
/// A session belongs to exactly one task for its whole lifetime and is closed
/// on every exit path.
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait for the page to load, bounded by `timeout`.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError>;

    /// Look once for a visible element matching `locator`.
    async fn find_visible(&mut self, locator: &Locator) -> Result<Option<ElementHandle>, SessionError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError>;

    /// Replace the element's value with `value`.
    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), SessionError>;

    /// Set the files of a file input.
    async fn attach_file(&mut self, element: &ElementHandle, path: &Path) -> Result<(), SessionError>;

    /// Full-page PNG capture.
    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError>;

    /// Current document HTML.
    async fn content(&mut self) -> Result<String, SessionError>;

    /// Release the session. Must be safe to call more than once.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens fresh sessions; one per task execution.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SessionError>;
}

/// Owns a session for the duration of one task.
///
/// `close` releases it explicitly; if the guard is dropped while the session
/// is still open (the execution unwound), the close is scheduled on the
/// runtime instead.
pub struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn session(&mut self) -> Option<&mut (dyn BrowserSession + 'static)> {
        self.session.as_deref_mut()
    }

    pub async fn close(mut self) -> Result<(), SessionError> {
        match self.session.take() {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            tracing::warn!("Browser session dropped while open, scheduling close");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        tracing::warn!(error = %e, "Deferred browser session close failed");
                    }
                });
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("navigation to {url} timed out after {}s", timeout.as_secs())]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("browser unavailable: {0}")]
    Launch(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("stale element handle: {0}")]
    StaleHandle(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSession {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserSession for CountingSession {
        async fn goto(&mut self, _url: &str, _timeout: Duration) -> Result<(), SessionError> {
            Ok(())
        }
        async fn find_visible(&mut self, _locator: &Locator) -> Result<Option<ElementHandle>, SessionError> {
            Ok(None)
        }
        async fn click(&mut self, _element: &ElementHandle) -> Result<(), SessionError> {
            Ok(())
        }
        async fn fill(&mut self, _element: &ElementHandle, _value: &str) -> Result<(), SessionError> {
            Ok(())
        }
        async fn attach_file(&mut self, _element: &ElementHandle, _path: &Path) -> Result<(), SessionError> {
            Ok(())
        }
        async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
            Ok(Vec::new())
        }
        async fn content(&mut self) -> Result<String, SessionError> {
            Ok(String::new())
        }
        async fn close(&mut self) -> Result<(), SessionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_explicit_close_runs_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let guard = SessionGuard::new(Box::new(CountingSession { closes: closes.clone() }));
        guard.close().await.unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_schedules_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let _guard = SessionGuard::new(Box::new(CountingSession { closes: closes.clone() }));
        }
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_navigation_timeout_message() {
        let err = SessionError::NavigationTimeout {
            url: "https://unreachable.invalid".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "navigation to https://unreachable.invalid timed out after 30s"
        );
    }
}
