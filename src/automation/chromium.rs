use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::automation::locator::{ElementHandle, Locator};
use crate::automation::session::{BrowserSession, SessionError, SessionFactory};

/// Attribute used to tag the element a lookup resolved, so later actions can
/// address it with a plain CSS selector.
const HANDLE_ATTR: &str = "data-autoapply-handle";

/// Navigation counts as settled once no new resource finished loading for
/// this long.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

/// Completed resource count, or -1 while the document is still loading.
const NETWORK_SAMPLE: &str = "(() => document.readyState === 'complete' \
    ? performance.getEntriesByType('resource').length : -1)()";

/// A shared handle that is replaced once its connection has died.
struct Relaunching<T> {
    current: Mutex<Option<Live<T>>>,
}

struct Live<T> {
    value: Arc<T>,
    alive: Arc<AtomicBool>,
}

impl<T> Relaunching<T> {
    fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    /// Return the cached value while its `alive` flag holds, otherwise
    /// launch a new one.
    async fn get_or_launch<F, Fut>(&self, launch: F) -> Result<Arc<T>, SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Arc<AtomicBool>), SessionError>>,
    {
        let mut current = self.current.lock().await;
        if let Some(live) = current.as_ref() {
            if live.alive.load(Ordering::SeqCst) {
                return Ok(Arc::clone(&live.value));
            }
            tracing::warn!("Browser connection lost, relaunching");
        }

        let (value, alive) = launch().await?;
        let value = Arc::new(value);
        *current = Some(Live {
            value: Arc::clone(&value),
            alive,
        });
        Ok(value)
    }

    /// Forget `stale` if it is still the cached value.
    async fn invalidate(&self, stale: &Arc<T>) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|live| Arc::ptr_eq(&live.value, stale)) {
            *current = None;
        }
    }
}

/// Launches (or connects to) one Chromium process per worker and hands out an
/// isolated browser context per session. A browser whose connection drops is
/// relaunched on the next open.
pub struct ChromiumLauncher {
    remote_url: Option<String>,
    executable: Option<PathBuf>,
    browser: Relaunching<Browser>,
}

impl ChromiumLauncher {
    pub fn new(remote_url: Option<String>, executable: Option<PathBuf>) -> Self {
        Self {
            remote_url,
            executable,
            browser: Relaunching::new(),
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, SessionError> {
        self.browser.get_or_launch(|| self.launch()).await
    }

    async fn launch(&self) -> Result<(Browser, Arc<AtomicBool>), SessionError> {
        let (browser, mut handler) = if let Some(url) = &self.remote_url {
            tracing::info!(url = %url, "Connecting to remote Chromium");
            Browser::connect(url.as_str())
                .await
                .map_err(|e| SessionError::Launch(e.to_string()))?
        } else {
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .request_timeout(Duration::from_secs(30))
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage");
            if let Some(path) = &self.executable {
                builder = builder.chrome_executable(path);
            }
            let config = builder.build().map_err(SessionError::Launch)?;
            tracing::info!("Launching headless Chromium");
            Browser::launch(config)
                .await
                .map_err(|e| SessionError::Launch(e.to_string()))?
        };

        let alive = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&alive);
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Chromium handler error");
                    break;
                }
            }
            flag.store(false, Ordering::SeqCst);
            tracing::warn!("Chromium connection closed");
        });

        Ok((browser, alive))
    }

    async fn create_context(&self) -> Result<(Arc<Browser>, BrowserContextId), SessionError> {
        let browser = self.browser().await?;
        match browser.execute(CreateBrowserContextParams::default()).await {
            Ok(created) => Ok((browser, created.result.browser_context_id)),
            Err(e) => {
                // Usually a dead connection; make the next open relaunch.
                self.browser.invalidate(&browser).await;
                Err(protocol(e))
            }
        }
    }
}

#[async_trait]
impl SessionFactory for ChromiumLauncher {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, SessionError> {
        let (browser, context_id) = match self.create_context().await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(error = %e, "Browser context creation failed, retrying with a fresh browser");
                self.create_context().await?
            }
        };

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(SessionError::Protocol)?;

        let page = match browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                if let Err(dispose) = browser
                    .execute(DisposeBrowserContextParams::new(context_id))
                    .await
                {
                    tracing::warn!(error = %dispose, "Failed to dispose browser context");
                }
                return Err(protocol(e));
            }
        };

        metrics::gauge!("browser_sessions_open").increment(1.0);

        Ok(Box::new(ChromiumSession {
            browser,
            page: Some(page),
            context_id: Some(context_id),
            next_handle: AtomicU64::new(0),
        }))
    }
}

/// Resolve once `sample` reports a loaded document whose value stays the
/// same across [`NETWORK_QUIET`].
async fn wait_until_quiet<F, Fut>(mut sample: F) -> Result<(), SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<i64, SessionError>>,
{
    let mut last = sample().await?;
    loop {
        tokio::time::sleep(NETWORK_QUIET).await;
        let now = sample().await?;
        if now >= 0 && now == last {
            return Ok(());
        }
        last = now;
    }
}

/// One page inside its own browser context.
pub struct ChromiumSession {
    browser: Arc<Browser>,
    page: Option<Page>,
    context_id: Option<BrowserContextId>,
    next_handle: AtomicU64,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, SessionError> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::Protocol("session already closed".to_string()))
    }

    fn selector(element: &ElementHandle) -> String {
        format!("[{HANDLE_ATTR}=\"{}\"]", element.id())
    }
}

fn protocol(e: impl std::fmt::Display) -> SessionError {
    SessionError::Protocol(e.to_string())
}

/// Script that finds the first visible element matching a locator and tags it.
fn locate_script(locator: &Locator, mark: &str) -> String {
    let (selector, text) = match locator {
        Locator::Css(selector) => (*selector, None),
        Locator::Text { tag, text } => (*tag, Some(*text)),
    };
    // JSON string literals are valid JavaScript string literals.
    let selector = serde_json::Value::from(selector).to_string();
    let text = text.map_or("null".to_string(), |t| serde_json::Value::from(t).to_string());
    let mark = serde_json::Value::from(mark).to_string();

    format!(
        r#"(() => {{
    const text = {text};
    const visible = (el) => {{
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        return rect.width > 0 && rect.height > 0
            && style.visibility !== 'hidden' && style.display !== 'none';
    }};
    const found = Array.from(document.querySelectorAll({selector}))
        .filter((el) => text === null || (el.innerText || el.textContent || '').includes(text))
        .find(visible);
    if (!found) return false;
    found.setAttribute('{HANDLE_ATTR}', {mark});
    return true;
}})()"#
    )
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError> {
        let page = self.page()?;
        let navigate = async {
            page.goto(url).await.map_err(|e| SessionError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            wait_until_quiet(|| async move {
                page.evaluate(NETWORK_SAMPLE)
                    .await
                    .map_err(protocol)?
                    .into_value::<i64>()
                    .map_err(protocol)
            })
            .await
        };
        match tokio::time::timeout(timeout, navigate).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }

    async fn find_visible(&mut self, locator: &Locator) -> Result<Option<ElementHandle>, SessionError> {
        let mark = format!("h{}", self.next_handle.fetch_add(1, Ordering::Relaxed));
        let found: bool = self
            .page()?
            .evaluate(locate_script(locator, &mark))
            .await
            .map_err(protocol)?
            .into_value()
            .map_err(protocol)?;

        Ok(found.then(|| ElementHandle::new(mark)))
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        self.page()?
            .find_element(Self::selector(element))
            .await
            .map_err(|e| SessionError::StaleHandle(e.to_string()))?
            .click()
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn fill(&mut self, element: &ElementHandle, value: &str) -> Result<(), SessionError> {
        let selector = Self::selector(element);
        let page = self.page()?;
        let field = page
            .find_element(selector.as_str())
            .await
            .map_err(|e| SessionError::StaleHandle(e.to_string()))?;

        let clear = format!(
            "(() => {{ const el = document.querySelector({}); if (el) {{ el.focus(); el.value = ''; }} }})()",
            serde_json::Value::from(selector).to_string()
        );
        page.evaluate(clear).await.map_err(protocol)?;
        field.type_str(value).await.map_err(protocol)?;
        Ok(())
    }

    async fn attach_file(&mut self, element: &ElementHandle, path: &Path) -> Result<(), SessionError> {
        let page = self.page()?;
        let input = page
            .find_element(Self::selector(element))
            .await
            .map_err(|e| SessionError::StaleHandle(e.to_string()))?;

        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string_lossy().into_owned()])
            .backend_node_id(input.backend_node_id)
            .build()
            .map_err(SessionError::Protocol)?;
        page.execute(params).await.map_err(protocol)?;
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        self.page()?.screenshot(params).await.map_err(protocol)
    }

    async fn content(&mut self) -> Result<String, SessionError> {
        self.page()?.content().await.map_err(protocol)
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let page_closed = match self.page.take() {
            Some(page) => page.close().await.map_err(protocol),
            None => Ok(()),
        };

        if let Some(context_id) = self.context_id.take() {
            metrics::gauge!("browser_sessions_open").decrement(1.0);
            self.browser
                .execute(DisposeBrowserContextParams::new(context_id))
                .await
                .map_err(protocol)?;
        }

        page_closed
    }
}
