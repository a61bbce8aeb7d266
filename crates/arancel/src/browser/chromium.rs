//! Chromium-backed browser sessions using chromiumoxide.

use super::{BrowserLauncher, BrowserSession, Locator};
use crate::config::BrowserOptions;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::task::JoinHandle;

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    // 1. Configured path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // 2. ARANCEL_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("ARANCEL_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. System PATH
    for name in [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches one headless Chromium process per session.
pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let chrome_path = find_chromium(self.options.executable.as_ref())
            .context("Chromium not found. Set ARANCEL_CHROMIUM_PATH or install Chrome.")?;

        // Each session gets its own profile so concurrent launches never share state.
        let profile_dir =
            std::env::temp_dir().join(format!("arancel-chromium-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&profile_dir).with_context(|| {
            format!("failed to create profile dir: {}", profile_dir.display())
        })?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&profile_dir)
            .window_size(self.options.window_width, self.options.window_height)
            .viewport(None)
            .request_timeout(self.options.request_timeout)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(launched) => launched,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&profile_dir);
                return Err(anyhow::Error::new(e).context("failed to launch Chromium"));
            }
        };

        // The handler drives the DevTools connection and must be polled for the
        // whole lifetime of the browser.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let mut session = ChromiumSession {
            browser,
            page: None,
            handler_task,
            profile_dir,
        };

        let blank = session.browser.new_page("about:blank").await;
        match blank {
            Ok(page) => {
                session.page = Some(page);
                Ok(Box::new(session))
            }
            Err(e) => {
                let _ = Box::new(session).quit().await;
                Err(anyhow::Error::new(e).context("failed to create new page"))
            }
        }
    }
}

/// A running Chromium process and its current page.
pub struct ChromiumSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
    profile_dir: PathBuf,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page> {
        self.page.as_ref().context("session has no current window")
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self
            .page()?
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }
}

// Covers sessions dropped without `quit`, e.g. on runtime shutdown. The
// browser process itself is killed by `Browser`'s own drop.
impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
        let _ = std::fs::remove_dir_all(&self.profile_dir);
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page()?
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn is_present(&self, locator: &Locator) -> Result<bool> {
        self.eval(format!("({}) !== null", locator.to_js())).await
    }

    async fn is_clickable(&self, locator: &Locator) -> Result<bool> {
        self.eval(format!(
            "(() => {{ const el = {}; \
             return !!el && el.getClientRects().length > 0 && !el.disabled; }})()",
            locator.to_js()
        ))
        .await
    }

    async fn set_value(&self, locator: &Locator, value: &str) -> Result<()> {
        let found: bool = self
            .eval(format!(
                "(() => {{ const el = {}; if (!el) return false; el.value = {}; return true; }})()",
                locator.to_js(),
                super::js_string(value)
            ))
            .await?;
        if !found {
            bail!("element {locator} not found");
        }
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let found: bool = self
            .eval(format!(
                "(() => {{ const el = {}; if (!el) return false; el.click(); return true; }})()",
                locator.to_js()
            ))
            .await?;
        if !found {
            bail!("element {locator} not found");
        }
        Ok(())
    }

    async fn text(&self, locator: &Locator) -> Result<Option<String>> {
        self.eval(format!(
            "(() => {{ const el = {}; return el ? (el.innerText ?? el.textContent) : null; }})()",
            locator.to_js()
        ))
        .await
    }

    async fn current_window(&self) -> Result<String> {
        Ok(self.page()?.target_id().inner().clone())
    }

    async fn window_handles(&self) -> Result<Vec<String>> {
        let pages = self.browser.pages().await.context("failed to list windows")?;
        Ok(pages
            .iter()
            .map(|page| page.target_id().inner().clone())
            .collect())
    }

    async fn switch_to_window(&mut self, handle: &str) -> Result<()> {
        let pages = self.browser.pages().await.context("failed to list windows")?;
        let page = pages
            .into_iter()
            .find(|page| page.target_id().inner() == handle)
            .with_context(|| format!("window {handle} not found"))?;
        let _ = page.bring_to_front().await;
        self.page = Some(page);
        Ok(())
    }

    async fn quit(mut self: Box<Self>) -> Result<()> {
        self.page = None;

        let closed = self.browser.close().await;
        if closed.is_ok() {
            let _ = self.browser.wait().await;
        } else if let Some(Err(e)) = self.browser.kill().await {
            tracing::debug!("failed to kill Chromium: {e}");
        }

        self.handler_task.abort();
        let _ = std::fs::remove_dir_all(&self.profile_dir);

        closed.context("failed to close Chromium")?;
        Ok(())
    }
}
