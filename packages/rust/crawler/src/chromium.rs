//! Chrome-backed [`PageAutomation`] over the DevTools protocol.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use mfdocs_shared::{BrowserConfig, MfDocsError, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::page::{ElementHandle, PageAutomation};

/// How long `go_back` waits for the URL to change.
const BACK_POLLS: usize = 50;
const BACK_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn cdp(e: CdpError) -> MfDocsError {
    MfDocsError::browser(e.to_string())
}

/// A launched Chrome instance with its tabs.
///
/// Tabs are kept in the order they were first seen; tabs opened by page
/// scripts are picked up whenever the tab count is queried.
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    tabs: Vec<Page>,
    active: usize,
    elements: HashMap<u64, (TargetId, Element)>,
    next_handle: u64,
}

impl ChromiumSession {
    /// Launch Chrome and route its downloads into `download_dir`.
    pub async fn launch(config: &BrowserConfig, download_dir: &Path) -> Result<Self> {
        let mut builder =
            CdpBrowserConfig::builder().window_size(config.window_width, config.window_height);
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &config.executable {
            builder = builder.chrome_executable(executable);
        }
        let cdp_config = builder
            .build()
            .map_err(|e| MfDocsError::browser(format!("invalid browser configuration: {e}")))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| MfDocsError::browser(format!("failed to launch Chrome: {e}")))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        let mut session = Self {
            browser,
            handler,
            tabs: Vec::new(),
            active: 0,
            elements: HashMap::new(),
            next_handle: 1,
        };

        if let Err(e) = session.prepare(download_dir).await {
            if let Err(close_err) = session.release().await {
                warn!(error = %close_err, "failed to close browser after setup error");
            }
            return Err(e);
        }

        info!(headless = config.headless, download_dir = %download_dir.display(), "browser ready");
        Ok(session)
    }

    /// Allow downloads into `download_dir` and leave exactly one blank tab.
    async fn prepare(&mut self, download_dir: &Path) -> Result<()> {
        let download_path =
            std::fs::canonicalize(download_dir).map_err(|e| MfDocsError::io(download_dir, e))?;
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_path.to_string_lossy().into_owned())
            .build()
            .map_err(|e| MfDocsError::browser(format!("download behaviour: {e}")))?;
        self.browser.execute(params).await.map_err(cdp)?;

        let base = self.browser.new_page("about:blank").await.map_err(cdp)?;

        // Chrome may have opened its own start tab.
        for page in self.browser.pages().await.map_err(cdp)? {
            if page.target_id() != base.target_id() {
                if let Err(e) = page.close().await {
                    debug!(error = %e, "failed to close start tab");
                }
            }
        }

        self.tabs = vec![base];
        self.active = 0;
        Ok(())
    }

    fn active_page(&self) -> Result<&Page> {
        self.tabs
            .get(self.active)
            .ok_or_else(|| MfDocsError::browser("no active tab"))
    }

    fn element(&self, handle: ElementHandle) -> Result<&Element> {
        self.elements
            .get(&handle.0)
            .map(|(_, element)| element)
            .ok_or_else(|| MfDocsError::ElementNotFound(handle.to_string()))
    }

    /// Drop handles into a tab whose document changed or closed.
    fn forget_elements(&mut self, target: &TargetId) {
        self.elements.retain(|_, (owner, _)| owner != target);
    }

    /// Reconcile the tab list with the browser's open pages.
    async fn refresh_tabs(&mut self) -> Result<()> {
        let pages = self.browser.pages().await.map_err(cdp)?;
        let active_id = self.tabs.get(self.active).map(|p| p.target_id().clone());

        self.tabs
            .retain(|tab| pages.iter().any(|p| p.target_id() == tab.target_id()));
        for page in pages {
            if !self.tabs.iter().any(|t| t.target_id() == page.target_id()) {
                debug!(tab = ?page.target_id(), "new tab");
                self.tabs.push(page);
            }
        }

        self.active = active_id
            .and_then(|id| self.tabs.iter().position(|t| *t.target_id() == id))
            .unwrap_or(self.tabs.len().saturating_sub(1));
        Ok(())
    }
}

#[async_trait]
impl PageAutomation for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.active_page()?;
        let target = page.target_id().clone();
        page.goto(url)
            .await
            .map_err(|e| MfDocsError::browser(format!("failed to load {url}: {e}")))?;
        self.forget_elements(&target);
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        self.active_page()?.url().await.map_err(cdp)
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
        let page = self.active_page()?;
        let target = page.target_id().clone();
        let found = page.find_elements(selector).await.map_err(cdp)?;

        let mut handles = Vec::with_capacity(found.len());
        for element in found {
            let id = self.next_handle;
            self.next_handle += 1;
            self.elements.insert(id, (target.clone(), element));
            handles.push(ElementHandle(id));
        }
        Ok(handles)
    }

    async fn attribute(&mut self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        self.element(element)?.attribute(name).await.map_err(cdp)
    }

    async fn text(&mut self, element: ElementHandle) -> Result<String> {
        Ok(self
            .element(element)?
            .inner_text()
            .await
            .map_err(cdp)?
            .unwrap_or_default())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        self.element(element)?.click().await.map_err(cdp)?;
        Ok(())
    }

    async fn go_back(&mut self) -> Result<()> {
        let page = self.active_page()?;
        let target = page.target_id().clone();
        let before = page.url().await.map_err(cdp)?;
        page.evaluate("window.history.back()").await.map_err(cdp)?;

        for _ in 0..BACK_POLLS {
            tokio::time::sleep(BACK_POLL_INTERVAL).await;
            if page.url().await.map_err(cdp)? != before {
                break;
            }
        }

        self.forget_elements(&target);
        Ok(())
    }

    async fn tab_count(&mut self) -> Result<usize> {
        self.refresh_tabs().await?;
        Ok(self.tabs.len())
    }

    async fn switch_to_tab(&mut self, index: usize) -> Result<()> {
        let page = self
            .tabs
            .get(index)
            .ok_or_else(|| MfDocsError::browser(format!("no tab at index {index}")))?;
        page.bring_to_front().await.map_err(cdp)?;
        self.active = index;
        Ok(())
    }

    async fn close_active_tab(&mut self) -> Result<()> {
        if self.tabs.len() <= 1 {
            return Err(MfDocsError::browser("refusing to close the last tab"));
        }
        let page = self.tabs.remove(self.active.min(self.tabs.len() - 1));
        let target = page.target_id().clone();
        page.close().await.map_err(cdp)?;
        self.forget_elements(&target);

        self.active = self.tabs.len() - 1;
        self.active_page()?.bring_to_front().await.map_err(cdp)?;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.elements.clear();
        self.tabs.clear();

        let closed = self.browser.close().await.map(|_| ()).map_err(cdp);
        if let Err(e) = self.browser.wait().await {
            debug!(error = %e, "browser process wait failed");
        }
        self.handler.abort();
        closed
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
