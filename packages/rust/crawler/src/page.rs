//! The page-automation seam.
//!
//! The traversal never talks to a browser directly. It drives an explicitly
//! owned [`PageAutomation`] session: acquire it before the run, pass it by
//! `&mut`, and call [`PageAutomation::release`] on every exit path.

use std::time::Duration;

use async_trait::async_trait;
use mfdocs_shared::{MfDocsError, Result};
use tokio::time::Instant;

/// Opaque reference to an element found on some tab.
///
/// Handles stay valid until the backend discards them; a stale handle fails
/// with [`MfDocsError::ElementNotFound`] or a backend error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Browser-like capability: navigate, locate, click, and juggle tabs.
///
/// Tabs are indexed in the order they were opened; index 0 is the base tab.
/// Exactly one tab is active at a time and all element operations apply to it.
#[async_trait]
pub trait PageAutomation: Send {
    /// Load `url` in the active tab.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// URL of the active tab, if known.
    async fn current_url(&mut self) -> Result<Option<String>>;

    /// All elements in the active tab matching a CSS selector, in document order.
    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>>;

    /// Read an attribute; `None` when absent.
    async fn attribute(&mut self, element: ElementHandle, name: &str) -> Result<Option<String>>;

    /// Visible text of an element (untrimmed).
    async fn text(&mut self, element: ElementHandle) -> Result<String>;

    /// Simulate a user click.
    async fn click(&mut self, element: ElementHandle) -> Result<()>;

    /// Step the active tab back one history entry.
    async fn go_back(&mut self) -> Result<()>;

    /// Number of open tabs, including ones opened by page scripts since the last call.
    async fn tab_count(&mut self) -> Result<usize>;

    /// Make tab `index` active.
    async fn switch_to_tab(&mut self, index: usize) -> Result<()>;

    /// Close the active tab and activate the most recently opened remaining one.
    async fn close_active_tab(&mut self) -> Result<()>;

    /// Shut the session down. The session is unusable afterwards.
    async fn release(&mut self) -> Result<()>;

    /// First element matching `selector`, if any.
    async fn find_one(&mut self, selector: &str) -> Result<Option<ElementHandle>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    /// Poll until `selector` matches something or `timeout` elapses.
    ///
    /// The selector is always checked at least once, so a zero timeout still
    /// succeeds on an already-rendered page.
    async fn wait_for(&mut self, selector: &str, timeout: Duration, poll: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.find_all(selector).await?.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(MfDocsError::timeout(format!("'{selector}'"), timeout));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Close every tab above `keep` and activate the last survivor.
    async fn close_tabs_above(&mut self, keep: usize) -> Result<()> {
        let keep = keep.max(1);
        while self.tab_count().await? > keep {
            let last = self.tab_count().await? - 1;
            self.switch_to_tab(last).await?;
            self.close_active_tab().await?;
        }
        let remaining = self.tab_count().await?;
        self.switch_to_tab(remaining.min(keep).saturating_sub(1)).await
    }
}
