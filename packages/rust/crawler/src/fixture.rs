//! Fixture-driven fake browser for tests.
//!
//! Pages are plain HTML strings keyed by URL and queried with `scraper`.
//! Element attributes script the fake's behaviour on click:
//!
//! - `data-goto="<url>"` — navigate to `<url>`
//! - `data-new-tab` — open `data-goto` in a new tab instead
//! - `data-fail` — the click itself fails
//! - `data-download="<name>"` — write `<name>` into the download directory,
//!   as a browser download would

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mfdocs_shared::{MfDocsError, Result};
use scraper::{Html, Selector};

use crate::page::{ElementHandle, PageAutomation};

/// What the fake observed, shared with the test after the session is consumed.
#[derive(Debug, Default)]
pub(crate) struct SiteLog {
    pub navigations: Vec<String>,
    /// Trimmed text (or id) of every clicked element.
    pub clicks: Vec<String>,
    pub downloads: Vec<String>,
    pub released: bool,
}

#[derive(Debug, Clone)]
struct Bound {
    tab: usize,
    url: String,
    selector: String,
    nth: usize,
}

/// Owned snapshot of one element, extracted without holding a parsed document.
struct ElementInfo {
    text: String,
    attrs: HashMap<String, String>,
}

pub(crate) struct FixtureSite {
    pages: HashMap<String, String>,
    broken_urls: HashSet<String>,
    /// Each tab is its history stack; the last entry is the current page.
    tabs: Vec<Vec<String>>,
    active: usize,
    bound: HashMap<u64, Bound>,
    next_handle: u64,
    download_dir: Option<PathBuf>,
    log: Arc<Mutex<SiteLog>>,
}

impl FixtureSite {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            broken_urls: HashSet::new(),
            tabs: vec![vec!["about:blank".to_string()]],
            active: 0,
            bound: HashMap::new(),
            next_handle: 1,
            download_dir: None,
            log: Arc::new(Mutex::new(SiteLog::default())),
        }
    }

    /// Register `html` (body content is enough) at `url`.
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Navigating to `url` fails outright.
    pub fn broken(mut self, url: &str) -> Self {
        self.broken_urls.insert(url.to_string());
        self
    }

    /// Where `data-download` clicks write their files.
    pub fn downloads_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn log(&self) -> Arc<Mutex<SiteLog>> {
        Arc::clone(&self.log)
    }

    fn current(&self) -> &str {
        self.tabs[self.active]
            .last()
            .map(String::as_str)
            .unwrap_or("about:blank")
    }

    fn html_for(&self, url: &str) -> String {
        self.pages.get(url).cloned().unwrap_or_default()
    }

    fn select_count(&self, url: &str, selector: &str) -> Result<usize> {
        let sel = Selector::parse(selector)
            .map_err(|e| MfDocsError::browser(format!("bad selector '{selector}': {e:?}")))?;
        let doc = Html::parse_document(&self.html_for(url));
        Ok(doc.select(&sel).count())
    }

    fn resolve(&self, handle: ElementHandle) -> Result<ElementInfo> {
        let bound = self
            .bound
            .get(&handle.0)
            .ok_or_else(|| MfDocsError::ElementNotFound(handle.to_string()))?;

        let still_there = self
            .tabs
            .get(bound.tab)
            .and_then(|history| history.last())
            .is_some_and(|url| *url == bound.url);
        if !still_there {
            return Err(MfDocsError::ElementNotFound(format!("{handle} is stale")));
        }

        let sel = Selector::parse(&bound.selector)
            .map_err(|e| MfDocsError::browser(format!("{e:?}")))?;
        let doc = Html::parse_document(&self.html_for(&bound.url));
        let el = doc
            .select(&sel)
            .nth(bound.nth)
            .ok_or_else(|| MfDocsError::ElementNotFound(handle.to_string()))?;

        Ok(ElementInfo {
            text: el.text().collect(),
            attrs: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }
}

#[async_trait]
impl PageAutomation for FixtureSite {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.log.lock().unwrap().navigations.push(url.to_string());
        if self.broken_urls.contains(url) {
            return Err(MfDocsError::browser(format!("net::ERR_CONNECTION_RESET at {url}")));
        }
        self.tabs[self.active].push(url.to_string());
        Ok(())
    }

    async fn current_url(&mut self) -> Result<Option<String>> {
        Ok(Some(self.current().to_string()))
    }

    async fn find_all(&mut self, selector: &str) -> Result<Vec<ElementHandle>> {
        let url = self.current().to_string();
        let count = self.select_count(&url, selector)?;
        let mut handles = Vec::with_capacity(count);
        for nth in 0..count {
            let id = self.next_handle;
            self.next_handle += 1;
            self.bound.insert(
                id,
                Bound {
                    tab: self.active,
                    url: url.clone(),
                    selector: selector.to_string(),
                    nth,
                },
            );
            handles.push(ElementHandle(id));
        }
        Ok(handles)
    }

    async fn attribute(&mut self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        Ok(self.resolve(element)?.attrs.get(name).cloned())
    }

    async fn text(&mut self, element: ElementHandle) -> Result<String> {
        Ok(self.resolve(element)?.text)
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        let info = self.resolve(element)?;
        let label = info
            .attrs
            .get("id")
            .cloned()
            .unwrap_or_else(|| info.text.trim().to_string());
        self.log.lock().unwrap().clicks.push(label.clone());

        if info.attrs.contains_key("data-fail") {
            return Err(MfDocsError::browser(format!("click on '{label}' intercepted")));
        }

        if let Some(name) = info.attrs.get("data-download") {
            if let Some(dir) = &self.download_dir {
                std::fs::write(dir.join(name), b"%PDF-1.4 fixture")
                    .map_err(|e| MfDocsError::io(dir.join(name), e))?;
            }
            self.log.lock().unwrap().downloads.push(name.clone());
        }

        if let Some(target) = info.attrs.get("data-goto") {
            if info.attrs.contains_key("data-new-tab") {
                self.tabs.push(vec![target.clone()]);
            } else {
                self.tabs[self.active].push(target.clone());
            }
        }
        Ok(())
    }

    async fn go_back(&mut self) -> Result<()> {
        let history = &mut self.tabs[self.active];
        if history.len() > 1 {
            history.pop();
        }
        Ok(())
    }

    async fn tab_count(&mut self) -> Result<usize> {
        Ok(self.tabs.len())
    }

    async fn switch_to_tab(&mut self, index: usize) -> Result<()> {
        if index >= self.tabs.len() {
            return Err(MfDocsError::browser(format!("no tab at index {index}")));
        }
        self.active = index;
        Ok(())
    }

    async fn close_active_tab(&mut self) -> Result<()> {
        if self.tabs.len() == 1 {
            return Err(MfDocsError::browser("refusing to close the last tab"));
        }
        self.tabs.remove(self.active);
        self.active = self.tabs.len() - 1;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        self.log.lock().unwrap().released = true;
        Ok(())
    }
}
