//! Resumable traversal of the portal's document hierarchy.
//!
//! For each document type the [`Harvester`] opens the listing, walks every
//! category and every fund inside it, and tries to leave one PDF per fund in
//! the download directory. A checkpoint is written before each fund so an
//! interrupted run resumes on the fund it was working on.
//!
//! Failures are isolated per fund, per category and per document type; only
//! startup and top-level navigation failures end the run early.

use std::path::Path;
use std::time::{Duration, Instant};

use mfdocs_shared::{DocumentDescriptor, DocumentType, MfDocsError, PortalConfig, Result, TimingConfig};
use mfdocs_storage::{Checkpoint, CheckpointStore, ResumePoint};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::artifact::{
    DownloadWatcher, adopt_download, artifact_filename, extract_viewer_url, resolve_document_url,
};
use crate::fetcher::DocumentFetcher;
use crate::locators::{CATEGORY_SIGNATURE, FUND_SIGNATURE, LocatorChain, STRUCTURE_SELECTOR};
use crate::page::{ElementHandle, PageAutomation};
use crate::progress::ProgressReporter;

/// Fixed id of the download button on a fund detail page.
pub const DOWNLOAD_TRIGGER: &str = "#secondaryDownload";

/// Embedded PDF viewer used when the download button is missing.
pub const VIEWER_SELECTOR: &str = r#"iframe[src*=".pdf"]"#;

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// How a fund's document ended up (or didn't).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactOutcome {
    /// Download button clicked; the file was not checked for.
    Clicked,
    /// Download button clicked and the file showed up.
    Verified,
    /// Download button clicked but no file appeared in time.
    Unverified,
    /// Fetched over HTTP from the viewer URL.
    Fetched,
    /// Target file was already on disk; nothing was clicked or fetched.
    AlreadyPresent,
    /// Neither a download button nor a usable viewer was found.
    Missing,
    /// Viewer URL found but the HTTP fetch failed.
    FetchFailed,
}

impl ArtifactOutcome {
    pub const ALL: [ArtifactOutcome; 7] = [
        Self::Clicked,
        Self::Verified,
        Self::Unverified,
        Self::Fetched,
        Self::AlreadyPresent,
        Self::Missing,
        Self::FetchFailed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Clicked => "clicked",
            Self::Verified => "verified",
            Self::Unverified => "unverified",
            Self::Fetched => "fetched",
            Self::AlreadyPresent => "already present",
            Self::Missing => "missing",
            Self::FetchFailed => "fetch failed",
        }
    }
}

impl std::fmt::Display for ArtifactOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One fund that was processed to the end, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundRecord {
    pub doc_type: DocumentType,
    pub category_index: usize,
    pub fund_index: usize,
    /// Display name as shown on the category page (trimmed).
    pub fund_name: String,
    /// Deterministic artifact filename.
    pub filename: String,
    pub outcome: ArtifactOutcome,
}

/// Summary of a traversal run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Document types skipped because a previous run finished them.
    pub types_skipped: usize,
    /// Document types abandoned at the listing level.
    pub types_failed: usize,
    /// Categories opened and walked to the end.
    pub categories_visited: usize,
    /// Categories skipped on resume.
    pub categories_skipped: usize,
    /// Categories abandoned after an error.
    pub categories_failed: usize,
    /// Funds skipped on resume.
    pub funds_skipped: usize,
    /// Funds abandoned after an error.
    pub funds_failed: usize,
    /// Every fund processed to the end.
    pub records: Vec<FundRecord>,
    /// Errors encountered (location, error message).
    pub errors: Vec<(String, String)>,
    /// Whether every document type was walked to the end.
    pub completed: bool,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunSummary {
    /// Number of funds that ended with `outcome`.
    pub fn count(&self, outcome: ArtifactOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    fn fail(&mut self, location: String, error: &MfDocsError) {
        self.errors.push((location, error.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Timing and the document-type passes to run.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub timing: TimingConfig,
    /// Passes in traversal order.
    pub descriptors: Vec<DocumentDescriptor>,
}

impl HarvestSettings {
    pub fn new(timing: TimingConfig, portal: &PortalConfig) -> Result<Self> {
        Ok(Self {
            timing,
            descriptors: DocumentDescriptor::all(portal)?,
        })
    }
}

/// Per-pass values threaded through category and fund processing.
struct PassContext<'a> {
    doc_type: DocumentType,
    resume: &'a ResumePoint,
    download_dir: &'a Path,
}

/// A loaded listing page and the categories found on it.
struct Listing {
    url: Option<String>,
    categories: Vec<ElementHandle>,
}

enum Pass {
    Finished,
    Abandoned,
}

/// Drives one traversal over an owned page-automation session.
pub struct Harvester<S: PageAutomation> {
    session: S,
    store: CheckpointStore,
    fetcher: Box<dyn DocumentFetcher>,
    settings: HarvestSettings,
    progress: Box<dyn ProgressReporter>,
    locators: LocatorChain,
}

impl<S: PageAutomation> Harvester<S> {
    pub fn new(
        session: S,
        store: CheckpointStore,
        fetcher: Box<dyn DocumentFetcher>,
        settings: HarvestSettings,
        progress: Box<dyn ProgressReporter>,
    ) -> Self {
        Self {
            session,
            store,
            fetcher,
            settings,
            progress,
            locators: LocatorChain::new(),
        }
    }

    /// Replace the default category/fund discovery chain.
    pub fn with_locators(mut self, locators: LocatorChain) -> Self {
        self.locators = locators;
        self
    }

    /// Walk every document type, then release the session.
    ///
    /// The session is released on every path, including fatal errors. A run
    /// that reaches the end of all passes clears the checkpoint; anything
    /// else leaves the last saved cursor in place.
    #[instrument(skip_all, fields(run_id = %Uuid::now_v7(), download_dir = %download_dir.display()))]
    pub async fn run(mut self, download_dir: &Path) -> Result<RunSummary> {
        let start = Instant::now();
        let outcome = self.traverse(download_dir).await;

        if let Err(e) = self.session.release().await {
            warn!(error = %e, "failed to release browser session");
        }

        let mut summary = match outcome {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, "run aborted - progress checkpoint kept for resume");
                return Err(e);
            }
        };
        summary.duration = start.elapsed();

        info!(
            completed = summary.completed,
            funds = summary.records.len(),
            funds_failed = summary.funds_failed,
            categories_failed = summary.categories_failed,
            duration_ms = summary.duration.as_millis() as u64,
            "run finished"
        );
        self.progress.done(&summary);
        Ok(summary)
    }

    async fn traverse(&mut self, download_dir: &Path) -> Result<RunSummary> {
        std::fs::create_dir_all(download_dir).map_err(|e| MfDocsError::io(download_dir, e))?;

        let resume = ResumePoint::new(self.store.load());
        match resume.checkpoint() {
            Some(cp) => info!(checkpoint = %cp, "resuming from saved progress"),
            None => info!("no saved progress - starting from the beginning"),
        }

        let mut summary = RunSummary::default();
        let descriptors = self.settings.descriptors.clone();

        for descriptor in &descriptors {
            let doc_type = descriptor.doc_type;
            if !resume.runs_type(doc_type) {
                info!(%doc_type, "finished in a previous run - skipping");
                summary.types_skipped += 1;
                continue;
            }

            self.progress.phase(doc_type);
            let cx = PassContext {
                doc_type,
                resume: &resume,
                download_dir,
            };
            match self.process_document_type(&cx, descriptor, &mut summary).await? {
                Pass::Finished => {}
                Pass::Abandoned => return Ok(summary),
            }

            if let Some(next) = doc_type.next() {
                self.save_checkpoint(Checkpoint::start_of(next));
            }
        }

        summary.completed = true;
        match self.store.clear() {
            Ok(()) => info!("all document types processed - progress checkpoint cleared"),
            Err(e) => warn!(error = %e, "failed to clear progress checkpoint"),
        }
        Ok(summary)
    }

    #[instrument(skip_all, fields(doc_type = %cx.doc_type))]
    async fn process_document_type(
        &mut self,
        cx: &PassContext<'_>,
        descriptor: &DocumentDescriptor,
        summary: &mut RunSummary,
    ) -> Result<Pass> {
        let doc_type = cx.doc_type;
        info!(url = %descriptor.listing_url, "opening listing");

        self.session.navigate(descriptor.listing_url.as_str()).await?;
        let mut listing = match self.read_listing().await {
            Ok(listing) => listing,
            Err(e) => return Ok(abandon_type(doc_type, &e, summary)),
        };

        let total = listing.categories.len();
        if total == 0 {
            warn!("no categories found on listing");
        } else {
            info!(categories = total, "found categories");
        }

        for index in 0..total {
            if cx.resume.skip_category(doc_type, index) {
                debug!(category_index = index, "category already processed - skipping");
                summary.categories_skipped += 1;
                continue;
            }

            let Some(&category) = listing.categories.get(index) else {
                let e = MfDocsError::ElementNotFound(format!(
                    "category {index} (listing now shows {})",
                    listing.categories.len()
                ));
                return Ok(abandon_type(doc_type, &e, summary));
            };

            match self.process_category(cx, index, total, category, summary).await {
                Ok(()) => summary.categories_visited += 1,
                Err(e) => {
                    error!(category_index = index, error = %e, "category failed - moving on");
                    summary.categories_failed += 1;
                    summary.fail(format!("{doc_type} category {index}"), &e);
                    if let Err(e) = self.session.close_tabs_above(1).await {
                        warn!(error = %e, "failed to close extra tabs");
                    }
                }
            }

            self.session.close_tabs_above(1).await?;
            if self.session.current_url().await? != listing.url {
                debug!("category opened in the listing tab - reloading listing");
                self.session.navigate(descriptor.listing_url.as_str()).await?;
                listing = match self.read_listing().await {
                    Ok(listing) => listing,
                    Err(e) => return Ok(abandon_type(doc_type, &e, summary)),
                };
            }
        }

        info!("document type finished");
        Ok(Pass::Finished)
    }

    /// Wait for the current listing to render and enumerate its categories.
    async fn read_listing(&mut self) -> Result<Listing> {
        self.wait_for_structure().await?;
        let categories = self.locators.locate(&mut self.session, CATEGORY_SIGNATURE).await?;
        let url = self.session.current_url().await?;
        Ok(Listing { url, categories })
    }

    #[instrument(skip_all, fields(category_index = index))]
    async fn process_category(
        &mut self,
        cx: &PassContext<'_>,
        index: usize,
        total: usize,
        category: ElementHandle,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let doc_type = cx.doc_type;
        let name = self.session.text(category).await?.trim().to_string();
        self.progress.category(doc_type, index, total, &name);
        info!(category = %name, "opening category");

        self.click_and_follow(category).await?;
        let list_tabs = self.session.tab_count().await?;

        self.wait_for_structure().await?;
        let mut funds = self.locators.locate(&mut self.session, FUND_SIGNATURE).await?;
        let fund_list_url = self.session.current_url().await?;
        let fund_total = funds.len();
        debug!(funds = fund_total, "found funds");

        for fund_index in 0..fund_total {
            if cx.resume.skip_fund(doc_type, index, fund_index) {
                debug!(fund_index, "fund already processed - skipping");
                summary.funds_skipped += 1;
                continue;
            }

            let Some(&fund) = funds.get(fund_index) else {
                return Err(MfDocsError::ElementNotFound(format!(
                    "fund {fund_index} (list now shows {})",
                    funds.len()
                )));
            };

            self.save_checkpoint(Checkpoint::new(doc_type, index, fund_index));

            let (fund_name, result) = match self.session.text(fund).await {
                Ok(text) => {
                    let fund_name = text.trim().to_string();
                    let result = self
                        .process_fund(cx, index, fund_index, fund_total, fund, &fund_name)
                        .await;
                    (fund_name, result)
                }
                Err(e) => (String::new(), Err(e)),
            };

            match result {
                Ok(record) => summary.records.push(record),
                Err(e) => {
                    warn!(fund_index, fund = %fund_name, error = %e, "fund failed - moving on");
                    summary.funds_failed += 1;
                    let mut location = format!("{doc_type} category {index} fund {fund_index}");
                    if !fund_name.is_empty() {
                        location.push_str(&format!(" ({fund_name})"));
                    }
                    summary.fail(location, &e);
                }
            }

            if let Some(refreshed) = self
                .return_to_fund_list(list_tabs, fund_list_url.as_deref())
                .await?
            {
                funds = refreshed;
            }
        }

        self.session.close_tabs_above(1).await
    }

    /// Close the detail tab or step back to the fund list.
    ///
    /// Returns fresh fund handles when the list had to be reloaded.
    async fn return_to_fund_list(
        &mut self,
        list_tabs: usize,
        fund_list_url: Option<&str>,
    ) -> Result<Option<Vec<ElementHandle>>> {
        self.session.close_tabs_above(list_tabs).await?;
        if self.session.current_url().await?.as_deref() == fund_list_url {
            return Ok(None);
        }

        debug!("fund opened in the fund-list tab - going back");
        self.session.go_back().await?;
        self.wait_for_structure().await?;
        let funds = self.locators.locate(&mut self.session, FUND_SIGNATURE).await?;
        Ok(Some(funds))
    }

    #[instrument(skip_all, fields(fund_index = index, fund = %fund_name))]
    async fn process_fund(
        &mut self,
        cx: &PassContext<'_>,
        category_index: usize,
        index: usize,
        total: usize,
        fund: ElementHandle,
        fund_name: &str,
    ) -> Result<FundRecord> {
        let doc_type = cx.doc_type;
        self.progress.fund(doc_type, category_index, index, total, fund_name);
        info!("processing fund");

        self.click_and_follow(fund).await?;
        tokio::time::sleep(self.settings.timing.detail_render()).await;

        let filename = artifact_filename(fund_name, doc_type, index);
        let outcome = match self.session.find_one(DOWNLOAD_TRIGGER).await? {
            Some(trigger) => self.download_via_button(trigger, &filename, cx.download_dir).await?,
            None => self.download_via_viewer(&filename, cx.download_dir).await?,
        };
        debug!(filename = %filename, %outcome, "fund done");

        Ok(FundRecord {
            doc_type,
            category_index,
            fund_index: index,
            fund_name: fund_name.to_string(),
            filename,
            outcome,
        })
    }

    /// Primary path: click the download button and, if configured, wait for
    /// the browser to drop the file.
    async fn download_via_button(
        &mut self,
        trigger: ElementHandle,
        filename: &str,
        dir: &Path,
    ) -> Result<ArtifactOutcome> {
        let target = dir.join(filename);
        if target.exists() {
            info!(filename, "file already exists - skipping download");
            return Ok(ArtifactOutcome::AlreadyPresent);
        }

        let wait = self.settings.timing.download_wait();
        let watcher = if wait.is_zero() {
            None
        } else {
            Some(DownloadWatcher::snapshot(dir)?)
        };

        self.session.click(trigger).await?;
        tokio::time::sleep(self.settings.timing.download_settle()).await;

        let Some(watcher) = watcher else {
            info!(filename, "download triggered");
            return Ok(ArtifactOutcome::Clicked);
        };

        match watcher
            .wait_for_new_file(wait, self.settings.timing.poll_interval())
            .await?
        {
            Some(found) => {
                adopt_download(&found, &target)?;
                info!(filename, "download complete");
                Ok(ArtifactOutcome::Verified)
            }
            None => {
                warn!(filename, waited = ?wait, "download triggered but no file appeared");
                Ok(ArtifactOutcome::Unverified)
            }
        }
    }

    /// Fallback path: pull the document URL out of the embedded viewer and
    /// fetch it directly.
    async fn download_via_viewer(&mut self, filename: &str, dir: &Path) -> Result<ArtifactOutcome> {
        let Some(viewer) = self.session.find_one(VIEWER_SELECTOR).await? else {
            warn!(filename, "no download button or document viewer found");
            return Ok(ArtifactOutcome::Missing);
        };

        let src = self.session.attribute(viewer, "src").await?.unwrap_or_default();
        let Some(raw) = extract_viewer_url(&src) else {
            warn!(filename, src = %src, "viewer source has no document URL");
            return Ok(ArtifactOutcome::Missing);
        };

        if dir.join(filename).exists() {
            info!(filename, "file already exists - skipping fetch");
            return Ok(ArtifactOutcome::AlreadyPresent);
        }

        let page_url = self.session.current_url().await?;
        let url = resolve_document_url(&raw, page_url.as_deref())?;
        info!(filename, url = %url, "fetching from viewer");

        if self.fetcher.fetch(url.as_str(), filename, dir).await {
            Ok(ArtifactOutcome::Fetched)
        } else {
            Ok(ArtifactOutcome::FetchFailed)
        }
    }

    /// Click `element`, let any new tab open, and switch to it if one did.
    async fn click_and_follow(&mut self, element: ElementHandle) -> Result<()> {
        let before = self.session.tab_count().await?;
        self.session.click(element).await?;
        tokio::time::sleep(self.settings.timing.tab_settle()).await;

        let after = self.session.tab_count().await?;
        if after > before {
            debug!(tabs = after, "switching to new tab");
            self.session.switch_to_tab(after - 1).await?;
        }
        Ok(())
    }

    async fn wait_for_structure(&mut self) -> Result<()> {
        let timing = &self.settings.timing;
        let (timeout, poll) = (timing.structure_timeout(), timing.poll_interval());
        self.session.wait_for(STRUCTURE_SELECTOR, timeout, poll).await
    }

    fn save_checkpoint(&self, checkpoint: Checkpoint) {
        if let Err(e) = self.store.save(&checkpoint) {
            warn!(checkpoint = %checkpoint, error = %e, "failed to save progress - previous checkpoint stays current");
        }
    }
}

fn abandon_type(doc_type: DocumentType, e: &MfDocsError, summary: &mut RunSummary) -> Pass {
    let location = if e.is_timeout() {
        format!("{doc_type} listing (not rendered)")
    } else {
        format!("{doc_type} listing")
    };
    error!(
        %doc_type,
        error = %e,
        "{location} unavailable - stopping here, progress kept for the next run"
    );
    summary.types_failed += 1;
    summary.fail(location, e);
    Pass::Abandoned
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::fixture::{FixtureSite, SiteLog};
    use crate::progress::SilentProgress;

    const LISTING: &str = "https://portal.test/sebiweb/OtherAction.do?doMutualFund=yes";

    fn listing_url(doc_type: DocumentType) -> String {
        match doc_type {
            DocumentType::Kim => format!("{LISTING}&mftype=3"),
            DocumentType::Sid => format!("{LISTING}&mftype=2"),
        }
    }

    fn lower(doc_type: DocumentType) -> String {
        doc_type.tag().to_ascii_lowercase()
    }

    fn category_url(doc_type: DocumentType, c: usize) -> String {
        format!("https://portal.test/{}/category/{c}", lower(doc_type))
    }

    fn fund_url(doc_type: DocumentType, c: usize, f: usize) -> String {
        format!("https://portal.test/{}/fund/{c}/{f}", lower(doc_type))
    }

    fn fund_name(doc_type: DocumentType, c: usize, f: usize) -> String {
        format!("{doc_type} Fund {c}{f}")
    }

    /// Detail page with the regular download button.
    fn button_detail(doc_type: DocumentType, c: usize, f: usize) -> String {
        format!(
            r#"<h2>{}</h2><a id="secondaryDownload" data-download="{}-{c}-{f}.pdf">Download</a>"#,
            fund_name(doc_type, c, f),
            lower(doc_type)
        )
    }

    /// How links on generated pages behave.
    #[derive(Clone, Copy)]
    struct Layout {
        categories: usize,
        funds: usize,
        new_tabs: bool,
    }

    const TWO_BY_TWO: Layout = Layout {
        categories: 2,
        funds: 2,
        new_tabs: true,
    };

    /// Two-type portal; `detail` renders each fund detail page.
    fn portal(layout: Layout, detail: impl Fn(DocumentType, usize, usize) -> String) -> FixtureSite {
        let tab = if layout.new_tabs { " data-new-tab" } else { "" };
        let mut site = FixtureSite::new();

        for doc_type in DocumentType::ORDER {
            let categories: String = (0..layout.categories)
                .map(|c| {
                    format!(
                        r#"<tr><td><a href="javascript:getmutuakFund({c})" data-goto="{}"{tab}>{doc_type} category {c}</a></td></tr>"#,
                        category_url(doc_type, c)
                    )
                })
                .collect();
            site = site.page(&listing_url(doc_type), &format!("<table>{categories}</table>"));

            for c in 0..layout.categories {
                let funds: String = (0..layout.funds)
                    .map(|f| {
                        format!(
                            r#"<tr><td><a href="javascript:getfundDetails({f})" data-goto="{}"{tab}>{}</a></td></tr>"#,
                            fund_url(doc_type, c, f),
                            fund_name(doc_type, c, f)
                        )
                    })
                    .collect();
                site = site.page(&category_url(doc_type, c), &format!("<table>{funds}</table>"));

                for f in 0..layout.funds {
                    site = site.page(&fund_url(doc_type, c, f), &detail(doc_type, c, f));
                }
            }
        }
        site
    }

    /// Records every fetch; succeeds unless told otherwise.
    #[derive(Clone, Default)]
    struct RecordingFetcher {
        calls: Arc<Mutex<Vec<(String, String)>>>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentFetcher for RecordingFetcher {
        async fn fetch(&self, url: &str, filename: &str, _dir: &Path) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), filename.to_string()));
            !self.fail
        }
    }

    struct TestRun {
        dir: PathBuf,
        store: CheckpointStore,
        fetcher: RecordingFetcher,
        timing: TimingConfig,
    }

    impl TestRun {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("mfdocs_engine_{}", Uuid::now_v7()));
            let store = CheckpointStore::new(dir.join("state").join("download_progress.json"));
            Self {
                dir,
                store,
                fetcher: RecordingFetcher::default(),
                timing: TimingConfig::immediate(),
            }
        }

        fn downloads(&self) -> PathBuf {
            self.dir.join("downloads")
        }

        fn settings(&self) -> HarvestSettings {
            let portal = PortalConfig {
                listing_url: LISTING.to_string(),
                ..PortalConfig::default()
            };
            HarvestSettings::new(self.timing.clone(), &portal).unwrap()
        }

        /// Run over `site`, returning the result and the site's log.
        async fn run(&self, site: FixtureSite) -> (Result<RunSummary>, Arc<Mutex<SiteLog>>) {
            std::fs::create_dir_all(self.downloads()).unwrap();
            let site = site.downloads_to(self.downloads());
            let log = site.log();
            let harvester = Harvester::new(
                site,
                self.store.clone(),
                Box::new(self.fetcher.clone()),
                self.settings(),
                Box::new(SilentProgress),
            );
            (harvester.run(&self.downloads()).await, log)
        }
    }

    impl Drop for TestRun {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    fn clicked(log: &Arc<Mutex<SiteLog>>, label: &str) -> bool {
        log.lock().unwrap().clicks.iter().any(|c| c == label)
    }

    #[tokio::test]
    async fn full_run_visits_everything_and_clears_checkpoint() {
        let t = TestRun::new();
        let (result, log) = t.run(portal(TWO_BY_TWO, button_detail)).await;
        let summary = result.unwrap();

        assert!(summary.completed);
        assert_eq!(summary.categories_visited, 4);
        assert_eq!(summary.records.len(), 8);
        assert_eq!(summary.count(ArtifactOutcome::Clicked), 8);
        assert!(summary.errors.is_empty());

        let log = log.lock().unwrap();
        assert_eq!(log.downloads.len(), 8);
        assert!(log.released);
        assert_eq!(log.navigations[0], listing_url(DocumentType::Kim));
        assert!(log.navigations.contains(&listing_url(DocumentType::Sid)));

        assert!(t.store.load().is_none());
        assert!(!t.store.path().exists());
    }

    #[tokio::test]
    async fn records_carry_deterministic_filenames() {
        let t = TestRun::new();
        let (result, _) = t.run(portal(TWO_BY_TWO, button_detail)).await;
        let summary = result.unwrap();

        let first = &summary.records[0];
        assert_eq!(first.doc_type, DocumentType::Kim);
        assert_eq!(first.fund_name, "KIM Fund 00");
        assert_eq!(first.filename, "KIM_Fund_00_KIM.pdf");

        let last = summary.records.last().unwrap();
        assert_eq!(last.doc_type, DocumentType::Sid);
        assert_eq!((last.category_index, last.fund_index), (1, 1));
        assert_eq!(last.filename, "SID_Fund_11_SID.pdf");
    }

    #[tokio::test]
    async fn resume_skips_completed_categories_and_funds() {
        let t = TestRun::new();
        t.store.save(&Checkpoint::new(DocumentType::Kim, 1, 1)).unwrap();

        let (result, log) = t.run(portal(TWO_BY_TWO, button_detail)).await;
        let summary = result.unwrap();

        assert!(!clicked(&log, "KIM category 0"));
        assert!(clicked(&log, "KIM category 1"));
        assert!(!clicked(&log, "KIM Fund 10"));
        assert!(clicked(&log, "KIM Fund 11"));
        // Later types are walked in full.
        assert!(clicked(&log, "SID category 0"));
        assert!(clicked(&log, "SID Fund 00"));

        assert_eq!(summary.categories_skipped, 1);
        assert_eq!(summary.funds_skipped, 1);
        assert_eq!(summary.records.len(), 1 + 4);
        assert!(summary.completed);
    }

    #[tokio::test]
    async fn resume_on_second_type_skips_first_entirely() {
        let t = TestRun::new();
        t.store.save(&Checkpoint::new(DocumentType::Sid, 0, 1)).unwrap();

        let (result, log) = t.run(portal(TWO_BY_TWO, button_detail)).await;
        let summary = result.unwrap();

        let navigations = log.lock().unwrap().navigations.clone();
        assert!(!navigations.contains(&listing_url(DocumentType::Kim)));
        assert!(!clicked(&log, "SID Fund 00"));
        assert!(clicked(&log, "SID Fund 01"));
        assert!(clicked(&log, "SID Fund 10"));

        assert_eq!(summary.types_skipped, 1);
        assert_eq!(summary.records.len(), 3);
    }

    #[tokio::test]
    async fn existing_artifacts_are_not_downloaded_again() {
        let mut t = TestRun::new();
        t.timing.download_wait_secs = 1;

        let (first, _) = t.run(portal(TWO_BY_TWO, button_detail)).await;
        let first = first.unwrap();
        assert_eq!(first.count(ArtifactOutcome::Verified), 8);
        assert!(t.downloads().join("KIM_Fund_00_KIM.pdf").exists());
        assert!(!t.downloads().join("kim-0-0.pdf").exists());

        let (second, log) = t.run(portal(TWO_BY_TWO, button_detail)).await;
        let second = second.unwrap();
        assert_eq!(second.count(ArtifactOutcome::AlreadyPresent), 8);

        let log = log.lock().unwrap();
        assert!(log.downloads.is_empty());
        assert!(!log.clicks.iter().any(|c| c == "secondaryDownload"));
    }

    #[tokio::test]
    async fn download_that_never_lands_is_unverified() {
        let mut t = TestRun::new();
        t.timing.download_wait_secs = 1;

        let detail = |doc_type: DocumentType, c: usize, f: usize| {
            if (doc_type, c, f) == (DocumentType::Kim, 0, 0) {
                r#"<a id="secondaryDownload">Download</a>"#.to_string()
            } else {
                button_detail(doc_type, c, f)
            }
        };
        let (result, _) = t.run(portal(TWO_BY_TWO, detail)).await;
        let summary = result.unwrap();

        assert_eq!(summary.records[0].outcome, ArtifactOutcome::Unverified);
        assert_eq!(summary.count(ArtifactOutcome::Verified), 7);
        assert!(summary.completed);
    }

    #[tokio::test]
    async fn viewer_fallback_fetches_resolved_url() {
        let t = TestRun::new();
        let detail = |doc_type: DocumentType, c: usize, f: usize| {
            format!(
                r#"<iframe src="/web/viewer.html?file=/docs/{}-{c}{f}.pdf&zoom=page-width"></iframe>"#,
                lower(doc_type)
            )
        };
        let (result, _) = t.run(portal(TWO_BY_TWO, detail)).await;
        let summary = result.unwrap();

        assert_eq!(summary.count(ArtifactOutcome::Fetched), 8);
        let calls = t.fetcher.calls.lock().unwrap();
        assert_eq!(calls.len(), 8);
        assert_eq!(
            calls[0],
            (
                "https://portal.test/docs/kim-00.pdf".to_string(),
                "KIM_Fund_00_KIM.pdf".to_string()
            )
        );
    }

    #[tokio::test]
    async fn viewer_fallback_skips_fetch_for_existing_file() {
        let t = TestRun::new();
        std::fs::create_dir_all(t.downloads()).unwrap();
        std::fs::write(t.downloads().join("KIM_Fund_00_KIM.pdf"), b"%PDF").unwrap();

        let detail = |_: DocumentType, _: usize, _: usize| {
            r#"<iframe src="viewer.html?file=https://cdn.test/doc.pdf"></iframe>"#.to_string()
        };
        let (result, _) = t.run(portal(TWO_BY_TWO, detail)).await;
        let summary = result.unwrap();

        assert_eq!(summary.records[0].outcome, ArtifactOutcome::AlreadyPresent);
        assert_eq!(t.fetcher.calls.lock().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn missing_document_and_failed_fetch_are_tolerated() {
        let mut t = TestRun::new();
        t.fetcher.fail = true;

        let detail = |doc_type: DocumentType, _: usize, f: usize| match (doc_type, f) {
            (DocumentType::Kim, 0) => "<p>No documents published.</p>".to_string(),
            _ => r#"<iframe src="viewer.html?file=https://cdn.test/doc.pdf&x=1"></iframe>"#
                .to_string(),
        };
        let (result, _) = t.run(portal(TWO_BY_TWO, detail)).await;
        let summary = result.unwrap();

        assert_eq!(summary.count(ArtifactOutcome::Missing), 2);
        assert_eq!(summary.count(ArtifactOutcome::FetchFailed), 6);
        assert_eq!(summary.funds_failed, 0);
        assert!(summary.completed);
    }

    #[tokio::test]
    async fn failing_fund_does_not_stop_the_next_one() {
        let t = TestRun::new();
        let site = portal(TWO_BY_TWO, button_detail).page(
            &category_url(DocumentType::Kim, 0),
            &format!(
                r#"<table>
                    <tr><td><a href="javascript:getfundDetails(0)" data-fail>KIM Fund 00</a></td></tr>
                    <tr><td><a href="javascript:getfundDetails(1)" data-goto="{}" data-new-tab>KIM Fund 01</a></td></tr>
                </table>"#,
                fund_url(DocumentType::Kim, 0, 1)
            ),
        );

        let (result, log) = t.run(site).await;
        let summary = result.unwrap();

        assert!(clicked(&log, "KIM Fund 00"));
        assert!(clicked(&log, "KIM Fund 01"));
        assert_eq!(summary.funds_failed, 1);
        assert_eq!(summary.records.len(), 7);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].0, "KIM category 0 fund 0 (KIM Fund 00)");
        assert!(summary.completed);
        assert!(t.store.load().is_none());
    }

    #[tokio::test]
    async fn failing_category_does_not_stop_the_next_one() {
        let t = TestRun::new();
        // Category 0 opens a page that never renders a table.
        let site = portal(TWO_BY_TWO, button_detail)
            .page(&category_url(DocumentType::Kim, 0), "<p>Service unavailable</p>");

        let (result, log) = t.run(site).await;
        let summary = result.unwrap();

        assert_eq!(summary.categories_failed, 1);
        assert_eq!(summary.categories_visited, 3);
        assert!(clicked(&log, "KIM category 1"));
        assert!(clicked(&log, "KIM Fund 10"));
        assert_eq!(summary.records.len(), 6);
        assert!(summary.completed);
    }

    #[tokio::test]
    async fn same_tab_navigation_reloads_lists() {
        let t = TestRun::new();
        let layout = Layout {
            new_tabs: false,
            ..TWO_BY_TWO
        };
        let (result, log) = t.run(portal(layout, button_detail)).await;
        let summary = result.unwrap();

        assert!(summary.completed);
        assert_eq!(summary.records.len(), 8);
        assert_eq!(summary.funds_failed, 0);

        let log = log.lock().unwrap();
        assert_eq!(log.downloads.len(), 8);
        let kim_listing_loads = log
            .navigations
            .iter()
            .filter(|url| **url == listing_url(DocumentType::Kim))
            .count();
        assert!(kim_listing_loads > 1);
    }

    #[tokio::test]
    async fn custom_locator_chain_is_used() {
        let t = TestRun::new();
        std::fs::create_dir_all(t.downloads()).unwrap();
        let site = portal(TWO_BY_TWO, button_detail).downloads_to(t.downloads());
        let log = site.log();

        let harvester = Harvester::new(
            site,
            t.store.clone(),
            Box::new(t.fetcher.clone()),
            t.settings(),
            Box::new(SilentProgress),
        )
        .with_locators(LocatorChain::with_strategies(vec![Box::new(
            crate::locators::LinkFilterLocator,
        )]));
        let summary = harvester.run(&t.downloads()).await.unwrap();

        assert!(summary.completed);
        assert_eq!(summary.records.len(), 8);
        assert_eq!(log.lock().unwrap().downloads.len(), 8);
    }

    #[tokio::test]
    async fn listing_without_structure_stops_run_and_keeps_checkpoint() {
        let t = TestRun::new();
        t.store.save(&Checkpoint::new(DocumentType::Kim, 1, 0)).unwrap();

        let site = portal(TWO_BY_TWO, button_detail)
            .page(&listing_url(DocumentType::Kim), "<p>Under maintenance</p>");
        let (result, log) = t.run(site).await;
        let summary = result.unwrap();

        assert!(!summary.completed);
        assert_eq!(summary.types_failed, 1);
        assert_eq!(summary.errors[0].0, "KIM listing (not rendered)");
        let log = log.lock().unwrap();
        assert!(!log.navigations.contains(&listing_url(DocumentType::Sid)));
        assert!(log.released);

        let kept = t.store.load().unwrap();
        assert_eq!(kept.doc_type, DocumentType::Kim);
        assert_eq!(kept.category_index, 1);
    }

    #[tokio::test]
    async fn fatal_navigation_error_keeps_checkpoint_and_releases_session() {
        let t = TestRun::new();
        let site = portal(TWO_BY_TWO, button_detail).broken(&listing_url(DocumentType::Sid));

        let (result, log) = t.run(site).await;
        assert!(result.is_err());
        assert!(log.lock().unwrap().released);

        // The first type finished, so the cursor points at the start of the second.
        let kept = t.store.load().unwrap();
        assert_eq!(
            (kept.doc_type, kept.category_index, kept.fund_index),
            (DocumentType::Sid, 0, 0)
        );
    }

    /// Reads the saved cursor at the moment each fund's document is fetched.
    struct CursorReader {
        store: CheckpointStore,
        seen: Arc<Mutex<Vec<(DocumentType, usize, usize)>>>,
    }

    #[async_trait]
    impl DocumentFetcher for CursorReader {
        async fn fetch(&self, _url: &str, _filename: &str, _dir: &Path) -> bool {
            let cp = self.store.load().unwrap();
            self.seen
                .lock()
                .unwrap()
                .push((cp.doc_type, cp.category_index, cp.fund_index));
            true
        }
    }

    #[tokio::test]
    async fn checkpoint_is_saved_before_each_fund() {
        let t = TestRun::new();
        std::fs::create_dir_all(t.downloads()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reader = CursorReader {
            store: t.store.clone(),
            seen: Arc::clone(&seen),
        };

        let site = portal(TWO_BY_TWO, |_: DocumentType, _: usize, _: usize| {
            r#"<iframe src="viewer.html?file=https://cdn.test/doc.pdf"></iframe>"#.to_string()
        });
        let harvester = Harvester::new(
            site,
            t.store.clone(),
            Box::new(reader),
            t.settings(),
            Box::new(SilentProgress),
        );
        let summary = harvester.run(&t.downloads()).await.unwrap();
        assert!(summary.completed);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 8);
        assert_eq!(seen[0], (DocumentType::Kim, 0, 0));
        assert_eq!(seen[3], (DocumentType::Kim, 1, 1));
        assert_eq!(seen[4], (DocumentType::Sid, 0, 0));
        assert_eq!(seen[7], (DocumentType::Sid, 1, 1));
    }

    #[tokio::test]
    async fn unwritable_checkpoint_does_not_stop_the_run() {
        let mut t = TestRun::new();
        // A directory where the checkpoint file should be: every save fails.
        t.store = CheckpointStore::new(t.dir.join("blocked"));
        std::fs::create_dir_all(t.store.path()).unwrap();

        let (result, log) = t.run(portal(TWO_BY_TWO, button_detail)).await;
        let summary = result.unwrap();

        assert!(summary.completed);
        assert_eq!(summary.records.len(), 8);
        assert_eq!(summary.funds_failed, 0);
        for doc_type in DocumentType::ORDER {
            for c in 0..2 {
                for f in 0..2 {
                    assert!(clicked(&log, &fund_name(doc_type, c, f)));
                }
            }
        }
        assert!(log.lock().unwrap().released);
        assert!(t.store.path().is_dir());
        assert!(t.store.load().is_none());
    }
}
