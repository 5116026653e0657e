//! Artifact naming, viewer-URL extraction, and browser-download detection.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use mfdocs_shared::{DocumentType, MfDocsError, Result};
use regex::Regex;
use tokio::time::Instant;
use url::Url;

/// Whitespace and path separators are not allowed in artifact names.
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s/\\]").expect("static regex"));

/// Suffixes browsers use for downloads that are still in flight.
const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp", ".download"];

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Replace each whitespace or path-separator character with `_`.
pub fn sanitize_fund_name(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name.trim(), "_").into_owned()
}

/// Deterministic artifact filename: `<sanitized-name>_<TAG>.pdf`.
///
/// `fund_index` is zero-based; an empty name becomes `fund_<index+1>`.
pub fn artifact_filename(fund_name: &str, doc_type: DocumentType, fund_index: usize) -> String {
    let mut safe = sanitize_fund_name(fund_name);
    if safe.is_empty() {
        safe = format!("fund_{}", fund_index + 1);
    }
    format!("{safe}_{}.pdf", doc_type.tag())
}

// ---------------------------------------------------------------------------
// Viewer URL
// ---------------------------------------------------------------------------

/// Pull the document URL out of an embedded viewer's `src`.
///
/// Everything after the first `file=`, cut at the next `&`.
pub fn extract_viewer_url(src: &str) -> Option<String> {
    let (_, rest) = src.split_once("file=")?;
    let url = rest.split('&').next().unwrap_or_default();
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Resolve a possibly relative document URL against the page it came from.
pub fn resolve_document_url(raw: &str, page_url: Option<&str>) -> Result<Url> {
    match Url::parse(raw) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = page_url.ok_or_else(|| {
                MfDocsError::validation(format!("relative document URL '{raw}' with no page URL"))
            })?;
            Url::parse(base)
                .and_then(|base| base.join(raw))
                .map_err(|e| MfDocsError::validation(format!("cannot resolve '{raw}': {e}")))
        }
        Err(e) => Err(MfDocsError::validation(format!("invalid document URL '{raw}': {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Browser download detection
// ---------------------------------------------------------------------------

/// Remembers a directory listing so files a browser adds later can be found.
///
/// Downloads already in flight at snapshot time belong to an earlier click:
/// the names they will complete under count as seen, so a late finisher is
/// never mistaken for the next download.
#[derive(Debug)]
pub struct DownloadWatcher {
    dir: PathBuf,
    before: HashSet<OsString>,
}

impl DownloadWatcher {
    /// Record what is in `dir` right now.
    pub fn snapshot(dir: &Path) -> Result<Self> {
        let mut before = list_names(dir)?;
        let pending: Vec<OsString> = before.iter().filter_map(completed_name).collect();
        before.extend(pending);
        Ok(Self {
            dir: dir.to_path_buf(),
            before,
        })
    }

    /// Completed PDFs that appeared since the snapshot, sorted by name.
    pub fn new_files(&self) -> Result<Vec<PathBuf>> {
        let mut fresh: Vec<PathBuf> = list_names(&self.dir)?
            .into_iter()
            .filter(|name| !self.before.contains(name))
            .filter(is_pdf)
            .map(|name| self.dir.join(name))
            .collect();
        fresh.sort();
        Ok(fresh)
    }

    /// Poll until a completed new file shows up or `timeout` elapses.
    pub async fn wait_for_new_file(
        &self,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Option<PathBuf>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = self.new_files()?.into_iter().next() {
                return Ok(Some(found));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

fn list_names(dir: &Path) -> Result<HashSet<OsString>> {
    let entries = std::fs::read_dir(dir).map_err(|e| MfDocsError::io(dir, e))?;
    let mut names = HashSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| MfDocsError::io(dir, e))?;
        if entry.path().is_file() {
            names.insert(entry.file_name());
        }
    }
    Ok(names)
}

/// Name an in-flight download will have once the browser finishes it.
fn completed_name(name: &OsString) -> Option<OsString> {
    let name = name.to_str()?;
    PARTIAL_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(*suffix))
        .filter(|stem| !stem.is_empty())
        .map(OsString::from)
}

fn is_pdf(name: &OsString) -> bool {
    name.to_string_lossy().to_ascii_lowercase().ends_with(".pdf")
}

/// Move a browser-named download onto its deterministic artifact path.
pub fn adopt_download(found: &Path, target: &Path) -> Result<()> {
    if found == target {
        return Ok(());
    }
    std::fs::rename(found, target).map_err(|e| MfDocsError::io(target, e))
}
