//! End-to-end workflows: harvest documents, inspect or reset progress, fetch
//! a single document by hand.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, instrument};

use mfdocs_crawler::{
    ChromiumSession, DocumentFetcher, HarvestSettings, Harvester, HttpDownloader,
    ProgressReporter, RunSummary,
};
use mfdocs_shared::{MfDocsError, Result, RunConfig};
use mfdocs_storage::{Checkpoint, CheckpointStore};

/// Run the full traversal.
///
/// 1. Prepare the download directory
/// 2. Launch the browser with downloads routed there
/// 3. Walk every document type, resuming from the saved checkpoint
#[instrument(skip_all, fields(download_dir = %config.download_dir.display()))]
pub async fn harvest(
    config: &RunConfig,
    progress: Box<dyn ProgressReporter>,
) -> Result<RunSummary> {
    let start = Instant::now();

    std::fs::create_dir_all(&config.download_dir)
        .map_err(|e| MfDocsError::io(&config.download_dir, e))?;

    let settings = HarvestSettings::new(config.timing.clone(), &config.portal)?;
    let fetcher = HttpDownloader::new(&config.http)?;
    let store = CheckpointStore::new(&config.checkpoint_file);
    info!(checkpoint = %store.path().display(), "starting harvest");

    let session = ChromiumSession::launch(&config.browser, &config.download_dir).await?;
    let summary = Harvester::new(session, store, Box::new(fetcher), settings, progress)
        .run(&config.download_dir)
        .await?;

    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        completed = summary.completed,
        "harvest finished"
    );
    Ok(summary)
}

/// The saved resume cursor, if any.
pub fn progress_status(config: &RunConfig) -> Option<Checkpoint> {
    CheckpointStore::new(&config.checkpoint_file).load()
}

/// Delete the saved resume cursor. Returns whether one existed.
pub fn reset_progress(config: &RunConfig) -> Result<bool> {
    let store = CheckpointStore::new(&config.checkpoint_file);
    let existed = store.path().exists();
    store.clear()?;
    if existed {
        info!(path = %store.path().display(), "progress checkpoint removed");
    }
    Ok(existed)
}

/// Download one document straight into the download directory.
///
/// For finishing funds the traversal reported as missing or failed.
#[instrument(skip(config))]
pub async fn fetch_document(config: &RunConfig, url: &str, filename: &str) -> Result<PathBuf> {
    if filename.trim().is_empty() || filename.contains(['/', '\\']) {
        return Err(MfDocsError::validation(format!(
            "'{filename}' is not a plain file name"
        )));
    }

    std::fs::create_dir_all(&config.download_dir)
        .map_err(|e| MfDocsError::io(&config.download_dir, e))?;

    let downloader = HttpDownloader::new(&config.http)?;
    if downloader.fetch(url, filename, &config.download_dir).await {
        Ok(config.download_dir.join(filename))
    } else {
        Err(MfDocsError::Network(format!("failed to fetch {url}")))
    }
}
