//! Portal traversal, page automation, and document download.
//!
//! This crate provides:
//! - [`page`] — The [`PageAutomation`] seam the traversal drives
//! - [`chromium`] — Chrome implementation of that seam
//! - [`locators`] — Ordered strategies for finding category and fund links
//! - [`fetcher`] — Direct HTTP download of viewer documents
//! - [`artifact`] — Artifact naming and download detection
//! - [`engine`] — The resumable [`Harvester`] traversal

pub mod artifact;
pub mod chromium;
pub mod engine;
pub mod fetcher;
pub mod locators;
pub mod page;
pub mod progress;

#[cfg(test)]
mod fixture;

pub use artifact::{artifact_filename, extract_viewer_url, sanitize_fund_name};
pub use chromium::ChromiumSession;
pub use engine::{ArtifactOutcome, FundRecord, HarvestSettings, Harvester, RunSummary};
pub use fetcher::{DocumentFetcher, HttpDownloader};
pub use locators::{LinkFilterLocator, LocatorChain, LocatorStrategy, SignatureLocator};
pub use page::{ElementHandle, PageAutomation};
pub use progress::{ProgressReporter, SilentProgress};
