//! Resume checkpoint storage.
//!
//! The [`CheckpointStore`] persists a single [`Checkpoint`] cursor as JSON:
//!
//! ```json
//! { "doc_type": "KIM", "category_index": 4, "fund_index": 17 }
//! ```
//!
//! **Write rules:**
//! - Only the traversal driver writes, and it writes *before* attempting a fund.
//! - Writes go to a temp file in the same directory and are renamed into place,
//!   so a reader never sees a half-written cursor.
//! - Anything unreadable on load means "start from the beginning".

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mfdocs_shared::{DocumentType, MfDocsError, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// The next unit of work not yet guaranteed complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Document type being traversed.
    pub doc_type: DocumentType,
    /// Zero-based category position on the listing page.
    pub category_index: usize,
    /// Zero-based fund position within the category.
    pub fund_index: usize,
    /// When the cursor was written (informational).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(doc_type: DocumentType, category_index: usize, fund_index: usize) -> Self {
        Self {
            doc_type,
            category_index,
            fund_index,
            saved_at: None,
        }
    }

    /// Cursor marking the start of `doc_type`'s pass.
    pub fn start_of(doc_type: DocumentType) -> Self {
        Self::new(doc_type, 0, 0)
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, category {}, fund {}",
            self.doc_type, self.category_index, self.fund_index
        )
    }
}

// ---------------------------------------------------------------------------
// ResumePoint
// ---------------------------------------------------------------------------

/// Skip decisions derived from the checkpoint loaded at startup.
///
/// `None` means no prior progress: nothing is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumePoint(Option<Checkpoint>);

impl ResumePoint {
    pub fn new(checkpoint: Option<Checkpoint>) -> Self {
        Self(checkpoint)
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.0.as_ref()
    }

    /// Whether the pass for `doc_type` should run at all.
    ///
    /// Only the first type can be skipped: a checkpoint naming any later type
    /// means the first type already finished.
    pub fn runs_type(&self, doc_type: DocumentType) -> bool {
        match &self.0 {
            None => true,
            Some(cp) => !doc_type.is_first() || cp.doc_type == doc_type,
        }
    }

    /// Categories strictly before the saved one are done.
    pub fn skip_category(&self, doc_type: DocumentType, category_index: usize) -> bool {
        matches!(&self.0, Some(cp) if cp.doc_type == doc_type && category_index < cp.category_index)
    }

    /// Funds strictly before the saved one, inside the saved category, are done.
    pub fn skip_fund(&self, doc_type: DocumentType, category_index: usize, fund_index: usize) -> bool {
        matches!(
            &self.0,
            Some(cp) if cp.doc_type == doc_type
                && category_index == cp.category_index
                && fund_index < cp.fund_index
        )
    }
}

// ---------------------------------------------------------------------------
// CheckpointStore
// ---------------------------------------------------------------------------

/// File-backed checkpoint persistence.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Create a store backed by `path`. Nothing touches disk until `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `checkpoint`, replacing any previous value atomically.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| MfDocsError::io(&parent, e))?;

        let mut stamped = checkpoint.clone();
        stamped.saved_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&stamped)
            .map_err(|e| MfDocsError::Checkpoint(format!("serialize failed: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| MfDocsError::io(&parent, e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| MfDocsError::io(tmp.path(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| MfDocsError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| MfDocsError::io(&self.path, e.error))?;

        info!(
            doc_type = %checkpoint.doc_type,
            category_index = checkpoint.category_index,
            fund_index = checkpoint.fund_index,
            "progress saved"
        );
        Ok(())
    }

    /// Read the last saved checkpoint.
    ///
    /// Missing or malformed state yields `None` ("start from the beginning").
    pub fn load(&self) -> Option<Checkpoint> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no checkpoint file, starting from beginning");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint unreadable, starting from beginning");
                return None;
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                info!(
                    doc_type = %checkpoint.doc_type,
                    category_index = checkpoint.category_index,
                    fund_index = checkpoint.fund_index,
                    "resuming from checkpoint"
                );
                Some(checkpoint)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint malformed, starting from beginning");
                None
            }
        }
    }

    /// Remove the persisted checkpoint. Missing file is fine.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "progress file cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MfDocsError::io(&self.path, e)),
        }
    }
}
