//! Progress callbacks for reporting traversal status.

use mfdocs_shared::DocumentType;

use crate::engine::RunSummary;

/// Receives traversal milestones; rendering is up to the caller.
pub trait ProgressReporter: Send + Sync {
    /// Called when a document-type pass starts.
    fn phase(&self, doc_type: DocumentType);
    /// Called when entering a category.
    fn category(&self, doc_type: DocumentType, index: usize, total: usize, name: &str);
    /// Called before a fund is attempted.
    fn fund(&self, doc_type: DocumentType, category_index: usize, index: usize, total: usize, name: &str);
    /// Called once the traversal finishes (not on fatal errors).
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _doc_type: DocumentType) {}
    fn category(&self, _doc_type: DocumentType, _index: usize, _total: usize, _name: &str) {}
    fn fund(
        &self,
        _doc_type: DocumentType,
        _category_index: usize,
        _index: usize,
        _total: usize,
        _name: &str,
    ) {
    }
    fn done(&self, _summary: &RunSummary) {}
}
