//! Consumed-service seams
//!
//! The timeline orchestrates three external services: content resolution,
//! line diffing, and notebook-structure diffing. Each is a trait here, with a
//! reference implementation adequate for embedding and tests. Production
//! hosts plug their own implementations in via
//! [`EditTimeline::with_services`](crate::store::EditTimeline::with_services).

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::error::{TimelineError, TimelineResult};
use crate::types::{ContentStamp, SnapshotUri};

/// Options for a line diff computation
#[derive(Debug, Clone)]
pub struct LineDiffOptions {
    /// Ignore leading/trailing whitespace on each line
    pub ignore_trim_whitespace: bool,
    /// Budget after which a partial, quit-early result is returned
    pub time_budget: Duration,
}

/// One changed range in a diff: `original_len` lines starting at
/// `original_start` became `modified_len` lines starting at `modified_start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMapping {
    pub original_start: usize,
    pub original_len: usize,
    pub modified_start: usize,
    pub modified_len: usize,
}

/// Raw outcome of a diff computation, before reduction to line counts
#[derive(Debug, Clone)]
pub struct DiffReport {
    /// The two contents are identical
    pub identical: bool,
    /// Computation hit its budget; `changes` is a lower bound
    pub quit_early: bool,
    /// Changed ranges
    pub changes: Vec<RangeMapping>,
}

impl DiffReport {
    /// Lines added, summed across all changed ranges
    pub fn added(&self) -> usize {
        self.changes.iter().map(|c| c.modified_len).sum()
    }

    /// Lines removed, summed across all changed ranges
    pub fn removed(&self) -> usize {
        self.changes.iter().map(|c| c.original_len).sum()
    }
}

/// A loadable, reference-counted handle to resolved snapshot content
///
/// The resolver's lease on the content is released when the handle drops;
/// whichever scope caches the handle owns that lifetime.
#[derive(Debug)]
pub struct ContentHandle {
    uri: SnapshotUri,
    version: u64,
    text: Arc<str>,
    _lease: Option<Lease>,
}

impl ContentHandle {
    /// Create a handle that is not leased from any resolver
    pub fn detached(uri: SnapshotUri, version: u64, text: impl Into<Arc<str>>) -> Self {
        Self {
            uri,
            version,
            text: text.into(),
            _lease: None,
        }
    }

    /// URI of the resolved content
    pub fn uri(&self) -> &SnapshotUri {
        &self.uri
    }

    /// Version of the resolved content
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The content itself
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug)]
struct Lease {
    uri: SnapshotUri,
    table: Weak<Mutex<HashMap<SnapshotUri, StoredContent>>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            if let Some(stored) = table.lock().get_mut(&self.uri) {
                stored.leases = stored.leases.saturating_sub(1);
            }
        }
    }
}

/// Resolves a snapshot URI to a content handle
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Resolve a snapshot URI, taking a lease on the content
    async fn resolve(&self, uri: &SnapshotUri) -> TimelineResult<ContentHandle>;
}

/// Generic line-oriented diff
#[async_trait]
pub trait LineDiffService: Send + Sync {
    /// Diff two resolved contents line by line
    async fn compute_diff(
        &self,
        original: &ContentHandle,
        modified: &ContentHandle,
        options: &LineDiffOptions,
    ) -> TimelineResult<DiffReport>;
}

/// Notebook-structure-aware diff
#[async_trait]
pub trait NotebookDiffService: Send + Sync {
    /// Diff two resolved notebook contents at cell granularity
    async fn compute_diff(
        &self,
        original: &ContentHandle,
        modified: &ContentHandle,
    ) -> TimelineResult<DiffReport>;
}

#[derive(Debug)]
struct StoredContent {
    text: Arc<str>,
    version: u64,
    leases: usize,
}

/// In-memory content resolver
///
/// Holds published snapshot contents in a table and counts outstanding
/// leases per URI. Suitable for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentResolver {
    table: Arc<Mutex<HashMap<SnapshotUri, StoredContent>>>,
}

impl MemoryContentResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish content under a fresh snapshot URI
    pub fn publish(&self, text: impl Into<Arc<str>>) -> ContentStamp {
        self.publish_at(SnapshotUri::generate(), text)
    }

    /// Publish content under a given URI, bumping its version if it exists
    pub fn publish_at(&self, uri: SnapshotUri, text: impl Into<Arc<str>>) -> ContentStamp {
        let mut table = self.table.lock();
        let next_version = table.get(&uri).map_or(1, |stored| stored.version + 1);
        table.insert(
            uri.clone(),
            StoredContent {
                text: text.into(),
                version: next_version,
                leases: 0,
            },
        );
        ContentStamp::new(uri, next_version)
    }

    /// Number of outstanding leases for a URI
    pub fn lease_count(&self, uri: &SnapshotUri) -> usize {
        self.table.lock().get(uri).map_or(0, |stored| stored.leases)
    }
}

#[async_trait]
impl ContentResolver for MemoryContentResolver {
    async fn resolve(&self, uri: &SnapshotUri) -> TimelineResult<ContentHandle> {
        let mut table = self.table.lock();
        let stored = table
            .get_mut(uri)
            .ok_or_else(|| TimelineError::resolve(format!("unknown snapshot {uri}")))?;
        stored.leases += 1;

        Ok(ContentHandle {
            uri: uri.clone(),
            version: stored.version,
            text: stored.text.clone(),
            _lease: Some(Lease {
                uri: uri.clone(),
                table: Arc::downgrade(&self.table),
            }),
        })
    }
}

/// Line diff backed by the `similar` crate
#[derive(Debug, Clone, Default)]
pub struct SimilarLineDiff;

impl SimilarLineDiff {
    /// Create a new diff service
    pub fn new() -> Self {
        Self
    }

    fn normalized(text: &str, trim: bool) -> String {
        if trim {
            let mut out = String::with_capacity(text.len());
            for line in text.lines() {
                out.push_str(line.trim());
                out.push('\n');
            }
            out
        } else {
            text.to_string()
        }
    }
}

#[async_trait]
impl LineDiffService for SimilarLineDiff {
    async fn compute_diff(
        &self,
        original: &ContentHandle,
        modified: &ContentHandle,
        options: &LineDiffOptions,
    ) -> TimelineResult<DiffReport> {
        let started = Instant::now();
        let old = Self::normalized(original.text(), options.ignore_trim_whitespace);
        let new = Self::normalized(modified.text(), options.ignore_trim_whitespace);

        let diff = similar::TextDiffConfig::default()
            .timeout(options.time_budget)
            .diff_lines(&old, &new);

        let mut changes = Vec::new();
        for op in diff.ops() {
            match *op {
                similar::DiffOp::Equal { .. } => {}
                similar::DiffOp::Delete {
                    old_index,
                    old_len,
                    new_index,
                } => changes.push(RangeMapping {
                    original_start: old_index,
                    original_len: old_len,
                    modified_start: new_index,
                    modified_len: 0,
                }),
                similar::DiffOp::Insert {
                    old_index,
                    new_index,
                    new_len,
                } => changes.push(RangeMapping {
                    original_start: old_index,
                    original_len: 0,
                    modified_start: new_index,
                    modified_len: new_len,
                }),
                similar::DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => changes.push(RangeMapping {
                    original_start: old_index,
                    original_len: old_len,
                    modified_start: new_index,
                    modified_len: new_len,
                }),
            }
        }

        Ok(DiffReport {
            identical: changes.is_empty(),
            quit_early: started.elapsed() >= options.time_budget,
            changes,
        })
    }
}

#[derive(Debug, Deserialize)]
struct NotebookDoc {
    #[serde(default)]
    cells: Vec<NotebookCell>,
}

#[derive(Debug, Deserialize)]
struct NotebookCell {
    #[serde(default)]
    source: String,
}

/// Cell-granularity notebook diff
///
/// Parses notebook JSON (`{"cells": [{"source": ...}]}`); content that does
/// not parse is treated as a single cell. Reported counts are the line counts
/// of cells that changed.
#[derive(Debug, Clone, Default)]
pub struct StructuralNotebookDiff;

impl StructuralNotebookDiff {
    /// Create a new diff service
    pub fn new() -> Self {
        Self
    }

    fn cells(text: &str) -> Vec<String> {
        match serde_json::from_str::<NotebookDoc>(text) {
            Ok(doc) => doc.cells.into_iter().map(|cell| cell.source).collect(),
            Err(_) => vec![text.to_string()],
        }
    }

    fn line_count(cell: &str) -> usize {
        cell.lines().count()
    }
}

#[async_trait]
impl NotebookDiffService for StructuralNotebookDiff {
    async fn compute_diff(
        &self,
        original: &ContentHandle,
        modified: &ContentHandle,
    ) -> TimelineResult<DiffReport> {
        let old = Self::cells(original.text());
        let new = Self::cells(modified.text());

        let mut changes = Vec::new();
        let mut old_idx = 0;
        let mut new_idx = 0;
        let mut old_line = 0;
        let mut new_line = 0;

        while old_idx < old.len() || new_idx < new.len() {
            if old_idx < old.len() && new_idx < new.len() {
                if old[old_idx] == new[new_idx] {
                    old_line += Self::line_count(&old[old_idx]);
                    new_line += Self::line_count(&new[new_idx]);
                    old_idx += 1;
                    new_idx += 1;
                } else {
                    changes.push(RangeMapping {
                        original_start: old_line,
                        original_len: Self::line_count(&old[old_idx]),
                        modified_start: new_line,
                        modified_len: Self::line_count(&new[new_idx]),
                    });
                    old_line += Self::line_count(&old[old_idx]);
                    new_line += Self::line_count(&new[new_idx]);
                    old_idx += 1;
                    new_idx += 1;
                }
            } else if old_idx < old.len() {
                changes.push(RangeMapping {
                    original_start: old_line,
                    original_len: Self::line_count(&old[old_idx]),
                    modified_start: new_line,
                    modified_len: 0,
                });
                old_line += Self::line_count(&old[old_idx]);
                old_idx += 1;
            } else {
                changes.push(RangeMapping {
                    original_start: old_line,
                    original_len: 0,
                    modified_start: new_line,
                    modified_len: Self::line_count(&new[new_idx]),
                });
                new_line += Self::line_count(&new[new_idx]);
                new_idx += 1;
            }
        }

        Ok(DiffReport {
            identical: changes.is_empty(),
            quit_early: false,
            changes,
        })
    }
}
