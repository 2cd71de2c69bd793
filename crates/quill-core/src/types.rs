//! Timeline type definitions
//!
//! This module defines the data model for the editing timeline: per-file
//! snapshots, stops (checkpoints), request entries, and the persisted state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// URI of a file touched during the session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileUri(pub String);

impl FileUri {
    /// Create from a string
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Get the URI as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// URI of captured content at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotUri(pub String);

impl SnapshotUri {
    /// Create from a string
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Generate a fresh snapshot URI
    pub fn generate() -> Self {
        Self(format!("quill-snapshot:{}", uuid::Uuid::new_v4()))
    }

    /// Get the URI as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SnapshotUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of content at a point in time
///
/// Equality is value equality of `(uri, version)` and stands in for content
/// equality everywhere in the timeline; contents are never compared deeply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentStamp {
    /// Where the captured content can be resolved from
    pub uri: SnapshotUri,
    /// Version of the content at capture time
    pub version: u64,
}

impl ContentStamp {
    /// Create a new stamp
    pub fn new(uri: SnapshotUri, version: u64) -> Self {
        Self { uri, version }
    }
}

/// Per-file captured state at a stop
///
/// Polymorphic over the document kind; diff computation dispatches on the
/// variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntrySnapshot {
    /// A text document snapshot
    Text {
        /// Identity of the captured content
        snapshot: ContentStamp,
        /// Language of the document, when known
        language_id: Option<String>,
    },
    /// A notebook document snapshot
    Notebook {
        /// Identity of the captured content
        snapshot: ContentStamp,
        /// Number of cells at capture time
        cell_count: u32,
    },
}

impl EntrySnapshot {
    /// Create a text snapshot
    pub fn text(snapshot: ContentStamp) -> Self {
        Self::Text {
            snapshot,
            language_id: None,
        }
    }

    /// Create a text snapshot with a language
    pub fn text_with_language(snapshot: ContentStamp, language_id: impl Into<String>) -> Self {
        Self::Text {
            snapshot,
            language_id: Some(language_id.into()),
        }
    }

    /// Create a notebook snapshot
    pub fn notebook(snapshot: ContentStamp, cell_count: u32) -> Self {
        Self::Notebook {
            snapshot,
            cell_count,
        }
    }

    /// Identity of the captured content
    pub fn stamp(&self) -> &ContentStamp {
        match self {
            Self::Text { snapshot, .. } => snapshot,
            Self::Notebook { snapshot, .. } => snapshot,
        }
    }

    /// Whether this is a notebook snapshot
    pub fn is_notebook(&self) -> bool {
        matches!(self, Self::Notebook { .. })
    }

    /// Whether two snapshots capture the same content, by stamp identity
    pub fn same_content(&self, other: &EntrySnapshot) -> bool {
        self.stamp() == other.stamp()
    }
}

/// Reserved stop id for the placeholder inserted right after an edit
/// completes, before an explicit stop boundary is known
pub const POST_EDIT_STOP_ID: &str = "quill.postEditStop";

/// Map of per-file snapshots recorded at a stop
pub type SnapshotEntries = HashMap<FileUri, Arc<EntrySnapshot>>;

/// A checkpoint: the state of every touched file at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Stop id; `None` for the baseline stop of a request
    pub stop_id: Option<String>,
    /// Per-file snapshots, at most one per file URI
    pub entries: SnapshotEntries,
}

impl Stop {
    /// Create an empty stop
    pub fn new(stop_id: Option<String>) -> Self {
        Self {
            stop_id,
            entries: HashMap::new(),
        }
    }

    /// Add a file snapshot
    pub fn with_entry(mut self, uri: FileUri, snapshot: EntrySnapshot) -> Self {
        self.entries.insert(uri, Arc::new(snapshot));
        self
    }

    /// Whether this is the post-edit placeholder stop
    pub fn is_post_edit_sentinel(&self) -> bool {
        self.stop_id.as_deref() == Some(POST_EDIT_STOP_ID)
    }

    /// Whether this stop records content for any file that differs from what
    /// `base` records for it (or that `base` does not record at all)
    pub fn provides_new_data_over(&self, base: &Stop) -> bool {
        self.entries.iter().any(|(uri, snapshot)| {
            base.entries
                .get(uri)
                .map_or(true, |recorded| !recorded.same_content(snapshot))
        })
    }
}

/// All checkpoints produced while handling one request, or an anonymous
/// pre-request baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEntry {
    /// Request id; `None` for the anonymous baseline
    pub request_id: Option<String>,
    /// Flat-index position of the first stop
    pub start_index: usize,
    /// Stops in creation order; a post-edit sentinel, if present, is last
    pub stops: Vec<Arc<Stop>>,
}

impl RequestEntry {
    /// Create an entry with no stops yet
    pub fn new(request_id: Option<String>, start_index: usize) -> Self {
        Self {
            request_id,
            start_index,
            stops: Vec::new(),
        }
    }

    /// Flat index one past this entry's last stop
    pub fn end_index(&self) -> usize {
        self.start_index + self.stops.len()
    }
}

/// Result of diffing one file between two logical snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDiff {
    /// Content the diff runs from
    pub original: SnapshotUri,
    /// Content the diff runs to
    pub modified: SnapshotUri,
    /// Whether the two contents are identical
    pub identical: bool,
    /// Whether computation was cut short; counts are then a lower bound
    pub quit_early: bool,
    /// Lines added, summed across all changed ranges
    pub added: usize,
    /// Lines removed, summed across all changed ranges
    pub removed: usize,
}

/// How a request should be presented while the pointer sits at or inside it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestDisablement {
    /// Every stop of the request is undone
    Full {
        /// The undone request
        request_id: String,
    },
    /// The pointer falls strictly inside the request's stops
    Partial {
        /// The partially undone request
        request_id: String,
        /// Stop id of the first stop that is no longer applied
        stop_id: Option<String>,
    },
}

/// Persisted form of the timeline: the full history and the flat pointer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    /// Request entries in order, `start_index` ascending and contiguous
    pub history: Vec<Arc<RequestEntry>>,
    /// Number of stops currently applied, in `[0, total_stop_count]`
    pub index: usize,
}

impl TimelineState {
    /// Total number of stops across all request entries
    pub fn total_stop_count(&self) -> usize {
        self.history.last().map_or(0, |entry| entry.end_index())
    }

    /// Locate the stop at a flat index
    ///
    /// Binary search over `start_index` (entries are sorted ascending), then
    /// a linear offset into the found entry's stops.
    pub fn stop_at(&self, index: usize) -> Option<(&Arc<RequestEntry>, &Arc<Stop>)> {
        let partition = self.history.partition_point(|entry| entry.start_index <= index);
        let entry = self.history.get(partition.checked_sub(1)?)?;
        let stop = entry.stops.get(index - entry.start_index)?;
        Some((entry, stop))
    }
}
