//! Editing timeline for AI-assisted editing sessions
//!
//! This crate records, navigates, and diffs the history of per-file
//! snapshots produced while an assistant iteratively edits files across
//! multiple user requests:
//! - A branch-discarding undo/redo log over request entries and stops,
//!   indexed by a single flat pointer
//! - Reconciliation of recorded stops against edits that complete after the
//!   stop was created
//! - Lazily computed, identity-memoized diffs between arbitrary historical
//!   points, scoped to one request or aggregated across the whole timeline
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use quill_core::{EditTimeline, EntrySnapshot, FileUri, TimelineConfig};
//!
//! let timeline = EditTimeline::new(TimelineConfig::default());
//!
//! // record checkpoints as the assistant works
//! timeline.push_snapshot(Some("request-1"), None, baseline_entries);
//! timeline.push_snapshot(Some("request-1"), Some("stop-1"), edited_entries);
//!
//! // navigate
//! if let Some(target) = timeline.undo_snapshot() {
//!     // ... restore file contents from target.stop ...
//!     timeline.apply(&target);
//! }
//!
//! // inspect what a request changed in one file
//! let diff = timeline
//!     .entry_diff_between_stops(&FileUri::new("file:///main.rs"), Some("request-1"), None)
//!     .await?;
//! ```
//!
//! # Services
//!
//! Content resolution and the two diff algorithms are consumed through
//! traits ([`ContentResolver`], [`LineDiffService`], [`NotebookDiffService`]);
//! reference implementations back [`EditTimeline::new`], and hosts plug their
//! own in via [`EditTimeline::with_services`].
//!
//! # Persistence
//!
//! [`EditTimeline::state_for_persistence`] and
//! [`EditTimeline::restore_from_state`] round-trip the `{history, index}`
//! state verbatim through serde.

pub mod config;
pub mod diff;
pub mod error;
pub mod navigator;
pub mod reactive;
pub mod reconcile;
pub mod services;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::TimelineConfig;
pub use error::{TimelineError, TimelineResult};
pub use reactive::{MemoCell, MemoMap};
pub use services::{
    ContentHandle, ContentResolver, DiffReport, LineDiffOptions, LineDiffService,
    MemoryContentResolver, NotebookDiffService, RangeMapping, SimilarLineDiff,
    StructuralNotebookDiff,
};
pub use store::{EditTimeline, NavigationTarget};
pub use types::{
    ContentStamp, EntryDiff, EntrySnapshot, FileUri, RequestDisablement, RequestEntry,
    SnapshotEntries, SnapshotUri, Stop, TimelineState, POST_EDIT_STOP_ID,
};
