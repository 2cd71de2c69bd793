//! The timeline store
//!
//! Owns the canonical ordered history of request entries and the flat
//! navigation pointer. All mutation happens synchronously inside one write
//! lock scope, so the history array and the pointer are never separately
//! observable. Structures are shared through `Arc` and replaced
//! copy-on-write: a `TimelineState` handed out earlier keeps seeing the
//! history it was read from.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::TimelineConfig;
use crate::diff::DiffCache;
use crate::reactive::MemoCell;
use crate::services::{
    ContentResolver, LineDiffService, MemoryContentResolver, NotebookDiffService, SimilarLineDiff,
    StructuralNotebookDiff,
};
use crate::types::{
    RequestDisablement, RequestEntry, SnapshotEntries, Stop, TimelineState,
};

/// A stop to navigate to, plus where the pointer lands when applied
///
/// Produced by the undo/redo walk and by
/// [`EditTimeline::get_snapshot_for_restore`]; pass it to
/// [`EditTimeline::apply`] to reposition the pointer.
#[derive(Debug, Clone)]
pub struct NavigationTarget {
    /// The stop whose recorded state becomes current
    pub stop: Arc<Stop>,
    /// Pointer value after applying: the stop's linear index plus one
    pub target_index: usize,
}

/// The editing timeline
///
/// Records per-file snapshots as requests and stops are produced, navigates
/// them with branch-discarding undo/redo, reconciles stops against
/// late-completing edits, and lazily diffs arbitrary historical points.
pub struct EditTimeline {
    pub(crate) config: TimelineConfig,
    pub(crate) state: RwLock<TimelineState>,
    revision: AtomicU64,
    pub(crate) resolver: Arc<dyn ContentResolver>,
    pub(crate) line_diff: Arc<dyn LineDiffService>,
    pub(crate) notebook_diff: Arc<dyn NotebookDiffService>,
    pub(crate) disablement: Mutex<MemoCell<u64, Arc<Vec<RequestDisablement>>>>,
    pub(crate) diff_cache: tokio::sync::Mutex<DiffCache>,
}

impl EditTimeline {
    /// Create a timeline with the reference service implementations
    pub fn new(config: TimelineConfig) -> Self {
        Self::with_services(
            config,
            Arc::new(MemoryContentResolver::new()),
            Arc::new(SimilarLineDiff::new()),
            Arc::new(StructuralNotebookDiff::new()),
        )
    }

    /// Create a timeline with custom service implementations
    pub fn with_services(
        config: TimelineConfig,
        resolver: Arc<dyn ContentResolver>,
        line_diff: Arc<dyn LineDiffService>,
        notebook_diff: Arc<dyn NotebookDiffService>,
    ) -> Self {
        Self {
            config,
            state: RwLock::new(TimelineState::default()),
            revision: AtomicU64::new(0),
            resolver,
            line_diff,
            notebook_diff,
            disablement: Mutex::new(MemoCell::new()),
            diff_cache: tokio::sync::Mutex::new(DiffCache::new()),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// Monotonic counter, bumped once per completed transaction
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    pub(crate) fn bump_revision(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    /// Total number of stops across all request entries
    pub fn total_stop_count(&self) -> usize {
        self.state.read().total_stop_count()
    }

    /// Record a checkpoint for `(request_id, stop_id)`
    ///
    /// Pushing while the pointer is behind the end of history first discards
    /// everything at or beyond the pointer: pushing after undo is a divergent
    /// edit and no redo branch survives. The new stop then joins the entry
    /// for `request_id` (replacing a trailing post-edit placeholder if one is
    /// pending, carrying its file snapshots over under the new stop id) or
    /// opens a new entry at the end of history. The pointer moves to the new
    /// end.
    pub fn push_snapshot(
        &self,
        request_id: Option<&str>,
        stop_id: Option<&str>,
        entries: SnapshotEntries,
    ) {
        let mut state = self.state.write();

        let total = state.total_stop_count();
        if state.index < total {
            let discarded = total - state.index;
            Self::truncate_at_pointer(&mut state);
            tracing::debug!(discarded, index = state.index, "discarded stops beyond pointer");
        }

        match state.history.last() {
            Some(last) if last.request_id.as_deref() == request_id => {
                let mut stops = last.stops.clone();
                let merged = match stops.last() {
                    Some(tail) if tail.is_post_edit_sentinel() => {
                        // rebase the placeholder's files onto the named stop;
                        // freshly pushed snapshots win on collision
                        let sentinel = stops.pop().expect("tail stop present");
                        let mut rebased = sentinel.entries.clone();
                        rebased.extend(entries);
                        rebased
                    }
                    _ => entries,
                };
                stops.push(Arc::new(Stop {
                    stop_id: stop_id.map(str::to_owned),
                    entries: merged,
                }));

                let entry = Arc::new(RequestEntry {
                    request_id: last.request_id.clone(),
                    start_index: last.start_index,
                    stops,
                });
                let last_pos = state.history.len() - 1;
                let mut history = state.history.clone();
                history[last_pos] = entry;
                state.history = history;
            }
            _ => {
                let start_index = state.total_stop_count();
                let entry = RequestEntry {
                    request_id: request_id.map(str::to_owned),
                    start_index,
                    stops: vec![Arc::new(Stop {
                        stop_id: stop_id.map(str::to_owned),
                        entries,
                    })],
                };
                let mut history = state.history.clone();
                history.push(Arc::new(entry));
                state.history = history;
            }
        }

        state.index = state.total_stop_count();
        tracing::debug!(
            request_id,
            stop_id,
            index = state.index,
            "recorded snapshot stop"
        );
        drop(state);
        self.bump_revision();
    }

    /// Drop entries at or beyond the pointer, and the stop-suffix of the
    /// entry straddling it
    fn truncate_at_pointer(state: &mut TimelineState) {
        let index = state.index;
        let mut history = Vec::with_capacity(state.history.len());

        for entry in &state.history {
            if entry.start_index >= index {
                break;
            }
            if entry.end_index() <= index {
                history.push(entry.clone());
            } else {
                let keep = index - entry.start_index;
                history.push(Arc::new(RequestEntry {
                    request_id: entry.request_id.clone(),
                    start_index: entry.start_index,
                    stops: entry.stops[..keep].to_vec(),
                }));
            }
        }

        state.history = history;
    }

    /// Look up the request entry for `request_id`
    pub fn find_snapshot(&self, request_id: &str) -> Option<Arc<RequestEntry>> {
        self.state
            .read()
            .history
            .iter()
            .find(|entry| entry.request_id.as_deref() == Some(request_id))
            .cloned()
    }

    /// Look up the stop for `(request_id, stop_id)`, returning its entry and
    /// its offset within the entry's stops
    pub fn find_edit_stop(
        &self,
        request_id: &str,
        stop_id: Option<&str>,
    ) -> Option<(Arc<RequestEntry>, usize)> {
        let entry = self.find_snapshot(request_id)?;
        let offset = entry
            .stops
            .iter()
            .position(|stop| stop.stop_id.as_deref() == stop_id)?;
        Some((entry, offset))
    }

    /// Look up the stop at a flat index
    pub fn stop_by_linear_index(&self, index: usize) -> Option<Arc<Stop>> {
        self.state.read().stop_at(index).map(|(_, stop)| stop.clone())
    }

    /// The stop recorded for `(request_id, stop_id)`, plus an application
    /// handle that repositions the pointer just past it
    pub fn get_snapshot_for_restore(
        &self,
        request_id: &str,
        stop_id: Option<&str>,
    ) -> Option<NavigationTarget> {
        let (entry, offset) = self.find_edit_stop(request_id, stop_id)?;
        Some(NavigationTarget {
            stop: entry.stops[offset].clone(),
            target_index: entry.start_index + offset + 1,
        })
    }

    /// Reposition the pointer to a navigation target
    pub fn apply(&self, target: &NavigationTarget) {
        let mut state = self.state.write();
        state.index = target.target_index.min(state.total_stop_count());
        tracing::debug!(index = state.index, "applied navigation target");
        drop(state);
        self.bump_revision();
    }

    /// Snapshot of the persisted state, `{history, index}` verbatim
    pub fn state_for_persistence(&self) -> TimelineState {
        self.state.read().clone()
    }

    /// Replace the timeline contents with previously persisted state
    ///
    /// A pointer beyond the restored stop count is clamped.
    pub fn restore_from_state(&self, state: TimelineState) {
        let mut guard = self.state.write();
        let total = state.total_stop_count();
        *guard = TimelineState {
            index: state.index.min(total),
            history: state.history,
        };
        tracing::debug!(
            entries = guard.history.len(),
            index = guard.index,
            "restored timeline state"
        );
        drop(guard);
        self.bump_revision();
    }
}
