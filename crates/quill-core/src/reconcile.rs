//! Snapshot reconciliation
//!
//! A stop records each file's state the moment the stop is created, but an
//! edit to some other file may still be streaming in at that point and only
//! complete afterwards. Reconciliation patches the recorded snapshot once the
//! edit settles, so the stop can later be diffed and undone correctly. The
//! patch is copy-on-write at every level touched: map, stop, request entry,
//! and the history array itself, so references handed out earlier stay valid.

use std::sync::Arc;

use crate::error::{TimelineError, TimelineResult};
use crate::store::EditTimeline;
use crate::types::{EntrySnapshot, FileUri, RequestEntry, Stop, POST_EDIT_STOP_ID};

impl EditTimeline {
    /// Make the snapshot recorded for `uri` at `(request_id, stop_id)` match
    /// the file's settled state
    ///
    /// With `next`, the stop immediately after `(request_id, stop_id)` is
    /// patched instead; if no such stop exists yet, a post-edit placeholder
    /// stop is appended (advancing the pointer past it in the same
    /// transaction) and patched.
    ///
    /// An unknown `request_id` or `stop_id` is a silent no-op: the session
    /// may have discarded the request concurrently. Asking for the stop after
    /// an existing placeholder is a hard error, since a request carries at
    /// most one.
    pub fn ensure_edit_in_undo_stop_matches(
        &self,
        request_id: &str,
        stop_id: Option<&str>,
        uri: &FileUri,
        settled: &EntrySnapshot,
        next: bool,
    ) -> TimelineResult<()> {
        let mut state = self.state.write();

        let Some(entry_pos) = state
            .history
            .iter()
            .position(|entry| entry.request_id.as_deref() == Some(request_id))
        else {
            tracing::trace!(request_id, "request no longer in history, skipping reconcile");
            return Ok(());
        };
        let Some(found) = state.history[entry_pos]
            .stops
            .iter()
            .position(|stop| stop.stop_id.as_deref() == stop_id)
        else {
            tracing::trace!(request_id, stop_id, "stop not found, skipping reconcile");
            return Ok(());
        };

        let mut stop_pos = found;
        let mut appended_placeholder = false;

        if next {
            let entry = &state.history[entry_pos];
            if stop_pos + 1 < entry.stops.len() {
                stop_pos += 1;
            } else {
                if entry.stops[stop_pos].is_post_edit_sentinel() {
                    return Err(TimelineError::sentinel_exists(request_id));
                }

                let insertion_index = entry.end_index();
                let mut stops = entry.stops.clone();
                stops.push(Arc::new(Stop::new(Some(POST_EDIT_STOP_ID.to_string()))));
                let patched = Arc::new(RequestEntry {
                    request_id: entry.request_id.clone(),
                    start_index: entry.start_index,
                    stops,
                });

                let mut history = state.history.clone();
                history[entry_pos] = patched;
                // keep start indices contiguous past the insertion
                for later in history.iter_mut().skip(entry_pos + 1) {
                    *later = Arc::new(RequestEntry {
                        request_id: later.request_id.clone(),
                        start_index: later.start_index + 1,
                        stops: later.stops.clone(),
                    });
                }
                state.history = history;
                if state.index >= insertion_index {
                    state.index += 1;
                }
                stop_pos += 1;
                appended_placeholder = true;
                tracing::debug!(request_id, index = state.index, "appended post-edit stop");
            }
        }

        let entry = &state.history[entry_pos];
        let stop = &entry.stops[stop_pos];
        let already_matches = stop
            .entries
            .get(uri)
            .is_some_and(|recorded| recorded.same_content(settled));

        if !already_matches {
            let mut snapshots = stop.entries.clone();
            snapshots.insert(uri.clone(), Arc::new(settled.clone()));
            let patched_stop = Arc::new(Stop {
                stop_id: stop.stop_id.clone(),
                entries: snapshots,
            });

            let mut stops = entry.stops.clone();
            stops[stop_pos] = patched_stop;
            let patched_entry = Arc::new(RequestEntry {
                request_id: entry.request_id.clone(),
                start_index: entry.start_index,
                stops,
            });

            let mut history = state.history.clone();
            history[entry_pos] = patched_entry;
            state.history = history;
            tracing::debug!(request_id, stop_id, %uri, "reconciled snapshot");
        } else if !appended_placeholder {
            // already reconciled; leave every reference untouched
            return Ok(());
        }

        drop(state);
        self.bump_revision();
        Ok(())
    }
}
