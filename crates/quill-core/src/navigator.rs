//! Undo/redo navigation over the flat stop index
//!
//! The pointer counts applied stops, so undo means walking backward from the
//! stop at `index - 1` and redo means walking forward. The walk never crosses
//! a request boundary except to land exactly on the neighboring stop, and it
//! skips stops that record no content change relative to the walk's starting
//! stop, so navigation always lands somewhere the user can see a difference.

use std::sync::Arc;

use crate::store::{EditTimeline, NavigationTarget};
use crate::types::{RequestDisablement, TimelineState};

impl EditTimeline {
    /// Whether an undo target exists
    ///
    /// The first stop is the session baseline; the pointer never moves below
    /// one.
    pub fn can_undo(&self) -> bool {
        self.state.read().index > 1
    }

    /// Whether a redo target exists
    pub fn can_redo(&self) -> bool {
        let state = self.state.read();
        state.index < state.total_stop_count()
    }

    /// The previous meaningful stop, or `None` when nothing can be undone
    pub fn undo_snapshot(&self) -> Option<NavigationTarget> {
        let state = self.state.read();
        if state.index <= 1 {
            return None;
        }
        let candidate = Self::walk(&state, state.index - 1, true)?;
        let (_, stop) = state.stop_at(candidate)?;
        Some(NavigationTarget {
            stop: stop.clone(),
            target_index: candidate + 1,
        })
    }

    /// The next meaningful stop, or `None` when nothing can be redone
    pub fn redo_snapshot(&self) -> Option<NavigationTarget> {
        let state = self.state.read();
        if state.index >= state.total_stop_count() {
            return None;
        }
        if state.index == 0 {
            let (_, stop) = state.stop_at(0)?;
            return Some(NavigationTarget {
                stop: stop.clone(),
                target_index: 1,
            });
        }
        let candidate = Self::walk(&state, state.index - 1, false)?;
        let (_, stop) = state.stop_at(candidate)?;
        Some(NavigationTarget {
            stop: stop.clone(),
            target_index: candidate + 1,
        })
    }

    /// Walk from `start_idx` one direction, skipping stops that provide no
    /// new data over the starting stop; terminal on the first data-providing
    /// stop or on a request boundary landing
    fn walk(state: &TimelineState, start_idx: usize, step_back: bool) -> Option<usize> {
        let (start_entry, start_stop) = state.stop_at(start_idx)?;
        let total = state.total_stop_count();
        let mut cur = start_idx;

        loop {
            let next = if step_back {
                cur.checked_sub(1)
            } else {
                (cur + 1 < total).then_some(cur + 1)
            };
            let Some(next) = next else { break };
            let (next_entry, next_stop) = state.stop_at(next)?;

            if next_entry.request_id != start_entry.request_id {
                // land exactly on the boundary stop, never pass it
                cur = next;
                break;
            }
            cur = next;
            if next_stop.provides_new_data_over(start_stop) {
                break;
            }
        }

        (cur != start_idx).then_some(cur)
    }

    /// How each request should be presented for the current pointer
    ///
    /// One element per request that is fully or partially undone; requests
    /// that are fully applied are omitted. Memoized on the store revision.
    pub fn request_disablement(&self) -> Arc<Vec<RequestDisablement>> {
        let revision = self.revision();
        let mut memo = self.disablement.lock();
        if let Some(cached) = memo.get(&revision) {
            return cached.clone();
        }

        let state = self.state.read();
        let mut list = Vec::new();
        for entry in &state.history {
            let Some(request_id) = entry.request_id.clone() else {
                continue;
            };
            if entry.start_index >= state.index {
                list.push(RequestDisablement::Full { request_id });
            } else if state.index < entry.end_index() {
                let boundary = &entry.stops[state.index - entry.start_index];
                list.push(RequestDisablement::Partial {
                    request_id,
                    stop_id: boundary.stop_id.clone(),
                });
            }
        }
        drop(state);

        memo.insert(revision, Arc::new(list)).clone()
    }
}
