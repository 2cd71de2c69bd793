//! Lazy per-file diffs between historical points
//!
//! Diffs are derived values: selecting which two snapshots to compare reads
//! the store, resolving and diffing them is async, and the result is
//! memoized per `(file, request, stop)` key on the identity of the two
//! content stamps. A cached result stays valid until either stamp changes,
//! at which point the next read recomputes and the replaced cache entry
//! releases its content handles. Store state is re-read after every await:
//! a computation whose inputs moved while it was suspended is abandoned and
//! restarted against the current snapshots.

use std::sync::Arc;

use crate::error::TimelineResult;
use crate::reactive::MemoMap;
use crate::services::{ContentHandle, LineDiffOptions};
use crate::store::EditTimeline;
use crate::types::{ContentStamp, EntryDiff, EntrySnapshot, FileUri};

/// Cache key: one cell per file and scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DiffKey {
    uri: FileUri,
    request_id: Option<String>,
    stop_id: Option<String>,
}

/// Identity of a diff's inputs; compared by stamp value, never by content
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DiffInputs {
    before: ContentStamp,
    after: ContentStamp,
}

/// A memoized diff plus the content handles it was computed from; dropping
/// the entry releases the handles
pub(crate) struct CachedDiff {
    result: Arc<EntryDiff>,
    _original: ContentHandle,
    _modified: ContentHandle,
}

pub(crate) type DiffCache = MemoMap<DiffKey, DiffInputs, CachedDiff>;

struct SelectedPair {
    before: Arc<EntrySnapshot>,
    after: Arc<EntrySnapshot>,
}

impl SelectedPair {
    fn inputs(&self) -> DiffInputs {
        DiffInputs {
            before: self.before.stamp().clone(),
            after: self.after.stamp().clone(),
        }
    }
}

impl EditTimeline {
    /// Diff one file between two logical snapshots
    ///
    /// With `request_id`, diffs the snapshot at `(request_id, stop_id)`
    /// against the immediately following stop of the same request. Without
    /// it, diffs the file's first appearance in the timeline against its
    /// last. Returns `None` whenever either side cannot be selected: unknown
    /// request or stop, no following stop, file absent from a side, or a
    /// file seen only once.
    pub async fn entry_diff_between_stops(
        &self,
        uri: &FileUri,
        request_id: Option<&str>,
        stop_id: Option<&str>,
    ) -> TimelineResult<Option<Arc<EntryDiff>>> {
        // aggregate mode is keyed by the file alone
        let stop_id = if request_id.is_some() { stop_id } else { None };
        let key = DiffKey {
            uri: uri.clone(),
            request_id: request_id.map(str::to_owned),
            stop_id: stop_id.map(str::to_owned),
        };

        loop {
            let Some(pair) = self.select_diff_pair(uri, request_id, stop_id) else {
                return Ok(None);
            };
            let inputs = pair.inputs();

            {
                let cache = self.diff_cache.lock().await;
                if let Some(cached) = cache.get(&key, &inputs) {
                    return Ok(Some(cached.result.clone()));
                }
            }

            let (original, modified) = futures::future::try_join(
                self.resolver.resolve(&inputs.before.uri),
                self.resolver.resolve(&inputs.after.uri),
            )
            .await?;

            if !self.pair_still_selected(uri, request_id, stop_id, &inputs) {
                tracing::trace!(%uri, "diff inputs changed during resolution, restarting");
                continue;
            }

            let report = if pair.before.is_notebook() {
                self.notebook_diff.compute_diff(&original, &modified).await?
            } else {
                let options = LineDiffOptions {
                    ignore_trim_whitespace: self.config.ignore_trim_whitespace,
                    time_budget: self.config.diff_time_budget,
                };
                self.line_diff.compute_diff(&original, &modified, &options).await?
            };

            if !self.pair_still_selected(uri, request_id, stop_id, &inputs) {
                tracing::trace!(%uri, "diff inputs changed during computation, restarting");
                continue;
            }

            let result = Arc::new(EntryDiff {
                original: inputs.before.uri.clone(),
                modified: inputs.after.uri.clone(),
                identical: report.identical,
                quit_early: report.quit_early,
                added: report.added(),
                removed: report.removed(),
            });

            let mut cache = self.diff_cache.lock().await;
            cache.insert(
                key,
                inputs,
                CachedDiff {
                    result: result.clone(),
                    _original: original,
                    _modified: modified,
                },
            );
            return Ok(Some(result));
        }
    }

    fn pair_still_selected(
        &self,
        uri: &FileUri,
        request_id: Option<&str>,
        stop_id: Option<&str>,
        inputs: &DiffInputs,
    ) -> bool {
        self.select_diff_pair(uri, request_id, stop_id)
            .is_some_and(|pair| pair.inputs() == *inputs)
    }

    fn select_diff_pair(
        &self,
        uri: &FileUri,
        request_id: Option<&str>,
        stop_id: Option<&str>,
    ) -> Option<SelectedPair> {
        let state = self.state.read();

        match request_id {
            Some(request_id) => {
                let entry = state
                    .history
                    .iter()
                    .find(|entry| entry.request_id.as_deref() == Some(request_id))?;
                let pos = entry
                    .stops
                    .iter()
                    .position(|stop| stop.stop_id.as_deref() == stop_id)?;
                let following = entry.stops.get(pos + 1)?;
                Some(SelectedPair {
                    before: entry.stops[pos].entries.get(uri)?.clone(),
                    after: following.entries.get(uri)?.clone(),
                })
            }
            None => {
                let mut first = None;
                let mut last = None;
                let mut position = 0usize;
                for entry in &state.history {
                    for stop in &entry.stops {
                        if let Some(snapshot) = stop.entries.get(uri) {
                            if first.is_none() {
                                first = Some((position, snapshot.clone()));
                            }
                            last = Some((position, snapshot.clone()));
                        }
                        position += 1;
                    }
                }
                let (first_pos, before) = first?;
                let (last_pos, after) = last?;
                // a file seen once has nothing to diff against
                (first_pos != last_pos).then_some(SelectedPair { before, after })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimelineConfig;
    use crate::services::{MemoryContentResolver, SimilarLineDiff, StructuralNotebookDiff};
    use crate::types::SnapshotEntries;

    fn timeline_with_resolver() -> (EditTimeline, MemoryContentResolver) {
        let resolver = MemoryContentResolver::new();
        let timeline = EditTimeline::with_services(
            TimelineConfig::default(),
            Arc::new(resolver.clone()),
            Arc::new(SimilarLineDiff::new()),
            Arc::new(StructuralNotebookDiff::new()),
        );
        (timeline, resolver)
    }

    fn text_entry(uri: &str, stamp: &ContentStamp) -> SnapshotEntries {
        [(
            FileUri::new(uri),
            Arc::new(EntrySnapshot::text(stamp.clone())),
        )]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn test_aggregate_diff_counts() {
        let (timeline, resolver) = timeline_with_resolver();
        let f1 = FileUri::new("file:///f1.rs");

        let untouched = resolver.publish("a\nb\nc\nd\n");
        let edited = resolver.publish("a\nc\nd\nx\ny\nz\n");
        timeline.push_snapshot(Some("r1"), None, text_entry("file:///f1.rs", &untouched));
        timeline.push_snapshot(Some("r1"), Some("b"), text_entry("file:///f1.rs", &edited));

        let diff = timeline
            .entry_diff_between_stops(&f1, None, None)
            .await
            .unwrap()
            .unwrap();

        assert!(!diff.identical);
        assert!(!diff.quit_early);
        assert_eq!(diff.added, 3);
        assert_eq!(diff.removed, 1);
        assert_eq!(diff.original, untouched.uri);
        assert_eq!(diff.modified, edited.uri);
    }

    #[tokio::test]
    async fn test_scoped_diff_between_adjacent_stops() {
        let (timeline, resolver) = timeline_with_resolver();
        let f1 = FileUri::new("file:///f1.rs");

        let first = resolver.publish("one\n");
        let second = resolver.publish("one\ntwo\n");
        let third = resolver.publish("one\ntwo\nthree\nfour\n");
        timeline.push_snapshot(Some("r1"), None, text_entry("file:///f1.rs", &first));
        timeline.push_snapshot(Some("r1"), Some("a"), text_entry("file:///f1.rs", &second));
        timeline.push_snapshot(Some("r1"), Some("b"), text_entry("file:///f1.rs", &third));

        // None -> "a": one line added
        let diff = timeline
            .entry_diff_between_stops(&f1, Some("r1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!((diff.added, diff.removed), (1, 0));

        // "a" -> "b": two lines added
        let diff = timeline
            .entry_diff_between_stops(&f1, Some("r1"), Some("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!((diff.added, diff.removed), (2, 0));

        // "b" has no following stop
        let diff = timeline
            .entry_diff_between_stops(&f1, Some("r1"), Some("b"))
            .await
            .unwrap();
        assert!(diff.is_none());
    }

    #[tokio::test]
    async fn test_diff_absent_cases() {
        let (timeline, resolver) = timeline_with_resolver();
        let stamp = resolver.publish("text\n");
        timeline.push_snapshot(Some("r1"), None, text_entry("file:///f1.rs", &stamp));

        // file appears once
        assert!(timeline
            .entry_diff_between_stops(&FileUri::new("file:///f1.rs"), None, None)
            .await
            .unwrap()
            .is_none());
        // file never appears
        assert!(timeline
            .entry_diff_between_stops(&FileUri::new("file:///other.rs"), None, None)
            .await
            .unwrap()
            .is_none());
        // unknown request
        assert!(timeline
            .entry_diff_between_stops(&FileUri::new("file:///f1.rs"), Some("r9"), None)
            .await
            .unwrap()
            .is_none());
        // file missing from the following stop
        timeline.push_snapshot(Some("r1"), Some("a"), SnapshotEntries::new());
        assert!(timeline
            .entry_diff_between_stops(&FileUri::new("file:///f1.rs"), Some("r1"), None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_diff_memoized_until_inputs_change() {
        let (timeline, resolver) = timeline_with_resolver();
        let f1 = FileUri::new("file:///f1.rs");

        let before = resolver.publish("a\n");
        let after = resolver.publish("a\nb\n");
        timeline.push_snapshot(Some("r1"), None, text_entry("file:///f1.rs", &before));
        timeline.push_snapshot(Some("r1"), Some("a"), text_entry("file:///f1.rs", &after));

        let first = timeline
            .entry_diff_between_stops(&f1, Some("r1"), None)
            .await
            .unwrap()
            .unwrap();
        let second = timeline
            .entry_diff_between_stops(&f1, Some("r1"), None)
            .await
            .unwrap()
            .unwrap();

        // unchanged inputs return the identical memoized object
        assert!(Arc::ptr_eq(&first, &second));

        // reconciling the "after" stop changes an input stamp
        let settled = resolver.publish("a\nb\nc\n");
        timeline
            .ensure_edit_in_undo_stop_matches(
                "r1",
                Some("a"),
                &f1,
                &EntrySnapshot::text(settled.clone()),
                false,
            )
            .unwrap();

        let third = timeline
            .entry_diff_between_stops(&f1, Some("r1"), None)
            .await
            .unwrap()
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!((third.added, third.removed), (2, 0));
    }

    #[tokio::test]
    async fn test_replaced_cache_entry_releases_handles() {
        let (timeline, resolver) = timeline_with_resolver();
        let f1 = FileUri::new("file:///f1.rs");

        let before = resolver.publish("a\n");
        let after = resolver.publish("b\n");
        timeline.push_snapshot(Some("r1"), None, text_entry("file:///f1.rs", &before));
        timeline.push_snapshot(Some("r1"), Some("a"), text_entry("file:///f1.rs", &after));

        timeline
            .entry_diff_between_stops(&f1, Some("r1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolver.lease_count(&before.uri), 1);
        assert_eq!(resolver.lease_count(&after.uri), 1);

        let settled = resolver.publish("c\n");
        timeline
            .ensure_edit_in_undo_stop_matches(
                "r1",
                Some("a"),
                &f1,
                &EntrySnapshot::text(settled.clone()),
                false,
            )
            .unwrap();
        timeline
            .entry_diff_between_stops(&f1, Some("r1"), None)
            .await
            .unwrap()
            .unwrap();

        // the stale entry dropped its leases; the fresh one holds its own
        assert_eq!(resolver.lease_count(&before.uri), 1);
        assert_eq!(resolver.lease_count(&after.uri), 0);
        assert_eq!(resolver.lease_count(&settled.uri), 1);
    }

    #[tokio::test]
    async fn test_notebook_snapshots_use_structural_diff() {
        let (timeline, resolver) = timeline_with_resolver();
        let nb = FileUri::new("file:///analysis.ipynb");

        let before = resolver.publish(r#"{"cells": [{"source": "x = 1"}]}"#);
        let after =
            resolver.publish(r#"{"cells": [{"source": "x = 1"}, {"source": "print(x)"}]}"#);

        timeline.push_snapshot(
            Some("r1"),
            None,
            [(nb.clone(), Arc::new(EntrySnapshot::notebook(before.clone(), 1)))]
                .into_iter()
                .collect(),
        );
        timeline.push_snapshot(
            Some("r1"),
            Some("a"),
            [(nb.clone(), Arc::new(EntrySnapshot::notebook(after.clone(), 2)))]
                .into_iter()
                .collect(),
        );

        let diff = timeline
            .entry_diff_between_stops(&nb, Some("r1"), None)
            .await
            .unwrap()
            .unwrap();

        assert!(!diff.identical);
        assert_eq!((diff.added, diff.removed), (1, 0));
    }

    #[tokio::test]
    async fn test_no_op_stop_diffs_identical() {
        let (timeline, resolver) = timeline_with_resolver();
        let f1 = FileUri::new("file:///f1.rs");

        let stamp = resolver.publish("same\n");
        timeline.push_snapshot(Some("r1"), None, text_entry("file:///f1.rs", &stamp));
        timeline.push_snapshot(Some("r1"), Some("a"), text_entry("file:///f1.rs", &stamp));

        let diff = timeline
            .entry_diff_between_stops(&f1, Some("r1"), None)
            .await
            .unwrap()
            .unwrap();
        assert!(diff.identical);
        assert_eq!(diff.added + diff.removed, 0);
    }
}
