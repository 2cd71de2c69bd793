//! End-to-end session scenarios against the public API

use quill_core::{
    ContentStamp, EditTimeline, EntrySnapshot, FileUri, MemoryContentResolver, RequestDisablement,
    SimilarLineDiff, SnapshotEntries, StructuralNotebookDiff, TimelineConfig,
};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("quill_core=debug")
        .try_init();
}

fn session() -> (EditTimeline, MemoryContentResolver) {
    let resolver = MemoryContentResolver::new();
    let timeline = EditTimeline::with_services(
        TimelineConfig::default(),
        Arc::new(resolver.clone()),
        Arc::new(SimilarLineDiff::new()),
        Arc::new(StructuralNotebookDiff::new()),
    );
    (timeline, resolver)
}

fn text_entries(pairs: &[(&str, &ContentStamp)]) -> SnapshotEntries {
    pairs
        .iter()
        .map(|(uri, stamp)| {
            (
                FileUri::new(*uri),
                Arc::new(EntrySnapshot::text((*stamp).clone())),
            )
        })
        .collect()
}

#[tokio::test]
async fn full_request_cycle_with_undo_redo_and_diff() {
    init_tracing();
    let (timeline, resolver) = session();
    let main_rs = FileUri::new("file:///src/main.rs");

    let before = resolver.publish("fn main() {}\n");
    timeline.push_snapshot(Some("r1"), None, text_entries(&[("file:///src/main.rs", &before)]));

    let after = resolver.publish("fn main() {\n    let greeting = \"hi\";\n    println!(\"{greeting}\");\n}\n");
    timeline.push_snapshot(
        Some("r1"),
        Some("done"),
        text_entries(&[("file:///src/main.rs", &after)]),
    );

    let diff = timeline
        .entry_diff_between_stops(&main_rs, None, None)
        .await
        .unwrap()
        .unwrap();
    assert!(!diff.identical);
    assert_eq!((diff.added, diff.removed), (4, 1));

    // undo back to the request baseline
    assert!(timeline.can_undo());
    let undo = timeline.undo_snapshot().unwrap();
    assert_eq!(undo.target_index, 1);
    timeline.apply(&undo);
    assert!(!timeline.can_undo());
    assert_eq!(
        *timeline.request_disablement(),
        vec![RequestDisablement::Partial {
            request_id: "r1".into(),
            stop_id: Some("done".into()),
        }]
    );

    // and forward again
    let redo = timeline.redo_snapshot().unwrap();
    assert_eq!(redo.target_index, 2);
    timeline.apply(&redo);
    assert!(!timeline.can_redo());
    assert!(timeline.request_disablement().is_empty());

    // a reloaded session answers the same questions
    let json = serde_json::to_string(&timeline.state_for_persistence()).unwrap();
    let (reloaded, _) = session();
    reloaded.restore_from_state(serde_json::from_str(&json).unwrap());
    assert_eq!(reloaded.can_undo(), timeline.can_undo());
    assert_eq!(reloaded.can_redo(), timeline.can_redo());
    assert_eq!(
        reloaded.undo_snapshot().map(|t| t.target_index),
        timeline.undo_snapshot().map(|t| t.target_index)
    );
}

#[test]
fn divergent_edit_discards_redo_branch() {
    let (timeline, resolver) = session();

    let v1 = resolver.publish("one\n");
    let v2 = resolver.publish("two\n");
    let v3 = resolver.publish("three\n");
    timeline.push_snapshot(Some("r1"), None, text_entries(&[("file:///a.rs", &v1)]));
    timeline.push_snapshot(Some("r1"), Some("end"), text_entries(&[("file:///a.rs", &v2)]));
    timeline.push_snapshot(Some("r2"), None, text_entries(&[("file:///a.rs", &v3)]));

    let undo = timeline.undo_snapshot().unwrap();
    timeline.apply(&undo);
    let undo = timeline.undo_snapshot().unwrap();
    timeline.apply(&undo);
    assert_eq!(timeline.state_for_persistence().index, 1);

    // editing from here abandons everything that was undone
    let v4 = resolver.publish("four\n");
    timeline.push_snapshot(Some("r3"), None, text_entries(&[("file:///a.rs", &v4)]));

    assert!(timeline.find_snapshot("r2").is_none());
    assert!(!timeline.can_redo());
    assert_eq!(timeline.total_stop_count(), 2);
}

#[test]
fn late_edit_lands_in_next_boundary_stop() {
    let (timeline, resolver) = session();
    let side_file = FileUri::new("file:///b.rs");

    let a1 = resolver.publish("alpha\n");
    timeline.push_snapshot(Some("r1"), None, text_entries(&[("file:///a.rs", &a1)]));

    // an edit to b.rs settles after the stop was recorded
    let b1 = resolver.publish("beta\n");
    timeline
        .ensure_edit_in_undo_stop_matches(
            "r1",
            None,
            &side_file,
            &EntrySnapshot::text(b1.clone()),
            true,
        )
        .unwrap();

    // the next explicit stop carries the settled snapshot
    let a2 = resolver.publish("alpha prime\n");
    timeline.push_snapshot(Some("r1"), Some("end"), text_entries(&[("file:///a.rs", &a2)]));

    let (entry, offset) = timeline.find_edit_stop("r1", Some("end")).unwrap();
    let stop = &entry.stops[offset];
    assert!(stop.entries.contains_key(&side_file));
    assert!(stop.entries.contains_key(&FileUri::new("file:///a.rs")));
    assert_eq!(timeline.total_stop_count(), 2);
}
