//! Show snapshot round-trip tests
//!
//! The snapshot is the seam to the persistence collaborator: writing one
//! out and reading it back must reproduce scene order, cue order and trim
//! offsets exactly.

use cuedeck_engine::show::{Cue, CueKind, SceneGraph, ShowSnapshot};
use uuid::Uuid;

fn build_show() -> (SceneGraph, Vec<Uuid>, Vec<Uuid>) {
    let mut graph = SceneGraph::new();
    let opening = graph.add_scene("Opening");
    let act1 = graph.add_scene("Act 1");

    let mut cue_ids = Vec::new();
    let mut walk_in = Cue::new(CueKind::Audio, "/media/walk-in.mp3");
    walk_in.set_trim(12.5, Some(180.0)).unwrap();
    walk_in.note = "fade house lights at 2:30".to_string();
    cue_ids.push(walk_in.id);
    graph.add_cue(opening, walk_in).unwrap();

    let title = Cue::new(CueKind::Image, "/media/title.png");
    cue_ids.push(title.id);
    graph.add_cue(opening, title).unwrap();

    let mut highlight = Cue::new(CueKind::Video, "/media/highlight.mp4");
    highlight.set_trim(0.75, None).unwrap();
    cue_ids.push(highlight.id);
    graph.add_cue(act1, highlight).unwrap();

    let slides = Cue::new(CueKind::Ppt, "/shows/keynote.pptx");
    cue_ids.push(slides.id);
    graph.add_cue(act1, slides).unwrap();

    (graph, vec![opening, act1], cue_ids)
}

#[test]
fn roundtrip_through_json_preserves_everything() {
    let (graph, scene_ids, cue_ids) = build_show();

    let json = serde_json::to_string_pretty(&graph.snapshot()).unwrap();
    let snapshot: ShowSnapshot = serde_json::from_str(&json).unwrap();
    let mut restored = SceneGraph::new();
    restored.restore(snapshot, true);

    let restored_scenes: Vec<Uuid> = restored.scenes().iter().map(|s| s.id).collect();
    assert_eq!(restored_scenes, scene_ids);

    let restored_cues: Vec<Uuid> = restored
        .scenes()
        .iter()
        .flat_map(|s| s.cues().iter().map(|c| c.id))
        .collect();
    assert_eq!(restored_cues, cue_ids);

    let walk_in = restored.find_cue(cue_ids[0]).unwrap().1;
    assert_eq!(walk_in.kind(), CueKind::Audio);
    assert_eq!(walk_in.start_offset(), 12.5);
    assert_eq!(walk_in.stop_offset(), Some(180.0));
    assert_eq!(walk_in.note, "fade house lights at 2:30");

    let highlight = restored.find_cue(cue_ids[2]).unwrap().1;
    assert_eq!(highlight.start_offset(), 0.75);
    assert_eq!(highlight.stop_offset(), None);
}

#[test]
fn roundtrip_through_file_preserves_order() {
    let (graph, scene_ids, _) = build_show();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("show.json");
    std::fs::write(&path, serde_json::to_vec(&graph.snapshot()).unwrap()).unwrap();

    let snapshot: ShowSnapshot =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let mut restored = SceneGraph::new();
    restored.restore(snapshot, true);

    let restored_scenes: Vec<Uuid> = restored.scenes().iter().map(|s| s.id).collect();
    assert_eq!(restored_scenes, scene_ids);
    // Restore selects the first scene, as at engine start
    assert_eq!(restored.selected_scene_id(), Some(scene_ids[0]));
}

#[test]
fn restore_replaces_previous_content() {
    let (graph, _, _) = build_show();
    let snapshot = graph.snapshot();

    let mut other = SceneGraph::new();
    let stale = other.add_scene("Stale");
    other
        .add_cue(stale, Cue::new(CueKind::Audio, "/media/old.mp3"))
        .unwrap();

    other.restore(snapshot, true);
    assert_eq!(other.scenes().len(), 2);
    assert!(other.scene(stale).is_none());
}
