//! Engine integration tests
//!
//! Drives the real control task through its handle. Slide-deck cues make a
//! full lifecycle testable without any player executable installed: the
//! null slide controller stands in for the platform automation and no OS
//! process is spawned.

use cuedeck_engine::config::Config;
use cuedeck_engine::output::LoggingSecondScreen;
use cuedeck_engine::playback::{spawn_engine, EngineHandle};
use cuedeck_engine::registry::ProcessRegistry;
use cuedeck_engine::show::CueKind;
use cuedeck_engine::slides::NullSlideController;
use cuedeck_engine::{Error, SharedState};
use cuedeck_common::events::{DeckId, DeckPhase, OverlayInfo, VolumeStep};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> Config {
    Config {
        // No player backend resolves in the test environment
        mpv_path: "/nonexistent/mpv".into(),
        ffplay_path: "/nonexistent/ffplay".into(),
        ..Config::default()
    }
}

struct TestEngine {
    handle: EngineHandle,
    state: Arc<SharedState>,
    slides: Arc<NullSlideController>,
    _task: tokio::task::JoinHandle<()>,
}

fn start_engine() -> TestEngine {
    let registry = Arc::new(ProcessRegistry::new(Duration::from_millis(200)));
    let state = Arc::new(SharedState::new(VolumeStep::Full));
    let slides = Arc::new(NullSlideController::new());
    let (handle, task) = spawn_engine(
        test_config(),
        registry,
        Arc::clone(&state),
        Arc::new(LoggingSecondScreen),
        slides.clone(),
    );
    TestEngine {
        handle,
        state,
        slides,
        _task: task,
    }
}

#[tokio::test]
async fn ppt_cue_full_lifecycle() {
    let engine = start_engine();
    let scene = engine.handle.add_scene("Keynote".to_string()).await.unwrap();
    let cue = engine
        .handle
        .add_cue(scene, CueKind::Ppt, "/shows/keynote.pptx".into())
        .await
        .unwrap();

    engine.handle.select_cue(cue).await.unwrap();
    engine.handle.play_selected().await.unwrap();

    let deck = engine.state.deck(DeckId::B).await.unwrap();
    assert_eq!(deck.phase, DeckPhase::Playing);
    assert_eq!(deck.cue_id, Some(cue));
    assert_eq!(
        engine.state.output().await,
        OverlayInfo::PptHandoff { cue_id: cue }
    );

    // Slide navigation reaches the controller while the deck runs
    engine.handle.slide_next().await.unwrap();
    engine.handle.slide_previous().await.unwrap();

    engine.handle.stop(DeckId::B).await.unwrap();
    let deck = engine.state.deck(DeckId::B).await.unwrap();
    assert_eq!(deck.phase, DeckPhase::Loaded);
    assert_eq!(deck.cue_id, Some(cue));
    assert_eq!(engine.state.output().await, OverlayInfo::Blackout);

    assert_eq!(
        engine.slides.calls(),
        vec![
            "open /shows/keynote.pptx".to_string(),
            "next".to_string(),
            "previous".to_string(),
            "close".to_string(),
        ]
    );
}

#[tokio::test]
async fn slide_navigation_without_open_deck_conflicts() {
    let engine = start_engine();
    let err = engine.handle.slide_next().await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn go_live_holds_at_end_of_cue_list() {
    let engine = start_engine();
    let scene = engine.handle.add_scene("Slides".to_string()).await.unwrap();
    let cue = engine
        .handle
        .add_cue(scene, CueKind::Ppt, "/shows/only.pptx".into())
        .await
        .unwrap();

    // Nothing selected: GO LIVE picks the first cue and starts it
    engine.handle.go_live().await.unwrap();
    assert_eq!(
        engine.state.deck(DeckId::B).await.unwrap().phase,
        DeckPhase::Playing
    );

    // Running with no next cue: stop and hold, no wraparound
    engine.handle.go_live().await.unwrap();
    let deck = engine.state.deck(DeckId::B).await.unwrap();
    assert_eq!(deck.phase, DeckPhase::Loaded);
    assert_eq!(deck.cue_id, Some(cue));
}

#[tokio::test]
async fn play_without_backend_leaves_cue_loaded() {
    let engine = start_engine();
    let scene = engine.handle.add_scene("Music".to_string()).await.unwrap();
    let cue = engine
        .handle
        .add_cue(scene, CueKind::Audio, "/media/track.mp3".into())
        .await
        .unwrap();
    engine.handle.select_cue(cue).await.unwrap();

    let err = engine.handle.play_selected().await.unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));

    // The cue stays loaded for a retry once a backend is installed
    let deck = engine.state.deck(DeckId::A).await.unwrap();
    assert_eq!(deck.phase, DeckPhase::Loaded);
    assert_eq!(deck.cue_id, Some(cue));
}

#[tokio::test]
async fn trim_edits_validate_at_edit_time() {
    let engine = start_engine();
    let scene = engine.handle.add_scene("Music".to_string()).await.unwrap();
    let cue = engine
        .handle
        .add_cue(scene, CueKind::Audio, "/media/track.mp3".into())
        .await
        .unwrap();

    let err = engine.handle.trim_cue(cue, 30.0, Some(10.0)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTiming(_)));

    engine.handle.trim_cue(cue, 5.0, Some(95.0)).await.unwrap();
    let snapshot = engine.handle.snapshot().await.unwrap();
    let cue = snapshot.scenes[0]
        .cues()
        .iter()
        .find(|c| c.id == cue)
        .unwrap();
    assert_eq!(cue.start_offset(), 5.0);
    assert_eq!(cue.stop_offset(), Some(95.0));
}

#[tokio::test]
async fn restore_resets_decks_and_selection() {
    let engine = start_engine();
    let scene = engine.handle.add_scene("Slides".to_string()).await.unwrap();
    engine
        .handle
        .add_cue(scene, CueKind::Ppt, "/shows/deck.pptx".into())
        .await
        .unwrap();
    engine.handle.go_live().await.unwrap();
    assert_eq!(
        engine.state.deck(DeckId::B).await.unwrap().phase,
        DeckPhase::Playing
    );

    let snapshot = engine.handle.snapshot().await.unwrap();
    engine.handle.restore(snapshot).await.unwrap();

    // Decks come back empty, first scene selected
    let deck = engine.state.deck(DeckId::B).await.unwrap();
    assert_eq!(deck.phase, DeckPhase::Empty);
    let selection = engine.state.selection().await;
    assert_eq!(selection.scene_id, Some(scene));
    assert_eq!(engine.state.output().await, OverlayInfo::Blackout);
}

#[tokio::test]
async fn volume_step_tracks_on_idle_deck() {
    let engine = start_engine();
    engine
        .handle
        .step_volume(DeckId::A, VolumeStep::Mute)
        .await
        .unwrap();
    // Idempotent repeat
    engine
        .handle
        .step_volume(DeckId::A, VolumeStep::Mute)
        .await
        .unwrap();
    assert_eq!(
        engine.state.deck(DeckId::A).await.unwrap().volume,
        VolumeStep::Mute
    );
}

#[tokio::test]
async fn removing_running_cue_clears_its_deck() {
    let engine = start_engine();
    let scene = engine.handle.add_scene("Slides".to_string()).await.unwrap();
    let cue = engine
        .handle
        .add_cue(scene, CueKind::Ppt, "/shows/deck.pptx".into())
        .await
        .unwrap();
    engine.handle.go_live().await.unwrap();

    engine.handle.remove_cue(cue).await.unwrap();
    let deck = engine.state.deck(DeckId::B).await.unwrap();
    assert_eq!(deck.phase, DeckPhase::Empty);
    assert_eq!(engine.state.output().await, OverlayInfo::Blackout);
}
