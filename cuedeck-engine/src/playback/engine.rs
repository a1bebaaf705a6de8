//! Cue engine - the control task
//!
//! **Responsibilities:**
//! - Serialize every deck/scene transition through one task: operator
//!   commands arrive on the command queue, worker results (runner events,
//!   preview outcomes, probe results) on the signal queue, and nothing
//!   else ever mutates engine state
//! - Apply the advance policy on runner completion: audio/video select and
//!   load the next cue into the same deck (without starting it); image and
//!   slide cues hold until the operator acts
//! - Route cues to decks (audio → A, visuals → B) and keep the output
//!   manager, shared state and event bus in step with every transition

use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::{OutputManager, SecondScreen};
use crate::playback::backend::{resolve_backend, ResolvedBackend, SinkTarget};
use crate::playback::deck::Deck;
use crate::playback::events::{EngineSignal, RunnerEvent};
use crate::playback::runner::{MediaRunner, RunnerTiming};
use crate::preview::{PreviewGenerator, PreviewOutcome};
use crate::registry::ProcessRegistry;
use crate::show::{Cue, CueKind, SceneGraph, ShowSnapshot};
use crate::slides::SlideController;
use crate::state::{DeckSnapshot, SelectionSnapshot, SharedState};
use cuedeck_common::events::{DeckId, DeckPhase, OverlayInfo, ShowEvent, VolumeStep};
use cuedeck_common::time::{format_timecode, now};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Operator commands, answered over oneshot replies
pub enum EngineCommand {
    SelectScene {
        scene_id: Uuid,
        reply: oneshot::Sender<Result<()>>,
    },
    SelectCue {
        cue_id: Uuid,
        reply: oneshot::Sender<Result<()>>,
    },
    GoLive {
        reply: oneshot::Sender<Result<()>>,
    },
    PlaySelected {
        reply: oneshot::Sender<Result<()>>,
    },
    Play {
        deck: DeckId,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        deck: DeckId,
        reply: oneshot::Sender<Result<()>>,
    },
    TogglePause {
        deck: DeckId,
        reply: oneshot::Sender<Result<bool>>,
    },
    Seek {
        deck: DeckId,
        seconds: f64,
        reply: oneshot::Sender<Result<f64>>,
    },
    StepVolume {
        deck: DeckId,
        step: VolumeStep,
        reply: oneshot::Sender<Result<()>>,
    },
    SetLoop {
        deck: DeckId,
        enabled: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    SlideNext {
        reply: oneshot::Sender<Result<()>>,
    },
    SlidePrevious {
        reply: oneshot::Sender<Result<()>>,
    },
    AddScene {
        name: String,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    RenameScene {
        scene_id: Uuid,
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveScene {
        scene_id: Uuid,
        reply: oneshot::Sender<Result<()>>,
    },
    AddCue {
        scene_id: Uuid,
        kind: CueKind,
        path: std::path::PathBuf,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    RemoveCue {
        cue_id: Uuid,
        reply: oneshot::Sender<Result<()>>,
    },
    ShiftCue {
        cue_id: Uuid,
        delta: i64,
        reply: oneshot::Sender<Result<()>>,
    },
    MoveCue {
        cue_id: Uuid,
        scene_id: Uuid,
        index: usize,
        reply: oneshot::Sender<Result<()>>,
    },
    TrimCue {
        cue_id: Uuid,
        start: f64,
        stop: Option<f64>,
        reply: oneshot::Sender<Result<()>>,
    },
    UpdateCueMeta {
        cue_id: Uuid,
        name: Option<String>,
        note: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    RequestPreview {
        cue_id: Uuid,
        reply: oneshot::Sender<Result<u64>>,
    },
    Snapshot {
        reply: oneshot::Sender<ShowSnapshot>,
    },
    Restore {
        snapshot: ShowSnapshot,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the engine control task
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
}

impl EngineHandle {
    fn send(&self, command: EngineCommand) -> Result<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| Error::Internal("engine control task is gone".to_string()))
    }

    async fn recv<T>(&self, rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await
            .map_err(|_| Error::Internal("engine dropped the reply".to_string()))
    }

    pub async fn select_scene(&self, scene_id: Uuid) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SelectScene { scene_id, reply })?;
        self.recv(rx).await?
    }

    pub async fn select_cue(&self, cue_id: Uuid) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SelectCue { cue_id, reply })?;
        self.recv(rx).await?
    }

    pub async fn go_live(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::GoLive { reply })?;
        self.recv(rx).await?
    }

    pub async fn play_selected(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::PlaySelected { reply })?;
        self.recv(rx).await?
    }

    pub async fn play(&self, deck: DeckId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Play { deck, reply })?;
        self.recv(rx).await?
    }

    pub async fn stop(&self, deck: DeckId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Stop { deck, reply })?;
        self.recv(rx).await?
    }

    pub async fn toggle_pause(&self, deck: DeckId) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::TogglePause { deck, reply })?;
        self.recv(rx).await?
    }

    pub async fn seek(&self, deck: DeckId, seconds: f64) -> Result<f64> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Seek {
            deck,
            seconds,
            reply,
        })?;
        self.recv(rx).await?
    }

    pub async fn step_volume(&self, deck: DeckId, step: VolumeStep) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::StepVolume { deck, step, reply })?;
        self.recv(rx).await?
    }

    pub async fn set_loop(&self, deck: DeckId, enabled: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetLoop {
            deck,
            enabled,
            reply,
        })?;
        self.recv(rx).await?
    }

    pub async fn slide_next(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SlideNext { reply })?;
        self.recv(rx).await?
    }

    pub async fn slide_previous(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SlidePrevious { reply })?;
        self.recv(rx).await?
    }

    pub async fn add_scene(&self, name: String) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::AddScene { name, reply })?;
        self.recv(rx).await?
    }

    pub async fn rename_scene(&self, scene_id: Uuid, name: String) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RenameScene {
            scene_id,
            name,
            reply,
        })?;
        self.recv(rx).await?
    }

    pub async fn remove_scene(&self, scene_id: Uuid) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RemoveScene { scene_id, reply })?;
        self.recv(rx).await?
    }

    pub async fn add_cue(
        &self,
        scene_id: Uuid,
        kind: CueKind,
        path: std::path::PathBuf,
    ) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::AddCue {
            scene_id,
            kind,
            path,
            reply,
        })?;
        self.recv(rx).await?
    }

    pub async fn remove_cue(&self, cue_id: Uuid) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RemoveCue { cue_id, reply })?;
        self.recv(rx).await?
    }

    pub async fn shift_cue(&self, cue_id: Uuid, delta: i64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::ShiftCue {
            cue_id,
            delta,
            reply,
        })?;
        self.recv(rx).await?
    }

    pub async fn move_cue(&self, cue_id: Uuid, scene_id: Uuid, index: usize) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::MoveCue {
            cue_id,
            scene_id,
            index,
            reply,
        })?;
        self.recv(rx).await?
    }

    pub async fn trim_cue(&self, cue_id: Uuid, start: f64, stop: Option<f64>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::TrimCue {
            cue_id,
            start,
            stop,
            reply,
        })?;
        self.recv(rx).await?
    }

    pub async fn update_cue_meta(
        &self,
        cue_id: Uuid,
        name: Option<String>,
        note: Option<String>,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::UpdateCueMeta {
            cue_id,
            name,
            note,
            reply,
        })?;
        self.recv(rx).await?
    }

    pub async fn request_preview(&self, cue_id: Uuid) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::RequestPreview { cue_id, reply })?;
        self.recv(rx).await?
    }

    pub async fn snapshot(&self) -> Result<ShowSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Snapshot { reply })?;
        self.recv(rx).await
    }

    pub async fn restore(&self, snapshot: ShowSnapshot) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Restore { snapshot, reply })?;
        self.recv(rx).await?
    }

    /// Stop all playback and end the control task
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Shutdown { reply })?;
        self.recv(rx).await
    }
}

/// Spawn the engine control task. Returns the command handle and the task
/// handle (awaited by main after shutdown).
pub fn spawn_engine(
    config: Config,
    registry: Arc<ProcessRegistry>,
    state: Arc<SharedState>,
    screen: Arc<dyn SecondScreen>,
    slides: Arc<dyn SlideController>,
) -> (EngineHandle, tokio::task::JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (preview_tx, preview_rx) = mpsc::unbounded_channel();

    let engine = CueEngine::new(config, registry, state, screen, slides, signal_tx, preview_tx);
    let task = tokio::spawn(engine.run(cmd_rx, signal_rx, preview_rx));
    (EngineHandle { cmd_tx }, task)
}

/// The engine state machine. All fields are owned by the control task;
/// nothing here is shared or locked.
pub struct CueEngine {
    config: Config,
    backend: Option<ResolvedBackend>,
    registry: Arc<ProcessRegistry>,
    state: Arc<SharedState>,
    graph: SceneGraph,
    deck_a: Deck,
    deck_b: Deck,
    output: OutputManager,
    previews: PreviewGenerator,
    slides: Arc<dyn SlideController>,
    signal_tx: mpsc::UnboundedSender<EngineSignal>,
    /// Most recent selection-driven preview request; anything else arriving
    /// is stale
    preview_focus: Option<(Uuid, u64)>,
}

impl CueEngine {
    pub fn new(
        config: Config,
        registry: Arc<ProcessRegistry>,
        state: Arc<SharedState>,
        screen: Arc<dyn SecondScreen>,
        slides: Arc<dyn SlideController>,
        signal_tx: mpsc::UnboundedSender<EngineSignal>,
        preview_tx: mpsc::UnboundedSender<PreviewOutcome>,
    ) -> Self {
        let backend = match resolve_backend(config.backend, &config.mpv_path, &config.ffplay_path)
        {
            Ok(backend) => {
                info!("Player backend: {}", backend.name());
                Some(backend)
            }
            Err(e) => {
                warn!("{}; playback will fail until a backend is installed", e);
                None
            }
        };
        let previews = PreviewGenerator::new(
            config.ffmpeg_path.clone(),
            config.preview_cache_dir.clone(),
            Arc::clone(&registry),
            preview_tx,
        );
        let volume = config.startup_volume;
        Self {
            config,
            backend,
            registry,
            state,
            graph: SceneGraph::new(),
            deck_a: Deck::new(DeckId::A, volume),
            deck_b: Deck::new(DeckId::B, volume),
            output: OutputManager::new(screen),
            previews,
            slides,
            signal_tx,
            preview_focus: None,
        }
    }

    /// Control loop: commands and worker signals, strictly serialized
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
        mut signal_rx: mpsc::UnboundedReceiver<EngineSignal>,
        mut preview_rx: mpsc::UnboundedReceiver<PreviewOutcome>,
    ) {
        info!("Cue engine control task started");
        loop {
            tokio::select! {
                Some(command) = cmd_rx.recv() => {
                    if !self.handle_command(command).await {
                        break;
                    }
                }
                Some(signal) = signal_rx.recv() => {
                    self.handle_signal(signal).await;
                }
                Some(outcome) = preview_rx.recv() => {
                    self.handle_preview(outcome).await;
                }
                else => break,
            }
        }
        info!("Cue engine control task stopped");
    }

    // ------------------------------------------------------------------
    // Deck plumbing
    // ------------------------------------------------------------------

    fn deck(&self, id: DeckId) -> &Deck {
        match id {
            DeckId::A => &self.deck_a,
            DeckId::B => &self.deck_b,
        }
    }

    fn deck_mut(&mut self, id: DeckId) -> &mut Deck {
        match id {
            DeckId::A => &mut self.deck_a,
            DeckId::B => &mut self.deck_b,
        }
    }

    /// Fixed kind-based routing: audio on deck A, visuals on deck B
    fn route_deck(kind: CueKind) -> DeckId {
        if kind == CueKind::Audio {
            DeckId::A
        } else {
            DeckId::B
        }
    }

    fn overlay_for(cue: &Cue) -> Option<OverlayInfo> {
        match cue.kind() {
            CueKind::Video => Some(OverlayInfo::Video { cue_id: cue.id }),
            CueKind::Image => Some(OverlayInfo::Image { cue_id: cue.id }),
            CueKind::Ppt => Some(OverlayInfo::PptHandoff { cue_id: cue.id }),
            CueKind::Audio => None,
        }
    }

    async fn publish_deck(&self, id: DeckId) {
        let deck = self.deck(id);
        let snapshot = DeckSnapshot {
            phase: deck.phase(),
            cue_id: deck.cue().map(|c| c.id),
            cue_name: deck.cue().map(|c| c.display_name().to_string()),
            cue_kind: deck.cue().map(|c| c.kind()),
            position_secs: deck.runner().and_then(|r| r.position()),
            duration_secs: deck
                .cue()
                .and_then(|c| c.stop_offset().or(c.duration_hint)),
            volume: deck.volume,
            loop_enabled: deck.loop_enabled,
        };
        self.state.set_deck(id, snapshot).await;
    }

    async fn deck_transition(&self, id: DeckId, old_phase: DeckPhase) {
        self.publish_deck(id).await;
        let deck = self.deck(id);
        let new_phase = deck.phase();
        if new_phase != old_phase {
            self.state.broadcast(ShowEvent::DeckChanged {
                deck: id,
                old_phase,
                new_phase,
                cue_id: deck.cue().map(|c| c.id),
                timestamp: now(),
            });
        }
    }

    async fn output_changed(&self, overlay: Option<OverlayInfo>) {
        if let Some(overlay) = overlay {
            self.state.set_output(overlay.clone()).await;
            self.state.broadcast(ShowEvent::OutputChanged {
                overlay,
                timestamp: now(),
            });
        }
    }

    async fn publish_selection(&self) {
        self.state
            .set_selection(SelectionSnapshot {
                scene_id: self.graph.selected_scene_id(),
                cue_id: self.graph.selected_cue_id(),
            })
            .await;
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Follow-up work whenever the cue cursor lands somewhere new:
    /// publish, announce, refresh the preview, probe an unknown duration.
    async fn after_cue_selected(&mut self) {
        self.publish_selection().await;
        let Some(cue) = self.graph.selected_cue().cloned() else {
            return;
        };
        let scene_id = self.graph.selected_scene_id().expect("cue implies scene");
        self.state.broadcast(ShowEvent::CueSelected {
            scene_id,
            cue_id: cue.id,
            timestamp: now(),
        });

        let token = self.previews.request(&cue);
        self.preview_focus = Some((cue.id, token));

        if cue.duration_hint.is_none() && cue.kind() != CueKind::Ppt && cue.media_exists() {
            self.spawn_duration_probe(&cue);
        }
    }

    fn spawn_duration_probe(&self, cue: &Cue) {
        let ffprobe = self.config.ffprobe_path.clone();
        let media = cue.media_path.clone();
        let cue_id = cue.id;
        let registry = Arc::clone(&self.registry);
        let signal_tx = self.signal_tx.clone();
        tokio::spawn(async move {
            match crate::probe::probe_duration(&ffprobe, &media, &registry).await {
                Ok(seconds) => {
                    let _ = signal_tx.send(EngineSignal::DurationProbed { cue_id, seconds });
                }
                Err(e) => debug!("Duration probe failed for {}: {}", media.display(), e),
            }
        });
    }

    async fn select_scene_op(&mut self, scene_id: Uuid) -> Result<()> {
        self.graph
            .select_scene(scene_id, self.config.auto_select_on_scene_change)?;
        self.publish_selection().await;
        self.state.broadcast(ShowEvent::SceneSelected {
            scene_id: Some(scene_id),
            timestamp: now(),
        });
        if self.graph.selected_cue_id().is_some() {
            self.after_cue_selected().await;
        }
        Ok(())
    }

    async fn select_cue_op(&mut self, cue_id: Uuid) -> Result<()> {
        let old_scene = self.graph.selected_scene_id();
        let scene_id = self.graph.select_cue(cue_id)?;
        if old_scene != Some(scene_id) {
            self.state.broadcast(ShowEvent::SceneSelected {
                scene_id: Some(scene_id),
                timestamp: now(),
            });
        }
        self.after_cue_selected().await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Load the selected cue into its deck (ordered teardown of whatever
    /// was there). Returns the deck used.
    async fn load_selected(&mut self) -> Result<DeckId> {
        let cue = self
            .graph
            .selected_cue()
            .cloned()
            .ok_or_else(|| Error::InvalidState("no cue selected".to_string()))?;
        let deck_id = Self::route_deck(cue.kind());
        let old_phase = self.deck(deck_id).phase();
        let had_visual = self.deck(deck_id).is_running()
            && self.deck(deck_id).cue().map(|c| c.kind().is_visual()) == Some(true);
        self.deck_mut(deck_id).load(cue).await?;
        if had_visual {
            let overlay = self.output.deck_stopped(deck_id);
            self.output_changed(overlay).await;
        }
        self.deck_transition(deck_id, old_phase).await;
        Ok(deck_id)
    }

    /// Launch the loaded cue on a deck.
    ///
    /// Fails with `AlreadyRunning` on an occupied deck and `SpawnError` /
    /// `BackendUnavailable` without touching deck state; the cue stays
    /// loaded and the operator decides what to do.
    async fn play_deck(&mut self, deck_id: DeckId) -> Result<()> {
        if self.deck(deck_id).is_running() {
            return Err(Error::AlreadyRunning(deck_id));
        }
        // Re-read the show's version of the cue so trims edited since the
        // load are honored at launch
        let loaded = self
            .deck(deck_id)
            .cue()
            .ok_or_else(|| Error::InvalidState(format!("deck {} has no cue loaded", deck_id)))?;
        let cue = self
            .graph
            .find_cue(loaded.id)
            .map(|(_, fresh)| fresh.clone())
            .unwrap_or_else(|| loaded.clone());
        if let Some(slot) = self.deck_mut(deck_id).cue_mut() {
            *slot = cue.clone();
        }

        let old_phase = self.deck(deck_id).phase();

        if cue.kind() == CueKind::Ppt {
            let runner = MediaRunner::launch_slides(&cue, Arc::clone(&self.slides))?;
            self.deck_mut(deck_id).set_running(runner)?;
            self.deck_transition(deck_id, old_phase).await;
            // Slide sessions have no launch confirmation; the handoff is
            // immediate
            let overlay = self
                .output
                .deck_live(deck_id, OverlayInfo::PptHandoff { cue_id: cue.id });
            self.output_changed(overlay).await;
            return Ok(());
        }

        let backend = self
            .backend
            .clone()
            .ok_or_else(|| Error::BackendUnavailable("no player backend resolved".to_string()))?;
        let sink = if cue.kind().is_visual() {
            SinkTarget::SecondScreen {
                geometry: self.config.second_screen,
                fullscreen: self.config.video_fullscreen,
            }
        } else {
            SinkTarget::Primary
        };
        let timing = RunnerTiming {
            poll_interval: std::time::Duration::from_millis(self.config.position_poll_ms),
            launch_wait: std::time::Duration::from_millis(self.config.launch_wait_ms),
            grace: std::time::Duration::from_millis(self.config.terminate_grace_ms),
        };
        let volume = self.deck(deck_id).volume;
        let runner = MediaRunner::launch(
            &cue,
            &backend,
            sink,
            volume,
            timing,
            deck_id,
            Arc::clone(&self.registry),
            self.signal_tx.clone(),
        )?;
        self.deck_mut(deck_id).set_running(runner)?;
        self.deck_transition(deck_id, old_phase).await;
        Ok(())
    }

    async fn stop_deck(&mut self, deck_id: DeckId) -> Result<()> {
        if !self.deck(deck_id).is_running() {
            return Ok(());
        }
        let old_phase = self.deck(deck_id).phase();
        let was_visual = self.deck(deck_id).cue().map(|c| c.kind().is_visual()) == Some(true);
        self.deck_mut(deck_id).stop().await?;
        if was_visual {
            let overlay = self.output.deck_stopped(deck_id);
            self.output_changed(overlay).await;
        }
        self.deck_transition(deck_id, old_phase).await;
        Ok(())
    }

    async fn play_selected_op(&mut self) -> Result<()> {
        let deck_id = self.load_selected().await?;
        self.play_deck(deck_id).await
    }

    async fn toggle_pause_op(&mut self, deck: DeckId) -> Result<bool> {
        let old_phase = self.deck(deck).phase();
        let paused = {
            let runner = self
                .deck_mut(deck)
                .runner_mut()
                .ok_or_else(|| Error::InvalidState(format!("deck {} is not running", deck)))?;
            let paused = runner.toggle_pause().await?;
            runner.phase = if paused {
                DeckPhase::Paused
            } else {
                DeckPhase::Playing
            };
            paused
        };
        self.deck_transition(deck, old_phase).await;
        Ok(paused)
    }

    async fn seek_op(&mut self, deck: DeckId, seconds: f64) -> Result<f64> {
        let runner = self
            .deck_mut(deck)
            .runner_mut()
            .ok_or_else(|| Error::InvalidState(format!("deck {} is not running", deck)))?;
        runner.seek(seconds).await
    }

    async fn step_volume_op(&mut self, deck: DeckId, step: VolumeStep) -> Result<()> {
        {
            let deck_ref = self.deck_mut(deck);
            if let Some(runner) = deck_ref.runner_mut() {
                runner.step_volume(step).await?;
            }
            deck_ref.volume = step;
        }
        self.publish_deck(deck).await;
        self.state.broadcast(ShowEvent::VolumeChanged {
            deck,
            step,
            timestamp: now(),
        });
        Ok(())
    }

    /// GO LIVE: start the selected cue. When its deck is already running,
    /// stop it and immediately start the next cue in sequence.
    /// Past the last cue the engine holds position (no wraparound).
    async fn go_live(&mut self) -> Result<()> {
        if self.graph.selected_cue().is_none() {
            let first = self
                .graph
                .selected_scene()
                .and_then(|scene| scene.cues().first())
                .map(|cue| cue.id);
            match first {
                Some(cue_id) => self.select_cue_op(cue_id).await?,
                None => {
                    return Err(Error::InvalidState(
                        "no cue available to go live on".to_string(),
                    ))
                }
            }
        }

        let selected = self.graph.selected_cue().expect("selected above").clone();
        let deck_id = Self::route_deck(selected.kind());

        if self.deck(deck_id).is_running() {
            let playing_id = self
                .deck(deck_id)
                .cue()
                .map(|c| c.id)
                .expect("running deck has a cue");
            self.stop_deck(deck_id).await?;
            match self.graph.next_cue_after(playing_id).map(|c| c.id) {
                Some(next_id) => {
                    self.select_cue_op(next_id).await?;
                    let deck_id = self.load_selected().await?;
                    self.play_deck(deck_id).await
                }
                None => {
                    info!("End of cue list");
                    Ok(())
                }
            }
        } else {
            let deck_id = self.load_selected().await?;
            self.play_deck(deck_id).await
        }
    }

    // ------------------------------------------------------------------
    // Worker signals
    // ------------------------------------------------------------------

    async fn handle_signal(&mut self, signal: EngineSignal) {
        match signal {
            EngineSignal::Runner {
                deck,
                runner_id,
                event,
            } => self.handle_runner_event(deck, runner_id, event).await,
            EngineSignal::Preview(outcome) => self.handle_preview(outcome).await,
            EngineSignal::DurationProbed { cue_id, seconds } => {
                self.handle_duration_probed(cue_id, seconds).await
            }
        }
    }

    async fn handle_runner_event(&mut self, deck_id: DeckId, runner_id: Uuid, event: RunnerEvent) {
        // Events from runners a deck has already discarded are stale;
        // comparing ids is what keeps a late Finished from a torn-down
        // player mutating the deck's new occupant
        let current = self.deck(deck_id).runner().map(|r| r.id);
        if current != Some(runner_id) {
            debug!(
                "Discarding stale runner event for deck {} (runner {})",
                deck_id, runner_id
            );
            return;
        }

        match event {
            RunnerEvent::Started => {
                let old_phase = self.deck(deck_id).phase();
                if let Some(runner) = self.deck_mut(deck_id).runner_mut() {
                    runner.phase = DeckPhase::Playing;
                }
                self.deck_transition(deck_id, old_phase).await;
                let cue = self.deck(deck_id).cue().cloned();
                if let Some(cue) = cue {
                    if cue.kind().is_visual() {
                        if let Some(overlay) = Self::overlay_for(&cue) {
                            let changed = self.output.deck_live(deck_id, overlay);
                            self.output_changed(changed).await;
                        }
                    }
                }
            }

            RunnerEvent::Position { seconds } => {
                self.state.set_deck_position(deck_id, Some(seconds)).await;
                if let Some(cue) = self.deck(deck_id).cue() {
                    let duration = cue.stop_offset().or(cue.duration_hint);
                    self.state.broadcast(ShowEvent::PlaybackProgress {
                        deck: deck_id,
                        cue_id: cue.id,
                        position_ms: (seconds.max(0.0) * 1000.0) as u64,
                        duration_ms: duration.map(|d| (d * 1000.0) as u64),
                        timestamp: now(),
                    });
                }
            }

            RunnerEvent::Finished => {
                let old_phase = self.deck(deck_id).phase();
                let cue = match self.deck(deck_id).cue().cloned() {
                    Some(cue) => cue,
                    None => return,
                };
                self.deck_mut(deck_id).take_finished_runner();
                if cue.kind().is_visual() {
                    let overlay = self.output.deck_stopped(deck_id);
                    self.output_changed(overlay).await;
                }
                self.state.set_deck_position(deck_id, None).await;
                self.deck_transition(deck_id, old_phase).await;
                info!(
                    "Finished: {} ({})",
                    cue.display_name(),
                    format_timecode(cue.trimmed_duration())
                );
                self.state.broadcast(ShowEvent::CueFinished {
                    deck: deck_id,
                    cue_id: cue.id,
                    timestamp: now(),
                });
                self.apply_advance_policy(deck_id, &cue).await;
            }

            RunnerEvent::Failed { message } => {
                let old_phase = self.deck(deck_id).phase();
                let cue_id = self.deck(deck_id).cue().map(|c| c.id);
                self.deck_mut(deck_id).take_finished_runner();
                let was_visual =
                    self.deck(deck_id).cue().map(|c| c.kind().is_visual()) == Some(true);
                if was_visual {
                    let overlay = self.output.deck_stopped(deck_id);
                    self.output_changed(overlay).await;
                }
                self.state.set_deck_position(deck_id, None).await;
                self.deck_transition(deck_id, old_phase).await;
                warn!("Deck {} playback failed: {}", deck_id, message);
                if let Some(cue_id) = cue_id {
                    self.state.broadcast(ShowEvent::CueFailed {
                        deck: deck_id,
                        cue_id,
                        message,
                        timestamp: now(),
                    });
                }
                // No advance on failure: the operator decides what runs
                // next on the live output
            }

            RunnerEvent::Stopped => {
                // A terminate the engine did not orchestrate (engine stops
                // discard the runner before this arrives); collapse and
                // restore blackout if needed
                let old_phase = self.deck(deck_id).phase();
                let was_visual =
                    self.deck(deck_id).cue().map(|c| c.kind().is_visual()) == Some(true);
                self.deck_mut(deck_id).take_finished_runner();
                if was_visual {
                    let overlay = self.output.deck_stopped(deck_id);
                    self.output_changed(overlay).await;
                }
                self.state.set_deck_position(deck_id, None).await;
                self.deck_transition(deck_id, old_phase).await;
            }
        }
    }

    /// The policy table: audio/video advance (select + load, never start),
    /// image/ppt hold. Loop-enabled decks relaunch instead of advancing.
    async fn apply_advance_policy(&mut self, deck_id: DeckId, finished: &Cue) {
        if !finished.kind().auto_advances() {
            // Static visual media never advances on its own
            return;
        }

        if self.deck(deck_id).loop_enabled {
            if let Err(e) = self.play_deck(deck_id).await {
                warn!("Loop relaunch on deck {} failed: {}", deck_id, e);
            }
            return;
        }

        let next = self.graph.next_cue_after(finished.id).map(|c| c.id);
        let Some(next_id) = next else {
            return; // end of scene: hold on the last cue
        };
        if let Err(e) = self.select_cue_op(next_id).await {
            warn!("Auto-advance selection failed: {}", e);
            return;
        }
        let next_cue = match self.graph.selected_cue().cloned() {
            Some(cue) => cue,
            None => return,
        };
        let old_phase = self.deck(deck_id).phase();
        // Same deck as the finished cue, loaded but not started; starting
        // is always an operator action
        if let Err(e) = self.deck_mut(deck_id).load(next_cue).await {
            warn!("Auto-advance load failed: {}", e);
            return;
        }
        self.deck_transition(deck_id, old_phase).await;
    }

    async fn handle_preview(&mut self, outcome: PreviewOutcome) {
        if !self.previews.accept(&outcome) {
            return;
        }
        // Results for a cue that lost focus since the request are stale
        // even when they are that cue's newest
        if self.preview_focus != Some((outcome.cue_id, outcome.token)) {
            debug!(
                "Discarding preview for unfocused cue {} (token {})",
                outcome.cue_id, outcome.token
            );
            return;
        }
        match outcome.result {
            Ok(artwork) => self.state.broadcast(ShowEvent::PreviewReady {
                cue_id: outcome.cue_id,
                artwork,
                timestamp: now(),
            }),
            Err(message) => {
                warn!("Preview extraction failed for {}: {}", outcome.cue_id, message);
                self.state.broadcast(ShowEvent::PreviewFailed {
                    cue_id: outcome.cue_id,
                    message,
                    timestamp: now(),
                });
            }
        }
    }

    async fn handle_duration_probed(&mut self, cue_id: Uuid, seconds: f64) {
        if let Some(cue) = self.graph.find_cue_mut(cue_id) {
            cue.duration_hint = Some(seconds);
        }
        for deck_id in [DeckId::A, DeckId::B] {
            let matches = self.deck(deck_id).cue().map(|c| c.id) == Some(cue_id);
            if matches {
                if let Some(cue) = self.deck_mut(deck_id).cue_mut() {
                    cue.duration_hint = Some(seconds);
                }
                self.publish_deck(deck_id).await;
            }
        }
        self.state.broadcast(ShowEvent::DurationProbed {
            cue_id,
            duration_secs: seconds,
            timestamp: now(),
        });
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::SelectScene { scene_id, reply } => {
                let result = self.select_scene_op(scene_id).await;
                let _ = reply.send(result);
            }
            EngineCommand::SelectCue { cue_id, reply } => {
                let result = self.select_cue_op(cue_id).await;
                let _ = reply.send(result);
            }
            EngineCommand::GoLive { reply } => {
                let result = self.go_live().await;
                let _ = reply.send(result);
            }
            EngineCommand::PlaySelected { reply } => {
                let result = self.play_selected_op().await;
                let _ = reply.send(result);
            }
            EngineCommand::Play { deck, reply } => {
                let _ = reply.send(self.play_deck(deck).await);
            }
            EngineCommand::Stop { deck, reply } => {
                let _ = reply.send(self.stop_deck(deck).await);
            }
            EngineCommand::TogglePause { deck, reply } => {
                let result = self.toggle_pause_op(deck).await;
                let _ = reply.send(result);
            }
            EngineCommand::Seek {
                deck,
                seconds,
                reply,
            } => {
                let result = self.seek_op(deck, seconds).await;
                let _ = reply.send(result);
            }
            EngineCommand::StepVolume { deck, step, reply } => {
                let result = self.step_volume_op(deck, step).await;
                let _ = reply.send(result);
            }
            EngineCommand::SetLoop {
                deck,
                enabled,
                reply,
            } => {
                self.deck_mut(deck).loop_enabled = enabled;
                self.publish_deck(deck).await;
                let _ = reply.send(Ok(()));
            }
            EngineCommand::SlideNext { reply } => {
                let _ = reply.send(self.slide_nav(true));
            }
            EngineCommand::SlidePrevious { reply } => {
                let _ = reply.send(self.slide_nav(false));
            }
            EngineCommand::AddScene { name, reply } => {
                let had_selection = self.graph.selected_scene_id().is_some();
                let scene_id = self.graph.add_scene(name);
                if !had_selection {
                    self.publish_selection().await;
                    self.state.broadcast(ShowEvent::SceneSelected {
                        scene_id: Some(scene_id),
                        timestamp: now(),
                    });
                }
                self.show_edited();
                let _ = reply.send(Ok(scene_id));
            }
            EngineCommand::RenameScene {
                scene_id,
                name,
                reply,
            } => {
                let result = match self.graph.scene_mut(scene_id) {
                    Some(scene) => {
                        scene.name = name;
                        Ok(())
                    }
                    None => Err(Error::NotFound(format!("scene {}", scene_id))),
                };
                if result.is_ok() {
                    self.show_edited();
                }
                let _ = reply.send(result);
            }
            EngineCommand::RemoveScene { scene_id, reply } => {
                let result = self.remove_scene_op(scene_id).await;
                let _ = reply.send(result);
            }
            EngineCommand::AddCue {
                scene_id,
                kind,
                path,
                reply,
            } => {
                let cue = Cue::new(kind, path);
                let cue_id = cue.id;
                let probe = cue.kind() != CueKind::Ppt && cue.media_exists();
                let result = self.graph.add_cue(scene_id, cue);
                if result.is_ok() {
                    if probe {
                        let cue = self
                            .graph
                            .find_cue(cue_id)
                            .map(|(_, c)| c.clone())
                            .expect("cue just added");
                        self.spawn_duration_probe(&cue);
                    }
                    self.show_edited();
                }
                let _ = reply.send(result.map(|_| cue_id));
            }
            EngineCommand::RemoveCue { cue_id, reply } => {
                let result = self.remove_cue_op(cue_id).await;
                let _ = reply.send(result);
            }
            EngineCommand::ShiftCue {
                cue_id,
                delta,
                reply,
            } => {
                let result = self.graph.shift_cue(cue_id, delta);
                if matches!(result, Ok(true)) {
                    self.show_edited();
                }
                let _ = reply.send(result.map(|_| ()));
            }
            EngineCommand::MoveCue {
                cue_id,
                scene_id,
                index,
                reply,
            } => {
                let result = self.graph.move_cue(cue_id, scene_id, index);
                if result.is_ok() {
                    self.show_edited();
                }
                let _ = reply.send(result);
            }
            EngineCommand::TrimCue {
                cue_id,
                start,
                stop,
                reply,
            } => {
                let result = match self.graph.find_cue_mut(cue_id) {
                    Some(cue) => cue.set_trim(start, stop),
                    None => Err(Error::NotFound(format!("cue {}", cue_id))),
                };
                if result.is_ok() {
                    self.show_edited();
                }
                let _ = reply.send(result);
            }
            EngineCommand::UpdateCueMeta {
                cue_id,
                name,
                note,
                reply,
            } => {
                let result = match self.graph.find_cue_mut(cue_id) {
                    Some(cue) => {
                        if let Some(name) = name {
                            cue.name = name;
                        }
                        if let Some(note) = note {
                            cue.note = note;
                        }
                        Ok(())
                    }
                    None => Err(Error::NotFound(format!("cue {}", cue_id))),
                };
                if result.is_ok() {
                    self.show_edited();
                }
                let _ = reply.send(result);
            }
            EngineCommand::RequestPreview { cue_id, reply } => {
                let result = match self.graph.find_cue(cue_id) {
                    Some((_, cue)) => {
                        let cue = cue.clone();
                        let token = self.previews.request(&cue);
                        self.preview_focus = Some((cue_id, token));
                        Ok(token)
                    }
                    None => Err(Error::NotFound(format!("cue {}", cue_id))),
                };
                let _ = reply.send(result);
            }
            EngineCommand::Snapshot { reply } => {
                let _ = reply.send(self.graph.snapshot());
            }
            EngineCommand::Restore { snapshot, reply } => {
                let result = self.restore_op(snapshot).await;
                let _ = reply.send(result);
            }
            EngineCommand::Shutdown { reply } => {
                info!("Engine shutdown requested");
                if let Err(e) = self.stop_deck(DeckId::A).await {
                    warn!("Deck A teardown failed: {}", e);
                }
                if let Err(e) = self.stop_deck(DeckId::B).await {
                    warn!("Deck B teardown failed: {}", e);
                }
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn slide_nav(&self, forward: bool) -> Result<()> {
        let runner = self
            .deck(DeckId::B)
            .runner()
            .filter(|r| r.cue().kind() == CueKind::Ppt)
            .ok_or_else(|| Error::InvalidState("no slide deck is open".to_string()))?;
        if forward {
            runner.slide_next()
        } else {
            runner.slide_previous()
        }
    }

    fn show_edited(&self) {
        self.state.broadcast(ShowEvent::ShowEdited { timestamp: now() });
    }

    async fn remove_scene_op(&mut self, scene_id: Uuid) -> Result<()> {
        let old_scene = self.graph.selected_scene_id();
        let removed = self
            .graph
            .remove_scene(scene_id, self.config.auto_select_on_scene_change)?;

        // Cues die with their scene; clear any deck holding one of them
        for deck_id in [DeckId::A, DeckId::B] {
            let holds_removed = self
                .deck(deck_id)
                .cue()
                .map(|c| removed.cue(c.id).is_some())
                .unwrap_or(false);
            if holds_removed {
                self.clear_deck(deck_id).await?;
            }
        }

        self.publish_selection().await;
        if self.graph.selected_scene_id() != old_scene {
            self.state.broadcast(ShowEvent::SceneSelected {
                scene_id: self.graph.selected_scene_id(),
                timestamp: now(),
            });
            if self.graph.selected_cue_id().is_some() {
                self.after_cue_selected().await;
            }
        }
        self.show_edited();
        Ok(())
    }

    async fn remove_cue_op(&mut self, cue_id: Uuid) -> Result<()> {
        self.graph.remove_cue(cue_id)?;
        for deck_id in [DeckId::A, DeckId::B] {
            if self.deck(deck_id).cue().map(|c| c.id) == Some(cue_id) {
                self.clear_deck(deck_id).await?;
            }
        }
        self.publish_selection().await;
        self.show_edited();
        Ok(())
    }

    async fn clear_deck(&mut self, deck_id: DeckId) -> Result<()> {
        let old_phase = self.deck(deck_id).phase();
        let was_visual = self.deck(deck_id).is_running()
            && self.deck(deck_id).cue().map(|c| c.kind().is_visual()) == Some(true);
        self.deck_mut(deck_id).clear().await?;
        if was_visual {
            let overlay = self.output.deck_stopped(deck_id);
            self.output_changed(overlay).await;
        }
        self.state.set_deck_position(deck_id, None).await;
        self.deck_transition(deck_id, old_phase).await;
        Ok(())
    }

    async fn restore_op(&mut self, snapshot: ShowSnapshot) -> Result<()> {
        // Decks may hold cues that no longer exist after the restore
        self.clear_deck(DeckId::A).await?;
        self.clear_deck(DeckId::B).await?;
        self.graph
            .restore(snapshot, self.config.auto_select_on_scene_change);
        self.publish_selection().await;
        self.state.broadcast(ShowEvent::SceneSelected {
            scene_id: self.graph.selected_scene_id(),
            timestamp: now(),
        });
        if self.graph.selected_cue_id().is_some() {
            self.after_cue_selected().await;
        }
        self.show_edited();
        Ok(())
    }
}
