//! MediaRunner: one (deck, cue) playback session over an external process
//!
//! A runner exclusively owns its player process for its lifetime; the
//! process registry holds only the pid for crash-path cleanup. The child
//! handle itself lives inside the monitor task, which confirms the launch,
//! polls position, classifies process exit, and services the terminate
//! request, so the control task never blocks on process I/O beyond the
//! bounded wait inside `terminate()`.
//!
//! State machine: Launching → Playing ⇄ Paused, ending in Finished,
//! Stopped or Failed (reported as events; the deck discards the runner on
//! any terminal event).

use crate::error::{Error, Result};
use crate::playback::backend::{BackendCapabilities, ResolvedBackend, SinkTarget};
use crate::playback::events::{EngineSignal, RunnerEvent};
use crate::playback::{ffplay, mpv};
use crate::registry::{ProcessRegistry, ProcessToken};
use crate::show::Cue;
use crate::slides::SlideController;
use cuedeck_common::events::{DeckId, DeckPhase, VolumeStep};
use serde_json::json;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

/// Where the monitor sources position reports from
enum PositionSource {
    /// Backend property polling over IPC
    Ipc(mpv::MpvIpc),
    /// Monotonic clock estimate from the start offset (ffplay)
    Clock {
        start_offset: f64,
        stop_offset: Option<f64>,
    },
}

/// Runtime control channel of a runner
enum RunnerControl {
    Mpv(mpv::MpvIpc),
    /// No runtime control; everything was baked into the launch arguments
    Ffplay,
    /// Slide-deck controller session (no OS process of our own)
    Slides(Arc<dyn SlideController>),
    #[cfg(test)]
    Stub {
        sent: Arc<Mutex<Vec<String>>>,
    },
}

/// Timing knobs a launch needs, lifted from `Config`
#[derive(Debug, Clone, Copy)]
pub struct RunnerTiming {
    pub poll_interval: Duration,
    pub launch_wait: Duration,
    pub grace: Duration,
}

/// One playback session. Owned by a deck until a terminal event, then
/// discarded.
pub struct MediaRunner {
    pub id: Uuid,
    cue: Cue,
    caps: BackendCapabilities,
    control: RunnerControl,
    /// Observable phase, maintained by the control task from runner events
    pub(crate) phase: DeckPhase,
    terminate_tx: Option<oneshot::Sender<oneshot::Sender<()>>>,
    monitor: Option<tokio::task::JoinHandle<()>>,
    last_position: Arc<Mutex<Option<f64>>>,
    last_volume: Option<VolumeStep>,
    paused: bool,
    terminated: bool,
    grace: Duration,
}

impl std::fmt::Debug for MediaRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaRunner")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("paused", &self.paused)
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl MediaRunner {
    /// Launch a player process for a cue.
    ///
    /// Spawning is synchronous and fast; launch *confirmation* happens in
    /// the monitor task, which emits `Started` (or `Failed`) into the
    /// engine's event queue. Fails immediately with `Spawn` when the
    /// executable or the media file is unusable.
    pub fn launch(
        cue: &Cue,
        backend: &ResolvedBackend,
        sink: SinkTarget,
        volume: VolumeStep,
        timing: RunnerTiming,
        deck: DeckId,
        registry: Arc<ProcessRegistry>,
        signal_tx: mpsc::UnboundedSender<EngineSignal>,
    ) -> Result<Self> {
        if !cue.media_exists() {
            return Err(Error::Spawn(format!(
                "media file missing: {}",
                cue.media_path.display()
            )));
        }

        let runner_id = Uuid::new_v4();
        let (executable, args, ipc) = match backend {
            ResolvedBackend::Mpv { executable } => {
                let socket = mpv::socket_path(runner_id);
                let args = mpv::build_args(cue, &sink, &socket, volume);
                (executable, args, Some(mpv::MpvIpc::new(socket)))
            }
            ResolvedBackend::Ffplay { executable } => {
                let args = ffplay::build_args(cue, &sink, volume);
                (executable, args, None)
            }
        };

        let mut command = tokio::process::Command::new(executable);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            Error::Spawn(format!("{} ({}): {}", backend.name(), executable.display(), e))
        })?;
        let pid = child.id();
        debug!(
            "Launched {} for cue '{}' (runner {}, pid {:?})",
            backend.name(),
            cue.display_name(),
            runner_id,
            pid
        );

        let token = registry.register(
            pid.unwrap_or(0),
            format!("{} [{}]", backend.name(), cue.display_name()),
        );

        let (terminate_tx, terminate_rx) = oneshot::channel();
        let last_position = Arc::new(Mutex::new(None));

        let position_source = match &ipc {
            Some(ipc) => PositionSource::Ipc(ipc.clone()),
            None => PositionSource::Clock {
                start_offset: cue.start_offset(),
                stop_offset: cue.stop_offset(),
            },
        };

        let monitor = tokio::spawn(monitor_task(MonitorContext {
            child,
            pid,
            confirm_ipc: ipc.clone(),
            position_source,
            deck,
            runner_id,
            registry,
            token,
            signal_tx,
            terminate_rx,
            last_position: Arc::clone(&last_position),
            timing,
        }));

        Ok(Self {
            id: runner_id,
            cue: cue.clone(),
            caps: backend.capabilities(),
            control: match ipc {
                Some(ipc) => RunnerControl::Mpv(ipc),
                None => RunnerControl::Ffplay,
            },
            phase: DeckPhase::Launching,
            terminate_tx: Some(terminate_tx),
            monitor: Some(monitor),
            last_position,
            last_volume: Some(volume),
            paused: false,
            terminated: false,
            grace: timing.grace,
        })
    }

    /// Start a slide-deck session: the controller opens the presentation
    /// and the deck counts as running until an explicit stop.
    pub fn launch_slides(cue: &Cue, controller: Arc<dyn SlideController>) -> Result<Self> {
        controller.open(&cue.media_path)?;
        Ok(Self {
            id: Uuid::new_v4(),
            cue: cue.clone(),
            // No process, no timeline: nothing is controllable mid-stream
            caps: BackendCapabilities {
                can_pause: false,
                can_seek: false,
                can_step_volume: false,
                reports_position: false,
            },
            control: RunnerControl::Slides(controller),
            phase: DeckPhase::Playing,
            terminate_tx: None,
            monitor: None,
            last_position: Arc::new(Mutex::new(None)),
            last_volume: None,
            paused: false,
            terminated: false,
            grace: Duration::ZERO,
        })
    }

    pub fn cue(&self) -> &Cue {
        &self.cue
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.caps
    }

    /// Best-effort elapsed position in seconds; advisory only
    pub fn position(&self) -> Option<f64> {
        *self
            .last_position
            .lock()
            .expect("runner position lock poisoned")
    }

    /// Toggle pause. Returns the new paused flag, or `Unsupported` when the
    /// backend cannot pause mid-stream.
    pub async fn toggle_pause(&mut self) -> Result<bool> {
        if !self.caps.can_pause {
            return Err(Error::Unsupported(format!(
                "pause not supported for {} cue on this backend",
                self.cue.kind()
            )));
        }
        let target = !self.paused;
        match &self.control {
            RunnerControl::Mpv(ipc) => ipc.set_property("pause", json!(target)).await?,
            #[cfg(test)]
            RunnerControl::Stub { sent } => sent
                .lock()
                .expect("stub log poisoned")
                .push(format!("pause {}", target)),
            _ => unreachable!("can_pause implies a controllable backend"),
        }
        self.paused = target;
        Ok(target)
    }

    /// Absolute seek, clamped to the cue's trim window. Returns the clamped
    /// target.
    pub async fn seek(&mut self, seconds: f64) -> Result<f64> {
        if !self.caps.can_seek {
            return Err(Error::Unsupported(format!(
                "seek not supported for {} cue on this backend",
                self.cue.kind()
            )));
        }
        let clamped = self.cue.clamp_seek(seconds);
        match &self.control {
            RunnerControl::Mpv(ipc) => ipc.seek_absolute(clamped).await?,
            #[cfg(test)]
            RunnerControl::Stub { sent } => sent
                .lock()
                .expect("stub log poisoned")
                .push(format!("seek {:.3}", clamped)),
            _ => unreachable!("can_seek implies a controllable backend"),
        }
        Ok(clamped)
    }

    /// Send a discrete volume step. Repeating the current step is an
    /// idempotent no-op; returns whether a command was actually sent.
    pub async fn step_volume(&mut self, step: VolumeStep) -> Result<bool> {
        if !self.caps.can_step_volume {
            return Err(Error::Unsupported(format!(
                "volume step not supported for {} cue on this backend",
                self.cue.kind()
            )));
        }
        if self.last_volume == Some(step) {
            return Ok(false);
        }
        match &self.control {
            RunnerControl::Mpv(ipc) => {
                ipc.set_property("volume", json!(step.backend_level())).await?
            }
            #[cfg(test)]
            RunnerControl::Stub { sent } => sent
                .lock()
                .expect("stub log poisoned")
                .push(format!("volume {}", step.backend_level())),
            _ => unreachable!("can_step_volume implies a controllable backend"),
        }
        self.last_volume = Some(step);
        Ok(true)
    }

    /// Forward slide navigation while a ppt cue is running
    pub fn slide_next(&self) -> Result<()> {
        match &self.control {
            RunnerControl::Slides(controller) => controller.next(),
            _ => Err(Error::Unsupported("not a slide-deck session".to_string())),
        }
    }

    pub fn slide_previous(&self) -> Result<()> {
        match &self.control {
            RunnerControl::Slides(controller) => controller.previous(),
            _ => Err(Error::Unsupported("not a slide-deck session".to_string())),
        }
    }

    /// Tear the session down. Safe in every state, including already
    /// terminal, and guarantees the OS process is gone on return: the
    /// monitor escalates graceful stop → force-kill within the bounded
    /// grace period before acknowledging.
    pub async fn terminate(&mut self) -> Result<()> {
        if self.terminated {
            return Ok(());
        }
        self.terminated = true;

        if let RunnerControl::Slides(controller) = &self.control {
            return controller.close();
        }

        if let Some(tx) = self.terminate_tx.take() {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(ack_tx).is_ok() {
                // Monitor force-kills within grace; the margin covers reaping
                let bound = self.grace + Duration::from_secs(2);
                if timeout(bound, ack_rx).await.is_err() {
                    warn!("Runner {} terminate acknowledgement timed out", self.id);
                }
            }
        }
        if let Some(monitor) = self.monitor.take() {
            // Monitor exit implies the child has been reaped
            let _ = monitor.await;
        }
        Ok(())
    }

    /// Stub runner for policy tests: no process, scripted capabilities,
    /// command log shared with the test.
    #[cfg(test)]
    pub(crate) fn stub(
        cue: &Cue,
        caps: BackendCapabilities,
        volume: VolumeStep,
    ) -> (Self, Arc<Mutex<Vec<String>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let runner = Self {
            id: Uuid::new_v4(),
            cue: cue.clone(),
            caps,
            control: RunnerControl::Stub {
                sent: Arc::clone(&sent),
            },
            phase: DeckPhase::Playing,
            terminate_tx: None,
            monitor: None,
            last_position: Arc::new(Mutex::new(None)),
            last_volume: Some(volume),
            paused: false,
            terminated: false,
            grace: Duration::ZERO,
        };
        (runner, sent)
    }
}

struct MonitorContext {
    child: tokio::process::Child,
    pid: Option<u32>,
    confirm_ipc: Option<mpv::MpvIpc>,
    position_source: PositionSource,
    deck: DeckId,
    runner_id: Uuid,
    registry: Arc<ProcessRegistry>,
    token: ProcessToken,
    signal_tx: mpsc::UnboundedSender<EngineSignal>,
    terminate_rx: oneshot::Receiver<oneshot::Sender<()>>,
    last_position: Arc<Mutex<Option<f64>>>,
    timing: RunnerTiming,
}

/// Per-runner monitor: launch confirmation, position polling, exit
/// classification, terminate servicing.
async fn monitor_task(ctx: MonitorContext) {
    let MonitorContext {
        mut child,
        pid,
        confirm_ipc,
        position_source,
        deck,
        runner_id,
        registry,
        token,
        signal_tx,
        mut terminate_rx,
        last_position,
        timing,
    } = ctx;

    let emit = |event: RunnerEvent| {
        let _ = signal_tx.send(EngineSignal::Runner {
            deck,
            runner_id,
            event,
        });
    };

    // Launch confirmation: for mpv the IPC socket must come up; ffplay is
    // confirmed by the spawn itself.
    if let Some(ipc) = &confirm_ipc {
        if !ipc.wait_ready(timing.launch_wait).await {
            let _ = child.start_kill();
            let _ = child.wait().await;
            registry.unregister(token);
            ipc.remove_socket();
            emit(RunnerEvent::Failed {
                message: "player started but its control socket never came up".to_string(),
            });
            return;
        }
    }
    emit(RunnerEvent::Started);
    let started_at = Instant::now();

    let mut poll = tokio::time::interval(timing.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            status = child.wait() => {
                registry.unregister(token);
                if let Some(ipc) = &confirm_ipc {
                    ipc.remove_socket();
                }
                let event = match status {
                    Ok(status) if status.success() => RunnerEvent::Finished,
                    Ok(status) => RunnerEvent::Failed {
                        message: format!("player exited with {}", status),
                    },
                    Err(e) => RunnerEvent::Failed {
                        message: format!("could not observe player exit: {}", e),
                    },
                };
                emit(event);
                break;
            }

            ack = &mut terminate_rx => {
                // Graceful first, then force within the grace bound
                match &confirm_ipc {
                    Some(ipc) => {
                        let _ = ipc.quit().await;
                    }
                    None => {
                        if let Some(pid) = pid {
                            crate::registry::signal_terminate(pid);
                        }
                    }
                }
                if timeout(timing.grace, child.wait()).await.is_err() {
                    warn!("Runner {} ignored graceful stop, killing", runner_id);
                    let _ = child.kill().await;
                }
                registry.unregister(token);
                if let Some(ipc) = &confirm_ipc {
                    ipc.remove_socket();
                }
                emit(RunnerEvent::Stopped);
                if let Ok(ack) = ack {
                    let _ = ack.send(());
                }
                break;
            }

            _ = poll.tick() => {
                let position = match &position_source {
                    PositionSource::Ipc(ipc) => {
                        ipc.get_property_f64("time-pos").await.ok().flatten()
                    }
                    PositionSource::Clock { start_offset, stop_offset } => {
                        let estimate = start_offset + started_at.elapsed().as_secs_f64();
                        Some(match stop_offset {
                            Some(stop) => estimate.min(*stop),
                            None => estimate,
                        })
                    }
                };
                if let Some(seconds) = position {
                    *last_position.lock().expect("runner position lock poisoned") = Some(seconds);
                    emit(RunnerEvent::Position { seconds });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::show::CueKind;

    fn full_caps() -> BackendCapabilities {
        BackendCapabilities {
            can_pause: true,
            can_seek: true,
            can_step_volume: true,
            reports_position: true,
        }
    }

    fn no_caps() -> BackendCapabilities {
        BackendCapabilities {
            can_pause: false,
            can_seek: false,
            can_step_volume: false,
            reports_position: false,
        }
    }

    #[tokio::test]
    async fn test_volume_step_idempotent() {
        let cue = Cue::new(CueKind::Audio, "/media/track.mp3");
        let (mut runner, sent) = MediaRunner::stub(&cue, full_caps(), VolumeStep::Full);

        // Repeating the launch volume sends nothing
        assert!(!runner.step_volume(VolumeStep::Full).await.unwrap());
        assert!(sent.lock().unwrap().is_empty());

        // First change sends one command; repeating it sends none
        assert!(runner.step_volume(VolumeStep::Mute).await.unwrap());
        assert!(!runner.step_volume(VolumeStep::Mute).await.unwrap());
        assert_eq!(sent.lock().unwrap().as_slice(), ["volume 0"]);

        assert!(runner.step_volume(VolumeStep::Half).await.unwrap());
        assert_eq!(sent.lock().unwrap().as_slice(), ["volume 0", "volume 50"]);
    }

    #[tokio::test]
    async fn test_unsupported_operations_are_surfaced() {
        let cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        let (mut runner, _sent) = MediaRunner::stub(&cue, no_caps(), VolumeStep::Full);

        assert!(matches!(
            runner.toggle_pause().await.unwrap_err(),
            Error::Unsupported(_)
        ));
        assert!(matches!(
            runner.seek(10.0).await.unwrap_err(),
            Error::Unsupported(_)
        ));
        assert!(matches!(
            runner.step_volume(VolumeStep::Mute).await.unwrap_err(),
            Error::Unsupported(_)
        ));
    }

    #[tokio::test]
    async fn test_seek_clamps_to_trim_window() {
        let mut cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        cue.set_trim(10.0, Some(60.0)).unwrap();
        let (mut runner, sent) = MediaRunner::stub(&cue, full_caps(), VolumeStep::Full);

        assert_eq!(runner.seek(0.0).await.unwrap(), 10.0);
        assert_eq!(runner.seek(200.0).await.unwrap(), 60.0);
        assert_eq!(runner.seek(30.0).await.unwrap(), 30.0);
        assert_eq!(
            sent.lock().unwrap().as_slice(),
            ["seek 10.000", "seek 60.000", "seek 30.000"]
        );
    }

    #[tokio::test]
    async fn test_pause_toggles() {
        let cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        let (mut runner, sent) = MediaRunner::stub(&cue, full_caps(), VolumeStep::Full);

        assert!(runner.toggle_pause().await.unwrap());
        assert!(!runner.toggle_pause().await.unwrap());
        assert_eq!(sent.lock().unwrap().as_slice(), ["pause true", "pause false"]);
    }

    #[tokio::test]
    async fn test_launch_missing_media_is_spawn_error() {
        let cue = Cue::new(CueKind::Video, "/nonexistent/clip.mp4");
        let backend = ResolvedBackend::Ffplay {
            executable: std::path::PathBuf::from("/bin/true"),
        };
        let registry = Arc::new(ProcessRegistry::new(Duration::from_millis(100)));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = MediaRunner::launch(
            &cue,
            &backend,
            SinkTarget::Primary,
            VolumeStep::Full,
            RunnerTiming {
                poll_interval: Duration::from_millis(250),
                launch_wait: Duration::from_secs(5),
                grace: Duration::from_millis(100),
            },
            DeckId::B,
            registry,
            tx,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
    }

    #[tokio::test]
    async fn test_slides_runner_terminate_closes_controller() {
        let controller = Arc::new(crate::slides::NullSlideController::new());
        let cue = Cue::new(CueKind::Ppt, "/shows/deck.pptx");
        let mut runner = MediaRunner::launch_slides(&cue, controller.clone()).unwrap();
        assert_eq!(runner.phase, DeckPhase::Playing);

        runner.terminate().await.unwrap();
        // Terminate is idempotent; close happens once
        runner.terminate().await.unwrap();
        assert_eq!(
            controller.calls(),
            vec!["open /shows/deck.pptx".to_string(), "close".to_string()]
        );
    }
}
