//! Event types for the CueDeck event system
//!
//! Provides the shared event definitions and EventBus used by the engine and
//! its control-surface clients.
//!
//! # Architecture
//!
//! CueDeck uses hybrid communication:
//! - **EventBus** (tokio::broadcast): One-to-many event broadcasting to SSE
//!   clients and other observers
//! - **Command channels** (tokio::mpsc): Request → engine control task
//! - **Shared state** (Arc<RwLock<T>>): Read-heavy status snapshots
//!
//! Events are broadcast via EventBus and can be serialized for SSE
//! transmission. Everything user-visible flows through the central
//! [`ShowEvent`] enum for type safety and exhaustive matching.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Playback deck identifier.
///
/// Deck A hosts audio cues, Deck B hosts visual cues (video/image/ppt);
/// routing is fixed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeckId {
    A,
    B,
}

impl std::fmt::Display for DeckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeckId::A => write!(f, "A"),
            DeckId::B => write!(f, "B"),
        }
    }
}

/// Observable deck phase, as published to the control surface.
///
/// Terminal runner states (finished/stopped/failed) are not phases; the deck
/// collapses back to `Loaded` when its runner reaches one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeckPhase {
    Empty,
    Loaded,
    Launching,
    Playing,
    Paused,
}

/// Discrete volume step sent to a player backend.
///
/// These are step commands, not fade curves; repeating a step is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStep {
    Mute,
    Half,
    Full,
}

impl VolumeStep {
    /// Backend volume level (0-100) for this step
    pub fn backend_level(&self) -> u8 {
        match self {
            VolumeStep::Mute => 0,
            VolumeStep::Half => 50,
            VolumeStep::Full => 100,
        }
    }
}

/// The currently visible second-screen surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "surface", rename_all = "snake_case")]
pub enum OverlayInfo {
    /// Idle black surface, shown whenever no visual cue is live
    Blackout,
    /// Live video playback for the given cue
    Video { cue_id: Uuid },
    /// Still image display for the given cue
    Image { cue_id: Uuid },
    /// Slide-deck controller owns the screen
    PptHandoff { cue_id: Uuid },
}

/// Preview artwork for a cue: an extracted frame on disk, or a named icon
/// for kinds that have no frame to extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreviewArtwork {
    Frame { path: std::path::PathBuf },
    Icon { name: String },
}

/// CueDeck event types
///
/// Broadcast by the engine control task after each state transition; the SSE
/// endpoint re-serializes them for connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShowEvent {
    /// A deck changed phase (load, launch, play, pause, teardown)
    DeckChanged {
        deck: DeckId,
        old_phase: DeckPhase,
        new_phase: DeckPhase,
        /// Cue loaded in the deck after the transition, if any
        cue_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic position report for a running deck
    ///
    /// Best-effort, sourced from backend polling; advisory only.
    PlaybackProgress {
        deck: DeckId,
        cue_id: Uuid,
        position_ms: u64,
        duration_ms: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A cue reached natural end-of-media
    CueFinished {
        deck: DeckId,
        cue_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A runner failed (spawn error or unexpected process death)
    ///
    /// The deck has already returned to `Loaded`; no auto-advance happens on
    /// failure.
    CueFailed {
        deck: DeckId,
        cue_id: Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scene selection moved
    SceneSelected {
        scene_id: Option<Uuid>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Cue selection moved
    CueSelected {
        scene_id: Uuid,
        cue_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The second-screen surface switched
    OutputChanged {
        overlay: OverlayInfo,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A requested preview finished extracting
    PreviewReady {
        cue_id: Uuid,
        artwork: PreviewArtwork,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Preview extraction failed; the UI falls back to a kind icon
    PreviewFailed {
        cue_id: Uuid,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A cue's cached duration was confirmed or refreshed by probing
    DurationProbed {
        cue_id: Uuid,
        duration_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A deck's volume step changed
    VolumeChanged {
        deck: DeckId,
        step: VolumeStep,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The show content changed (cue/scene added, removed, moved, trimmed)
    ShowEdited {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ShowEvent {
    /// Event type string used as the SSE `event:` field
    pub fn type_str(&self) -> &'static str {
        match self {
            ShowEvent::DeckChanged { .. } => "DeckChanged",
            ShowEvent::PlaybackProgress { .. } => "PlaybackProgress",
            ShowEvent::CueFinished { .. } => "CueFinished",
            ShowEvent::CueFailed { .. } => "CueFailed",
            ShowEvent::SceneSelected { .. } => "SceneSelected",
            ShowEvent::CueSelected { .. } => "CueSelected",
            ShowEvent::OutputChanged { .. } => "OutputChanged",
            ShowEvent::PreviewReady { .. } => "PreviewReady",
            ShowEvent::PreviewFailed { .. } => "PreviewFailed",
            ShowEvent::DurationProbed { .. } => "DurationProbed",
            ShowEvent::VolumeChanged { .. } => "VolumeChanged",
            ShowEvent::ShowEdited { .. } => "ShowEdited",
        }
    }
}

/// Event broadcaster wrapping tokio::sync::broadcast
///
/// Subscribers that lag behind drop the oldest events rather than blocking
/// the emitter.
pub struct EventBus {
    tx: broadcast::Sender<ShowEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ShowEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns an error when no subscriber exists; use [`emit_lossy`] when
    /// that is acceptable.
    ///
    /// [`emit_lossy`]: EventBus::emit_lossy
    pub fn emit(&self, event: ShowEvent) -> Result<usize, broadcast::error::SendError<ShowEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscribers case
    pub fn emit_lossy(&self, event: ShowEvent) {
        let _ = self.tx.send(event);
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = ShowEvent::SceneSelected {
            scene_id: None,
            timestamp: chrono::Utc::now(),
        };

        // Should return error when no subscribers
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = Arc::new(EventBus::new(100));
        let mut rx = bus.subscribe();

        let event = ShowEvent::DeckChanged {
            deck: DeckId::A,
            old_phase: DeckPhase::Loaded,
            new_phase: DeckPhase::Launching,
            cue_id: Some(Uuid::new_v4()),
            timestamp: chrono::Utc::now(),
        };

        assert!(bus.emit(event).is_ok());

        let received = rx.recv().await.unwrap();
        match received {
            ShowEvent::DeckChanged {
                deck,
                old_phase,
                new_phase,
                ..
            } => {
                assert_eq!(deck, DeckId::A);
                assert_eq!(old_phase, DeckPhase::Loaded);
                assert_eq!(new_phase, DeckPhase::Launching);
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_eventbus_emit_lossy() {
        let bus = EventBus::new(100);
        let event = ShowEvent::PlaybackProgress {
            deck: DeckId::B,
            cue_id: Uuid::new_v4(),
            position_ms: 1000,
            duration_ms: Some(60000),
            timestamp: chrono::Utc::now(),
        };

        // Should not panic even without subscribers
        bus.emit_lossy(event);
    }

    #[test]
    fn test_volume_step_levels() {
        assert_eq!(VolumeStep::Mute.backend_level(), 0);
        assert_eq!(VolumeStep::Half.backend_level(), 50);
        assert_eq!(VolumeStep::Full.backend_level(), 100);
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = ShowEvent::CueFinished {
            deck: DeckId::A,
            cue_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"CueFinished\""));
        assert_eq!(event.type_str(), "CueFinished");
    }

    #[test]
    fn test_overlay_roundtrip() {
        let overlay = OverlayInfo::Video {
            cue_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&overlay).unwrap();
        let back: OverlayInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(overlay, back);
    }
}
