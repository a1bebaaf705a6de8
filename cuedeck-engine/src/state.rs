//! Shared engine state
//!
//! Read-heavy status snapshots for the control surface. Written only by
//! the engine control task after each transition; API handlers and SSE
//! code read, never mutate.

use crate::show::CueKind;
use cuedeck_common::events::{DeckId, DeckPhase, EventBus, OverlayInfo, ShowEvent, VolumeStep};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Published view of one deck
#[derive(Debug, Clone, Serialize)]
pub struct DeckSnapshot {
    pub phase: DeckPhase,
    pub cue_id: Option<Uuid>,
    pub cue_name: Option<String>,
    pub cue_kind: Option<CueKind>,
    /// Best-effort position in seconds (advisory)
    pub position_secs: Option<f64>,
    /// Trimmed-window duration when known
    pub duration_secs: Option<f64>,
    pub volume: VolumeStep,
    pub loop_enabled: bool,
}

impl DeckSnapshot {
    pub fn empty(volume: VolumeStep) -> Self {
        Self {
            phase: DeckPhase::Empty,
            cue_id: None,
            cue_name: None,
            cue_kind: None,
            position_secs: None,
            duration_secs: None,
            volume,
            loop_enabled: false,
        }
    }
}

/// Published selection cursors
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelectionSnapshot {
    pub scene_id: Option<Uuid>,
    pub cue_id: Option<Uuid>,
}

/// Shared state accessible by all components
pub struct SharedState {
    decks: RwLock<HashMap<DeckId, DeckSnapshot>>,
    selection: RwLock<SelectionSnapshot>,
    output: RwLock<OverlayInfo>,
    events: EventBus,
}

impl SharedState {
    pub fn new(startup_volume: VolumeStep) -> Self {
        let mut decks = HashMap::new();
        decks.insert(DeckId::A, DeckSnapshot::empty(startup_volume));
        decks.insert(DeckId::B, DeckSnapshot::empty(startup_volume));
        Self {
            decks: RwLock::new(decks),
            selection: RwLock::new(SelectionSnapshot::default()),
            output: RwLock::new(OverlayInfo::Blackout),
            events: EventBus::new(256),
        }
    }

    /// Broadcast an event to all SSE listeners (no-subscribers is fine)
    pub fn broadcast(&self, event: ShowEvent) {
        self.events.emit_lossy(event);
    }

    /// Subscribe to the event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<ShowEvent> {
        self.events.subscribe()
    }

    pub async fn set_deck(&self, deck: DeckId, snapshot: DeckSnapshot) {
        self.decks.write().await.insert(deck, snapshot);
    }

    pub async fn deck(&self, deck: DeckId) -> Option<DeckSnapshot> {
        self.decks.read().await.get(&deck).cloned()
    }

    pub async fn decks(&self) -> HashMap<DeckId, DeckSnapshot> {
        self.decks.read().await.clone()
    }

    pub async fn set_deck_position(&self, deck: DeckId, position_secs: Option<f64>) {
        if let Some(snapshot) = self.decks.write().await.get_mut(&deck) {
            snapshot.position_secs = position_secs;
        }
    }

    pub async fn set_selection(&self, selection: SelectionSnapshot) {
        *self.selection.write().await = selection;
    }

    pub async fn selection(&self) -> SelectionSnapshot {
        self.selection.read().await.clone()
    }

    pub async fn set_output(&self, overlay: OverlayInfo) {
        *self.output.write().await = overlay;
    }

    pub async fn output(&self) -> OverlayInfo {
        self.output.read().await.clone()
    }
}
