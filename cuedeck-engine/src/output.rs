//! Second-screen output management
//!
//! The audience-facing display shows exactly one surface at a time: the
//! blackout, or the overlay of a live visual cue. Switching is a single
//! `show` call against the surface provider, never a hide-then-show, so
//! the viewer never sees a flash of desktop or of the previous content.
//!
//! One OutputManager instance is owned by the engine and injected where
//! needed; the drawable surface itself comes from an external collaborator
//! behind [`SecondScreen`].

use cuedeck_common::events::{DeckId, OverlayInfo};
use std::collections::HashMap;
use tracing::info;

/// Surface provider supplied by the windowing collaborator.
///
/// Implementations receive the full overlay description and are expected
/// to swap surfaces atomically from the viewer's perspective.
pub trait SecondScreen: Send + Sync {
    fn show(&self, overlay: &OverlayInfo);
    fn show_blackout(&self);
}

/// Headless surface provider: logs transitions. Stands in when no
/// windowing collaborator is attached (and in tests, which assert against
/// recorded calls instead).
#[derive(Default)]
pub struct LoggingSecondScreen;

impl SecondScreen for LoggingSecondScreen {
    fn show(&self, overlay: &OverlayInfo) {
        info!("Second screen live: {:?}", overlay);
    }

    fn show_blackout(&self) {
        info!("Second screen blackout");
    }
}

/// Blackout ⇄ Live state machine over the injected surface.
///
/// Tracks which decks currently run visual cues; the screen leaves
/// blackout when the first goes live and returns only when the last
/// stops. A newer live deck takes the screen over immediately.
pub struct OutputManager {
    screen: std::sync::Arc<dyn SecondScreen>,
    visible: OverlayInfo,
    live: HashMap<DeckId, OverlayInfo>,
}

impl OutputManager {
    /// Create the manager and put the screen into blackout
    pub fn new(screen: std::sync::Arc<dyn SecondScreen>) -> Self {
        screen.show_blackout();
        Self {
            screen,
            visible: OverlayInfo::Blackout,
            live: HashMap::new(),
        }
    }

    /// Currently visible surface
    pub fn current(&self) -> &OverlayInfo {
        &self.visible
    }

    /// A deck entered `running` with a visual cue. Returns the new visible
    /// overlay when the surface changed.
    pub fn deck_live(&mut self, deck: DeckId, overlay: OverlayInfo) -> Option<OverlayInfo> {
        self.live.insert(deck, overlay.clone());
        if self.visible == overlay {
            return None;
        }
        self.visible = overlay.clone();
        self.screen.show(&overlay);
        Some(overlay)
    }

    /// A deck stopped running a visual cue. Returns the new visible overlay
    /// when the surface changed (another live deck's overlay, or blackout).
    pub fn deck_stopped(&mut self, deck: DeckId) -> Option<OverlayInfo> {
        let Some(was) = self.live.remove(&deck) else {
            return None;
        };
        if was != self.visible {
            // A later deck already owns the screen; nothing to change
            return None;
        }
        match self.live.values().next().cloned() {
            Some(overlay) => {
                // Another visual deck is still live: stay out of blackout
                self.visible = overlay.clone();
                self.screen.show(&overlay);
                Some(overlay)
            }
            None => {
                self.visible = OverlayInfo::Blackout;
                self.screen.show_blackout();
                Some(OverlayInfo::Blackout)
            }
        }
    }
}
