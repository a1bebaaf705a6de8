//! Internal playback events
//!
//! Everything worker tasks need to tell the control task flows through
//! these types into a single mpsc queue. Workers never touch deck or scene
//! state directly; the control task is the only mutator, which is what
//! keeps two operator actions from interleaving into an inconsistent deck.

use crate::preview::PreviewOutcome;
use cuedeck_common::events::DeckId;
use uuid::Uuid;

/// Events emitted by a runner's monitor task
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    /// Launch confirmed: the player process is up (and, for mpv, the IPC
    /// socket answers)
    Started,

    /// Best-effort position report (seconds into the media)
    Position { seconds: f64 },

    /// Natural end-of-media: clean process exit without a terminate request
    Finished,

    /// Terminate request serviced; the OS process is gone
    Stopped,

    /// Spawn confirmation failed or the process died unexpectedly
    Failed { message: String },
}

/// Internal event delivered into the control task's queue
#[derive(Debug)]
pub enum EngineSignal {
    /// From a runner monitor. The runner id lets the control task discard
    /// events from runners a deck has already discarded.
    Runner {
        deck: DeckId,
        runner_id: Uuid,
        event: RunnerEvent,
    },

    /// From a preview extraction task (may be stale; checked by token)
    Preview(PreviewOutcome),

    /// From a duration probe task
    DurationProbed { cue_id: Uuid, seconds: f64 },
}
