//! Deck: a runtime playback slot
//!
//! A deck hosts at most one runner. Loading over an occupied deck performs
//! an ordered shutdown: the previous runner reaches a terminal state
//! (terminate confirmed) before the new cue is even loaded, so two runners
//! never target the same output sink. The deck holds no policy beyond
//! that; advance decisions live in the engine.

use crate::error::{Error, Result};
use crate::playback::runner::MediaRunner;
use crate::show::Cue;
use cuedeck_common::events::{DeckId, DeckPhase, VolumeStep};

/// Deck occupancy
pub enum DeckState {
    Empty,
    Loaded(Cue),
    Running { cue: Cue, runner: MediaRunner },
}

/// A named playback slot (Deck A for audio, Deck B for visuals)
pub struct Deck {
    pub id: DeckId,
    state: DeckState,
    /// When set, audio/video cues relaunch on natural end instead of
    /// advancing
    pub loop_enabled: bool,
    /// Volume step applied at launch and tracked across step commands
    pub volume: VolumeStep,
}

impl Deck {
    pub fn new(id: DeckId, volume: VolumeStep) -> Self {
        Self {
            id,
            state: DeckState::Empty,
            loop_enabled: false,
            volume,
        }
    }

    pub fn phase(&self) -> DeckPhase {
        match &self.state {
            DeckState::Empty => DeckPhase::Empty,
            DeckState::Loaded(_) => DeckPhase::Loaded,
            DeckState::Running { runner, .. } => runner.phase,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, DeckState::Running { .. })
    }

    pub fn cue(&self) -> Option<&Cue> {
        match &self.state {
            DeckState::Empty => None,
            DeckState::Loaded(cue) => Some(cue),
            DeckState::Running { cue, .. } => Some(cue),
        }
    }

    pub fn cue_mut(&mut self) -> Option<&mut Cue> {
        match &mut self.state {
            DeckState::Empty => None,
            DeckState::Loaded(cue) => Some(cue),
            DeckState::Running { cue, .. } => Some(cue),
        }
    }

    pub fn runner(&self) -> Option<&MediaRunner> {
        match &self.state {
            DeckState::Running { runner, .. } => Some(runner),
            _ => None,
        }
    }

    pub fn runner_mut(&mut self) -> Option<&mut MediaRunner> {
        match &mut self.state {
            DeckState::Running { runner, .. } => Some(runner),
            _ => None,
        }
    }

    /// Load a cue, tearing down any existing runner first.
    ///
    /// Blocks (bounded) until the previous runner's terminate confirms the
    /// process is gone; only then does the deck transition to `Loaded`.
    pub async fn load(&mut self, cue: Cue) -> Result<()> {
        self.teardown().await?;
        self.state = DeckState::Loaded(cue);
        Ok(())
    }

    /// Empty the deck, tearing down any existing runner
    pub async fn clear(&mut self) -> Result<()> {
        self.teardown().await?;
        self.state = DeckState::Empty;
        Ok(())
    }

    /// Stop playback, returning to `Loaded` with the same cue. A no-op on
    /// decks that are not running.
    pub async fn stop(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, DeckState::Empty) {
            DeckState::Running { cue, mut runner } => {
                runner.terminate().await?;
                self.state = DeckState::Loaded(cue);
            }
            other => self.state = other,
        }
        Ok(())
    }

    /// Attach a freshly launched runner to the loaded cue.
    ///
    /// Fails with `AlreadyRunning` when a runner is active and
    /// `InvalidState` on an empty deck; launching is only legal from
    /// `Loaded`.
    pub fn set_running(&mut self, runner: MediaRunner) -> Result<()> {
        match std::mem::replace(&mut self.state, DeckState::Empty) {
            DeckState::Loaded(cue) => {
                self.state = DeckState::Running { cue, runner };
                Ok(())
            }
            DeckState::Running { cue, runner: old } => {
                self.state = DeckState::Running { cue, runner: old };
                Err(Error::AlreadyRunning(self.id))
            }
            DeckState::Empty => Err(Error::InvalidState(format!(
                "deck {} has no cue loaded",
                self.id
            ))),
        }
    }

    /// Collapse `Running` back to `Loaded` after the runner reported a
    /// terminal event. Returns the spent runner for disposal.
    pub fn take_finished_runner(&mut self) -> Option<MediaRunner> {
        match std::mem::replace(&mut self.state, DeckState::Empty) {
            DeckState::Running { cue, runner } => {
                self.state = DeckState::Loaded(cue);
                Some(runner)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    async fn teardown(&mut self) -> Result<()> {
        if let DeckState::Running { mut runner, .. } =
            std::mem::replace(&mut self.state, DeckState::Empty)
        {
            runner.terminate().await?;
        }
        Ok(())
    }
}
