//! Playback pipeline: backends, runners, decks and the cue engine
//!
//! **Module Structure:**
//! - `backend.rs`: Backend selection, capability query, sink targets
//! - `mpv.rs` / `ffplay.rs`: Per-backend process arguments and (for mpv)
//!   the JSON IPC client
//! - `runner.rs`: MediaRunner lifecycle and its monitor task
//! - `deck.rs`: The two playback slots
//! - `engine.rs`: The control task (command handling and advance policy)
//! - `events.rs`: Internal event types flowing into the control task

pub mod backend;
pub mod deck;
pub mod engine;
pub mod events;
pub mod ffplay;
pub mod mpv;
pub mod runner;

pub use engine::{spawn_engine, CueEngine, EngineHandle};
