//! # CueDeck Engine Library (cuedeck-engine)
//!
//! Live-event playback controller core.
//!
//! **Purpose:** Arm scenes of media cues (audio, video, image, slide deck)
//! and trigger them in real time, driving external player processes onto a
//! second screen with a blackout fallback, while an HTTP/SSE control
//! surface stays responsive.
//!
//! **Architecture:** One engine control task serializes every deck/scene
//! transition; per-runner monitor tasks, preview extraction and duration
//! probes run as workers and report back through the control task's event
//! queue. A process registry guarantees no spawned player or extractor
//! outlives the engine.

pub mod api;
pub mod config;
pub mod error;
pub mod output;
pub mod playback;
pub mod preview;
pub mod probe;
pub mod registry;
pub mod show;
pub mod slides;
pub mod state;

pub use error::{Error, Result};
pub use state::SharedState;
