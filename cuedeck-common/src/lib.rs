//! # CueDeck Common Library
//!
//! Shared code for the CueDeck playback controller:
//! - Event types (ShowEvent enum) and the EventBus
//! - Configuration resolution (CLI > env > TOML > default)
//! - Timecode parsing and formatting
//! - Shared error type

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
