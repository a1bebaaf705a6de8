//! Player backend selection and capability model
//!
//! Playback is delegated to external player processes; the engine only
//! needs to know which executable to launch and what the backend can do
//! mid-stream. Capabilities are queried, never assumed: operations a
//! backend lacks surface as `Unsupported` instead of pretending.

use crate::config::ScreenGeometry;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configured backend preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Probe mpv first, fall back to ffplay
    Auto,
    Mpv,
    Ffplay,
}

/// What the selected backend supports while a session is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    pub can_pause: bool,
    pub can_seek: bool,
    pub can_step_volume: bool,
    /// Whether position comes from the backend itself (vs a clock estimate)
    pub reports_position: bool,
}

/// A backend that passed the availability probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBackend {
    Mpv { executable: PathBuf },
    Ffplay { executable: PathBuf },
}

impl ResolvedBackend {
    pub fn name(&self) -> &'static str {
        match self {
            ResolvedBackend::Mpv { .. } => "mpv",
            ResolvedBackend::Ffplay { .. } => "ffplay",
        }
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        match self {
            // Full runtime control over the IPC socket
            ResolvedBackend::Mpv { .. } => BackendCapabilities {
                can_pause: true,
                can_seek: true,
                can_step_volume: true,
                reports_position: true,
            },
            // Fire-and-forget: trim and volume are launch arguments only
            ResolvedBackend::Ffplay { .. } => BackendCapabilities {
                can_pause: false,
                can_seek: false,
                can_step_volume: false,
                reports_position: false,
            },
        }
    }
}

/// Where a runner's output lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Default audio device / operator machine
    Primary,
    /// The second-screen surface (projector or extended display)
    SecondScreen {
        geometry: ScreenGeometry,
        fullscreen: bool,
    },
}

/// Resolve the configured backend preference against what is installed.
///
/// Fails with `BackendUnavailable` when no usable executable exists; the
/// engine keeps running and surfaces the error on each playback attempt
/// until the situation is resolved externally.
pub fn resolve_backend(
    choice: BackendChoice,
    mpv_path: &Path,
    ffplay_path: &Path,
) -> Result<ResolvedBackend> {
    match choice {
        BackendChoice::Mpv => find_executable(mpv_path)
            .map(|executable| ResolvedBackend::Mpv { executable })
            .ok_or_else(|| Error::BackendUnavailable(format!("mpv not found at {}", mpv_path.display()))),
        BackendChoice::Ffplay => find_executable(ffplay_path)
            .map(|executable| ResolvedBackend::Ffplay { executable })
            .ok_or_else(|| {
                Error::BackendUnavailable(format!("ffplay not found at {}", ffplay_path.display()))
            }),
        BackendChoice::Auto => find_executable(mpv_path)
            .map(|executable| ResolvedBackend::Mpv { executable })
            .or_else(|| {
                find_executable(ffplay_path).map(|executable| ResolvedBackend::Ffplay { executable })
            })
            .ok_or_else(|| {
                Error::BackendUnavailable("neither mpv nor ffplay is installed".to_string())
            }),
    }
}

/// Locate an executable: explicit paths are checked directly, bare names
/// are searched on PATH.
pub fn find_executable(candidate: &Path) -> Option<PathBuf> {
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let full = dir.join(candidate);
        if full.is_file() {
            return Some(full);
        }
    }
    None
}
