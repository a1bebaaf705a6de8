//! Engine configuration
//!
//! Runtime settings for the playback engine: HTTP port, player backend
//! selection and tool paths, second-screen geometry, and the timing knobs
//! for launch confirmation, position polling and process teardown.
//!
//! Values resolve CLI > environment > TOML config file > compiled default;
//! the file lives at the platform config path resolved by
//! `cuedeck_common::config::config_file_path`.

use crate::error::{Error, Result};
use crate::playback::backend::BackendChoice;
use cuedeck_common::events::VolumeStep;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Second-screen placement.
///
/// Extended displays can sit left of or above the primary, so offsets are
/// signed (e.g. `left = -1920` for a projector arranged to the left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenGeometry {
    fn default() -> Self {
        // Primary-right 1080p extended display, the common venue setup
        Self {
            left: 1920,
            top: 0,
            width: 1920,
            height: 1080,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP control-surface port
    pub port: u16,

    /// Player backend selection (auto probes mpv, then ffplay)
    pub backend: BackendChoice,

    /// External tool executables; bare names resolve via PATH
    pub mpv_path: PathBuf,
    pub ffplay_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,

    /// Slide-deck helper command (platform automation wrapper); None leaves
    /// ppt cues controllable only by a collaborator-provided controller
    pub slide_helper: Option<PathBuf>,

    /// Second-screen placement and fullscreen behavior
    pub second_screen: ScreenGeometry,
    pub video_fullscreen: bool,

    /// Selecting a scene auto-selects (never auto-plays) its first cue
    pub auto_select_on_scene_change: bool,

    /// Volume step applied to freshly launched runners
    pub startup_volume: VolumeStep,

    /// Position poll interval for runner monitors (milliseconds)
    pub position_poll_ms: u64,

    /// Bound on waiting for a launched player to confirm (milliseconds)
    pub launch_wait_ms: u64,

    /// Grace period between graceful stop and force-kill (milliseconds)
    pub terminate_grace_ms: u64,

    /// Where extracted preview frames land
    pub preview_cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5750,
            backend: BackendChoice::Auto,
            mpv_path: PathBuf::from("mpv"),
            ffplay_path: PathBuf::from("ffplay"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            slide_helper: None,
            second_screen: ScreenGeometry::default(),
            video_fullscreen: true,
            auto_select_on_scene_change: true,
            startup_volume: VolumeStep::Full,
            position_poll_ms: 250,
            launch_wait_ms: 5000,
            terminate_grace_ms: 1500,
            preview_cache_dir: cuedeck_common::config::default_preview_cache_dir(),
        }
    }
}

/// TOML config file shape; every field optional so partial files work
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    port: Option<u16>,
    backend: Option<BackendChoice>,
    mpv_path: Option<PathBuf>,
    ffplay_path: Option<PathBuf>,
    ffmpeg_path: Option<PathBuf>,
    ffprobe_path: Option<PathBuf>,
    slide_helper: Option<PathBuf>,
    second_screen: Option<ScreenGeometry>,
    video_fullscreen: Option<bool>,
    auto_select_on_scene_change: Option<bool>,
    startup_volume: Option<VolumeStep>,
    position_poll_ms: Option<u64>,
    launch_wait_ms: Option<u64>,
    terminate_grace_ms: Option<u64>,
    preview_cache_dir: Option<PathBuf>,
}

impl Config {
    /// Resolve configuration from the config file plus CLI overrides.
    ///
    /// `cli_port` comes from clap (which already applies its env fallback);
    /// it wins over the file value per the resolution order.
    pub fn load(cli_port: Option<u16>) -> Result<Self> {
        let table = cuedeck_common::config::load_config_table()
            .map_err(|e| Error::Config(e.to_string()))?;
        let file: FileConfig = table
            .try_into()
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?;
        Ok(Self::merge(file, cli_port))
    }

    fn merge(file: FileConfig, cli_port: Option<u16>) -> Self {
        let defaults = Config::default();
        Config {
            port: cli_port.or(file.port).unwrap_or(defaults.port),
            backend: file.backend.unwrap_or(defaults.backend),
            mpv_path: file.mpv_path.unwrap_or(defaults.mpv_path),
            ffplay_path: file.ffplay_path.unwrap_or(defaults.ffplay_path),
            ffmpeg_path: file.ffmpeg_path.unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: file.ffprobe_path.unwrap_or(defaults.ffprobe_path),
            slide_helper: file.slide_helper.or(defaults.slide_helper),
            second_screen: file.second_screen.unwrap_or(defaults.second_screen),
            video_fullscreen: file.video_fullscreen.unwrap_or(defaults.video_fullscreen),
            auto_select_on_scene_change: file
                .auto_select_on_scene_change
                .unwrap_or(defaults.auto_select_on_scene_change),
            startup_volume: file.startup_volume.unwrap_or(defaults.startup_volume),
            position_poll_ms: file.position_poll_ms.unwrap_or(defaults.position_poll_ms),
            launch_wait_ms: file.launch_wait_ms.unwrap_or(defaults.launch_wait_ms),
            terminate_grace_ms: file
                .terminate_grace_ms
                .unwrap_or(defaults.terminate_grace_ms),
            preview_cache_dir: file
                .preview_cache_dir
                .unwrap_or(defaults.preview_cache_dir),
        }
    }
}
