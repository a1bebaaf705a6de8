//! Preview frame extraction via ffmpeg
//!
//! Short-lived, single-purpose process per extraction, fully independent
//! of any live player. Uses two-stage seeking: a coarse `-ss` before the
//! input jumps to the nearest keyframe fast, a fine `-ss` after the input
//! decodes precisely to the requested timestamp.

use crate::error::{Error, Result};
use crate::registry::ProcessRegistry;
use std::path::Path;
use std::process::Stdio;

/// Preview thumbnail dimensions
pub const PREVIEW_WIDTH: u32 = 320;
pub const PREVIEW_HEIGHT: u32 = 180;

/// Coarse-seek lead-in (seconds)
const SEEK_MARGIN: f64 = 2.0;

/// Extract one frame of `media` at `timestamp` into `output` (JPEG).
///
/// The frame is scaled into a 16:9 box and padded with black. Failures
/// (missing file, unsupported codec, ffmpeg exit != 0) come back as
/// `Extraction`.
pub async fn extract_frame(
    ffmpeg: &Path,
    media: &Path,
    timestamp: f64,
    output: &Path,
    registry: &ProcessRegistry,
) -> Result<()> {
    let t0 = (timestamp - SEEK_MARGIN).max(0.0);
    let delta = timestamp - t0;

    let filter = format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black",
        w = PREVIEW_WIDTH,
        h = PREVIEW_HEIGHT
    );

    let mut command = tokio::process::Command::new(ffmpeg);
    command.args(["-hide_banner", "-loglevel", "error"]);
    if t0 > 0.0 {
        command.args(["-ss", &format!("{:.3}", t0)]);
    }
    command.arg("-i").arg(media);
    if delta > 0.0 {
        command.args(["-ss", &format!("{:.3}", delta)]);
    }
    command.args([
        "-frames:v", "1",
        "-an", "-sn", "-dn",
        "-threads", "1",
        "-vf", filter.as_str(),
        "-q:v", "2",
        "-y",
    ]);
    command.arg(output);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| Error::Extraction(format!("could not run ffmpeg: {}", e)))?;
    let token = registry.register(
        child.id().unwrap_or(0),
        format!("ffmpeg-preview [{}]", media.display()),
    );
    let result = child.wait_with_output().await;
    registry.unregister(token);

    let out = result.map_err(|e| Error::Extraction(format!("ffmpeg wait failed: {}", e)))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(Error::Extraction(stderr.trim().to_string()));
    }
    if !output.exists() {
        return Err(Error::Extraction(format!(
            "ffmpeg produced no frame for {}",
            media.display()
        )));
    }
    Ok(())
}
