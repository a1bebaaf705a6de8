//! Media duration probing
//!
//! Fills a cue's `duration_hint` via a short ffprobe run. The hint is a
//! cache, not ground truth: a running player's own duration report always
//! wins. Probes run in worker tasks with a hard timeout so a wedged
//! container file cannot pile work up behind the control task.

use crate::error::{Error, Result};
use crate::registry::ProcessRegistry;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;

/// Probe deadline; files that take longer simply keep an unknown duration
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Read the container duration of a media file in seconds.
pub async fn probe_duration(
    ffprobe: &Path,
    media: &Path,
    registry: &ProcessRegistry,
) -> Result<f64> {
    let mut command = tokio::process::Command::new(ffprobe);
    command
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(media)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| Error::Spawn(format!("ffprobe ({}): {}", ffprobe.display(), e)))?;
    let token = registry.register(
        child.id().unwrap_or(0),
        format!("ffprobe [{}]", media.display()),
    );

    let result = timeout(PROBE_TIMEOUT, child.wait_with_output()).await;
    registry.unregister(token);

    let output = result
        .map_err(|_| Error::Internal(format!("ffprobe timed out on {}", media.display())))?
        .map_err(|e| Error::Internal(format!("ffprobe wait failed: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Internal(format!(
            "ffprobe exited with {} on {}",
            output.status,
            media.display()
        )));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    text.trim()
        .parse::<f64>()
        .map_err(|_| Error::Internal(format!("ffprobe returned no duration for {}", media.display())))
}
