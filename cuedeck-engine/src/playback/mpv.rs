//! mpv backend: process arguments and the JSON IPC client
//!
//! Each playback session gets its own mpv process with a private IPC
//! socket. `--keep-open=no` makes natural end-of-media a clean process
//! exit, so completion detection is uniform with the ffplay backend.
//!
//! The IPC protocol is one JSON object per line over a Unix socket. A
//! fresh connection is opened per command; commands carry a `request_id`
//! so replies can be told apart from the property-change events mpv also
//! writes to the socket.

use crate::error::{Error, Result};
use crate::playback::backend::SinkTarget;
use crate::show::{Cue, CueKind};
use cuedeck_common::events::VolumeStep;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::{sleep, timeout};
use uuid::Uuid;

/// Per-runner IPC socket path under the system temp directory
pub fn socket_path(runner_id: Uuid) -> PathBuf {
    std::env::temp_dir().join(format!("cuedeck-mpv-{}.sock", runner_id.simple()))
}

/// Build the mpv argument list for one playback session
pub fn build_args(cue: &Cue, sink: &SinkTarget, socket: &Path, volume: VolumeStep) -> Vec<String> {
    let mut args = vec![
        "--no-terminal".to_string(),
        "--really-quiet".to_string(),
        "--no-input-default-bindings".to_string(),
        // Exit at natural end so the monitor sees end-of-media as a clean
        // process exit
        "--keep-open=no".to_string(),
        format!("--input-ipc-server={}", socket.display()),
        "--hwdec=auto".to_string(),
        format!("--volume={}", volume.backend_level()),
    ];

    if cue.start_offset() > 0.0 {
        args.push(format!("--start={:.3}", cue.start_offset()));
    }
    if let Some(stop) = cue.stop_offset() {
        args.push(format!("--end={:.3}", stop));
    }

    match cue.kind() {
        CueKind::Audio => {
            args.push("--vid=no".to_string());
            args.push("--force-window=no".to_string());
        }
        CueKind::Video | CueKind::Image => {
            args.push("--force-window=yes".to_string());
            if cue.kind() == CueKind::Image {
                // A still has no timeline; hold it until the operator stops
                args.push("--image-display-duration=inf".to_string());
            }
            if let SinkTarget::SecondScreen {
                geometry,
                fullscreen,
            } = sink
            {
                args.push(format!(
                    "--geometry={}x{}+{}+{}",
                    geometry.width, geometry.height, geometry.left, geometry.top
                ));
                if *fullscreen {
                    args.push("--fullscreen".to_string());
                }
            }
        }
        // Ppt cues never reach a player process
        CueKind::Ppt => {}
    }

    args.push(cue.media_path.to_string_lossy().into_owned());
    args
}

/// JSON IPC client for one mpv instance
#[derive(Debug, Clone)]
pub struct MpvIpc {
    socket: PathBuf,
}

impl MpvIpc {
    pub fn new(socket: PathBuf) -> Self {
        Self { socket }
    }

    /// Wait for the player's IPC socket to accept connections.
    ///
    /// mpv creates the socket shortly after start; this is the launch
    /// confirmation. Polls every 100ms up to the given bound.
    pub async fn wait_ready(&self, wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        while tokio::time::Instant::now() < deadline {
            if self.socket.exists() && self.command(json!(["get_property", "pid"])).await.is_ok() {
                return true;
            }
            sleep(Duration::from_millis(100)).await;
        }
        false
    }

    /// Send one command and return its `data` payload.
    ///
    /// mpv interleaves unsolicited events on the same socket; replies are
    /// matched by `request_id`.
    pub async fn command(&self, command: Value) -> Result<Value> {
        #[cfg(unix)]
        {
            let request_id = 1u64;
            let payload = serde_json::to_string(&json!({
                "command": command,
                "request_id": request_id,
            }))
            .map_err(|e| Error::Internal(format!("IPC encode: {}", e)))?;

            let io = async {
                let stream = tokio::net::UnixStream::connect(&self.socket).await?;
                let (read_half, mut write_half) = stream.into_split();
                write_half.write_all(payload.as_bytes()).await?;
                write_half.write_all(b"\n").await?;

                let mut lines = BufReader::new(read_half).lines();
                while let Some(line) = lines.next_line().await? {
                    let reply: Value = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    if reply.get("request_id").and_then(Value::as_u64) != Some(request_id) {
                        continue; // property-change event, not our reply
                    }
                    return Ok::<Value, std::io::Error>(reply);
                }
                Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "IPC socket closed before reply",
                ))
            };

            let reply = timeout(Duration::from_secs(2), io)
                .await
                .map_err(|_| Error::Internal("mpv IPC timed out".to_string()))?
                .map_err(|e| Error::Internal(format!("mpv IPC: {}", e)))?;

            match reply.get("error").and_then(Value::as_str) {
                Some("success") => Ok(reply.get("data").cloned().unwrap_or(Value::Null)),
                Some(other) => Err(Error::Internal(format!("mpv IPC error: {}", other))),
                None => Ok(Value::Null),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = command;
            Err(Error::Unsupported(
                "mpv IPC requires unix sockets on this platform".to_string(),
            ))
        }
    }

    pub async fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.command(json!(["set_property", name, value]))
            .await
            .map(|_| ())
    }

    pub async fn get_property_f64(&self, name: &str) -> Result<Option<f64>> {
        Ok(self
            .command(json!(["get_property", name]))
            .await?
            .as_f64())
    }

    /// Absolute seek in seconds (caller clamps to the trim window)
    pub async fn seek_absolute(&self, seconds: f64) -> Result<()> {
        self.command(json!(["seek", format!("{:.3}", seconds), "absolute"]))
            .await
            .map(|_| ())
    }

    /// Ask the player to exit; the graceful half of termination
    pub async fn quit(&self) -> Result<()> {
        self.command(json!(["quit"])).await.map(|_| ())
    }

    /// Best-effort socket file cleanup after the process is gone
    pub fn remove_socket(&self) {
        let _ = std::fs::remove_file(&self.socket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenGeometry;

    fn second_screen() -> SinkTarget {
        SinkTarget::SecondScreen {
            geometry: ScreenGeometry {
                left: 1920,
                top: 0,
                width: 1920,
                height: 1080,
            },
            fullscreen: true,
        }
    }

    #[test]
    fn test_video_args() {
        let mut cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        cue.set_trim(2.0, Some(30.5)).unwrap();
        let socket = PathBuf::from("/tmp/test.sock");
        let args = build_args(&cue, &second_screen(), &socket, VolumeStep::Full);

        assert!(args.contains(&"--start=2.000".to_string()));
        assert!(args.contains(&"--end=30.500".to_string()));
        assert!(args.contains(&"--geometry=1920x1080+1920+0".to_string()));
        assert!(args.contains(&"--fullscreen".to_string()));
        assert!(args.contains(&"--keep-open=no".to_string()));
        assert!(args.contains(&"--volume=100".to_string()));
        assert_eq!(args.last().unwrap(), "/media/clip.mp4");
    }

    #[test]
    fn test_audio_args_have_no_window() {
        let cue = Cue::new(CueKind::Audio, "/media/track.mp3");
        let socket = PathBuf::from("/tmp/test.sock");
        let args = build_args(&cue, &SinkTarget::Primary, &socket, VolumeStep::Half);

        assert!(args.contains(&"--vid=no".to_string()));
        assert!(args.contains(&"--force-window=no".to_string()));
        assert!(args.contains(&"--volume=50".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--geometry")));
        // No trim configured: no --start/--end
        assert!(!args.iter().any(|a| a.starts_with("--start")));
    }

    #[test]
    fn test_image_args_hold_forever() {
        let cue = Cue::new(CueKind::Image, "/media/slide.png");
        let socket = PathBuf::from("/tmp/test.sock");
        let args = build_args(&cue, &second_screen(), &socket, VolumeStep::Full);
        assert!(args.contains(&"--image-display-duration=inf".to_string()));
    }

    #[test]
    fn test_socket_paths_are_distinct() {
        let a = socket_path(Uuid::new_v4());
        let b = socket_path(Uuid::new_v4());
        assert_ne!(a, b);
    }
}
