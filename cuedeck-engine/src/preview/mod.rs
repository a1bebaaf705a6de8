//! Preview generator
//!
//! Produces representative artwork for cues without ever blocking the
//! control task: video/image cues get a frame extracted by a short-lived
//! ffmpeg process in a worker task, audio/slide cues resolve to a named
//! icon. Results come back through the engine's event queue, never by
//! synchronous return.
//!
//! Supersession is cooperative: a new request for a cue bumps that cue's
//! generation counter, and a result whose token no longer matches is
//! simply discarded when it arrives. In-flight extractions are not torn
//! down; they finish, get ignored, and their temp frames are overwritten
//! by the winner.

pub mod extract;

use crate::registry::ProcessRegistry;
use crate::show::{Cue, CueKind};
use cuedeck_common::events::PreviewArtwork;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Result of one preview request, tagged with its request token
#[derive(Debug)]
pub struct PreviewOutcome {
    pub cue_id: Uuid,
    pub token: u64,
    pub result: std::result::Result<PreviewArtwork, String>,
}

/// Issues preview requests and arbitrates which results are still wanted
pub struct PreviewGenerator {
    ffmpeg: PathBuf,
    cache_dir: PathBuf,
    registry: Arc<ProcessRegistry>,
    outcome_tx: mpsc::UnboundedSender<PreviewOutcome>,
    /// Latest token per cue; older in-flight requests are superseded
    generations: HashMap<Uuid, u64>,
    next_token: u64,
}

impl PreviewGenerator {
    pub fn new(
        ffmpeg: PathBuf,
        cache_dir: PathBuf,
        registry: Arc<ProcessRegistry>,
        outcome_tx: mpsc::UnboundedSender<PreviewOutcome>,
    ) -> Self {
        Self {
            ffmpeg,
            cache_dir,
            registry,
            outcome_tx,
            generations: HashMap::new(),
            next_token: 1,
        }
    }

    /// Request preview artwork for a cue. Returns the request token; the
    /// result arrives later through the outcome channel.
    ///
    /// A newer request for the same cue supersedes this one.
    pub fn request(&mut self, cue: &Cue) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.generations.insert(cue.id, token);

        let cue_id = cue.id;
        let tx = self.outcome_tx.clone();

        if !cue.kind().has_frame_preview() {
            // Icon fast path; still delivered asynchronously so callers
            // see one consistent arrival order
            let icon = cue.kind().icon_name().to_string();
            tokio::spawn(async move {
                let _ = tx.send(PreviewOutcome {
                    cue_id,
                    token,
                    result: Ok(PreviewArtwork::Icon { name: icon }),
                });
            });
            return token;
        }

        let ffmpeg = self.ffmpeg.clone();
        let registry = Arc::clone(&self.registry);
        let media = cue.media_path.clone();
        let timestamp = match cue.kind() {
            CueKind::Video => cue.start_offset(),
            _ => 0.0,
        };
        let cache_dir = self.cache_dir.clone();
        let output = cache_dir.join(format!("{}-{}.jpg", cue_id.simple(), token));

        tokio::spawn(async move {
            let result = async {
                tokio::fs::create_dir_all(&cache_dir)
                    .await
                    .map_err(|e| format!("preview cache dir: {}", e))?;
                extract::extract_frame(&ffmpeg, &media, timestamp, &output, &registry)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(PreviewArtwork::Frame {
                    path: output.clone(),
                })
            }
            .await;
            let _ = tx.send(PreviewOutcome {
                cue_id,
                token,
                result,
            });
        });
        token
    }

    /// Whether a token is still the newest request for its cue
    pub fn is_current(&self, cue_id: Uuid, token: u64) -> bool {
        self.generations.get(&cue_id) == Some(&token)
    }

    /// Arbitrate an arriving outcome: true when it should be delivered,
    /// false when a newer request superseded it.
    pub fn accept(&self, outcome: &PreviewOutcome) -> bool {
        let current = self.is_current(outcome.cue_id, outcome.token);
        if !current {
            debug!(
                "Discarding superseded preview for cue {} (token {})",
                outcome.cue_id, outcome.token
            );
        }
        current
    }
}
