//! Cue: one playable media item with optional trim points

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Media kind of a cue. Fixed at creation; there is deliberately no setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueKind {
    Audio,
    Video,
    Image,
    Ppt,
}

impl CueKind {
    /// Time-based media advances the cue list on natural completion;
    /// static visual media never does. This is the live-operation safety
    /// rule: a projected image or slide must not change without operator
    /// intent.
    pub fn auto_advances(&self) -> bool {
        matches!(self, CueKind::Audio | CueKind::Video)
    }

    /// Kinds that occupy the second-screen output while running
    pub fn is_visual(&self) -> bool {
        matches!(self, CueKind::Video | CueKind::Image | CueKind::Ppt)
    }

    /// Kinds whose preview is a frame extraction rather than an icon
    pub fn has_frame_preview(&self) -> bool {
        matches!(self, CueKind::Video | CueKind::Image)
    }

    /// Fallback icon name for kinds without frame previews (and for failed
    /// extractions)
    pub fn icon_name(&self) -> &'static str {
        match self {
            CueKind::Audio => "audio",
            CueKind::Video => "video",
            CueKind::Image => "image",
            CueKind::Ppt => "slides",
        }
    }
}

impl std::fmt::Display for CueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CueKind::Audio => write!(f, "audio"),
            CueKind::Video => write!(f, "video"),
            CueKind::Image => write!(f, "image"),
            CueKind::Ppt => write!(f, "ppt"),
        }
    }
}

/// One playable unit inside a scene.
///
/// Trim points are seconds from media start; `stop_offset == None` means
/// play to natural end. `duration_hint` is a cached total recomputed lazily
/// by probing and is not authoritative until a running player confirms it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cue {
    pub id: Uuid,
    kind: CueKind,
    pub media_path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    start_offset: f64,
    #[serde(default)]
    stop_offset: Option<f64>,
    #[serde(default)]
    pub duration_hint: Option<f64>,
}

impl Cue {
    /// Create a cue for a media file. The display name defaults to the
    /// file name.
    pub fn new(kind: CueKind, media_path: impl Into<PathBuf>) -> Self {
        let media_path = media_path.into();
        let name = media_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| media_path.to_string_lossy().into_owned());
        Self {
            id: Uuid::new_v4(),
            kind,
            media_path,
            name,
            note: String::new(),
            start_offset: 0.0,
            stop_offset: None,
            duration_hint: None,
        }
    }

    pub fn kind(&self) -> CueKind {
        self.kind
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    pub fn stop_offset(&self) -> Option<f64> {
        self.stop_offset
    }

    /// Set trim points, validating `0 <= start < stop` at edit time.
    ///
    /// Rejected edits leave the cue unchanged; playback never sees an
    /// invalid trim window.
    pub fn set_trim(&mut self, start: f64, stop: Option<f64>) -> Result<()> {
        if !start.is_finite() || start < 0.0 {
            return Err(Error::InvalidTiming(format!(
                "start offset {} must be >= 0",
                start
            )));
        }
        if let Some(stop) = stop {
            if !stop.is_finite() || stop <= start {
                return Err(Error::InvalidTiming(format!(
                    "stop offset {} must be greater than start offset {}",
                    stop, start
                )));
            }
        }
        self.start_offset = start;
        self.stop_offset = stop;
        Ok(())
    }

    /// Duration of the trimmed window, when enough is known to compute it
    pub fn trimmed_duration(&self) -> Option<f64> {
        let end = self.stop_offset.or(self.duration_hint)?;
        Some((end - self.start_offset).max(0.0))
    }

    /// Clamp a seek target into the playable window
    pub fn clamp_seek(&self, seconds: f64) -> f64 {
        let lo = self.start_offset;
        let hi = self.stop_offset.or(self.duration_hint).unwrap_or(f64::MAX);
        seconds.clamp(lo, hi.max(lo))
    }

    pub fn display_name(&self) -> &str {
        &self.name
    }

    /// True when the referenced media file exists on disk right now
    pub fn media_exists(&self) -> bool {
        Path::new(&self.media_path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cue_defaults() {
        let cue = Cue::new(CueKind::Audio, "/media/intro.mp3");
        assert_eq!(cue.kind(), CueKind::Audio);
        assert_eq!(cue.name, "intro.mp3");
        assert_eq!(cue.start_offset(), 0.0);
        assert!(cue.stop_offset().is_none());
        assert!(cue.duration_hint.is_none());
    }

    #[test]
    fn test_set_trim_valid() {
        let mut cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        cue.set_trim(1.5, Some(10.0)).unwrap();
        assert_eq!(cue.start_offset(), 1.5);
        assert_eq!(cue.stop_offset(), Some(10.0));
        assert_eq!(cue.trimmed_duration(), Some(8.5));
    }

    #[test]
    fn test_set_trim_open_ended() {
        let mut cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        cue.set_trim(3.0, None).unwrap();
        assert_eq!(cue.stop_offset(), None);
        // No stop and no hint: duration unknown
        assert_eq!(cue.trimmed_duration(), None);
    }

    #[test]
    fn test_set_trim_rejects_inverted_window() {
        let mut cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        cue.set_trim(2.0, Some(20.0)).unwrap();

        let err = cue.set_trim(10.0, Some(10.0)).unwrap_err();
        assert!(matches!(err, Error::InvalidTiming(_)));
        let err = cue.set_trim(10.0, Some(5.0)).unwrap_err();
        assert!(matches!(err, Error::InvalidTiming(_)));
        let err = cue.set_trim(-1.0, None).unwrap_err();
        assert!(matches!(err, Error::InvalidTiming(_)));

        // Rejected edits leave the cue unchanged
        assert_eq!(cue.start_offset(), 2.0);
        assert_eq!(cue.stop_offset(), Some(20.0));
    }

    #[test]
    fn test_clamp_seek() {
        let mut cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        cue.set_trim(5.0, Some(30.0)).unwrap();
        assert_eq!(cue.clamp_seek(0.0), 5.0);
        assert_eq!(cue.clamp_seek(12.0), 12.0);
        assert_eq!(cue.clamp_seek(99.0), 30.0);
    }

    #[test]
    fn test_advance_policy_by_kind() {
        assert!(CueKind::Audio.auto_advances());
        assert!(CueKind::Video.auto_advances());
        assert!(!CueKind::Image.auto_advances());
        assert!(!CueKind::Ppt.auto_advances());
    }

    #[test]
    fn test_visual_kinds() {
        assert!(!CueKind::Audio.is_visual());
        assert!(CueKind::Video.is_visual());
        assert!(CueKind::Image.is_visual());
        assert!(CueKind::Ppt.is_visual());
    }

    #[test]
    fn test_serde_roundtrip_preserves_trim() {
        let mut cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        cue.set_trim(1.25, Some(9.75)).unwrap();
        let json = serde_json::to_string(&cue).unwrap();
        let back: Cue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, cue.id);
        assert_eq!(back.kind(), CueKind::Video);
        assert_eq!(back.start_offset(), 1.25);
        assert_eq!(back.stop_offset(), Some(9.75));
    }
}
