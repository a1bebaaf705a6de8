//! ffplay backend: process arguments
//!
//! The fallback player when mpv is absent. ffplay has no runtime control
//! channel, so everything (trim window, volume, window placement) is
//! baked into the launch arguments and the session is fire-and-forget:
//! `-autoexit` turns natural end-of-media into a clean process exit.

use crate::playback::backend::SinkTarget;
use crate::show::{Cue, CueKind};
use cuedeck_common::events::VolumeStep;

/// Build the ffplay argument list for one playback session
pub fn build_args(cue: &Cue, sink: &SinkTarget, volume: VolumeStep) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-volume".to_string(),
        volume.backend_level().to_string(),
    ];

    if cue.start_offset() > 0.0 {
        args.push("-ss".to_string());
        args.push(format!("{:.3}", cue.start_offset()));
    }
    if let Some(stop) = cue.stop_offset() {
        let window = (stop - cue.start_offset()).max(0.0);
        args.push("-t".to_string());
        args.push(format!("{:.3}", window));
    }

    match cue.kind() {
        CueKind::Audio => {
            args.push("-nodisp".to_string());
            args.push("-autoexit".to_string());
        }
        CueKind::Video => {
            args.push("-autoexit".to_string());
            if let SinkTarget::SecondScreen {
                geometry,
                fullscreen,
            } = sink
            {
                args.push("-left".to_string());
                args.push(geometry.left.to_string());
                args.push("-top".to_string());
                args.push(geometry.top.to_string());
                if *fullscreen {
                    args.push("-fs".to_string());
                }
            }
        }
        CueKind::Image => {
            // Loop the single frame so the still stays up until stopped
            args.push("-loop".to_string());
            args.push("0".to_string());
            if let SinkTarget::SecondScreen {
                geometry,
                fullscreen,
            } = sink
            {
                args.push("-left".to_string());
                args.push(geometry.left.to_string());
                args.push("-top".to_string());
                args.push(geometry.top.to_string());
                if *fullscreen {
                    args.push("-fs".to_string());
                }
            }
        }
        CueKind::Ppt => {}
    }

    args.push("-i".to_string());
    args.push(cue.media_path.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenGeometry;

    #[test]
    fn test_audio_args() {
        let mut cue = Cue::new(CueKind::Audio, "/media/track.mp3");
        cue.set_trim(5.0, Some(65.0)).unwrap();
        let args = build_args(&cue, &SinkTarget::Primary, VolumeStep::Full);

        assert!(args.contains(&"-nodisp".to_string()));
        assert!(args.contains(&"-autoexit".to_string()));
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "5.000");
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "60.000");
    }

    #[test]
    fn test_video_second_screen_placement() {
        let cue = Cue::new(CueKind::Video, "/media/clip.mp4");
        let sink = SinkTarget::SecondScreen {
            geometry: ScreenGeometry {
                left: -1920,
                top: 0,
                width: 1920,
                height: 1080,
            },
            fullscreen: true,
        };
        let args = build_args(&cue, &sink, VolumeStep::Full);
        let left = args.iter().position(|a| a == "-left").unwrap();
        assert_eq!(args[left + 1], "-1920");
        assert!(args.contains(&"-fs".to_string()));
    }

    #[test]
    fn test_image_loops_without_autoexit() {
        let cue = Cue::new(CueKind::Image, "/media/still.png");
        let args = build_args(&cue, &SinkTarget::Primary, VolumeStep::Full);
        assert!(args.contains(&"-loop".to_string()));
        assert!(!args.contains(&"-autoexit".to_string()));
    }
}
