//! FFprobe source inspection.

use serde::Deserialize;
use std::path::Path;

use crate::error::{MediaError, MediaResult};
use crate::runner::{CommandRunner, RunContext};

/// Video file information.
#[derive(Debug, Clone)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a video file for duration and dimensions.
///
/// Goes through the [`CommandRunner`] so pipeline tests can script the
/// probe output without spawning ffprobe.
pub async fn probe_video(
    runner: &dyn CommandRunner,
    path: impl AsRef<Path>,
    ctx: &RunContext,
) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    let args: Vec<String> = [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain(std::iter::once(path.to_string_lossy().to_string()))
    .collect();

    let output = runner
        .run("ffprobe", &args, &ctx.relabel("probe"))
        .await
        .map_err(|e| match e {
            MediaError::Cancelled => MediaError::Cancelled,
            MediaError::FfprobeNotFound => MediaError::FfprobeNotFound,
            MediaError::EncoderFailed { stderr, .. } => MediaError::ProbeFailed {
                message: format!("ffprobe failed for {}", path.display()),
                stderr: Some(stderr),
            },
            other => other,
        })?;

    parse_probe_output(&output.stdout)
}

/// Parse ffprobe's JSON output into a [`VideoInfo`].
pub fn parse_probe_output(stdout: &str) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_str(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo("no video stream found".to_string()))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let width = video_stream
        .width
        .ok_or_else(|| MediaError::InvalidVideo("video stream has no width".to_string()))?;
    let height = video_stream
        .height
        .ok_or_else(|| MediaError::InvalidVideo("video stream has no height".to_string()))?;

    Ok(VideoInfo {
        duration,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "format": { "duration": "42.5" },
        "streams": [
            { "codec_type": "audio" },
            { "codec_type": "video", "width": 1920, "height": 1080 }
        ]
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(SAMPLE).unwrap();
        assert!((info.duration - 42.5).abs() < 1e-9);
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
    }

    #[test]
    fn test_parse_probe_output_without_video_stream() {
        let json = r#"{ "format": {}, "streams": [{ "codec_type": "audio" }] }"#;
        assert!(parse_probe_output(json).is_err());
    }
}
