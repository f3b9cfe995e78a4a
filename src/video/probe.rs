use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, VideoError};
use crate::video::types::VideoMetadata;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display rotation in degrees, normalised to 0..360
    ///
    /// Newer ffprobe reports it as display-matrix side data, older builds as
    /// a `rotate` tag.
    fn rotation(&self) -> i64 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse::<f64>().ok()))
            .unwrap_or(0.0);
        (degrees.round() as i64).rem_euclid(360)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe a media file with ffprobe and return its primary video stream metadata
pub async fn probe_video(ffprobe: &Path, path: &Path) -> Result<VideoMetadata> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|_| VideoError::ProbeFailed {
            path: format!("{}: ffprobe could not be started", path.display()),
        })?;

    if !output.status.success() {
        return Err(VideoError::ProbeFailed { path: path.display().to_string() }.into());
    }

    let metadata = parse_probe_json(&output.stdout).ok_or_else(|| VideoError::ProbeFailed {
        path: format!("{}: no decodable video stream", path.display()),
    })?;

    info!(
        "Video metadata: {}x{} @ {:.1}fps, {:.2}s ({})",
        metadata.width, metadata.height, metadata.fps, metadata.duration, metadata.codec
    );
    Ok(metadata)
}

fn parse_probe_json(raw: &[u8]) -> Option<VideoMetadata> {
    let parsed: ProbeOutput = serde_json::from_slice(raw).ok()?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))?;
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let duration = video
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            parsed
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .filter(|d| d.is_finite() && *d > 0.0)?;

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    // ffmpeg autorotates decoded frames, so quarter turns swap the frame size
    let rotation = video.rotation();
    let (width, height) = match rotation {
        90 | 270 => (video.height?, video.width?),
        _ => (video.width?, video.height?),
    };

    debug!(duration, fps, has_audio, rotation, "Parsed ffprobe output");

    Some(VideoMetadata {
        duration,
        fps,
        width,
        height,
        codec: video.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
        has_audio,
    })
}

/// Parse an ffprobe rational like "30000/1001"
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.parse::<f64>().ok()?, d.parse::<f64>().ok()?),
        None => (rate.parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
    }

    #[test]
    fn test_parse_probe_json_prefers_stream_duration() {
        let raw = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1080, "height": 1920,
                 "r_frame_rate": "30/1", "duration": "4.000000"}
            ],
            "format": {"duration": "4.020000"}
        }"#;
        let meta = parse_probe_json(raw).unwrap();
        assert_eq!(meta.duration, 4.0);
        assert_eq!((meta.width, meta.height), (1080, 1920));
        assert!(meta.has_audio);
        assert_eq!(meta.codec, "h264");
    }

    #[test]
    fn test_parse_probe_json_falls_back_to_format_duration() {
        let raw = br#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360}],
            "format": {"duration": "6.5"}
        }"#;
        let meta = parse_probe_json(raw).unwrap();
        assert_eq!(meta.duration, 6.5);
        assert_eq!(meta.fps, 30.0);
        assert!(!meta.has_audio);
    }

    #[test]
    fn test_rotated_stream_reports_display_dimensions() {
        let raw = br#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080, "duration": "8",
                         "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}],
                         "tags": {"rotate": "90"}}]
        }"#;
        let meta = parse_probe_json(raw).unwrap();
        assert_eq!((meta.width, meta.height), (1080, 1920));

        let tagged = br#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080, "duration": "8",
                         "tags": {"rotate": "270"}}]
        }"#;
        let meta = parse_probe_json(tagged).unwrap();
        assert_eq!((meta.width, meta.height), (1080, 1920));

        let upside_down = br#"{
            "streams": [{"codec_type": "video", "width": 1920, "height": 1080, "duration": "8",
                         "side_data_list": [{"rotation": 180}]}]
        }"#;
        let meta = parse_probe_json(upside_down).unwrap();
        assert_eq!((meta.width, meta.height), (1920, 1080));
    }

    #[test]
    fn test_parse_probe_json_without_video_stream() {
        let raw = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3"}}"#;
        assert!(parse_probe_json(raw).is_none());
    }
}
