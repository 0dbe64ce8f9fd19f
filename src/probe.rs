use std::process::Command;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Metadata the player needs before starting a cycle. `total_frames` is an
/// estimate at the target rate; 0 means unknown, and playback then runs until
/// extraction completes and the frame store drains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration_seconds: Option<f64>,
    pub total_frames: u64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

/// Asks ffprobe for the source's duration. Callers treat an `Err` as
/// "duration unknown", not as a reason to abort the cycle.
pub fn probe_media(source: &str, target_fps: f64) -> Result<MediaInfo> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(source)
        .output()
        .context("failed to run ffprobe")?;

    if !output.status.success() {
        return Err(anyhow!(
            "ffprobe failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    parse_probe_output(&output.stdout, target_fps)
}

fn parse_probe_output(raw: &[u8], target_fps: f64) -> Result<MediaInfo> {
    let probe: ProbeOutput =
        serde_json::from_slice(raw).context("unexpected ffprobe output")?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let mut duration = probe
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()))
        .or_else(|| video_stream.and_then(|s| parse_seconds(s.duration.as_deref())));

    // Streams without container duration sometimes still carry a frame count
    // and an average rate; estimate from those.
    if duration.is_none() {
        if let Some(stream) = video_stream {
            let frames = stream
                .nb_frames
                .as_deref()
                .and_then(|v| v.trim().parse::<f64>().ok());
            let rate = parse_rate(stream.avg_frame_rate.as_deref());
            if let (Some(frames), Some(rate)) = (frames, rate) {
                if frames > 0.0 && rate > 0.0 {
                    duration = Some(frames / rate);
                }
            }
        }
    }

    let total_frames = duration
        .map(|secs| (secs * target_fps).ceil() as u64)
        .unwrap_or(0);

    Ok(MediaInfo {
        duration_seconds: duration,
        total_frames,
    })
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    if value.is_empty() || value == "N/A" {
        return None;
    }
    value.parse::<f64>().ok().filter(|secs| *secs > 0.0)
}

/// ffprobe reports rates as a fraction, e.g. `30000/1001`.
fn parse_rate(value: Option<&str>) -> Option<f64> {
    let value = value?.trim();
    let (num, den) = value.split_once('/')?;
    let num = num.parse::<f64>().ok()?;
    let den = den.parse::<f64>().ok()?;
    if den > 0.0 {
        Some(num / den)
    } else {
        None
    }
}
