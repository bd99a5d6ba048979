// Input probing using ffprobe

use crate::engine::core::{MediaRecord, Resolution, Toolchain, build_probe_cmd, build_thumbnail_cmd};
use crate::engine::error::{ProbeError, RunError};
use crate::engine::process::capture;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProbeStream {
    codec_type: String,
    codec_name: String,
    width: u32,
    height: u32,
    r_frame_rate: String,
    avg_frame_rate: String,
    pix_fmt: String,
    sample_rate: String,
    channel_layout: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProbeFormat {
    duration: String,
    size: String,
}

/// Parse an ffprobe rate such as "30000/1001" or "25".
/// Anything unparseable (including a zero denominator) yields 0.
pub fn parse_frame_rate(s: &str) -> f64 {
    let s = s.trim();
    if let Some((num, den)) = s.split_once('/') {
        let (Ok(num), Ok(den)) = (num.trim().parse::<f64>(), den.trim().parse::<f64>()) else {
            return 0.0;
        };
        if den == 0.0 {
            return 0.0;
        }
        return num / den;
    }

    s.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Build a record from ffprobe's JSON. The thumbnail is left empty.
pub fn parse_probe_output(path: &Path, json: &str) -> Result<MediaRecord, ProbeError> {
    let data: ProbeOutput = serde_json::from_str(json).map_err(|source| ProbeError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let video = data
        .streams
        .iter()
        .find(|s| s.codec_type == "video" && s.width > 0 && s.height > 0)
        .ok_or_else(|| ProbeError::NoVideoStream {
            path: path.to_path_buf(),
        })?;
    let audio = data.streams.iter().find(|s| s.codec_type == "audio");

    // avg_frame_rate is the effective rate; r_frame_rate is only the timebase guess
    let mut frame_rate = parse_frame_rate(&video.avg_frame_rate);
    if frame_rate == 0.0 {
        frame_rate = parse_frame_rate(&video.r_frame_rate);
    }

    let mut record = MediaRecord::new(path);
    record.size = data.format.size.trim().parse().unwrap_or(0);
    record.duration = data
        .format
        .duration
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);
    record.resolution = Resolution::new(video.width, video.height);
    record.codec = video.codec_name.clone();
    record.frame_rate = frame_rate;
    record.pix_fmt = video.pix_fmt.clone();

    if let Some(audio) = audio {
        record.has_audio = true;
        record.audio_sample_rate = audio.sample_rate.trim().parse().unwrap_or(0);
        record.audio_channel_layout = audio.channel_layout.clone();
    }

    Ok(record)
}

/// Probe stream/format metadata only
pub fn probe_metadata(tools: &Toolchain, path: &Path) -> Result<MediaRecord, ProbeError> {
    let output = capture(build_probe_cmd(tools, path)).map_err(|source| ProbeError::Run {
        path: path.to_path_buf(),
        source,
    })?;

    let json = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(path, &json)
}

/// Grab the frame at 1s as an inline `data:image/jpeg;base64,...` URI
pub fn generate_thumbnail(tools: &Toolchain, path: &Path) -> Result<String, RunError> {
    let output = capture(build_thumbnail_cmd(tools, path))?;
    if output.stdout.is_empty() {
        return Err(RunError::Io {
            tool: "ffmpeg".to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "no image data produced",
            ),
        });
    }

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(&output.stdout)))
}

/// Probe a file and attach a thumbnail. A thumbnail failure is logged and
/// leaves the thumbnail empty.
pub fn probe(tools: &Toolchain, path: &Path) -> Result<MediaRecord, ProbeError> {
    let record = probe_metadata(tools, path)?;
    debug!(
        path = %path.display(),
        codec = %record.codec,
        resolution = %record.resolution,
        frame_rate = record.frame_rate,
        has_audio = record.has_audio,
        "probed"
    );

    match generate_thumbnail(tools, path) {
        Ok(thumbnail) => Ok(record.with_thumbnail(thumbnail)),
        Err(e) => {
            warn!(path = %path.display(), error = %e.diagnostic(), "thumbnail generation failed");
            Ok(record)
        }
    }
}

/// Probe every path independently; one bad file does not stop the rest
pub fn probe_all(
    tools: &Toolchain,
    paths: &[PathBuf],
) -> Vec<(PathBuf, Result<MediaRecord, ProbeError>)> {
    paths
        .iter()
        .map(|p| (p.clone(), probe(tools, p)))
        .collect()
}
