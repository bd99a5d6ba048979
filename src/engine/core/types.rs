use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Frame size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (no usable picture)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Probed metadata for one input file.
///
/// Produced by the prober and only read afterwards; the thumbnail is the one
/// field attached after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub duration: f64,
    pub resolution: Resolution,
    pub codec: String,
    pub frame_rate: f64,
    pub pix_fmt: String,
    pub has_audio: bool,
    pub audio_sample_rate: u32,
    pub audio_channel_layout: String,

    /// Inline image (`data:` URI) of the frame at 1s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl MediaRecord {
    /// Create an empty record for a path; metadata fields start zeroed
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            file_name: display_name(&path),
            path,
            size: 0,
            duration: 0.0,
            resolution: Resolution::default(),
            codec: String::new(),
            frame_rate: 0.0,
            pix_fmt: String::new(),
            has_audio: false,
            audio_sample_rate: 0,
            audio_channel_layout: String::new(),
            thumbnail: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }
}

/// File name shown to the user (falls back to the full path)
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// One merge invocation. Record order is the concatenation order.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub id: Uuid,
    pub records: Vec<MediaRecord>,
    pub output_path: PathBuf,
    pub use_hardware: bool,
}

impl MergeRequest {
    pub fn new(records: Vec<MediaRecord>, output_path: impl Into<PathBuf>, use_hardware: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            records,
            output_path: output_path.into(),
            use_hardware,
        }
    }

    /// Sum of all input durations, the denominator for final concat progress
    pub fn total_duration(&self) -> f64 {
        self.records.iter().map(|r| r.duration.max(0.0)).sum()
    }

    pub fn input_paths(&self) -> Vec<PathBuf> {
        self.records.iter().map(|r| r.path.clone()).collect()
    }
}

/// How the concat executor treats its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatMode {
    /// Stream-copy the original inputs; any ffmpeg error aborts (-xerror)
    Fast,
    /// Stream-copy normalized intermediates with -progress reporting
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergeStrategy {
    FastCopy,
    Normalized,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FastCopy => write!(f, "stream copy"),
            Self::Normalized => write!(f, "normalized re-encode"),
        }
    }
}

/// What a successful merge produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub output_path: PathBuf,
    pub strategy: MergeStrategy,
    pub inputs: usize,
    pub total_duration_s: f64,
    /// Video encoder used for normalization (None for stream copy)
    pub encoder: Option<String>,
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully merged {} videos to {}",
            self.inputs,
            self.output_path.display()
        )
    }
}

/// Terminal state of a merge that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Completed(MergeSummary),
    Cancelled,
}

impl MergeOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn summary(&self) -> Option<&MergeSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Cancelled => None,
        }
    }
}

/// Parser for ffmpeg progress output (key=value format)
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line of ffmpeg progress output.
    /// Unknown keys and unparseable values are ignored.
    pub fn parse_line(&mut self, line: &str) {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                // out_time_ms is in microseconds too (long-standing ffmpeg quirk)
                "out_time_us" | "out_time_ms" => {
                    if let Ok(us) = value.trim().parse::<u64>() {
                        self.out_time_us = us;
                    }
                }
                "progress" => {
                    if value.trim() == "end" {
                        self.is_complete = true;
                    }
                }
                _ => {}
            }
        }
    }

    /// Get output time in seconds
    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Percentage of `total_s` written so far, clamped to 100.
    /// Always 100 once ffmpeg reported `progress=end`.
    pub fn progress_pct(&self, total_s: f64) -> f64 {
        if self.is_complete {
            return 100.0;
        }
        if total_s > 0.0 {
            return (self.out_time_s() / total_s * 100.0).min(100.0);
        }
        0.0
    }
}
