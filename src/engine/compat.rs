//! Decides whether a set of inputs can be concatenated by stream copy.
//!
//! Pure functions over probed records. Used both for the merge strategy and
//! for a "fast merge ready" indicator, so they must stay side-effect free.

use crate::engine::core::MediaRecord;
use std::fmt;

/// Absolute frame-rate drift still treated as equal (29.97 vs 29.9701)
pub const FRAME_RATE_TOLERANCE: f64 = 0.05;

/// First difference found between a record and the baseline (first) record
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    Codec { index: usize, baseline: String, found: String },
    Resolution { index: usize, baseline: String, found: String },
    AudioPresence { index: usize, baseline: bool, found: bool },
    FrameRate { index: usize, baseline: f64, found: f64 },
    PixelFormat { index: usize, baseline: String, found: String },
    SampleRate { index: usize, baseline: u32, found: u32 },
    ChannelLayout { index: usize, baseline: String, found: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec { index, baseline, found } => {
                write!(f, "input {}: codec {} differs from {}", index, found, baseline)
            }
            Self::Resolution { index, baseline, found } => {
                write!(f, "input {}: resolution {} differs from {}", index, found, baseline)
            }
            Self::AudioPresence { index, baseline, found } => write!(
                f,
                "input {}: {} audio while the first input {}",
                index,
                if *found { "has" } else { "has no" },
                if *baseline { "has audio" } else { "has none" }
            ),
            Self::FrameRate { index, baseline, found } => write!(
                f,
                "input {}: frame rate {:.3} differs from {:.3}",
                index, found, baseline
            ),
            Self::PixelFormat { index, baseline, found } => {
                write!(f, "input {}: pixel format {} differs from {}", index, found, baseline)
            }
            Self::SampleRate { index, baseline, found } => {
                write!(f, "input {}: sample rate {} differs from {}", index, found, baseline)
            }
            Self::ChannelLayout { index, baseline, found } => write!(
                f,
                "input {}: channel layout {} differs from {}",
                index, found, baseline
            ),
        }
    }
}

fn compare(index: usize, base: &MediaRecord, rec: &MediaRecord) -> Option<Mismatch> {
    if rec.codec != base.codec {
        return Some(Mismatch::Codec {
            index,
            baseline: base.codec.clone(),
            found: rec.codec.clone(),
        });
    }
    if rec.resolution != base.resolution {
        return Some(Mismatch::Resolution {
            index,
            baseline: base.resolution.to_string(),
            found: rec.resolution.to_string(),
        });
    }
    if rec.has_audio != base.has_audio {
        return Some(Mismatch::AudioPresence {
            index,
            baseline: base.has_audio,
            found: rec.has_audio,
        });
    }
    // NaN never compares within tolerance
    if !((rec.frame_rate - base.frame_rate).abs() <= FRAME_RATE_TOLERANCE) {
        return Some(Mismatch::FrameRate {
            index,
            baseline: base.frame_rate,
            found: rec.frame_rate,
        });
    }
    if rec.pix_fmt != base.pix_fmt {
        return Some(Mismatch::PixelFormat {
            index,
            baseline: base.pix_fmt.clone(),
            found: rec.pix_fmt.clone(),
        });
    }
    if rec.has_audio && base.has_audio {
        if rec.audio_sample_rate != base.audio_sample_rate {
            return Some(Mismatch::SampleRate {
                index,
                baseline: base.audio_sample_rate,
                found: rec.audio_sample_rate,
            });
        }
        if rec.audio_channel_layout != base.audio_channel_layout {
            return Some(Mismatch::ChannelLayout {
                index,
                baseline: base.audio_channel_layout.clone(),
                found: rec.audio_channel_layout.clone(),
            });
        }
    }
    None
}

/// First mismatch against the baseline, in input order.
/// `None` for fewer than two records as well as for a compatible set.
pub fn first_mismatch(records: &[MediaRecord]) -> Option<Mismatch> {
    let (base, rest) = records.split_first()?;
    rest.iter()
        .enumerate()
        .find_map(|(i, rec)| compare(i + 1, base, rec))
}

/// True if every record can be stream-copied after the first one
pub fn is_fast_mergeable(records: &[MediaRecord]) -> bool {
    records.len() >= 2 && first_mismatch(records).is_none()
}
