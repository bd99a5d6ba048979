//! Hardware encoder detection and per-merge encoder selection

use crate::engine::core::{IntermediateFormat, Toolchain, build_encoders_cmd};
use crate::engine::process::capture;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Supported H.264 hardware encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareEncoder {
    Nvenc,
    Qsv,
    Amf,
    VideoToolbox,
}

impl HardwareEncoder {
    pub const ALL: [HardwareEncoder; 4] = [Self::Nvenc, Self::Qsv, Self::Amf, Self::VideoToolbox];

    /// Get the FFmpeg encoder name
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::Nvenc => "h264_nvenc",
            Self::Qsv => "h264_qsv",
            Self::Amf => "h264_amf",
            Self::VideoToolbox => "h264_videotoolbox",
        }
    }

    /// Get user-friendly display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Nvenc => "NVENC (NVIDIA)",
            Self::Qsv => "Quick Sync (Intel)",
            Self::Amf => "AMF (AMD)",
            Self::VideoToolbox => "VideoToolbox (Apple)",
        }
    }

    pub fn from_ffmpeg_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.ffmpeg_name() == name)
    }

    /// Vendor rate control tuned to roughly match the CPU path's quality
    pub fn args(&self) -> Vec<String> {
        let args: &[&str] = match self {
            Self::Nvenc => &["-preset", "p4", "-rc", "vbr", "-cq", "23", "-b:v", "0"],
            Self::Qsv => &["-preset", "veryfast", "-global_quality", "23"],
            Self::Amf => &["-quality", "balanced", "-rc", "cqp", "-qp_i", "23", "-qp_p", "23"],
            Self::VideoToolbox => &["-q:v", "65"],
        };

        let mut out = vec!["-c:v".to_string(), self.ffmpeg_name().to_string()];
        out.extend(args.iter().map(|s| s.to_string()));
        out
    }
}

/// Hardware encoders the local ffmpeg build reports.
///
/// Detected once at startup and passed by value/reference afterwards; never
/// mutated while a merge runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderAvailability {
    encoders: Vec<HardwareEncoder>,
}

impl EncoderAvailability {
    pub fn new(encoders: impl IntoIterator<Item = HardwareEncoder>) -> Self {
        let mut list = Vec::new();
        for encoder in encoders {
            if !list.contains(&encoder) {
                list.push(encoder);
            }
        }
        Self { encoders: list }
    }

    /// Run `ffmpeg -encoders` and match known identifiers.
    /// Detection failure degrades to "no hardware encoders".
    pub fn detect(tools: &Toolchain) -> Self {
        match capture(build_encoders_cmd(tools)) {
            Ok(output) => {
                let listing = String::from_utf8_lossy(&output.stdout);
                let availability = Self::from_encoder_listing(&listing);
                debug!(encoders = ?availability.names(), "hardware encoder detection finished");
                availability
            }
            Err(e) => {
                warn!(error = %e, "hardware encoder detection failed, using CPU encoding only");
                Self::default()
            }
        }
    }

    /// Substring match of known encoder names against the listing
    pub fn from_encoder_listing(listing: &str) -> Self {
        Self::new(
            HardwareEncoder::ALL
                .into_iter()
                .filter(|e| listing.contains(e.ffmpeg_name())),
        )
    }

    pub fn contains(&self, encoder: HardwareEncoder) -> bool {
        self.encoders.contains(&encoder)
    }

    pub fn encoders(&self) -> &[HardwareEncoder] {
        &self.encoders
    }

    pub fn names(&self) -> Vec<String> {
        self.encoders
            .iter()
            .map(|e| e.ffmpeg_name().to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }
}

/// Encoder identifier plus the full video argument vector.
/// Fixed for the duration of one merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderChoice {
    pub name: String,
    pub args: Vec<String>,
    pub hardware: bool,
}

/// How the encoder is picked and tuned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderPolicy {
    /// Hardware encoders tried in this order
    pub priority: Vec<HardwareEncoder>,
    pub software_preset: String,
    pub software_crf: u32,
    /// Appended after the encoder arguments
    pub extra_args: Vec<String>,
}

impl Default for EncoderPolicy {
    fn default() -> Self {
        Self {
            priority: vec![
                HardwareEncoder::Nvenc,
                HardwareEncoder::Qsv,
                HardwareEncoder::Amf,
            ],
            software_preset: "veryfast".to_string(),
            software_crf: 20,
            extra_args: Vec::new(),
        }
    }
}

impl EncoderPolicy {
    fn software_choice(&self) -> EncoderChoice {
        let args = vec![
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.software_preset.clone(),
            "-crf".to_string(),
            self.software_crf.to_string(),
        ];
        EncoderChoice {
            name: "libx264".to_string(),
            args,
            hardware: false,
        }
    }

    fn vp9_choice(&self) -> EncoderChoice {
        let args = [
            "-c:v", "libvpx-vp9", "-deadline", "good", "-cpu-used", "4", "-row-mt", "1", "-crf",
            "32", "-b:v", "0",
        ];
        EncoderChoice {
            name: "libvpx-vp9".to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            hardware: false,
        }
    }
}

/// Select the encoder for intermediates in `format`.
///
/// The hardware encoders are H.264 only, so WebM always gets libvpx-vp9.
pub fn select_encoder_for(
    format: IntermediateFormat,
    use_hardware: bool,
    availability: &EncoderAvailability,
    policy: &EncoderPolicy,
) -> EncoderChoice {
    match format {
        IntermediateFormat::Mp4 => select_encoder(use_hardware, availability, policy),
        IntermediateFormat::WebM => {
            let mut choice = policy.vp9_choice();
            choice.args.extend(policy.extra_args.iter().cloned());
            choice
        }
    }
}

/// Select the encoder for one merge.
///
/// With hardware enabled, the first encoder in `policy.priority` that is
/// available wins; otherwise (or if none is available) libx264 is used.
pub fn select_encoder(
    use_hardware: bool,
    availability: &EncoderAvailability,
    policy: &EncoderPolicy,
) -> EncoderChoice {
    let hardware = use_hardware
        .then(|| {
            policy
                .priority
                .iter()
                .copied()
                .find(|e| availability.contains(*e))
        })
        .flatten();

    let mut choice = match hardware {
        Some(encoder) => EncoderChoice {
            name: encoder.ffmpeg_name().to_string(),
            args: encoder.args(),
            hardware: true,
        },
        None => policy.software_choice(),
    };
    choice.args.extend(policy.extra_args.iter().cloned());
    choice
}
