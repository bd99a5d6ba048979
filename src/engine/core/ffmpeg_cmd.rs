use super::ffmpeg_info::Toolchain;
use super::types::{ConcatMode, Resolution};
use crate::engine::hardware::EncoderChoice;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// Fixed output parameters every normalized intermediate shares
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeSettings {
    pub frame_rate: u32,
    pub pix_fmt: String,
    pub audio_codec: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    pub audio_bitrate_kbps: u32,
}

impl Default for NormalizeSettings {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            pix_fmt: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_sample_rate: 48_000,
            audio_channels: 2,
            audio_bitrate_kbps: 192,
        }
    }
}

impl NormalizeSettings {
    /// lavfi source for a silent stereo track at the target sample rate
    pub fn silence_source(&self) -> String {
        format!(
            "anullsrc=channel_layout=stereo:sample_rate={}",
            self.audio_sample_rate
        )
    }
}

/// Container and codec family of the normalized intermediates.
///
/// Follows the output container: the final concat stream-copies the
/// intermediates, so their codecs must be ones the output muxer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntermediateFormat {
    /// H.264 + the configured audio codec in .mp4
    #[default]
    Mp4,
    /// VP9 + Opus in .webm
    WebM,
}

impl IntermediateFormat {
    pub fn for_output(output: &Path) -> Self {
        match output.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("webm") => Self::WebM,
            _ => Self::Mp4,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::WebM => "webm",
        }
    }

    /// Normalize settings with an audio codec this container can hold
    pub fn settings(self, base: &NormalizeSettings) -> NormalizeSettings {
        let mut settings = base.clone();
        if self == Self::WebM {
            settings.audio_codec = "libopus".to_string();
        }
        settings
    }
}

/// What a normalization task does with audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPlan {
    /// Re-encode the source's first audio stream to the target layout
    Reencode,
    /// Source has no audio but others do: add a silent track
    Silence,
    /// Nobody has audio: drop the audio stream entirely
    Omit,
}

impl AudioPlan {
    pub fn for_input(has_audio: bool, audio_normalization: bool) -> Self {
        match (has_audio, audio_normalization) {
            (true, _) => Self::Reencode,
            (false, true) => Self::Silence,
            (false, false) => Self::Omit,
        }
    }
}

/// Split user-provided extra ffmpeg arguments, shell style.
/// Quoted strings with spaces are preserved.
pub fn split_extra_args(extra: &str) -> Vec<String> {
    if extra.trim().is_empty() {
        return Vec::new();
    }

    // If shlex fails to parse (unbalanced quotes), fall back to simple whitespace split
    shlex::split(extra)
        .unwrap_or_else(|| extra.split_whitespace().map(str::to_string).collect())
}

/// Fit inside the target keeping aspect ratio, pad centered, force format and fps
pub fn scale_pad_filter(target: Resolution, settings: &NormalizeSettings) -> String {
    let Resolution { width, height } = target;
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,setsar=1,format={fmt},\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,fps={fps}",
        w = width,
        h = height,
        fmt = settings.pix_fmt,
        fps = settings.frame_rate
    )
}

/// Build the per-file re-encode command used during normalization
pub fn build_normalize_cmd(
    tools: &Toolchain,
    input: &Path,
    output: &Path,
    target: Resolution,
    encoder: &EncoderChoice,
    audio: AudioPlan,
    settings: &NormalizeSettings,
) -> Command {
    let mut cmd = tools.ffmpeg_command();
    cmd.args(["-y", "-hide_banner", "-nostdin", "-loglevel", "error"]);

    cmd.arg("-i").arg(input);
    if audio == AudioPlan::Silence {
        cmd.args(["-f", "lavfi", "-i"]).arg(settings.silence_source());
    }

    // Only the first video (and audio) stream; keeps stream counts identical
    cmd.args(["-map", "0:v:0"]);
    match audio {
        AudioPlan::Reencode => {
            cmd.args(["-map", "0:a:0"]);
        }
        AudioPlan::Silence => {
            cmd.args(["-map", "1:a:0"]);
        }
        AudioPlan::Omit => {}
    }

    cmd.arg("-vf").arg(scale_pad_filter(target, settings));
    cmd.args(&encoder.args);
    cmd.arg("-pix_fmt").arg(&settings.pix_fmt);
    cmd.arg("-r").arg(settings.frame_rate.to_string());

    if audio == AudioPlan::Omit {
        cmd.arg("-an");
    } else {
        cmd.arg("-c:a").arg(&settings.audio_codec);
        cmd.arg("-b:a")
            .arg(format!("{}k", settings.audio_bitrate_kbps));
        cmd.arg("-ar").arg(settings.audio_sample_rate.to_string());
        cmd.arg("-ac").arg(settings.audio_channels.to_string());
    }
    if audio == AudioPlan::Silence {
        // anullsrc never ends; stop at the video's end
        cmd.arg("-shortest");
    }

    cmd.args(["-sn", "-dn", "-map_chapters", "-1", "-map_metadata", "-1"]);
    cmd.arg(output);

    cmd
}

/// Build the concat-demuxer command. Never re-encodes.
pub fn build_concat_cmd(
    tools: &Toolchain,
    manifest: &Path,
    output: &Path,
    mode: ConcatMode,
) -> Command {
    let mut cmd = tools.ffmpeg_command();
    cmd.args(["-y", "-hide_banner", "-nostdin", "-loglevel", "error"]);

    if mode == ConcatMode::Fast {
        // Any error, even a "harmless" one, means the copy can't be trusted
        cmd.arg("-xerror");
    }

    cmd.args(["-f", "concat", "-safe", "0"]);
    cmd.arg("-i").arg(manifest);
    cmd.args(["-c", "copy"]);

    if mode == ConcatMode::Final {
        // Progress output (structured key=value to stdout)
        cmd.args(["-progress", "-", "-nostats"]);
    }

    cmd.arg(output);
    cmd
}

/// Single JPEG frame at 1s, written to stdout
pub fn build_thumbnail_cmd(tools: &Toolchain, input: &Path) -> Command {
    let mut cmd = tools.ffmpeg_command();
    cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error"]);
    cmd.args(["-ss", "00:00:01.000"]);
    cmd.arg("-i").arg(input);
    cmd.args(["-frames:v", "1", "-f", "image2pipe", "-c:v", "mjpeg", "-"]);
    cmd
}

/// ffprobe JSON dump of container format and all streams
pub fn build_probe_cmd(tools: &Toolchain, input: &Path) -> Command {
    let mut cmd = tools.ffprobe_command();
    cmd.args([
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]);
    cmd.arg(input);
    cmd
}

/// `ffmpeg -encoders` listing used for hardware detection
pub fn build_encoders_cmd(tools: &Toolchain) -> Command {
    let mut cmd = tools.ffmpeg_command();
    cmd.args(["-hide_banner", "-encoders"]);
    cmd
}
