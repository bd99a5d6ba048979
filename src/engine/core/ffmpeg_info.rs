use crate::engine::error::MergeError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;

const INSTALL_HINT: &str = "FFmpeg is required for this application to function. \
Please install it and ensure ffmpeg and ffprobe are in your system's PATH \
(or set [tools] in the config file).\n\n\
For installation instructions, please visit: https://ffmpeg.org/download.html";

/// Locations of the external ffmpeg/ffprobe executables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl Toolchain {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    pub fn ffmpeg_command(&self) -> Command {
        Command::new(&self.ffmpeg)
    }

    pub fn ffprobe_command(&self) -> Command {
        Command::new(&self.ffprobe)
    }

    /// Check if ffmpeg is available and return its version
    pub fn ffmpeg_version(&self) -> Result<String> {
        first_version_line(self.ffmpeg_command(), "ffmpeg")
    }

    /// Check if ffprobe is available and return its version
    pub fn ffprobe_version(&self) -> Result<String> {
        first_version_line(self.ffprobe_command(), "ffprobe")
    }

    /// Startup gate: both tools must run, otherwise nothing can be merged
    pub fn verify(&self) -> Result<(), MergeError> {
        self.ffmpeg_version()
            .and_then(|_| self.ffprobe_version())
            .map(|_| ())
            .map_err(|e| MergeError::ToolMissing(format!("{:#}\n\n{}", e, INSTALL_HINT)))
    }
}

fn first_version_line(mut cmd: Command, name: &str) -> Result<String> {
    let output = cmd.arg("-version").output().with_context(|| {
        format!(
            "Failed to execute {} ({}). Is it installed and in PATH?",
            name,
            cmd.get_program().to_string_lossy()
        )
    })?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", name, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}
