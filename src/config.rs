// Global configuration management

use crate::engine::{EncoderPolicy, HardwareEncoder, NormalizeSettings, Toolchain, split_extra_args};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: Toolchain,

    #[serde(default)]
    pub encoding: EncodingConfig,

    #[serde(default)]
    pub normalize: NormalizeSettings,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Prefer a hardware H.264 encoder when re-encoding
    #[serde(default)]
    pub use_hardware_encoding: bool,

    /// Hardware encoders to try, in order (ffmpeg encoder names)
    #[serde(default = "default_hardware_priority")]
    pub hardware_priority: Vec<String>,

    /// libx264 preset used when no hardware encoder is selected
    #[serde(default = "default_software_preset")]
    pub software_preset: String,

    #[serde(default = "default_software_crf")]
    pub software_crf: u32,

    /// Extra video encoder arguments, shell quoted (e.g. `-tune film`)
    #[serde(default)]
    pub extra_video_args: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Name used when no output path is given.
    /// Supports: {timestamp}, {ext}
    #[serde(default = "default_name_pattern")]
    pub default_name_pattern: String,
}

fn default_hardware_priority() -> Vec<String> {
    EncoderPolicy::default()
        .priority
        .iter()
        .map(|e| e.ffmpeg_name().to_string())
        .collect()
}

fn default_software_preset() -> String {
    "veryfast".to_string()
}

fn default_software_crf() -> u32 {
    20
}

fn default_name_pattern() -> String {
    "merged-{timestamp}.{ext}".to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            use_hardware_encoding: false,
            hardware_priority: default_hardware_priority(),
            software_preset: default_software_preset(),
            software_crf: default_software_crf(),
            extra_video_args: String::new(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            default_name_pattern: default_name_pattern(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("vidstitch")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("vidstitch")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();

            // Try to save the default config, but don't fail if we can't
            // (e.g., if the directory isn't writable)
            if let Err(e) = config.save() {
                tracing::warn!(error = %e, "could not create default config file, using built-in defaults");
            }

            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    pub fn toolchain(&self) -> Toolchain {
        self.tools.clone()
    }

    /// Encoder policy; unknown names in `hardware_priority` are skipped
    pub fn encoder_policy(&self) -> EncoderPolicy {
        let priority = self
            .encoding
            .hardware_priority
            .iter()
            .filter_map(|name| {
                let encoder = HardwareEncoder::from_ffmpeg_name(name.trim());
                if encoder.is_none() {
                    tracing::warn!(encoder = %name, "unknown hardware encoder in config, ignoring");
                }
                encoder
            })
            .collect();

        EncoderPolicy {
            priority,
            software_preset: self.encoding.software_preset.clone(),
            software_crf: self.encoding.software_crf,
            extra_args: split_extra_args(&self.encoding.extra_video_args),
        }
    }

    pub fn normalize_settings(&self) -> NormalizeSettings {
        self.normalize.clone()
    }

    /// Output path for a merge when none was given: next to the first input,
    /// named from `default_name_pattern`, extension of the first input
    pub fn default_output_path(&self, first_input: &Path) -> PathBuf {
        self.default_output_path_at(first_input, Local::now())
    }

    pub fn default_output_path_at(&self, first_input: &Path, now: DateTime<Local>) -> PathBuf {
        let ext = first_input
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .unwrap_or("mp4");
        let name = self
            .output
            .default_name_pattern
            .replace("{timestamp}", &now.format("%Y%m%d-%H%M%S").to_string())
            .replace("{ext}", ext);

        let dir = first_input.parent().unwrap_or_else(|| Path::new(""));
        dir.join(name)
    }
}
