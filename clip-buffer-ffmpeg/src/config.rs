//! Recorder settings, stored as JSON in the platform config directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use clip_buffer_core::{AudioSource, AudioSourceKind, SessionConfig};

use crate::error::FfmpegError;

const SETTINGS_DIR: &str = "clip-buffer";
const SETTINGS_FILE: &str = "settings.json";

/// Output format written by the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// Transcode to MP3.
    Mp3,
    /// Write the captured container unchanged.
    Source,
}

/// Settings for the ffmpeg-backed recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Path or name of the ffmpeg binary (default: "ffmpeg" from PATH).
    pub ffmpeg_path: PathBuf,

    /// ffmpeg input device format (`pulse`, `avfoundation`, `dshow`).
    pub input_format: String,

    /// Sources offered by `list`.
    pub sources: Vec<AudioSource>,

    /// Cadence at which encoder output is cut into fragments (default: 500).
    pub fragment_interval_ms: u64,

    /// Opus bitrate of the captured stream in kbit/s (default: 96).
    pub capture_bitrate_kbps: u32,

    /// Directory clips and recordings are saved to (default: Downloads).
    pub output_dir: PathBuf,

    pub target_format: TargetFormat,

    /// MP3 bitrate in kbit/s (default: 128).
    pub mp3_bitrate_kbps: u32,

    /// MP3 sample rate in Hz (default: 44100).
    pub mp3_sample_rate: u32,

    /// MP3 channel count (default: 2).
    pub mp3_channels: u32,

    pub session: SessionConfig,
}

impl RecorderSettings {
    /// Default location of the settings file.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    /// Load settings from `path`, falling back to defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, FfmpegError> {
        if !path.exists() {
            log::info!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .map_err(|e| FfmpegError::Settings(format!("failed to read {}: {}", path.display(), e)))?;
        let settings: Self = serde_json::from_str(&raw)
            .map_err(|e| FfmpegError::Settings(format!("invalid settings in {}: {}", path.display(), e)))?;

        settings.validate()?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), FfmpegError> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| FfmpegError::Settings(format!("failed to create {}: {}", parent.display(), e)))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| FfmpegError::Settings(format!("failed to serialize settings: {}", e)))?;
        fs::write(path, json)
            .map_err(|e| FfmpegError::Settings(format!("failed to write {}: {}", path.display(), e)))?;

        log::info!("saved settings to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FfmpegError> {
        self.session.validate().map_err(FfmpegError::Settings)?;
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(FfmpegError::Settings("ffmpeg path must not be empty".into()));
        }
        if self.input_format.is_empty() {
            return Err(FfmpegError::Settings("input format must not be empty".into()));
        }
        if self.fragment_interval_ms == 0 {
            return Err(FfmpegError::Settings("fragment interval must be positive".into()));
        }
        if self.capture_bitrate_kbps == 0 || self.mp3_bitrate_kbps == 0 {
            return Err(FfmpegError::Settings("bitrate must be positive".into()));
        }
        if self.mp3_sample_rate == 0 || !(1..=2).contains(&self.mp3_channels) {
            return Err(FfmpegError::Settings(format!(
                "unsupported mp3 layout: {} Hz, {} channels",
                self.mp3_sample_rate, self.mp3_channels
            )));
        }
        Ok(())
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            input_format: default_input_format().into(),
            sources: default_sources(),
            fragment_interval_ms: 500,
            capture_bitrate_kbps: 96,
            output_dir: default_output_dir(),
            target_format: TargetFormat::Mp3,
            mp3_bitrate_kbps: 128,
            mp3_sample_rate: 44_100,
            mp3_channels: 2,
            session: SessionConfig::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs_next::download_dir()
        .or_else(|| dirs_next::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(target_os = "macos")]
fn default_input_format() -> &'static str {
    "avfoundation"
}

#[cfg(target_os = "windows")]
fn default_input_format() -> &'static str {
    "dshow"
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn default_input_format() -> &'static str {
    "pulse"
}

fn source(id: &str, name: &str, kind: AudioSourceKind, is_default: bool) -> AudioSource {
    AudioSource {
        id: id.into(),
        name: name.into(),
        kind,
        is_default,
    }
}

#[cfg(target_os = "macos")]
fn default_sources() -> Vec<AudioSource> {
    vec![source(":0", "Default input", AudioSourceKind::Microphone, true)]
}

#[cfg(target_os = "windows")]
fn default_sources() -> Vec<AudioSource> {
    vec![source("audio=Microphone", "Microphone", AudioSourceKind::Microphone, true)]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn default_sources() -> Vec<AudioSource> {
    vec![
        source("default", "Default input", AudioSourceKind::Microphone, true),
        source("@DEFAULT_MONITOR@", "Default output monitor", AudioSourceKind::SystemOutput, false),
    ]
}
