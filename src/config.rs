use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::encoder::VideoEncoder;

pub const X264_PRESETS: [&str; 6] = ["ultrafast", "superfast", "veryfast", "faster", "fast", "medium"];
pub const DEFAULT_PRESET: &str = "veryfast";
pub const MIN_FRAME_RATE: u32 = 5;
pub const MAX_FRAME_RATE: u32 = 120;

const SETTINGS_ENV: &str = "SCREEN_RECORDER_SETTINGS";

/// The persisted user settings. Every field falls back to its default when
/// absent from the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ffmpeg_path: String,
    pub output_directory: String,
    pub frame_rate: u32,
    pub preset: String,
    pub encoder: VideoEncoder,
    pub monitor_index: usize,
    /// `None` until the user has made a choice; an empty name means
    /// "(none)" was picked on purpose.
    pub system_audio_device: Option<String>,
    pub microphone_device: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            output_directory: default_output_directory().to_string_lossy().to_string(),
            frame_rate: 30,
            preset: DEFAULT_PRESET.to_string(),
            encoder: VideoEncoder::X264,
            monitor_index: 0,
            system_audio_device: None,
            microphone_device: None,
        }
    }
}

fn default_output_directory() -> PathBuf {
    dirs::video_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Videos")))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
        .join("recordings")
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_or_init(&Self::settings_path())
    }

    /// Loads `path`, or writes the defaults there when it doesn't exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            let settings = Settings::default();
            settings.save_to(path)?;
            Ok(settings)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path())
    }

    /// Reads settings from `path`. A file that can't be parsed yields the
    /// defaults; it is overwritten on the next save.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;

        let settings = match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings.normalized(),
            Err(e) => {
                warn!("Ignoring unreadable settings {} ({}); using defaults", path.display(), e);
                Settings::default()
            }
        };
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn settings_path() -> PathBuf {
        if let Some(custom) = std::env::var_os(SETTINGS_ENV) {
            return PathBuf::from(custom);
        }
        dirs::config_dir()
            .unwrap_or_default()
            .join("screen-recorder")
            .join("settings.json")
    }

    fn normalized(mut self) -> Self {
        self.frame_rate = self.frame_rate.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE);
        if !X264_PRESETS.contains(&self.preset.as_str()) {
            warn!("Unknown preset '{}', falling back to {}", self.preset, DEFAULT_PRESET);
            self.preset = DEFAULT_PRESET.to_string();
        }
        if self.ffmpeg_path.trim().is_empty() {
            self.ffmpeg_path = "ffmpeg".to_string();
        }
        self.system_audio_device = self.system_audio_device.map(|d| d.trim().to_string());
        self.microphone_device = self.microphone_device.map(|d| d.trim().to_string());
        self
    }

    pub fn output_path(&self) -> PathBuf {
        let trimmed = self.output_directory.trim();
        if trimmed.is_empty() {
            default_output_directory()
        } else {
            PathBuf::from(trimmed)
        }
    }
}
