//! Application configuration.
//!
//! The `export` section doubles as the persisted export settings: every
//! completed render job writes its format, bitrate, normalization flag,
//! default crossfade and cue-sheet flag back here so the next export
//! starts from the same choices.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MixError, MixResult};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Export defaults (persisted after each successful export).
    #[serde(default)]
    pub export: ExportDefaults,

    /// Encoding engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Output audio container/codec family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Uncompressed PCM in a WAVE container.
    Wav,
    /// Lossless compressed, encoded at maximum compression.
    #[default]
    Flac,
    /// Lossy MP3 at a configurable bitrate.
    Mp3,
}

impl AudioFormat {
    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// Whether the format discards audio information.
    pub fn is_lossy(self) -> bool {
        matches!(self, AudioFormat::Mp3)
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "flac" => Ok(AudioFormat::Flac),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(MixError::config(format!(
                "Unknown format: {other}. Use: wav, flac, mp3"
            ))),
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Export settings remembered between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Output format.
    pub format: AudioFormat,

    /// Bitrate for lossy formats, in kbps.
    pub bitrate_kbps: u32,

    /// Whether to run 2-pass loudness normalization.
    pub normalize: bool,

    /// Crossfade applied between tracks that do not set their own.
    pub default_crossfade_secs: f64,

    /// Whether to write a cue sheet next to the rendered file.
    pub write_cue_sheet: bool,

    /// Wall-clock time of the last successful export (RFC 3339).
    pub last_exported_at: Option<String>,
}

/// Default lossy bitrate when none is requested.
pub const DEFAULT_BITRATE_KBPS: u32 = 320;

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            format: AudioFormat::Flac,
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            normalize: false,
            default_crossfade_secs: 0.0,
            write_cue_sheet: true,
            last_exported_at: None,
        }
    }
}

/// Encoding engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Executable name or path of the encoding engine.
    pub binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "mixdown=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> MixResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> MixResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Merge export settings into the config stored at `path` and write it back.
    ///
    /// Other sections of the stored file are preserved.
    pub fn persist_export_defaults(path: &Path, export: &ExportDefaults) -> MixResult<()> {
        let mut config = Self::load_from(path);
        config.export = export.clone();
        config.export.last_exported_at = Some(chrono::Utc::now().to_rfc3339());
        config
            .save_to(path)
            .map_err(|e| MixError::persist(format!("{}: {e}", path.display())))
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("mixdown").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("FLAC".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
        assert_eq!("wave".parse::<AudioFormat>().unwrap(), AudioFormat::Wav);
        assert!("ogg".parse::<AudioFormat>().is_err());
        assert!(AudioFormat::Mp3.is_lossy());
        assert!(!AudioFormat::Flac.is_lossy());
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("nope.json"));
        assert_eq!(config.export, ExportDefaults::default());
        assert_eq!(config.engine.binary, "ffmpeg");
    }

    #[test]
    fn test_corrupt_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = AppConfig::load_from(&path);
        assert_eq!(config.export.format, AudioFormat::Flac);
    }

    #[test]
    fn test_persist_export_defaults_preserves_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut original = AppConfig::default();
        original.engine.binary = "/opt/ffmpeg/bin/ffmpeg".to_string();
        original.save_to(&path).unwrap();

        let export = ExportDefaults {
            format: AudioFormat::Mp3,
            bitrate_kbps: 192,
            normalize: true,
            default_crossfade_secs: 4.0,
            write_cue_sheet: false,
            last_exported_at: None,
        };
        AppConfig::persist_export_defaults(&path, &export).unwrap();

        let reloaded = AppConfig::load_from(&path);
        assert_eq!(reloaded.engine.binary, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(reloaded.export.format, AudioFormat::Mp3);
        assert_eq!(reloaded.export.bitrate_kbps, 192);
        assert!(reloaded.export.normalize);
        assert!(reloaded.export.last_exported_at.is_some());
    }

    #[test]
    fn test_partial_config_uses_section_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "export": { "format": "wav" } }"#).unwrap();
        assert_eq!(config.export.format, AudioFormat::Wav);
        assert_eq!(config.export.bitrate_kbps, DEFAULT_BITRATE_KBPS);
        assert!(config.export.write_cue_sheet);
        assert_eq!(config.logging.level, "info");
    }
}
