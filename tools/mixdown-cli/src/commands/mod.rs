pub mod cue;
pub mod export;
pub mod graph;
pub mod info;
pub mod validate;

use std::path::{Path, PathBuf};

use mixdown_common::config::{AudioFormat, ExportDefaults};
use mixdown_project_model::LoadedMix;

/// Export options given on the command line.
#[derive(Debug, Default)]
pub struct ExportOverrides {
    pub format: Option<String>,
    pub bitrate_kbps: Option<u32>,
    pub normalize: Option<bool>,
    pub crossfade_secs: Option<f64>,
    pub write_cue_sheet: Option<bool>,
}

impl ExportOverrides {
    /// Layer the overrides on top of the saved defaults.
    pub fn apply(&self, defaults: &ExportDefaults) -> anyhow::Result<ExportDefaults> {
        let mut settings = defaults.clone();
        if let Some(format) = &self.format {
            settings.format = format.parse()?;
        }
        if let Some(kbps) = self.bitrate_kbps {
            settings.bitrate_kbps = kbps;
        }
        if let Some(normalize) = self.normalize {
            settings.normalize = normalize;
        }
        if let Some(secs) = self.crossfade_secs {
            if !(secs.is_finite() && secs >= 0.0) {
                anyhow::bail!("Crossfade must be a non-negative number of seconds, got {secs}");
            }
            settings.default_crossfade_secs = secs;
        }
        if let Some(write) = self.write_cue_sheet {
            settings.write_cue_sheet = write;
        }
        Ok(settings)
    }
}

/// Load a project from `project.json` or a directory containing one.
pub fn load_mix(path: &Path) -> anyhow::Result<LoadedMix> {
    let file = if path.is_dir() {
        path.join("project.json")
    } else {
        path.to_path_buf()
    };
    LoadedMix::load(&file).map_err(|e| anyhow::anyhow!("Failed to load project: {e}"))
}

/// `<project dir>/<project name>.<ext>`, with unsafe name characters replaced.
pub fn default_output(mix: &LoadedMix, format: AudioFormat) -> PathBuf {
    let stem: String = mix
        .project
        .name
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() { "mix".to_string() } else { stem };
    mix.root.join(format!("{stem}.{}", format.extension()))
}

/// Quote an argument for display in a shell.
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '+')
            });
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0);
    let minutes = (total / 60.0).floor();
    format!("{}:{:06.3}", minutes as u64, total - minutes * 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_project_model::MixProject;

    #[test]
    fn test_overrides_layer_on_defaults() {
        let defaults = ExportDefaults::default();
        let overrides = ExportOverrides {
            format: Some("mp3".to_string()),
            bitrate_kbps: Some(192),
            crossfade_secs: Some(4.5),
            write_cue_sheet: Some(false),
            ..Default::default()
        };
        let settings = overrides.apply(&defaults).unwrap();
        assert_eq!(settings.format, AudioFormat::Mp3);
        assert_eq!(settings.bitrate_kbps, 192);
        assert_eq!(settings.default_crossfade_secs, 4.5);
        assert!(!settings.write_cue_sheet);
        assert!(!settings.normalize);

        let untouched = ExportOverrides::default().apply(&defaults).unwrap();
        assert_eq!(untouched.format, defaults.format);
        assert!(untouched.write_cue_sheet);
    }

    #[test]
    fn test_overrides_can_restore_saved_toggles() {
        let saved = ExportDefaults {
            normalize: true,
            write_cue_sheet: false,
            ..ExportDefaults::default()
        };

        let kept = ExportOverrides::default().apply(&saved).unwrap();
        assert!(kept.normalize);
        assert!(!kept.write_cue_sheet);

        let restored = ExportOverrides {
            normalize: Some(false),
            write_cue_sheet: Some(true),
            ..Default::default()
        }
        .apply(&saved)
        .unwrap();
        assert!(!restored.normalize);
        assert!(restored.write_cue_sheet);
    }

    #[test]
    fn test_overrides_reject_bad_values() {
        let defaults = ExportDefaults::default();
        let bad_format = ExportOverrides {
            format: Some("ogg".to_string()),
            ..Default::default()
        };
        assert!(bad_format.apply(&defaults).is_err());

        let bad_fade = ExportOverrides {
            crossfade_secs: Some(-1.0),
            ..Default::default()
        };
        assert!(bad_fade.apply(&defaults).is_err());
    }

    #[test]
    fn test_default_output_sanitizes_name() {
        let mix = LoadedMix::from_project("/sets", MixProject::new("Friday Night: Part 2"));
        assert_eq!(
            default_output(&mix, AudioFormat::Flac),
            PathBuf::from("/sets/Friday_Night__Part_2.flac")
        );
    }

    #[test]
    fn test_load_mix_accepts_directory() {
        let dir = tempfile::tempdir().unwrap();
        LoadedMix::from_project(dir.path(), MixProject::new("Dir"))
            .save()
            .unwrap();
        let mix = load_mix(dir.path()).unwrap();
        assert_eq!(mix.project.name, "Dir");
        assert!(load_mix(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("-hide_banner"), "-hide_banner");
        assert_eq!(shell_quote("[out]"), "'[out]'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(195.5), "3:15.500");
        assert_eq!(format_duration(0.0), "0:00.000");
    }
}
