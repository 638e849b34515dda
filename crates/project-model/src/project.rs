//! Mix project metadata and file handling.
//!
//! A project is the top-level container that ties together the ordered
//! track list, per-track edits, and release metadata written into the
//! rendered file and cue sheet.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::track::{CrossfadeCurve, Track};

/// Top-level project file (`project.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixProject {
    /// Schema version.
    pub version: String,

    /// Mix title.
    pub name: String,

    /// Mix performer.
    #[serde(default)]
    pub artist: Option<String>,

    /// Ordered tracks.
    pub tracks: Vec<Track>,

    /// Release metadata.
    #[serde(default)]
    pub metadata: MixMetadata,
}

/// Optional release metadata. Only populated fields are written out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    pub year: Option<String>,
}

impl MixMetadata {
    /// Populated fields as `(key, value)` pairs in a stable order.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("title", &self.title),
            ("artist", &self.artist),
            ("album", &self.album),
            ("genre", &self.genre),
            ("comment", &self.comment),
            ("date", &self.year),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
        .collect()
    }
}

/// Crossfade between a track and the one after it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub duration_secs: f64,
    pub curve: CrossfadeCurve,
}

/// The complete in-memory representation of a loaded project.
#[derive(Debug, Clone)]
pub struct LoadedMix {
    /// Directory that relative source paths resolve against.
    pub root: PathBuf,

    /// Path of the project file itself.
    pub path: PathBuf,

    /// Project contents, with tracks sorted by position.
    pub project: MixProject,
}

impl MixProject {
    /// Create an empty project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            name: name.into(),
            artist: None,
            tracks: vec![],
            metadata: MixMetadata::default(),
        }
    }

    /// Sort tracks by their position key.
    pub fn sort_tracks(&mut self) {
        self.tracks.sort_by_key(|t| t.position);
    }

    /// Resolve the N-1 transitions between consecutive tracks.
    ///
    /// Tracks without an explicit crossfade use `default_crossfade_secs`.
    /// Negative durations are treated as zero.
    pub fn transitions(&self, default_crossfade_secs: f64) -> Vec<Transition> {
        if self.tracks.len() < 2 {
            return vec![];
        }
        self.tracks[..self.tracks.len() - 1]
            .iter()
            .map(|track| Transition {
                duration_secs: track
                    .crossfade_secs
                    .unwrap_or(default_crossfade_secs)
                    .max(0.0),
                curve: track.crossfade_curve.unwrap_or_default(),
            })
            .collect()
    }

    /// Metadata with the project name/artist filled in where unset.
    pub fn effective_metadata(&self) -> MixMetadata {
        let mut metadata = self.metadata.clone();
        if metadata.title.is_none() {
            metadata.title = Some(self.name.clone());
        }
        if metadata.artist.is_none() {
            metadata.artist = self.artist.clone();
        }
        metadata
    }
}

impl LoadedMix {
    /// Load a project from a `project.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref().to_path_buf();
        let json = std::fs::read_to_string(&path).map_err(|e| ProjectError::IoError {
            path: path.clone(),
            source: e,
        })?;

        let mut project: MixProject =
            serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
                path: path.clone(),
                source: e,
            })?;
        project.sort_tracks();

        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            root,
            path,
            project,
        })
    }

    /// Wrap an in-memory project rooted at `root`.
    pub fn from_project(root: impl Into<PathBuf>, mut project: MixProject) -> Self {
        let root = root.into();
        project.sort_tracks();
        Self {
            path: root.join("project.json"),
            root,
            project,
        }
    }

    /// Save the project back to its file.
    pub fn save(&self) -> Result<(), ProjectError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProjectError::IoError {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json =
            serde_json::to_string_pretty(&self.project).map_err(|e| ProjectError::ParseError {
                path: self.path.clone(),
                source: e,
            })?;
        std::fs::write(&self.path, json).map_err(|e| ProjectError::IoError {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Absolute (or root-relative) path of a track's source.
    pub fn source_path(&self, track: &Track) -> PathBuf {
        if track.source.is_absolute() {
            track.source.clone()
        } else {
            self.root.join(&track.source)
        }
    }

    /// Source paths of all tracks, in track order.
    pub fn source_paths(&self) -> Vec<PathBuf> {
        self.project
            .tracks
            .iter()
            .map(|t| self.source_path(t))
            .collect()
    }

    /// Titles of tracks whose source file does not exist.
    pub fn missing_sources(&self) -> Vec<String> {
        self.project
            .tracks
            .iter()
            .filter(|t| !self.source_path(t).exists())
            .map(|t| t.title.clone())
            .collect()
    }
}

/// Errors that can occur when working with projects.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<ProjectError> for mixdown_common::MixError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::IoError { source, .. } => mixdown_common::MixError::Io(source),
            ProjectError::ParseError { source, .. } => mixdown_common::MixError::Json(source),
        }
    }
}
