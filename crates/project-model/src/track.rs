//! Track types: a source file and the edits applied to it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Rates within this distance of 1.0 are treated as "no tempo change".
pub const UNITY_RATE_EPSILON: f64 = 1e-6;

/// A single track in the mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Ordering key within the mix (ascending).
    pub position: u32,

    /// Display title, used in the cue sheet and in error messages.
    pub title: String,

    /// Track performer, if different from the mix artist.
    #[serde(default)]
    pub artist: Option<String>,

    /// Source media file. Relative paths resolve against the project directory.
    pub source: PathBuf,

    /// Raw duration of the source in seconds.
    pub duration_secs: f64,

    /// Trim-in point (seconds). Defaults to 0.
    #[serde(default)]
    pub trim_start_secs: Option<f64>,

    /// Trim-out point (seconds). Defaults to the raw duration.
    #[serde(default)]
    pub trim_end_secs: Option<f64>,

    /// Regions cut out of the track.
    #[serde(default)]
    pub removed_regions: Vec<RemovedRegion>,

    /// Playback rate multiplier (1.0 = unchanged, >1 = faster).
    #[serde(default)]
    pub tempo_rate: Option<f64>,

    /// When set, the tempo rate ramps back to 1.0 over the end of this region.
    #[serde(default)]
    pub tempo_region: Option<TempoRegion>,

    /// Static gain in dB.
    #[serde(default)]
    pub gain_db: Option<f64>,

    /// Volume automation breakpoints (time -> linear gain).
    #[serde(default)]
    pub volume_envelope: Vec<VolumePoint>,

    /// Crossfade into the next track, in seconds. `None` inherits the export default.
    #[serde(default)]
    pub crossfade_secs: Option<f64>,

    /// Curve of the crossfade into the next track.
    #[serde(default)]
    pub crossfade_curve: Option<CrossfadeCurve>,

    /// Measured loudness from a pre-pass, if available.
    #[serde(default)]
    pub loudness: Option<LoudnessMeasurement>,

    /// Markers within the track.
    #[serde(default)]
    pub cue_points: Vec<CuePoint>,
}

/// A region removed from a track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RemovedRegion {
    pub start_secs: f64,
    pub end_secs: f64,
    /// Disabled regions are kept in the project but ignored when rendering.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RemovedRegion {
    pub fn new(start_secs: f64, end_secs: f64) -> Self {
        Self {
            start_secs,
            end_secs,
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Region over whose tail the tempo ramps back to normal speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoRegion {
    pub start_secs: f64,
    pub end_secs: f64,
    /// Length of the ramp ending at `end_secs`.
    pub ramp_secs: f64,
}

impl TempoRegion {
    /// Time at which the ramp begins, never before zero.
    pub fn ramp_start_secs(&self) -> f64 {
        (self.end_secs - self.ramp_secs.max(0.0)).max(0.0)
    }
}

/// A volume automation breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub time_secs: f64,
    /// Linear gain (1.0 = unity).
    pub value: f64,
}

/// Crossfade curve shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrossfadeCurve {
    #[default]
    Linear,
    EqualPower,
    SCurve,
    /// Unrecognized curve names fall back to linear when rendering.
    #[serde(other)]
    Unknown,
}

/// Loudness statistics reported by the measurement pre-pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoudnessMeasurement {
    /// Integrated loudness (LUFS).
    pub integrated_lufs: f64,
    /// True peak (dBTP).
    pub true_peak_dbtp: f64,
    /// Loudness range (LU).
    pub lra_lu: f64,
    /// Gating threshold (LUFS).
    pub threshold_lufs: f64,
}

/// A marker inside a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuePoint {
    /// Position on the track's own timeline (seconds).
    pub time_secs: f64,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub kind: CuePointKind,
}

/// What a cue point marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CuePointKind {
    #[default]
    Marker,
    TrimStart,
    TrimEnd,
}

impl CuePointKind {
    pub fn is_trim(self) -> bool {
        matches!(self, CuePointKind::TrimStart | CuePointKind::TrimEnd)
    }
}

/// Playable length of a track after trimming and tempo adjustment.
///
/// Faster rates shorten the output, slower rates lengthen it. Rates of
/// exactly 1 (or non-positive rates) leave the trimmed length unchanged.
pub fn effective_duration(
    duration_secs: f64,
    trim_start_secs: Option<f64>,
    trim_end_secs: Option<f64>,
    tempo_rate: Option<f64>,
) -> f64 {
    let trimmed = trim_end_secs.unwrap_or(duration_secs) - trim_start_secs.unwrap_or(0.0);
    match tempo_rate {
        Some(rate) if rate > 0.0 && (rate - 1.0).abs() > UNITY_RATE_EPSILON => trimmed / rate,
        _ => trimmed,
    }
}

/// Convert a gain in dB to a linear amplitude multiplier.
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

impl Track {
    /// Create a track with no edits.
    pub fn new(
        position: u32,
        title: impl Into<String>,
        source: impl Into<PathBuf>,
        duration_secs: f64,
    ) -> Self {
        Self {
            position,
            title: title.into(),
            artist: None,
            source: source.into(),
            duration_secs,
            trim_start_secs: None,
            trim_end_secs: None,
            removed_regions: vec![],
            tempo_rate: None,
            tempo_region: None,
            gain_db: None,
            volume_envelope: vec![],
            crossfade_secs: None,
            crossfade_curve: None,
            loudness: None,
            cue_points: vec![],
        }
    }

    /// The `[start, end]` window left after trimming.
    pub fn trim_window(&self) -> (f64, f64) {
        (
            self.trim_start_secs.unwrap_or(0.0),
            self.trim_end_secs.unwrap_or(self.duration_secs),
        )
    }

    /// See [`effective_duration`].
    pub fn effective_duration(&self) -> f64 {
        effective_duration(
            self.duration_secs,
            self.trim_start_secs,
            self.trim_end_secs,
            self.tempo_rate,
        )
    }

    /// The tempo rate if it actually changes playback speed.
    pub fn tempo_change(&self) -> Option<f64> {
        self.tempo_rate
            .filter(|rate| *rate > 0.0 && (rate - 1.0).abs() > UNITY_RATE_EPSILON)
    }

    /// Static gain as a linear multiplier, if a gain is set.
    pub fn linear_gain(&self) -> Option<f64> {
        self.gain_db.map(db_to_linear)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_duration_trim_only() {
        assert!((effective_duration(300.0, Some(30.0), Some(270.0), None) - 240.0).abs() < 1e-9);
        assert!((effective_duration(300.0, None, None, None) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_effective_duration_with_tempo() {
        assert!(
            (effective_duration(300.0, Some(30.0), Some(270.0), Some(1.2)) - 200.0).abs() < 1e-9
        );
        // Slower playback lengthens the output.
        assert!((effective_duration(100.0, None, None, Some(0.5)) - 200.0).abs() < 1e-9);
        // Unity rate is a no-op.
        assert!((effective_duration(100.0, None, None, Some(1.0)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_db_to_linear() {
        assert!((db_to_linear(-6.0) - 0.501187).abs() < 1e-5);
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_tempo_change_ignores_unity() {
        let mut track = Track::new(0, "a", "a.wav", 10.0);
        assert_eq!(track.tempo_change(), None);
        track.tempo_rate = Some(1.0);
        assert_eq!(track.tempo_change(), None);
        track.tempo_rate = Some(1.25);
        assert_eq!(track.tempo_change(), Some(1.25));
    }

    #[test]
    fn test_unknown_curve_deserializes() {
        let curve: CrossfadeCurve = serde_json::from_str("\"logarithmic\"").unwrap();
        assert_eq!(curve, CrossfadeCurve::Unknown);
        let curve: CrossfadeCurve = serde_json::from_str("\"equal_power\"").unwrap();
        assert_eq!(curve, CrossfadeCurve::EqualPower);
    }

    #[test]
    fn test_track_minimal_json() {
        let json = r#"{
            "position": 2,
            "title": "Night Drive",
            "source": "audio/night.flac",
            "duration_secs": 215.5,
            "removed_regions": [{ "start_secs": 10.0, "end_secs": 12.0 }]
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.title, "Night Drive");
        assert!(track.removed_regions[0].enabled);
        assert!(track.cue_points.is_empty());
        assert_eq!(track.trim_window(), (0.0, 215.5));
    }

    #[test]
    fn test_ramp_start_clamped() {
        let region = TempoRegion {
            start_secs: 0.0,
            end_secs: 4.0,
            ramp_secs: 10.0,
        };
        assert_eq!(region.ramp_start_secs(), 0.0);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn effective_duration_scales_inversely_with_rate(
                duration in 1.0f64..600.0,
                rate in 0.25f64..4.0,
            ) {
                let plain = effective_duration(duration, None, None, None);
                let adjusted = effective_duration(duration, None, None, Some(rate));
                let unity = (rate - 1.0).abs() <= UNITY_RATE_EPSILON;
                prop_assert!(unity || (adjusted * rate - plain).abs() < 1e-6);
            }
        }
    }
}
