//! Cue sheet generation.
//!
//! Track start times are rebuilt from durations, trims, tempo and
//! crossfades rather than read back from the compiled graph, so the two
//! must agree on the same arithmetic.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use mixdown_common::config::AudioFormat;
use mixdown_common::error::{MixError, MixResult};
use mixdown_project_model::project::{MixProject, Transition};
use mixdown_project_model::track::{effective_duration, Track};

/// Cue sheet frames per second.
pub const FRAMES_PER_SECOND: f64 = 75.0;

/// Highest index number a track can carry.
const MAX_INDEX: usize = 99;

/// Render seconds as `MM:SS:FF`.
///
/// Frames are rounded but never reach 75; a fraction that would round up
/// to a full second is held at frame 74.
pub fn seconds_to_cue_time(secs: f64) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    let whole = secs.floor();
    let frames = ((secs - whole) * FRAMES_PER_SECOND)
        .round()
        .min(FRAMES_PER_SECOND - 1.0) as u64;
    let whole = whole as u64;
    format!("{:02}:{:02}:{:02}", whole / 60, whole % 60, frames)
}

/// Output start time of each track.
///
/// `start[0] = 0` and each later start is the previous start plus the
/// previous track's duration minus the crossfade between them.
pub fn compute_start_times(durations: &[f64], crossfades: &[f64]) -> Vec<f64> {
    let mut starts = Vec::with_capacity(durations.len());
    let mut cursor = 0.0;
    for (i, duration) in durations.iter().enumerate() {
        starts.push(cursor);
        cursor += duration - crossfades.get(i).copied().unwrap_or(0.0);
    }
    starts
}

fn track_duration(track: &Track) -> f64 {
    effective_duration(
        track.duration_secs,
        track.trim_start_secs,
        track.trim_end_secs,
        track.tempo_rate,
    )
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\\\""))
}

fn file_type(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Mp3 => "MP3",
        AudioFormat::Wav | AudioFormat::Flac => "WAVE",
    }
}

/// Absolute output times of a track's markers, sorted by local time.
///
/// Trim markers and markers outside the trim window are left out.
fn marker_times(track: &Track, track_start: f64) -> Vec<f64> {
    let (trim_start, trim_end) = track.trim_window();
    let mut local: Vec<f64> = track
        .cue_points
        .iter()
        .filter(|cue| !cue.kind.is_trim())
        .map(|cue| cue.time_secs)
        .filter(|t| *t >= trim_start && *t <= trim_end)
        .collect();
    local.sort_by(f64::total_cmp);
    local
        .into_iter()
        .map(|t| track_start + (t - trim_start))
        .collect()
}

/// Render the cue sheet for a mix written to `file_name`.
pub fn generate_cue_sheet(
    project: &MixProject,
    transitions: &[Transition],
    file_name: &str,
    format: AudioFormat,
) -> String {
    let metadata = project.effective_metadata();
    let mut out = String::new();

    if let Some(genre) = metadata.genre.as_deref().filter(|g| !g.trim().is_empty()) {
        let _ = writeln!(out, "REM GENRE {}", quoted(genre));
    }
    if let Some(year) = metadata.year.as_deref().filter(|y| !y.trim().is_empty()) {
        let _ = writeln!(out, "REM DATE {}", year.trim());
    }
    if let Some(comment) = metadata.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        let _ = writeln!(out, "REM COMMENT {}", quoted(comment));
    }
    if let Some(artist) = metadata.artist.as_deref() {
        let _ = writeln!(out, "PERFORMER {}", quoted(artist));
    }
    let title = metadata.title.as_deref().unwrap_or(&project.name);
    let _ = writeln!(out, "TITLE {}", quoted(title));
    let _ = writeln!(out, "FILE {} {}", quoted(file_name), file_type(format));

    let durations: Vec<f64> = project.tracks.iter().map(track_duration).collect();
    let crossfades: Vec<f64> = transitions.iter().map(|t| t.duration_secs).collect();
    let starts = compute_start_times(&durations, &crossfades);

    for (i, (track, start)) in project.tracks.iter().zip(starts).enumerate() {
        let _ = writeln!(out, "  TRACK {:02} AUDIO", i + 1);
        let _ = writeln!(out, "    TITLE {}", quoted(&track.title));
        if let Some(artist) = track.artist.as_deref() {
            let _ = writeln!(out, "    PERFORMER {}", quoted(artist));
        }
        let _ = writeln!(out, "    INDEX 01 {}", seconds_to_cue_time(start));

        let markers = marker_times(track, start);
        if markers.len() + 1 > MAX_INDEX {
            tracing::warn!(
                track = %track.title,
                markers = markers.len(),
                "Too many cue points; extra markers dropped"
            );
        }
        for (n, time) in markers.into_iter().take(MAX_INDEX - 1).enumerate() {
            let _ = writeln!(out, "    INDEX {:02} {}", n + 2, seconds_to_cue_time(time));
        }
    }

    out
}

/// Cue sheet path beside a rendered file.
pub fn cue_path_for(output: &Path) -> PathBuf {
    output.with_extension("cue")
}

/// Write a cue sheet, reporting failures as [`MixError::CueSheet`].
pub async fn write_cue_sheet(path: &Path, contents: &str) -> MixResult<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| MixError::cue_sheet(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_project_model::project::MixMetadata;
    use mixdown_project_model::track::{CrossfadeCurve, CuePoint, CuePointKind};
    use proptest::prelude::*;

    fn cue(time_secs: f64, kind: CuePointKind) -> CuePoint {
        CuePoint {
            time_secs,
            label: None,
            kind,
        }
    }

    fn fade(duration_secs: f64) -> Transition {
        Transition {
            duration_secs,
            curve: CrossfadeCurve::Linear,
        }
    }

    #[test]
    fn test_cue_time_never_emits_frame_75() {
        assert_eq!(seconds_to_cue_time(0.9967), "00:00:74");
        assert_eq!(seconds_to_cue_time(61.9967), "01:01:74");
        assert_eq!(seconds_to_cue_time(0.0), "00:00:00");
        assert_eq!(seconds_to_cue_time(195.5), "03:15:38");
        assert_eq!(seconds_to_cue_time(-3.0), "00:00:00");
    }

    #[test]
    fn test_compute_start_times() {
        assert_eq!(
            compute_start_times(&[200.0, 180.0, 150.0], &[5.0, 3.0, 0.0]),
            vec![0.0, 195.0, 372.0]
        );
        assert!(compute_start_times(&[], &[]).is_empty());
    }

    #[test]
    fn test_full_sheet() {
        let mut project = MixProject::new("Night \"Shift\"");
        project.artist = Some("DJ Test".to_string());
        project.metadata = MixMetadata {
            genre: Some("Techno".to_string()),
            year: Some("2024".to_string()),
            ..Default::default()
        };

        let mut a = Track::new(0, "Opener", "a.wav", 200.0);
        a.cue_points = vec![
            cue(150.0, CuePointKind::Marker),
            cue(0.0, CuePointKind::TrimStart),
            cue(60.0, CuePointKind::Marker),
        ];
        let mut b = Track::new(1, "Middle", "b.wav", 300.0);
        b.artist = Some("Guest".to_string());
        b.trim_start_secs = Some(30.0);
        b.trim_end_secs = Some(270.0);
        b.tempo_rate = Some(1.2);
        b.cue_points = vec![cue(20.0, CuePointKind::Marker), cue(40.0, CuePointKind::Marker)];
        let c = Track::new(2, "Closer", "c.wav", 150.0);
        project.tracks = vec![a, b, c];

        let sheet = generate_cue_sheet(
            &project,
            &[fade(5.0), fade(3.0)],
            "mix.flac",
            AudioFormat::Flac,
        );
        let expected = "\
REM GENRE \"Techno\"
REM DATE 2024
PERFORMER \"DJ Test\"
TITLE \"Night \\\"Shift\\\"\"
FILE \"mix.flac\" WAVE
  TRACK 01 AUDIO
    TITLE \"Opener\"
    INDEX 01 00:00:00
    INDEX 02 01:00:00
    INDEX 03 02:30:00
  TRACK 02 AUDIO
    TITLE \"Middle\"
    PERFORMER \"Guest\"
    INDEX 01 03:15:00
    INDEX 02 03:25:00
  TRACK 03 AUDIO
    TITLE \"Closer\"
    INDEX 01 06:32:00
";
        assert_eq!(sheet, expected);
    }

    #[test]
    fn test_mp3_file_type() {
        let mut project = MixProject::new("M");
        project.tracks = vec![Track::new(0, "Only", "a.mp3", 10.0)];
        let sheet = generate_cue_sheet(&project, &[], "m.mp3", AudioFormat::Mp3);
        assert!(sheet.contains("FILE \"m.mp3\" MP3\n"));
        assert!(!sheet.contains("PERFORMER"));
    }

    #[test]
    fn test_cue_path_for() {
        assert_eq!(cue_path_for(Path::new("/out/mix.flac")), PathBuf::from("/out/mix.cue"));
    }

    #[tokio::test]
    async fn test_write_failure_is_cue_sheet_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("mix.cue");
        let err = write_cue_sheet(&path, "TITLE \"x\"\n").await.unwrap_err();
        assert!(matches!(err, MixError::CueSheet { .. }));
    }

    proptest! {
        #[test]
        fn prop_cue_time_round_trips_within_a_frame(secs in 0.0f64..5999.0) {
            let text = seconds_to_cue_time(secs);
            let parts: Vec<u64> = text.split(':').map(|p| p.parse().unwrap()).collect();
            prop_assert_eq!(parts.len(), 3);
            prop_assert!(parts[1] < 60);
            prop_assert!(parts[2] < 75);
            let back = (parts[0] * 60 + parts[1]) as f64 + parts[2] as f64 / FRAMES_PER_SECOND;
            prop_assert!((back - secs).abs() <= 1.0 / FRAMES_PER_SECOND);
        }

        #[test]
        fn prop_marker_indexes_increase_with_time(
            times in prop::collection::vec(0.0f64..200.0, 0..12),
        ) {
            let mut track = Track::new(0, "T", "t.wav", 200.0);
            track.cue_points = times.iter().map(|t| cue(*t, CuePointKind::Marker)).collect();
            let marks = marker_times(&track, 10.0);
            prop_assert_eq!(marks.len(), times.len());
            for pair in marks.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }
    }
}
