//! Progress accounting for render jobs.
//!
//! The analysis phase owns the first [`ANALYSIS_SHARE`] percent of a job;
//! encoding fills the rest in proportion to encoded time over the
//! estimated mix length.

use mixdown_project_model::project::Transition;
use mixdown_project_model::track::Track;

/// Percentage of overall progress reserved for loudness analysis.
pub const ANALYSIS_SHARE: f64 = 20.0;

/// Bytes of engine diagnostics kept for error reports.
pub const DIAGNOSTIC_TAIL_BYTES: usize = 4096;

/// Progress during the rendering phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderProgress {
    pub percent: f64,
    pub eta_secs: Option<f64>,
}

/// Estimated output length: effective durations minus crossfade overlap.
///
/// Tempo-ramp regions are not accounted for, so heavily ramped mixes can
/// report progress that drifts from the real encode position.
pub fn total_mix_duration(tracks: &[Track], transitions: &[Transition]) -> f64 {
    let played: f64 = tracks.iter().map(Track::effective_duration).sum();
    let overlap: f64 = transitions.iter().map(|t| t.duration_secs).sum();
    (played - overlap).max(0.0)
}

/// Overall percentage after `done` of `total` tracks have been analyzed.
pub fn analysis_percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return ANALYSIS_SHARE;
    }
    ANALYSIS_SHARE * (done.min(total) as f64 / total as f64)
}

/// Map encoded time onto the 20-100% band and estimate time remaining.
pub fn render_progress(encoded_secs: f64, total_secs: f64, wall_secs: f64) -> RenderProgress {
    let fraction = if total_secs <= 0.0 {
        0.0
    } else {
        (encoded_secs / total_secs).clamp(0.0, 1.0)
    };

    let eta_secs = (fraction > 0.0).then(|| ((wall_secs / fraction) - wall_secs).max(0.0));

    RenderProgress {
        percent: ANALYSIS_SHARE + fraction * (100.0 - ANALYSIS_SHARE),
        eta_secs,
    }
}

/// Elapsed encoded time from the last parsable `time=HH:MM:SS.ff` in a chunk.
pub fn parse_elapsed_secs(chunk: &str) -> Option<f64> {
    chunk
        .rmatch_indices("time=")
        .find_map(|(idx, marker)| parse_clock(&chunk[idx + marker.len()..]))
}

fn parse_clock(text: &str) -> Option<f64> {
    let token = text.split_whitespace().next()?;
    let mut parts = token.splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total.is_finite() && total >= 0.0).then_some(total)
}

/// Bounded tail of the engine's diagnostic stream.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    buf: String,
    cap: usize,
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::with_capacity(DIAGNOSTIC_TAIL_BYTES)
    }
}

impl DiagnosticTail {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.buf.push_str(chunk);
        if self.buf.len() > self.cap {
            let mut cut = self.buf.len() - self.cap;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}
