//! Per-track processing chains.
//!
//! Each track compiles to a run of stages in fixed order: segment
//! extraction, tempo, volume, normalization. Only the last stage is
//! mandatory; it always produces the chain's single output `[a{i}]`.

use mixdown_project_model::track::{Track, VolumePoint, UNITY_RATE_EPSILON};

use crate::graph::{num, Filter, FilterStage, Pad};
use crate::loudness::LoudnessTargets;
use crate::segments::{compute_kept_segments, total_length, Interval};

/// Equal-width steps used to approximate a tempo ramp.
///
/// The stretch filter has no ramp mode, so a ramp is a staircase of
/// constant rates. More steps give a smoother ramp at the cost of a
/// larger graph.
pub const TEMPO_RAMP_STEPS: usize = 8;

/// Lowest rate a single `atempo` instance is given.
pub const ATEMPO_MIN: f64 = 0.5;

/// Highest rate a single `atempo` instance is given.
pub const ATEMPO_MAX: f64 = 2.0;

/// Length of the silent stand-in for a track with nothing left to play.
pub const PLACEHOLDER_SECS: f64 = 0.001;

/// Options shared by every chain in a mix.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainOptions {
    pub normalize: bool,
    pub targets: LoudnessTargets,
}

/// Compiled stages for one track.
#[derive(Debug, Clone)]
pub struct TrackChain {
    /// Engine input index of the track's source.
    pub index: usize,
    pub stages: Vec<FilterStage>,
    pub output: Pad,
}

impl TrackChain {
    /// Rename the chain's output pad.
    pub fn relabel_output(&mut self, label: Pad) {
        for stage in self.stages.iter_mut().rev() {
            if let Some(pad) = stage.outputs.iter_mut().find(|p| **p == self.output) {
                *pad = label.clone();
                break;
            }
        }
        self.output = label;
    }
}

struct ChainBuilder {
    index: usize,
    stages: Vec<FilterStage>,
    current: Pad,
}

impl ChainBuilder {
    fn pad(&self, suffix: &str) -> Pad {
        Pad::new(format!("t{}_{suffix}", self.index))
    }

    /// Append a single-input stage fed by the current output.
    fn then(&mut self, filters: Vec<Filter>, output: Pad) {
        let input = std::mem::replace(&mut self.current, output.clone());
        self.stages.push(FilterStage::chain(input, filters, output));
    }

    /// Split the current output into one branch per piece, run each
    /// piece's filters, and join the branches back together in order.
    fn split_join(&mut self, tag: &str, pieces: Vec<Vec<Filter>>, output: Pad) {
        if pieces.len() == 1 {
            if let Some(filters) = pieces.into_iter().next() {
                self.then(filters, output);
            }
            return;
        }

        let count = pieces.len();
        let branches: Vec<Pad> = (0..count)
            .map(|k| self.pad(&format!("{tag}src{k}")))
            .collect();
        let input = std::mem::replace(&mut self.current, output.clone());
        self.stages.push(FilterStage::new(
            vec![input],
            vec![Filter::new("asplit").value(count)],
            branches.clone(),
        ));

        let mut joined = Vec::with_capacity(count);
        for (k, (branch, filters)) in branches.into_iter().zip(pieces).enumerate() {
            let piece = self.pad(&format!("{tag}seg{k}"));
            self.stages
                .push(FilterStage::chain(branch, filters, piece.clone()));
            joined.push(piece);
        }
        self.stages
            .push(FilterStage::new(joined, vec![concat(count)], vec![output]));
    }
}

/// Compile one track into its processing chain.
pub fn compile_track_chain(index: usize, track: &Track, options: &ChainOptions) -> TrackChain {
    let mut builder = ChainBuilder {
        index,
        stages: vec![],
        current: Pad::input(index),
    };

    let (trim_start, trim_end) = track.trim_window();
    let kept = compute_kept_segments(Interval::new(trim_start, trim_end), &track.removed_regions);
    extract_segments(&mut builder, track, &kept);

    if let Some(rate) = track.tempo_change() {
        match track.tempo_region {
            Some(region) => {
                let cut_len = if kept.is_empty() {
                    PLACEHOLDER_SECS
                } else {
                    total_length(&kept)
                };
                let pieces = ramp_pieces(rate, region.ramp_start_secs(), region.end_secs, cut_len);
                let tempo = builder.pad("tempo");
                builder.split_join("r", pieces, tempo);
            }
            None => {
                let tempo = builder.pad("tempo");
                builder.then(atempo_chain(rate), tempo);
            }
        }
    }

    if let Some(volume) = volume_filter(track) {
        let vol = builder.pad("vol");
        builder.then(vec![volume], vol);
    }

    let output = Pad::new(format!("a{index}"));
    builder.then(vec![normalization_filter(track, options)], output.clone());

    TrackChain {
        index,
        stages: builder.stages,
        output,
    }
}

fn extract_segments(builder: &mut ChainBuilder, track: &Track, kept: &[Interval]) {
    let cut = builder.pad("cut");
    match kept {
        [] => builder.stages.push(FilterStage::new(
            vec![],
            vec![
                Filter::new("anullsrc").arg("r", 44100).arg("cl", "stereo"),
                Filter::new("atrim").arg("end", num(PLACEHOLDER_SECS)),
            ],
            vec![cut.clone()],
        )),
        [single] => {
            let open_end = track.trim_end_secs.is_none()
                && (single.end - track.duration_secs).abs() < UNITY_RATE_EPSILON;
            let trim = if open_end {
                Filter::new("atrim").arg("start", num(single.start))
            } else {
                trim_filter(single.start, single.end)
            };
            builder.then(vec![trim, reset_timestamps()], cut.clone());
        }
        many => {
            let pieces = many
                .iter()
                .map(|seg| vec![trim_filter(seg.start, seg.end), reset_timestamps()])
                .collect();
            builder.split_join("", pieces, cut.clone());
        }
    }
    builder.current = cut;
}

/// Staircase pieces for a ramp back to unity, in chain-local time.
///
/// A constant-rate lead-in runs until the ramp starts, the ramp itself is
/// [`TEMPO_RAMP_STEPS`] equal slices whose rate is interpolated at each
/// slice's midpoint, and whatever follows the region plays untouched.
fn ramp_pieces(rate: f64, ramp_start: f64, region_end: f64, length: f64) -> Vec<Vec<Filter>> {
    let region_end = region_end.clamp(0.0, length);
    let ramp_start = ramp_start.clamp(0.0, region_end);

    let mut spans: Vec<(f64, Option<f64>, f64)> = Vec::new();
    if ramp_start > 0.0 {
        spans.push((0.0, Some(ramp_start), rate));
    }
    let width = (region_end - ramp_start) / TEMPO_RAMP_STEPS as f64;
    if width > 0.0 {
        for step in 0..TEMPO_RAMP_STEPS {
            let midpoint = (step as f64 + 0.5) / TEMPO_RAMP_STEPS as f64;
            spans.push((
                ramp_start + width * step as f64,
                Some(ramp_start + width * (step + 1) as f64),
                rate + (1.0 - rate) * midpoint,
            ));
        }
    }
    if region_end < length || spans.is_empty() {
        spans.push((region_end, None, 1.0));
    }

    spans
        .into_iter()
        .map(|(start, end, step_rate)| {
            let mut trim = Filter::new("atrim").arg("start", num(start));
            if let Some(end) = end {
                trim = trim.arg("end", num(end));
            }
            let mut filters = vec![trim, reset_timestamps()];
            if (step_rate - 1.0).abs() > UNITY_RATE_EPSILON {
                filters.extend(atempo_chain(step_rate));
            }
            filters
        })
        .collect()
}

/// Split a rate into factors that each stay within `atempo`'s range.
///
/// The product of the returned factors equals `rate`.
pub fn decompose_tempo(rate: f64) -> Vec<f64> {
    let mut factors = Vec::new();
    if !(rate.is_finite() && rate > 0.0) {
        return factors;
    }
    let mut residual = rate;
    while residual > ATEMPO_MAX {
        factors.push(ATEMPO_MAX);
        residual /= ATEMPO_MAX;
    }
    while residual < ATEMPO_MIN {
        factors.push(ATEMPO_MIN);
        residual /= ATEMPO_MIN;
    }
    if factors.is_empty() || (residual - 1.0).abs() > UNITY_RATE_EPSILON {
        factors.push(residual);
    }
    factors
}

fn atempo_chain(rate: f64) -> Vec<Filter> {
    decompose_tempo(rate)
        .into_iter()
        .map(|factor| Filter::new("atempo").value(num(factor)))
        .collect()
}

fn volume_filter(track: &Track) -> Option<Filter> {
    let gain = track.linear_gain();
    if track.volume_envelope.len() >= 2 {
        let scale = gain.unwrap_or(1.0);
        let points = track
            .volume_envelope
            .iter()
            .map(|p| VolumePoint {
                time_secs: p.time_secs,
                value: p.value * scale,
            })
            .collect();
        return Some(
            Filter::new("volume")
                .arg("volume", format!("'{}'", envelope_expr(points)))
                .arg("eval", "frame"),
        );
    }
    gain.map(|g| Filter::new("volume").value(num(g)))
}

/// Piecewise-linear gain over time as a single engine expression.
///
/// Holds the first value before the first breakpoint and the last value
/// after the last one. Breakpoints sharing a time form an instant step.
pub fn envelope_expr(mut points: Vec<VolumePoint>) -> String {
    points.sort_by(|a, b| a.time_secs.total_cmp(&b.time_secs));

    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return num(1.0),
    };
    if points.len() == 1 {
        return num(first.value);
    }

    let mut expr = num(last.value);
    for pair in points.windows(2).rev() {
        let (p0, p1) = (pair[0], pair[1]);
        let interp = format!(
            "{v0}+({delta})*(t-{t0})/{dur}",
            v0 = num(p0.value),
            delta = num(p1.value - p0.value),
            t0 = num(p0.time_secs),
            dur = num((p1.time_secs - p0.time_secs).max(1e-4)),
        );
        expr = format!("if(lt(t,{t1}),{interp},{expr})", t1 = num(p1.time_secs));
    }
    format!(
        "if(lt(t,{t0}),{v0},{expr})",
        t0 = num(first.time_secs),
        v0 = num(first.value)
    )
}

fn normalization_filter(track: &Track, options: &ChainOptions) -> Filter {
    match (options.normalize, track.loudness) {
        (true, Some(measured)) => {
            let targets = options.targets;
            Filter::new("loudnorm")
                .arg("I", targets.integrated)
                .arg("TP", targets.true_peak)
                .arg("LRA", targets.lra)
                .arg("measured_I", measured.integrated_lufs)
                .arg("measured_TP", measured.true_peak_dbtp)
                .arg("measured_LRA", measured.lra_lu)
                .arg("measured_thresh", measured.threshold_lufs)
                .arg("linear", "true")
        }
        _ => Filter::new("anull"),
    }
}

fn trim_filter(start: f64, end: f64) -> Filter {
    Filter::new("atrim")
        .arg("start", num(start))
        .arg("end", num(end))
}

fn reset_timestamps() -> Filter {
    Filter::new("asetpts").value("PTS-STARTPTS")
}

pub(crate) fn concat(count: usize) -> Filter {
    Filter::new("concat")
        .arg("n", count)
        .arg("v", 0)
        .arg("a", 1)
}
