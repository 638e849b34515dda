//! Kept-interval resolution for trimmed tracks with removed regions.

use mixdown_project_model::track::RemovedRegion;

/// A half-open time interval in seconds on a track's own timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Enabled regions, sorted by start, with overlapping or touching
/// regions merged into maximal runs.
pub fn merge_regions(regions: &[RemovedRegion]) -> Vec<Interval> {
    let mut enabled: Vec<Interval> = regions
        .iter()
        .filter(|r| r.enabled && r.end_secs > r.start_secs)
        .map(|r| Interval::new(r.start_secs, r.end_secs))
        .collect();
    enabled.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Interval> = Vec::with_capacity(enabled.len());
    for region in enabled {
        match merged.last_mut() {
            Some(last) if region.start <= last.end => last.end = last.end.max(region.end),
            _ => merged.push(region),
        }
    }
    merged
}

/// Sub-ranges of `window` that survive removal of the enabled regions.
///
/// With no enabled regions the result is the window itself. A region that
/// covers the whole window yields an empty list; callers substitute a
/// silent placeholder so downstream joins keep their arity.
pub fn compute_kept_segments(window: Interval, regions: &[RemovedRegion]) -> Vec<Interval> {
    let merged = merge_regions(regions);
    if merged.is_empty() {
        return vec![window];
    }

    let mut kept = Vec::with_capacity(merged.len() + 1);
    let mut cursor = window.start;
    for region in merged {
        if region.start >= window.end {
            break;
        }
        if region.end <= cursor {
            continue;
        }
        if region.start > cursor {
            kept.push(Interval::new(cursor, region.start.min(window.end)));
        }
        cursor = cursor.max(region.end);
    }
    if cursor < window.end {
        kept.push(Interval::new(cursor, window.end));
    }
    kept
}

/// Total length of a set of intervals.
pub fn total_length(intervals: &[Interval]) -> f64 {
    intervals.iter().map(Interval::len).sum()
}
