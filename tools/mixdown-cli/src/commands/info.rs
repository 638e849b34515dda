//! Show mix information.

use std::path::PathBuf;

use mixdown_common::config::AppConfig;
use mixdown_render_engine::cue::{compute_start_times, seconds_to_cue_time};
use mixdown_render_engine::progress::total_mix_duration;

use super::{format_duration, load_mix};

pub fn run(path: PathBuf, crossfade: Option<f64>, config: &AppConfig) -> anyhow::Result<()> {
    let mix = load_mix(&path)?;
    let p = &mix.project;

    println!("Mix: {}", p.name);
    if let Some(artist) = &p.artist {
        println!("  Artist: {artist}");
    }
    for (key, value) in p.metadata.entries() {
        println!("  {key}: {value}");
    }
    println!();

    let default_crossfade = crossfade.unwrap_or(config.export.default_crossfade_secs);
    let transitions = p.transitions(default_crossfade);
    let durations: Vec<f64> = p.tracks.iter().map(|t| t.effective_duration()).collect();
    let fades: Vec<f64> = transitions.iter().map(|t| t.duration_secs).collect();
    let starts = compute_start_times(&durations, &fades);

    println!("Tracks:");
    for (i, track) in p.tracks.iter().enumerate() {
        println!(
            "  {:02}. {} [{}] start {} ({})",
            i + 1,
            track.title,
            format_duration(durations[i]),
            format_duration(starts[i]),
            seconds_to_cue_time(starts[i]),
        );
        println!("      Source: {}", mix.source_path(track).display());
        if let Some(rate) = track.tempo_change() {
            println!("      Tempo: {rate:.3}x");
        }
        if let Some(gain) = track.gain_db {
            println!("      Gain: {gain:+.1} dB");
        }
        let removed = track.removed_regions.iter().filter(|r| r.enabled).count();
        if removed > 0 {
            println!("      Removed regions: {removed}");
        }
        if let Some(fade) = transitions.get(i) {
            println!(
                "      Crossfade out: {:.1}s ({:?})",
                fade.duration_secs, fade.curve
            );
        }
    }
    println!();

    println!(
        "Estimated length: {}",
        format_duration(total_mix_duration(&p.tracks, &transitions))
    );

    Ok(())
}
