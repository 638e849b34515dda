//! Validate a mix project.

use std::path::PathBuf;

use mixdown_common::config::AppConfig;
use mixdown_render_engine::{EncoderBackend, FfmpegBackend};

use super::load_mix;

pub fn run(path: PathBuf, config: &AppConfig) -> anyhow::Result<()> {
    println!("Validating mix at: {}", path.display());

    let mix = load_mix(&path)?;
    let project = &mix.project;

    println!("  Name: {}", project.name);
    println!("  Version: {}", project.version);
    println!("  Tracks: {}", project.tracks.len());

    let mut issues = Vec::new();
    if project.tracks.is_empty() {
        issues.push("Mix has no tracks".to_string());
    }
    for title in mix.missing_sources() {
        issues.push(format!("Missing source for track '{title}'"));
    }
    for track in &project.tracks {
        let (start, end) = track.trim_window();
        if end <= start {
            issues.push(format!(
                "Track '{}' has an empty trim window ({start:.3}s..{end:.3}s)",
                track.title
            ));
        }
    }

    let engine = FfmpegBackend::from_config(&config.engine);
    if engine.is_available() {
        println!("  Engine: {} found", engine.binary());
    } else {
        issues.push(format!("Encoding engine '{}' not found", engine.binary()));
    }

    if issues.is_empty() {
        println!("  Sources: All present");
        println!("\nMix is valid.");
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        println!("\n{} issue(s) found. Export will fail.", issues.len());
    }

    Ok(())
}
