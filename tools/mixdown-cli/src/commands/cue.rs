//! Write the cue sheet for a mix without rendering audio.

use std::path::PathBuf;

use mixdown_common::config::AppConfig;
use mixdown_render_engine::cue::{cue_path_for, generate_cue_sheet, write_cue_sheet};

use super::{default_output, load_mix, ExportOverrides};

pub async fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    overrides: ExportOverrides,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let mix = load_mix(&path)?;
    let settings = overrides.apply(&config.export)?;

    let audio = default_output(&mix, settings.format);
    let cue_path = output.unwrap_or_else(|| cue_path_for(&audio));
    // The sheet references the audio file that sits beside it.
    let audio_name = cue_path
        .with_extension(settings.format.extension())
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let transitions = mix.project.transitions(settings.default_crossfade_secs);
    let sheet = generate_cue_sheet(&mix.project, &transitions, &audio_name, settings.format);
    write_cue_sheet(&cue_path, &sheet).await?;

    println!("Cue sheet written: {}", cue_path.display());
    Ok(())
}
