//! Print the compiled filter graph and encoder invocation.

use std::path::PathBuf;

use mixdown_common::config::AppConfig;
use mixdown_render_engine::plan_render;

use super::{default_output, load_mix, shell_quote, ExportOverrides};

pub fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    json: bool,
    overrides: ExportOverrides,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let mix = load_mix(&path)?;
    let settings = overrides.apply(&config.export)?;
    let output_path = output.unwrap_or_else(|| default_output(&mix, settings.format));

    let plan = plan_render(&mix, &settings, &output_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan.args)?);
        return Ok(());
    }

    if settings.normalize && mix.project.tracks.iter().any(|t| t.loudness.is_none()) {
        println!("# Tracks without a loudness measurement pass through unnormalized.");
    }
    let graph = plan.graph.to_filter_graph();
    println!("# Filter graph ({} stages)", graph.stages.len());
    for stage in &graph.stages {
        println!("{stage}");
    }
    println!();
    println!("# Estimated length: {:.3}s", plan.total_duration_secs);
    let command = std::iter::once(config.engine.binary.as_str())
        .chain(plan.args.iter().map(String::as_str))
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ");
    println!("{command}");

    Ok(())
}
