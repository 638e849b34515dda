//! Render a mix to an audio file.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use mixdown_common::config::{config_file_path, AppConfig};
use mixdown_render_engine::job::{ExportRequest, JobOutcome, ProgressEvent, RenderPhase};
use mixdown_render_engine::{FfmpegBackend, RenderService};
use tokio::sync::broadcast::error::RecvError;

use super::{default_output, format_duration, load_mix, ExportOverrides};

pub async fn run(
    path: PathBuf,
    output: Option<PathBuf>,
    overrides: ExportOverrides,
    config: &AppConfig,
) -> anyhow::Result<()> {
    println!("Exporting mix at: {}", path.display());

    let mix = load_mix(&path)?;
    let settings = overrides.apply(&config.export)?;
    let output_path = output.unwrap_or_else(|| default_output(&mix, settings.format));

    println!("  Tracks: {}", mix.project.tracks.len());
    println!("  Output: {}", output_path.display());
    println!("  Format: {}", settings.format);
    if settings.format.is_lossy() {
        println!("  Bitrate: {} kbps", settings.bitrate_kbps);
    }
    println!("  Default crossfade: {:.1}s", settings.default_crossfade_secs);
    println!("  Normalize: {}", settings.normalize);

    let backend = Arc::new(FfmpegBackend::from_config(&config.engine));
    let service = RenderService::new(backend).with_settings_path(config_file_path());
    let mut events = service.subscribe();

    let handle = service.spawn(ExportRequest {
        mix,
        output_path,
        settings,
    })?;

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    print_event(&event);
                    if event.phase.is_terminal() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress display fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let wait = handle.wait();
    tokio::pin!(wait);
    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!("\n  Cancelling...");
            service.cancel();
            wait.await
        }
    };
    drop(service);
    if let Err(e) = printer.await {
        tracing::debug!(error = %e, "Progress printer stopped");
    }

    match outcome {
        JobOutcome::Completed(path) => {
            println!("\nExport complete: {}", path.display());
            Ok(())
        }
        JobOutcome::Cancelled => {
            println!("\nExport cancelled.");
            Ok(())
        }
        JobOutcome::Failed(message) => Err(anyhow::anyhow!("Export failed: {message}")),
    }
}

fn print_event(event: &ProgressEvent) {
    let label = match event.phase {
        RenderPhase::Validating => "Validating",
        RenderPhase::Analyzing => "Analyzing loudness",
        RenderPhase::Rendering => "Rendering",
        RenderPhase::Cue => "Writing cue sheet",
        RenderPhase::Complete | RenderPhase::Error | RenderPhase::Cancelled => return,
    };
    let eta = event
        .eta_secs
        .map(|secs| format!(", ETA: {}", format_duration(secs)))
        .unwrap_or_default();
    print!("\r  {label}: {:.1}%{eta}          ", event.percent);
    std::io::stdout().flush().ok();
}
