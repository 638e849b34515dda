//! Render job orchestration.
//!
//! A [`RenderService`] runs at most one render job at a time. The job
//! advances through its phases on a single task:
//!
//! ```text
//! validating ─► analyzing ─► rendering ─► cue ─► complete
//!      │            │            │         │
//!      └────────────┴─────┬──────┴─────────┘
//!                         ▼
//!                 error | cancelled
//! ```
//!
//! Cancellation is a shared token checked at every phase boundary and
//! around each engine run. Progress is broadcast to subscribers and never
//! polled.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use mixdown_common::config::{AppConfig, ExportDefaults};
use mixdown_common::error::{MixError, MixResult};
use mixdown_project_model::project::LoadedMix;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::backend::{run_engine, EncoderBackend};
use crate::cue::{cue_path_for, generate_cue_sheet, write_cue_sheet};
use crate::loudness::{loudness_pass_args, parse_loudnorm_output, LoudnessTargets};
use crate::mix::plan_render;
use crate::progress::{analysis_percent, parse_elapsed_secs, render_progress, ANALYSIS_SHARE};

/// Identifier of a render job.
pub type JobId = Uuid;

/// Buffered progress events per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

/// Lifecycle phase of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    Validating,
    Analyzing,
    Rendering,
    Cue,
    Complete,
    Error,
    Cancelled,
}

impl RenderPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RenderPhase::Complete | RenderPhase::Error | RenderPhase::Cancelled
        )
    }
}

/// A progress notification pushed to every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub phase: RenderPhase,
    /// Overall progress, 0-100.
    pub percent: f64,
    /// Estimated seconds remaining, while rendering.
    pub eta_secs: Option<f64>,
    /// Human-readable detail; carries the error message on failure.
    pub message: Option<String>,
    /// Rendered file, on completion.
    pub output_path: Option<PathBuf>,
}

/// What to render and where.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub mix: LoadedMix,
    pub output_path: PathBuf,
    pub settings: ExportDefaults,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(PathBuf),
    Failed(String),
    Cancelled,
}

struct ActiveJob {
    id: JobId,
    cancel: CancellationToken,
}

type JobSlot = Arc<Mutex<Option<ActiveJob>>>;

fn lock_slot(slot: &JobSlot) -> MutexGuard<'_, Option<ActiveJob>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Starts, tracks and cancels render jobs, one at a time.
#[derive(Clone)]
pub struct RenderService {
    backend: Arc<dyn EncoderBackend>,
    events: broadcast::Sender<ProgressEvent>,
    active: JobSlot,
    settings_path: Option<PathBuf>,
}

impl RenderService {
    /// A service that does not persist export settings.
    pub fn new(backend: Arc<dyn EncoderBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            events,
            active: Arc::new(Mutex::new(None)),
            settings_path: None,
        }
    }

    /// Write each completed job's export settings to the config at `path`.
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Receive progress events for jobs started after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Id of the running job, if any.
    pub fn active_job(&self) -> Option<JobId> {
        lock_slot(&self.active).as_ref().map(|job| job.id)
    }

    /// Start a job in the background.
    ///
    /// Fails with [`MixError::AlreadyInProgress`] while another job is
    /// active; the running job is not affected.
    pub fn start(&self, request: ExportRequest) -> MixResult<JobId> {
        self.spawn(request).map(|handle| handle.id)
    }

    /// Like [`RenderService::start`], but returns a handle that resolves to
    /// the job's outcome.
    pub fn spawn(&self, request: ExportRequest) -> MixResult<JobHandle> {
        let mut slot = lock_slot(&self.active);
        if let Some(active) = slot.as_ref() {
            tracing::warn!(active_job = %active.id, "Rejected export start: job already running");
            return Err(MixError::AlreadyInProgress);
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *slot = Some(ActiveJob {
            id,
            cancel: cancel.clone(),
        });
        drop(slot);

        tracing::info!(
            job_id = %id,
            tracks = request.mix.project.tracks.len(),
            output = %request.output_path.display(),
            "Starting render job"
        );

        let job = RenderJob {
            id,
            phase: RenderPhase::Validating,
            cancel,
            output_path: request.output_path.clone(),
            percent: 0.0,
            backend: Arc::clone(&self.backend),
            events: self.events.clone(),
            settings_path: self.settings_path.clone(),
            slot: SlotGuard {
                slot: Arc::clone(&self.active),
                id,
            },
        };
        let task = tokio::spawn(job.run(request));
        Ok(JobHandle { id, task })
    }

    /// Request cancellation of the active job.
    ///
    /// Returns whether a job was active. Calling it again, or with no job
    /// running, does nothing.
    pub fn cancel(&self) -> bool {
        match lock_slot(&self.active).as_ref() {
            Some(job) => {
                tracing::info!(job_id = %job.id, "Cancellation requested");
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

/// A started job.
pub struct JobHandle {
    pub id: JobId,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    /// Wait for the job to reach a terminal phase.
    pub async fn wait(self) -> JobOutcome {
        self.task
            .await
            .unwrap_or_else(|e| JobOutcome::Failed(format!("render task aborted: {e}")))
    }
}

/// Clears the service's job slot when the job ends, even by panic.
struct SlotGuard {
    slot: JobSlot,
    id: JobId,
}

impl SlotGuard {
    fn release(&self) {
        let mut slot = lock_slot(&self.slot);
        if slot.as_ref().is_some_and(|job| job.id == self.id) {
            *slot = None;
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.release();
    }
}

enum Halt {
    Cancelled,
    Failed(MixError),
}

impl From<MixError> for Halt {
    fn from(err: MixError) -> Self {
        Halt::Failed(err)
    }
}

/// The single in-flight job record, owned by its task.
struct RenderJob {
    id: JobId,
    phase: RenderPhase,
    cancel: CancellationToken,
    output_path: PathBuf,
    percent: f64,
    backend: Arc<dyn EncoderBackend>,
    events: broadcast::Sender<ProgressEvent>,
    settings_path: Option<PathBuf>,
    slot: SlotGuard,
}

impl RenderJob {
    async fn run(mut self, request: ExportRequest) -> JobOutcome {
        let ExportRequest {
            mut mix, settings, ..
        } = request;
        let started = Instant::now();

        match self.execute(&mut mix, &settings).await {
            Ok(()) => {
                self.persist_settings(&settings);
                self.slot.release();
                self.phase = RenderPhase::Complete;
                self.percent = 100.0;
                tracing::info!(
                    job_id = %self.id,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    output = %self.output_path.display(),
                    "Render job complete"
                );
                self.emit(
                    None,
                    Some("Export complete".to_string()),
                    Some(self.output_path.clone()),
                );
                JobOutcome::Completed(self.output_path)
            }
            Err(Halt::Cancelled) => {
                tracing::info!(job_id = %self.id, phase = ?self.phase, "Render job cancelled");
                remove_partial_output(&self.output_path).await;
                self.slot.release();
                self.phase = RenderPhase::Cancelled;
                self.emit(None, Some("Export cancelled".to_string()), None);
                JobOutcome::Cancelled
            }
            Err(Halt::Failed(err)) => {
                let message = err.to_string();
                tracing::error!(
                    job_id = %self.id,
                    phase = ?self.phase,
                    error = %message,
                    "Render job failed"
                );
                self.slot.release();
                self.phase = RenderPhase::Error;
                self.emit(None, Some(message.clone()), None);
                JobOutcome::Failed(message)
            }
        }
    }

    async fn execute(
        &mut self,
        mix: &mut LoadedMix,
        settings: &ExportDefaults,
    ) -> Result<(), Halt> {
        self.enter(RenderPhase::Validating, 0.0)?;
        self.validate(mix).await?;

        if settings.normalize {
            self.enter(RenderPhase::Analyzing, 0.0)?;
            self.analyze(mix).await?;
        }

        self.enter(RenderPhase::Rendering, ANALYSIS_SHARE)?;
        self.render(mix, settings).await?;

        // The audio is finished; a late cancel no longer removes it.
        if settings.write_cue_sheet {
            self.advance(RenderPhase::Cue, 100.0);
            self.write_cue(mix, settings).await;
        }
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            Err(Halt::Cancelled)
        } else {
            Ok(())
        }
    }

    fn enter(&mut self, phase: RenderPhase, percent: f64) -> Result<(), Halt> {
        self.check_cancelled()?;
        self.advance(phase, percent);
        Ok(())
    }

    fn advance(&mut self, phase: RenderPhase, percent: f64) {
        self.phase = phase;
        self.percent = percent;
        tracing::info!(job_id = %self.id, phase = ?phase, "Entering phase");
        self.emit(None, None, None);
    }

    fn emit(&self, eta_secs: Option<f64>, message: Option<String>, output_path: Option<PathBuf>) {
        // No subscribers is not an error.
        let _ = self.events.send(ProgressEvent {
            job_id: self.id,
            phase: self.phase,
            percent: self.percent,
            eta_secs,
            message,
            output_path,
        });
    }

    async fn validate(&self, mix: &LoadedMix) -> Result<(), Halt> {
        let mut missing = Vec::new();
        for track in &mix.project.tracks {
            let path = mix.source_path(track);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                tracing::warn!(track = %track.title, path = %path.display(), "Source file missing");
                missing.push(track.title.clone());
            }
        }
        if !missing.is_empty() {
            return Err(MixError::Validation { missing }.into());
        }

        let backend = Arc::clone(&self.backend);
        let available = tokio::task::spawn_blocking(move || backend.is_available())
            .await
            .unwrap_or(false);
        if !available {
            return Err(MixError::unsupported(format!(
                "encoding engine '{}' is not available",
                self.backend.name()
            ))
            .into());
        }
        Ok(())
    }

    async fn analyze(&mut self, mix: &mut LoadedMix) -> Result<(), Halt> {
        let targets = LoudnessTargets::default();
        let total = mix.project.tracks.len();

        for index in 0..total {
            self.check_cancelled()?;
            let track = &mix.project.tracks[index];
            let title = track.title.clone();
            let args = loudness_pass_args(&mix.source_path(track), &targets);

            let mut output = String::new();
            let run = run_engine(self.backend.as_ref(), &args, &self.cancel, |chunk| {
                output.push_str(chunk)
            })
            .await
            .map_err(|e| MixError::analysis(format!("{title}: failed to run engine: {e}")))?
            .ok_or(Halt::Cancelled)?;

            if !run.status.success() {
                return Err(MixError::Analysis {
                    message: format!(
                        "{title}: loudness pass exited with {}\n{}",
                        run.status,
                        run.tail.trim()
                    ),
                }
                .into());
            }

            let measured = parse_loudnorm_output(&output)
                .map_err(|e| MixError::analysis(format!("{title}: {e}")))?;
            tracing::debug!(
                job_id = %self.id,
                track = %title,
                integrated_lufs = measured.integrated_lufs,
                true_peak_dbtp = measured.true_peak_dbtp,
                "Measured loudness"
            );
            mix.project.tracks[index].loudness = Some(measured);

            self.check_cancelled()?;
            self.percent = analysis_percent(index + 1, total);
            self.emit(None, Some(format!("Analyzed {title}")), None);
        }
        Ok(())
    }

    async fn render(&mut self, mix: &LoadedMix, settings: &ExportDefaults) -> Result<(), Halt> {
        let plan = plan_render(mix, settings, &self.output_path)?;

        if let Some(parent) = self.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MixError::render(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        tracing::debug!(job_id = %self.id, args = ?plan.args, "Running encoder");

        let started = Instant::now();
        let total = plan.total_duration_secs;
        let mut percent = self.percent;
        let (id, events) = (self.id, &self.events);
        let run = run_engine(self.backend.as_ref(), &plan.args, &self.cancel, |chunk| {
            let Some(encoded) = parse_elapsed_secs(chunk) else {
                return;
            };
            let progress = render_progress(encoded, total, started.elapsed().as_secs_f64());
            if progress.percent < percent {
                return;
            }
            percent = progress.percent;
            let _ = events.send(ProgressEvent {
                job_id: id,
                phase: RenderPhase::Rendering,
                percent,
                eta_secs: progress.eta_secs,
                message: None,
                output_path: None,
            });
        })
        .await
        .map_err(|e| MixError::render(format!("failed to run encoder: {e}")))?
        .ok_or(Halt::Cancelled)?;

        if !run.status.success() {
            return Err(MixError::render_with_tail(
                format!("encoder exited with {}", run.status),
                run.tail,
            )
            .into());
        }
        self.percent = 100.0;
        Ok(())
    }

    /// Failures here are logged; the rendered audio stays in place.
    async fn write_cue(&self, mix: &LoadedMix, settings: &ExportDefaults) {
        let file_name = self
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let transitions = mix.project.transitions(settings.default_crossfade_secs);
        let sheet = generate_cue_sheet(&mix.project, &transitions, &file_name, settings.format);
        let path = cue_path_for(&self.output_path);

        match write_cue_sheet(&path, &sheet).await {
            Ok(()) => tracing::info!(job_id = %self.id, path = %path.display(), "Wrote cue sheet"),
            Err(e) => tracing::warn!(job_id = %self.id, error = %e, "Cue sheet not written"),
        }
    }

    fn persist_settings(&self, settings: &ExportDefaults) {
        let Some(path) = &self.settings_path else {
            return;
        };
        if let Err(e) = AppConfig::persist_export_defaults(path, settings) {
            tracing::warn!(job_id = %self.id, error = %e, "Export settings not saved");
        }
    }
}

async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output")
        }
    }
}
