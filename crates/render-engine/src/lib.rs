//! Mixdown Render Engine
//!
//! Compiles an ordered track list with per-track edits into a single
//! ffmpeg filter graph plus a matching cue sheet, and runs the encode as
//! a cancellable background job.
//!
//! # Pipeline Architecture
//!
//! ```text
//! track ──► segments ──► tempo ──► volume ──► loudnorm/anull ──► [a0] ─┐
//! track ──► segments ──► tempo ──► volume ──► loudnorm/anull ──► [a1] ─┤
//!                                                                      ├── acrossfade / concat fold ──► [out]
//! track ──► ...                                                  [aN] ─┘                                  │
//!                                                                                                         ▼
//!                                                                                          encode (wav / flac / mp3)
//!
//! durations + trims + tempo + crossfades ──► start times ──► cue sheet
//! ```
//!
//! The graph is built as typed stages ([`graph`]) and only turned into
//! text when the encoder arguments are assembled ([`mix`]).

pub mod backend;
pub mod chain;
pub mod cue;
pub mod graph;
pub mod job;
pub mod loudness;
pub mod mix;
pub mod progress;
pub mod segments;

pub use backend::{EncoderBackend, FfmpegBackend};
pub use job::{
    ExportRequest, JobHandle, JobId, JobOutcome, ProgressEvent, RenderPhase, RenderService,
};
pub use mix::{plan_render, RenderPlan};
