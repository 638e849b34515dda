//! Mixdown Project Model
//!
//! Defines the core data contracts for a mix:
//! - **Track:** One source file plus its edits (trim, removed regions,
//!   tempo, volume automation, gain, loudness, cue points)
//! - **Crossfade:** Overlap duration and curve into the next track
//! - **Project:** The ordered track list and release metadata
//!
//! All times are in seconds on the track's own timeline unless noted.

pub mod project;
pub mod track;

pub use project::*;
pub use track::*;
