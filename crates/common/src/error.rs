//! Error types shared across Mixdown crates.

/// Top-level error type for Mixdown operations.
#[derive(Debug, thiserror::Error)]
pub enum MixError {
    /// One or more track sources could not be found. Carries track titles.
    #[error("Missing source files for: {}", .missing.join(", "))]
    Validation { missing: Vec<String> },

    #[error("Loudness analysis error: {message}")]
    Analysis { message: String },

    #[error("Graph build error: {message}")]
    GraphBuild { message: String },

    #[error("Render error: {message}{}", format_tail(.diagnostic_tail))]
    Render {
        message: String,
        diagnostic_tail: String,
    },

    #[error("Cue sheet error: {message}")]
    CueSheet { message: String },

    #[error("Failed to persist export settings: {message}")]
    Persist { message: String },

    #[error("An export is already in progress")]
    AlreadyInProgress,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using MixError.
pub type MixResult<T> = Result<T, MixError>;

fn format_tail(tail: &str) -> String {
    let tail = tail.trim();
    if tail.is_empty() {
        String::new()
    } else {
        format!("\n{tail}")
    }
}

impl MixError {
    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis {
            message: msg.into(),
        }
    }

    pub fn graph_build(msg: impl Into<String>) -> Self {
        Self::GraphBuild {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
            diagnostic_tail: String::new(),
        }
    }

    pub fn render_with_tail(msg: impl Into<String>, tail: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
            diagnostic_tail: tail.into(),
        }
    }

    pub fn cue_sheet(msg: impl Into<String>) -> Self {
        Self::CueSheet {
            message: msg.into(),
        }
    }

    pub fn persist(msg: impl Into<String>) -> Self {
        Self::Persist {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_titles() {
        let err = MixError::Validation {
            missing: vec!["Intro".to_string(), "Outro".to_string()],
        };
        assert_eq!(err.to_string(), "Missing source files for: Intro, Outro");
    }

    #[test]
    fn test_render_error_includes_tail() {
        let err = MixError::render_with_tail("ffmpeg exited with status 1", "Invalid argument\n");
        let msg = err.to_string();
        assert!(msg.starts_with("Render error: ffmpeg exited with status 1"));
        assert!(msg.ends_with("Invalid argument"));

        let bare = MixError::render("boom");
        assert_eq!(bare.to_string(), "Render error: boom");
    }
}
