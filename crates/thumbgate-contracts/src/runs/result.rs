use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Every attempt ran but none cleared the gate.
    ConstraintViolation,
    /// A generation capability returned nothing usable and the run was
    /// configured to stop on the first such error.
    AdapterError,
}

/// Terminal response of one pipeline run, serialized in the wire shape
/// callers consume (`status` tag plus flat fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PipelineResult {
    Success {
        url: PathBuf,
        attempts: u32,
    },
    Failed {
        error_type: ErrorKind,
        message: String,
        failure_log: Vec<String>,
        fallback_image: PathBuf,
    },
}

impl PipelineResult {
    pub fn success(url: impl Into<PathBuf>, attempts: u32) -> Self {
        Self::Success {
            url: url.into(),
            attempts,
        }
    }

    pub fn constraint_violation(
        attempts: u32,
        failure_log: Vec<String>,
        fallback_image: impl Into<PathBuf>,
    ) -> Self {
        Self::Failed {
            error_type: ErrorKind::ConstraintViolation,
            message: format!("Quality constraints not met after {attempts} attempts."),
            failure_log,
            fallback_image: fallback_image.into(),
        }
    }

    pub fn adapter_error(message: String, fallback_image: impl Into<PathBuf>) -> Self {
        Self::Failed {
            error_type: ErrorKind::AdapterError,
            failure_log: vec![message.clone()],
            message,
            fallback_image: fallback_image.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The renderable artifact handed back to the caller either way.
    pub fn image_path(&self) -> &Path {
        match self {
            Self::Success { url, .. } => url,
            Self::Failed { fallback_image, .. } => fallback_image,
        }
    }
}
