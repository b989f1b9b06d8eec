pub mod command;
pub mod elevenlabs;
pub mod provider;

pub use provider::{select_backend, Synthesizer};

use serde::Serialize;
use thiserror::Error;

/// Failure of a single synthesis call.
///
/// `Transient` and `Permanent` concern one line only. `Auth` and
/// `QuotaExceeded` mean no further call can succeed in this run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("transient synthesis failure: {0}")]
    Transient(String),
    #[error("synthesis rejected: {0}")]
    Permanent(String),
    #[error("synthesis credential rejected: {0}")]
    Auth(String),
    #[error("synthesis quota exceeded: {0}")]
    QuotaExceeded(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Permanent,
    Auth,
    QuotaExceeded,
    /// The audio arrived but could not be written to the audio directory.
    Artifact,
}

impl SynthesisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SynthesisError::Transient(_) => FailureKind::Transient,
            SynthesisError::Permanent(_) => FailureKind::Permanent,
            SynthesisError::Auth(_) => FailureKind::Auth,
            SynthesisError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
        }
    }

    /// Whether the rest of the batch should still be attempted.
    pub fn is_per_line(&self) -> bool {
        matches!(
            self,
            SynthesisError::Transient(_) | SynthesisError::Permanent(_)
        )
    }
}

#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub available: bool,
}

pub fn backends_info() -> Vec<BackendInfo> {
    vec![
        BackendInfo {
            name: "elevenlabs".to_string(),
            available: cfg!(feature = "elevenlabs"),
        },
        BackendInfo {
            name: "command".to_string(),
            available: true,
        },
    ]
}
