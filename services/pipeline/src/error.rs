//! services/pipeline/src/error.rs
//!
//! Defines the primary error type for the pipeline service: the single
//! outward-facing taxonomy the caller sees. Stage errors are translated
//! into it, never masked — a validation failure inside generation stays
//! distinguishable from a rate limit.

use crate::config::ConfigError;
use crate::generator::GenerationError;
use quizform_core::domain::ValidationError;
use quizform_core::ports::ExtractionError;

/// The primary error type for the `pipeline` service.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The caller's request was malformed; rejected before any network work.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// The document could not be turned into text. Terminal, not retried.
    #[error("document extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    /// Question generation failed after its own retry policies ran out.
    #[error("question generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),

    /// Credential resolution, refresh, or the forms API's auth check failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Assembly failed outright; no usable remote artifact was created.
    #[error("form assembly failed: {0}")]
    AssemblyFailed(String),

    /// A remote form exists but holds fewer graded items than requested.
    /// Surfaced with counts, never collapsed into success or failure.
    #[error("form partially assembled: {succeeded} item(s) created, {failed} failed ({edit_url})")]
    AssemblyPartial {
        succeeded: usize,
        failed: usize,
        edit_url: String,
    },

    /// The caller-supplied overall deadline ran out mid-stage. `note`
    /// carries stage-specific context, e.g. that an assembly cutoff may
    /// have left a partially populated remote form behind.
    #[error("pipeline deadline exceeded during {stage}{note}")]
    Timeout {
        stage: &'static str,
        note: &'static str,
    },

    /// Represents an error that occurred during configuration loading.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// The stable outward-facing kind tag for this failure.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::ExtractionFailed(_) => "extraction_failed",
            Self::GenerationFailed(_) => "generation_failed",
            Self::AuthFailed(_) => "auth_failed",
            Self::AssemblyFailed(_) => "assembly_failed",
            Self::AssemblyPartial { .. } => "assembly_partial",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misconfiguration_is_not_reported_as_caller_input() {
        let err = PipelineError::Config(ConfigError::MissingVar("OPENAI_API_KEY".to_string()));
        assert_eq!(err.kind(), "config");
        assert_eq!(
            PipelineError::InvalidInput(
                quizform_core::domain::ValidationError::EmptySourceText
            )
            .kind(),
            "invalid_input"
        );
    }
}
