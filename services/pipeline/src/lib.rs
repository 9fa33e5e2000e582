//! services/pipeline/src/lib.rs
//!
//! The `pipeline` service crate: turns an uploaded document into a graded
//! multiple-choice quiz form. Core domain types and port traits live in
//! `quizform_core`; this crate supplies the orchestration and the concrete
//! adapters.

pub mod adapters;
pub mod assembler;
pub mod config;
pub mod credentials;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod retry;

pub use assembler::{AssemblyError, FormAssembler, POINTS_PER_QUESTION};
pub use config::{Config, ConfigError};
pub use credentials::{AuthError, AuthedClient, CredentialStore};
pub use error::PipelineError;
pub use generator::{GenerationError, QuestionGenerator, MAX_SOURCE_CHARS};
pub use pipeline::Pipeline;
pub use retry::RetryPolicy;
