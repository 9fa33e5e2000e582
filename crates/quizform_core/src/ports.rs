//! crates/quizform_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the pipeline's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like the LLM provider
//! or the remote forms API.

use crate::domain::Credential;
use async_trait::async_trait;
use std::time::Duration;

//=========================================================================================
// Boundary Error Types
//=========================================================================================

/// Failure to turn document bytes into text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("document could not be read: {0}")]
    Unreadable(String),
    #[error("document contained no extractable text")]
    Empty,
}

/// Failure of a single LLM completion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("network failure talking to the model: {0}")]
    Network(String),
    #[error("model rate limit hit")]
    RateLimited { retry_after: Option<u64> },
    #[error("model authentication failed: {0}")]
    Auth(String),
    #[error("model API rejected the request: {0}")]
    Api(String),
}

impl LlmError {
    /// Transient failures worth another attempt; auth and request-shape
    /// problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}

/// Failure of a forms API call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormsApiError {
    #[error("network failure talking to the forms API: {0}")]
    Network(String),
    #[error("forms API authentication failed: {0}")]
    Auth(String),
    #[error("forms API rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Failure of the interactive consent exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsentError {
    #[error("user declined authorization: {0}")]
    Declined(String),
    #[error("authorization flow timed out")]
    TimedOut,
}

//=========================================================================================
// Forms API Payloads
//=========================================================================================

/// Handle to a freshly created (still empty) remote form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedForm {
    pub form_id: String,
    pub responder_url: Option<String>,
}

/// One "add multiple-choice item" operation, ready for the remote batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizItem {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub point_value: u32,
}

/// The result of submitting an item batch. The remote API may commit only
/// part of a batch; that state must stay distinguishable from both total
/// success and total failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every item in the batch was committed.
    Committed,
    /// Only some items were committed; the remote form is now inconsistent
    /// but observable.
    Partial { succeeded: usize, failed: usize },
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Turns raw document bytes into a single plain-text string.
    async fn extract(&self, document: &[u8]) -> Result<String, ExtractionError>;
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Sends one prompt to the model and returns the raw text of its reply.
    /// The call must not outlive `timeout`.
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, LlmError>;
}

#[async_trait]
pub trait FormsApi: Send + Sync {
    /// Creates the remote form container. Must be called before any other
    /// operation; the returned id is required by all of them.
    async fn create_form(
        &self,
        title: &str,
        document_title: &str,
    ) -> Result<CreatedForm, FormsApiError>;

    /// Switches the form into graded-quiz mode.
    async fn enable_quiz(&self, form_id: &str) -> Result<(), FormsApiError>;

    /// Submits one ordered batch of item-add operations. Item order is the
    /// displayed question order.
    async fn add_items(
        &self,
        form_id: &str,
        items: &[QuizItem],
    ) -> Result<BatchOutcome, FormsApiError>;
}

#[async_trait]
pub trait ConsentFlow: Send + Sync {
    /// Runs the interactive browser-based authorization exchange and mints
    /// a fresh credential.
    async fn obtain_credential(&self) -> Result<Credential, ConsentError>;
}
