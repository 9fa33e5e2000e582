//! crates/quizform_core/src/domain.rs
//!
//! Defines the pure, core data structures for the quiz pipeline.
//! These structs are independent of any LLM provider, remote API, or
//! serialization format used at the edges.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The smallest number of questions a caller may request.
pub const MIN_QUESTION_COUNT: usize = 1;
/// The largest number of questions a caller may request.
pub const MAX_QUESTION_COUNT: usize = 50;
/// How many answer options each generated question carries by default.
pub const DEFAULT_OPTIONS_PER_QUESTION: usize = 4;

//=========================================================================================
// Validation Errors
//=========================================================================================

/// A violation of the invariants of a single multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum McqViolation {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("option {0} is empty")]
    EmptyOption(usize),
    #[error("expected {expected} options but got {got}")]
    WrongOptionCount { expected: usize, got: usize },
    #[error("options contain duplicates after case-normalization")]
    DuplicateOptions,
    #[error("correct option index {index} is out of range for {len} options")]
    CorrectIndexOutOfRange { index: usize, len: usize },
}

/// A request- or set-level validation failure.
///
/// Raised when caller input is constructed and again when a `QuestionSet`
/// is re-checked at the form-assembly boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "question count {0} is outside the allowed range \
         {MIN_QUESTION_COUNT}..={MAX_QUESTION_COUNT}"
    )]
    QuestionCountOutOfRange(usize),
    #[error("unrecognized language '{0}'")]
    UnknownLanguage(String),
    #[error("source text is empty")]
    EmptySourceText,
    #[error("model name is empty")]
    EmptyModelName,
    #[error("options per question must be at least 2, got {0}")]
    TooFewOptionsRequested(usize),
    #[error("question {index}: {violation}")]
    Question { index: usize, violation: McqViolation },
    #[error("expected exactly {expected} questions but got {got}")]
    WrongQuestionCount { expected: usize, got: usize },
}

//=========================================================================================
// Request Types
//=========================================================================================

/// The language the generated questions must be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    He,
    Pl,
}

impl Language {
    /// Parses a caller-supplied language tag, accepting the common aliases
    /// seen in upload forms (`en-us`, `iw`, `he-il`, ...). Unknown tags are
    /// a validation error rather than a silent default.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" | "english" | "en-us" | "en-gb" => Ok(Self::En),
            "he" | "hebrew" | "iw" | "he-il" => Ok(Self::He),
            "pl" | "polish" | "pl-pl" => Ok(Self::Pl),
            _ => Err(ValidationError::UnknownLanguage(raw.to_string())),
        }
    }

    /// The canonical two-letter code for this language.
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::He => "he",
            Self::Pl => "pl",
        }
    }
}

/// A validated request for question generation, covering one pipeline run.
///
/// Construction is the validation boundary: an out-of-range question count
/// is rejected here, never clamped.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub source_text: String,
    pub question_count: usize,
    pub language: Language,
    pub model_name: String,
    pub options_per_question: usize,
}

impl GenerationRequest {
    /// Creates a new request, rejecting invalid caller input.
    pub fn new(
        source_text: String,
        question_count: usize,
        language: Language,
        model_name: String,
        options_per_question: usize,
    ) -> Result<Self, ValidationError> {
        Self::validate_question_count(question_count)?;
        if source_text.trim().is_empty() {
            return Err(ValidationError::EmptySourceText);
        }
        if model_name.trim().is_empty() {
            return Err(ValidationError::EmptyModelName);
        }
        if options_per_question < 2 {
            return Err(ValidationError::TooFewOptionsRequested(options_per_question));
        }
        Ok(Self {
            source_text,
            question_count,
            language,
            model_name,
            options_per_question,
        })
    }

    /// Checks the 1..=50 question-count bound on its own, so callers can
    /// reject bad input before doing any expensive work.
    pub fn validate_question_count(question_count: usize) -> Result<(), ValidationError> {
        if !(MIN_QUESTION_COUNT..=MAX_QUESTION_COUNT).contains(&question_count) {
            return Err(ValidationError::QuestionCountOutOfRange(question_count));
        }
        Ok(())
    }
}

//=========================================================================================
// Questions
//=========================================================================================

/// A single multiple-choice question with exactly one correct option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mcq {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

impl Mcq {
    /// Checks this question against the MCQ invariants: non-empty prompt
    /// and options, the configured option count, case-normalized option
    /// distinctness, and an in-range correct index.
    pub fn check(&self, options_per_question: usize) -> Result<(), McqViolation> {
        if self.prompt.trim().is_empty() {
            return Err(McqViolation::EmptyPrompt);
        }
        if self.options.len() != options_per_question {
            return Err(McqViolation::WrongOptionCount {
                expected: options_per_question,
                got: self.options.len(),
            });
        }
        for (i, option) in self.options.iter().enumerate() {
            if option.trim().is_empty() {
                return Err(McqViolation::EmptyOption(i));
            }
        }
        let mut normalized: Vec<String> = self
            .options
            .iter()
            .map(|o| o.trim().to_lowercase())
            .collect();
        normalized.sort();
        normalized.dedup();
        if normalized.len() != self.options.len() {
            return Err(McqViolation::DuplicateOptions);
        }
        if self.correct_index >= self.options.len() {
            return Err(McqViolation::CorrectIndexOutOfRange {
                index: self.correct_index,
                len: self.options.len(),
            });
        }
        Ok(())
    }
}

/// The validated, ordered collection of MCQs produced for one request.
///
/// The requested count is carried in the set itself, so the
/// length-equals-requested-count invariant enforced at construction can be
/// re-checked at the assembly boundary via [`Self::revalidate`] even after
/// the (public) question list has been modified.
#[derive(Debug, Clone)]
pub struct QuestionSet {
    pub questions: Vec<Mcq>,
    pub requested_count: usize,
    pub options_per_question: usize,
}

impl QuestionSet {
    /// Builds a set from generated questions, enforcing every invariant.
    /// A wrong count is a validation failure, never silently corrected.
    pub fn new(
        questions: Vec<Mcq>,
        requested_count: usize,
        options_per_question: usize,
    ) -> Result<Self, ValidationError> {
        let set = Self {
            questions,
            requested_count,
            options_per_question,
        };
        set.revalidate()?;
        Ok(set)
    }

    /// Re-runs the full invariant check against the originally requested
    /// count. Runs again at the assembly boundary before the set becomes
    /// remote form operations.
    pub fn revalidate(&self) -> Result<(), ValidationError> {
        if self.questions.len() != self.requested_count {
            return Err(ValidationError::WrongQuestionCount {
                expected: self.requested_count,
                got: self.questions.len(),
            });
        }
        for (index, question) in self.questions.iter().enumerate() {
            question
                .check(self.options_per_question)
                .map_err(|violation| ValidationError::Question { index, violation })?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Returns true when two questions share a case-normalized prompt.
    /// Prompt uniqueness is not an invariant; callers may log this as a
    /// soft warning.
    pub fn has_duplicate_prompts(&self) -> bool {
        let mut prompts: Vec<String> = self
            .questions
            .iter()
            .map(|q| q.prompt.trim().to_lowercase())
            .collect();
        prompts.sort();
        prompts.windows(2).any(|pair| pair[0] == pair[1])
    }
}

//=========================================================================================
// Credentials and Results
//=========================================================================================

/// The OAuth token material used to call the remote forms/drive API.
///
/// Exactly one logical credential is live per process; it is owned by the
/// credential store and persisted as JSON to whichever location it was
/// loaded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl Credential {
    /// Safety margin applied when deciding whether a refresh is due.
    pub const REFRESH_MARGIN_SECS: i64 = 300;

    /// Returns true when the access token expires within the safety margin
    /// of `now` (or already has).
    pub fn expires_soon(&self, now: DateTime<Utc>) -> bool {
        self.expiry - now <= Duration::seconds(Self::REFRESH_MARGIN_SECS)
    }
}

/// The outcome of a successful form assembly, returned to the caller.
/// After this value is produced the process retains no ownership of the
/// remote resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormResult {
    pub edit_url: String,
    pub responder_url: Option<String>,
    pub item_count: usize,
}

//=========================================================================================
// Tests
//=========================================================================================
