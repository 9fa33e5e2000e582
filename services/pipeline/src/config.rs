//! services/pipeline/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use quizform_core::domain::DEFAULT_OPTIONS_PER_QUESTION;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Path where a deployment mounts the credential secret (read-only).
pub const DEFAULT_SECRET_TOKEN_PATH: &str = "/secrets/token.json";
/// Fallback credential cache used for local development.
pub const DEFAULT_CACHE_TOKEN_PATH: &str = "token.json";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: Level,
    // --- Generation settings ---
    pub openai_api_key: Option<String>,
    pub generation_model: String,
    pub question_count: usize,
    pub language: String,
    pub options_per_question: usize,
    pub llm_timeout: Duration,
    // --- Forms / OAuth settings ---
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub secret_token_path: PathBuf,
    pub cache_token_path: PathBuf,
    // --- Pipeline settings ---
    pub pipeline_deadline: Duration,
    pub document_path: Option<PathBuf>,
    pub quiz_title: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Generation Settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let generation_model =
            std::env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4.1".to_string());
        let question_count = parse_var("NUM_QUESTIONS", 6)?;
        let language = std::env::var("QUIZ_LANGUAGE").unwrap_or_else(|_| "en".to_string());
        let options_per_question =
            parse_var("OPTIONS_PER_QUESTION", DEFAULT_OPTIONS_PER_QUESTION)?;
        let llm_timeout = Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", 120)?);

        // --- Load Forms / OAuth Settings ---
        let google_client_id = std::env::var("GOOGLE_CLIENT_ID").ok();
        let google_client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok();
        let secret_token_path = std::env::var("SECRET_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SECRET_TOKEN_PATH));
        let cache_token_path = std::env::var("CACHE_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CACHE_TOKEN_PATH));

        // --- Load Pipeline Settings ---
        let pipeline_deadline = Duration::from_secs(parse_var("PIPELINE_DEADLINE_SECS", 300)?);
        let document_path = std::env::var("DOCUMENT_PATH").map(PathBuf::from).ok();
        let quiz_title = std::env::var("QUIZ_TITLE").ok();

        Ok(Self {
            log_level,
            openai_api_key,
            generation_model,
            question_count,
            language,
            options_per_question,
            llm_timeout,
            google_client_id,
            google_client_secret,
            secret_token_path,
            cache_token_path,
            pipeline_deadline,
            document_path,
            quiz_title,
        })
    }

    /// Returns a required variable or a `MissingVar` error naming it.
    pub fn require(value: &Option<String>, name: &str) -> Result<String, ConfigError> {
        value
            .clone()
            .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
    }
}

/// Parses an optional numeric environment variable, falling back to a default.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
    }
}
