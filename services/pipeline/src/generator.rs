//! services/pipeline/src/generator.rs
//!
//! Drives the LLM call that turns extracted document text into a validated
//! `QuestionSet`: builds the strict JSON-only prompt, sends it with bounded
//! network retries, parses the reply, and checks every MCQ invariant.
//!
//! Two retry budgets are deliberately separate: transient network failures
//! are handled by a `RetryPolicy`, while malformed or invalid model output
//! gets a small re-prompt budget of its own, because a model can emit bad
//! JSON on a perfectly successful call.

use crate::retry::RetryPolicy;
use quizform_core::domain::{GenerationRequest, Language, Mcq, QuestionSet, ValidationError};
use quizform_core::ports::{CompletionModel, LlmError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Front-anchored truncation budget for the source text, in characters.
/// Text beyond this bound never reaches the model.
pub const MAX_SOURCE_CHARS: usize = 48_000;

/// Extra prompts allowed when the model returns unparseable JSON.
const PARSE_RETRY_BUDGET: u32 = 2;
/// Extra prompts allowed when parsed output violates the MCQ invariants.
const VALIDATION_RETRY_BUDGET: u32 = 1;

/// Terminal failure of question generation, after all retry budgets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("model call failed: {0}")]
    Network(String),
    #[error("model rate limit persisted across retries")]
    RateLimited,
    #[error("model authentication failed: {0}")]
    Auth(String),
    #[error("model returned output that is not the expected JSON payload: {0}")]
    InvalidOutput(String),
    #[error("model output failed validation: {0}")]
    ValidationFailed(ValidationError),
}

//=========================================================================================
// Wire Payload
//=========================================================================================

/// The JSON shape the prompt instructs the model to emit.
#[derive(Debug, Deserialize)]
struct RawQuestionSheet {
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    prompt: String,
    options: Vec<String>,
    correct_index: usize,
}

//=========================================================================================
// QuestionGenerator
//=========================================================================================

/// Generates a validated `QuestionSet` from one `GenerationRequest`.
pub struct QuestionGenerator {
    model: Arc<dyn CompletionModel>,
    network_policy: RetryPolicy,
    llm_timeout: Duration,
}

impl QuestionGenerator {
    /// Creates a generator with the default network retry policy
    /// (4 attempts, backoff doubling from 2s, capped at 30s).
    pub fn new(model: Arc<dyn CompletionModel>, llm_timeout: Duration) -> Self {
        Self::with_policy(
            model,
            llm_timeout,
            RetryPolicy::new(4, Duration::from_secs(2), Duration::from_secs(30)),
        )
    }

    /// Creates a generator with an explicit network retry policy.
    pub fn with_policy(
        model: Arc<dyn CompletionModel>,
        llm_timeout: Duration,
        network_policy: RetryPolicy,
    ) -> Self {
        Self {
            model,
            network_policy,
            llm_timeout,
        }
    }

    /// Runs the full generate step: prompt, call, parse, validate.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<QuestionSet, GenerationError> {
        let prompt = build_prompt(request);
        let mut parse_retries = 0;
        let mut validation_retries = 0;

        loop {
            let raw = self.call_model(&prompt, &request.model_name).await?;

            let sheet = match parse_payload(&raw) {
                Ok(sheet) => sheet,
                Err(message) => {
                    if parse_retries < PARSE_RETRY_BUDGET {
                        parse_retries += 1;
                        warn!(
                            parse_retries,
                            "model output was not valid JSON, re-prompting: {message}"
                        );
                        continue;
                    }
                    return Err(GenerationError::InvalidOutput(message));
                }
            };

            match build_set(sheet, request) {
                Ok(set) => {
                    if set.has_duplicate_prompts() {
                        // Not an invariant; the source does not enforce
                        // prompt uniqueness across questions.
                        warn!("generated question set contains duplicate prompts");
                    }
                    info!(
                        questions = set.len(),
                        language = request.language.code(),
                        "question generation complete"
                    );
                    return Ok(set);
                }
                Err(violation) => {
                    if validation_retries < VALIDATION_RETRY_BUDGET {
                        validation_retries += 1;
                        warn!(
                            validation_retries,
                            "model output failed validation, re-prompting once: {violation}"
                        );
                        continue;
                    }
                    return Err(GenerationError::ValidationFailed(violation));
                }
            }
        }
    }

    /// One model call wrapped in the bounded network retry policy.
    async fn call_model(&self, prompt: &str, model: &str) -> Result<String, GenerationError> {
        self.network_policy
            .run(
                |attempt| {
                    debug!(attempt, model, "calling completion model");
                    self.model.complete(prompt, model, self.llm_timeout)
                },
                LlmError::is_retryable,
            )
            .await
            .map_err(|err| match err {
                LlmError::Network(message) => GenerationError::Network(message),
                LlmError::RateLimited { .. } => GenerationError::RateLimited,
                LlmError::Auth(message) => GenerationError::Auth(message),
                // A rejected request shape is an upstream failure from the
                // caller's point of view; keep its message.
                LlmError::Api(message) => GenerationError::Network(message),
            })
    }
}

//=========================================================================================
// Prompt Construction
//=========================================================================================

/// Builds the single structured prompt sent to the model.
fn build_prompt(request: &GenerationRequest) -> String {
    let excerpt = truncate_front(&request.source_text, MAX_SOURCE_CHARS);
    format!(
        r#"You generate multiple-choice quiz questions from provided source text.
{language_block}

Return ONLY a single JSON object that exactly matches this schema (no markdown, no code fences, no extra keys):

{{"questions":[{{"prompt":"string, the question in one paragraph","options":["string","string","string","string"],"correct_index":0}}]}}

Hard constraints:
- Produce exactly {count} questions in "questions".
- Every question has exactly {options} options; options must be mutually exclusive and collectively plausible.
- "correct_index" is the zero-based index of the single correct option.
- Derive questions strictly from the source text; do not invent facts.
- Avoid ambiguous wording, double negatives, and exposing the answer in the prompt.
- Do not include sensitive personal information.
- Do not include any text before or after the JSON object.

Here is the source text to base your questions on:
---
{excerpt}
---"#,
        language_block = language_instructions(request.language),
        count = request.question_count,
        options = request.options_per_question,
    )
}

/// Language-specific instruction block for the prompt.
fn language_instructions(language: Language) -> &'static str {
    match language {
        Language::En => "All prompts and options must be in clear English.",
        Language::He => {
            "כל השאלות ואפשרויות הבחירה חייבות להיות בעברית תקינה. שמור על כיווניות RTL וסימני פיסוק."
        }
        Language::Pl => {
            "Wszystkie pytania i odpowiedzi muszą być napisane poprawną polszczyzną."
        }
    }
}

/// Front-anchored truncation on a character boundary. Deterministic: the
/// first `budget` characters survive, the rest are dropped.
fn truncate_front(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

//=========================================================================================
// Parsing and Validation
//=========================================================================================

/// Parses the raw model reply into the question sheet. Models occasionally
/// wrap the JSON in markdown fences or chatter; salvage by slicing the
/// outermost brace pair before giving up.
fn parse_payload(raw: &str) -> Result<RawQuestionSheet, String> {
    if let Ok(sheet) = serde_json::from_str::<RawQuestionSheet>(raw) {
        return Ok(sheet);
    }
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err("no JSON object found in model output".to_string());
    };
    if end <= start {
        return Err("no JSON object found in model output".to_string());
    }
    serde_json::from_str::<RawQuestionSheet>(&raw[start..=end]).map_err(|e| e.to_string())
}

/// Turns the parsed sheet into a validated `QuestionSet`, trimming the
/// strings the model produced.
fn build_set(
    sheet: RawQuestionSheet,
    request: &GenerationRequest,
) -> Result<QuestionSet, ValidationError> {
    let questions: Vec<Mcq> = sheet
        .questions
        .into_iter()
        .map(|q| Mcq {
            prompt: q.prompt.trim().to_string(),
            options: q.options.into_iter().map(|o| o.trim().to_string()).collect(),
            correct_index: q.correct_index,
        })
        .collect();
    QuestionSet::new(questions, request.question_count, request.options_per_question)
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// A scripted model: pops one canned reply per call and records when
    /// each call happened (against the paused tokio clock).
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        call_times: Mutex<Vec<Instant>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                call_times: Mutex::new(Vec::new()),
            }
        }

        fn call_times(&self) -> Vec<Instant> {
            self.call_times.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(
            &self,
            _prompt: &str,
            _model: &str,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            self.call_times.lock().unwrap().push(Instant::now());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted model ran out of replies")
        }
    }

    fn request(question_count: usize) -> GenerationRequest {
        GenerationRequest::new(
            "The mitochondria is the powerhouse of the cell.".to_string(),
            question_count,
            Language::En,
            "gpt-4.1".to_string(),
            4,
        )
        .unwrap()
    }

    fn sheet_json(count: usize) -> String {
        let questions: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{"prompt":"Question {i}?","options":["opt a{i}","opt b{i}","opt c{i}","opt d{i}"],"correct_index":{}}}"#,
                    i % 4
                )
            })
            .collect();
        format!(r#"{{"questions":[{}]}}"#, questions.join(","))
    }

    fn generator(model: Arc<ScriptedModel>) -> QuestionGenerator {
        QuestionGenerator::new(model, Duration::from_secs(120))
    }

    #[tokio::test]
    async fn returns_exactly_the_requested_count() {
        for count in [1, 6, 50] {
            let model = Arc::new(ScriptedModel::new(vec![Ok(sheet_json(count))]));
            let set = generator(model).generate(&request(count)).await.unwrap();
            assert_eq!(set.len(), count);
        }
    }

    #[tokio::test]
    async fn wrong_count_reprompts_once_then_fails_validation() {
        // Requested 6, model insists on returning 5 both times.
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(sheet_json(5)),
            Ok(sheet_json(5)),
        ]));
        let err = generator(model.clone())
            .generate(&request(6))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::ValidationFailed(ValidationError::WrongQuestionCount {
                expected: 6,
                got: 5
            })
        );
        assert_eq!(model.call_times().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_back_off_with_increasing_delays() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(LlmError::RateLimited { retry_after: None }),
            Err(LlmError::RateLimited { retry_after: None }),
            Err(LlmError::RateLimited { retry_after: None }),
            Ok(sheet_json(3)),
        ]));
        let set = generator(model.clone()).generate(&request(3)).await.unwrap();
        assert_eq!(set.len(), 3);

        let times = model.call_times();
        assert_eq!(times.len(), 4);
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(
            gaps.windows(2).all(|g| g[1] > g[0]),
            "backoff gaps must increase: {gaps:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_rate_limit_exhausts_the_network_budget() {
        let model = Arc::new(ScriptedModel::new(vec![
            Err(LlmError::RateLimited { retry_after: None });
            4
        ]));
        let err = generator(model.clone())
            .generate(&request(3))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::RateLimited);
        assert_eq!(model.call_times().len(), 4);
    }

    #[tokio::test]
    async fn auth_failure_is_not_retried() {
        let model = Arc::new(ScriptedModel::new(vec![Err(LlmError::Auth(
            "bad key".to_string(),
        ))]));
        let err = generator(model.clone())
            .generate(&request(3))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Auth("bad key".to_string()));
        assert_eq!(model.call_times().len(), 1);
    }

    #[tokio::test]
    async fn fenced_json_is_salvaged() {
        let fenced = format!("```json\n{}\n```", sheet_json(2));
        let model = Arc::new(ScriptedModel::new(vec![Ok(fenced)]));
        let set = generator(model).generate(&request(2)).await.unwrap();
        assert_eq!(set.len(), 2);
    }

    #[tokio::test]
    async fn unparseable_output_reprompts_then_fails() {
        let model = Arc::new(ScriptedModel::new(vec![
            Ok("I'm sorry, I can't help with that.".to_string()),
            Ok("still not json".to_string()),
            Ok("{broken".to_string()),
        ]));
        let err = generator(model.clone())
            .generate(&request(2))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput(_)));
        assert_eq!(model.call_times().len(), 3);
    }

    #[tokio::test]
    async fn out_of_range_correct_index_fails_validation() {
        let bad = r#"{"questions":[{"prompt":"Q?","options":["a","b","c","d"],"correct_index":7}]}"#;
        let model = Arc::new(ScriptedModel::new(vec![
            Ok(bad.to_string()),
            Ok(bad.to_string()),
        ]));
        let err = generator(model).generate(&request(1)).await.unwrap_err();
        assert!(matches!(err, GenerationError::ValidationFailed(_)));
    }

    #[test]
    fn truncation_is_front_anchored_and_char_safe() {
        let text = "ab🦀cd";
        assert_eq!(truncate_front(text, 3), "ab🦀");
        assert_eq!(truncate_front(text, 99), text);
    }

    #[test]
    fn prompt_names_the_exact_count_and_language() {
        let prompt = build_prompt(&request(6));
        assert!(prompt.contains("exactly 6 questions"));
        assert!(prompt.contains("clear English"));
    }
}
