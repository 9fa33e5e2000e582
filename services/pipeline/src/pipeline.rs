//! services/pipeline/src/pipeline.rs
//!
//! The end-to-end orchestrator: document bytes in, graded quiz form out.
//! Stages run strictly in order (extract, generate, assemble) under a
//! single overall deadline; whatever time a stage consumes is gone for
//! the stages after it.
//!
//! Input validation happens before any stage runs, so a bad request never
//! costs a network call.

use crate::assembler::{AssemblyError, FormAssembler};
use crate::error::PipelineError;
use crate::generator::QuestionGenerator;
use quizform_core::domain::{FormResult, GenerationRequest, Language};
use quizform_core::ports::{FormsApiError, TextExtractor};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument};

/// Title used when the caller supplies none and the document yields no
/// better hint.
const FALLBACK_TITLE: &str = "Generated Quiz";

pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    generator: QuestionGenerator,
    assembler: FormAssembler,
    options_per_question: usize,
    deadline: Duration,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        generator: QuestionGenerator,
        assembler: FormAssembler,
        options_per_question: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            extractor,
            generator,
            assembler,
            options_per_question,
            deadline,
        }
    }

    /// Runs the full document-to-quiz pipeline once.
    #[instrument(skip_all, fields(question_count = question_count, language = language))]
    pub async fn run(
        &self,
        document: &[u8],
        question_count: usize,
        language: &str,
        model_name: &str,
        title_hint: Option<&str>,
    ) -> Result<FormResult, PipelineError> {
        // Reject bad input before spending any budget.
        GenerationRequest::validate_question_count(question_count)?;
        let language = Language::parse(language)?;
        let started = Instant::now();

        let source_text = self
            .stage(started, "extraction", self.extractor.extract(document))
            .await??;
        info!(chars = source_text.len(), "document text extracted");

        let request = GenerationRequest::new(
            source_text,
            question_count,
            language,
            model_name.to_string(),
            self.options_per_question,
        )?;
        let set = self
            .stage(started, "generation", self.generator.generate(&request))
            .await??;

        let title = title_hint
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(FALLBACK_TITLE);
        let result = self
            .stage(started, "assembly", self.assembler.create_quiz_form(&set, title))
            .await?
            .map_err(map_assembly_error)?;

        info!(
            items = result.item_count,
            edit_url = %result.edit_url,
            "pipeline complete"
        );
        Ok(result)
    }

    /// Runs one stage under whatever remains of the overall deadline.
    async fn stage<T>(
        &self,
        started: Instant,
        name: &'static str,
        fut: impl std::future::Future<Output = T>,
    ) -> Result<T, PipelineError> {
        // An assembly cutoff can land after the remote form was created.
        let note = if name == "assembly" {
            "; a partially populated remote form may exist"
        } else {
            ""
        };
        let timeout_err = || PipelineError::Timeout { stage: name, note };
        let remaining = self
            .deadline
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
            .ok_or_else(timeout_err)?;
        tokio::time::timeout(remaining, fut)
            .await
            .map_err(|_| timeout_err())
    }
}

/// Assembly failures fold into the pipeline taxonomy. Anything that left a
/// usable-but-incomplete remote form keeps its edit URL and counts.
fn map_assembly_error(err: AssemblyError) -> PipelineError {
    match err {
        AssemblyError::Invalid(e) => PipelineError::AssemblyFailed(e.to_string()),
        AssemblyError::Api(FormsApiError::Auth(message)) => PipelineError::AuthFailed(message),
        AssemblyError::Api(e) => PipelineError::AssemblyFailed(e.to_string()),
        AssemblyError::OrphanedForm {
            edit_url,
            requested,
            source,
            ..
        } => match source {
            // The auth cause wins the kind, but the orphaned form must
            // stay visible to the caller.
            FormsApiError::Auth(message) => PipelineError::AuthFailed(format!(
                "{message}; an incomplete form was left behind at {edit_url}"
            )),
            _ => PipelineError::AssemblyPartial {
                succeeded: 0,
                failed: requested,
                edit_url,
            },
        },
        AssemblyError::PartialBatch {
            edit_url,
            succeeded,
            failed,
            ..
        } => PipelineError::AssemblyPartial {
            succeeded,
            failed,
            edit_url,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quizform_core::ports::{
        BatchOutcome, CompletionModel, CreatedForm, ExtractionError, FormsApi, LlmError, QuizItem,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedExtractor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        async fn extract(&self, _document: &[u8]) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Photosynthesis converts light into chemical energy.".to_string())
        }
    }

    struct FixedModel {
        reply: String,
    }

    #[async_trait]
    impl CompletionModel for FixedModel {
        async fn complete(
            &self,
            _prompt: &str,
            _model: &str,
            _timeout: Duration,
        ) -> Result<String, LlmError> {
            Ok(self.reply.clone())
        }
    }

    struct HappyForms;

    #[async_trait]
    impl FormsApi for HappyForms {
        async fn create_form(
            &self,
            _title: &str,
            _document_title: &str,
        ) -> Result<CreatedForm, FormsApiError> {
            Ok(CreatedForm {
                form_id: "f1".to_string(),
                responder_url: None,
            })
        }

        async fn enable_quiz(&self, _form_id: &str) -> Result<(), FormsApiError> {
            Ok(())
        }

        async fn add_items(
            &self,
            _form_id: &str,
            items: &[QuizItem],
        ) -> Result<BatchOutcome, FormsApiError> {
            assert!(items.iter().all(|i| i.point_value == 1));
            Ok(BatchOutcome::Committed)
        }
    }

    fn sheet_json(count: usize) -> String {
        let questions: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{"prompt":"Q{i}?","options":["a{i}","b{i}","c{i}","d{i}"],"correct_index":0}}"#
                )
            })
            .collect();
        format!(r#"{{"questions":[{}]}}"#, questions.join(","))
    }

    fn pipeline_with(extractor: Arc<FixedExtractor>, model_reply: String) -> Pipeline {
        Pipeline::new(
            extractor,
            QuestionGenerator::new(
                Arc::new(FixedModel { reply: model_reply }),
                Duration::from_secs(120),
            ),
            FormAssembler::new(Arc::new(HappyForms)),
            4,
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn happy_path_produces_a_form_with_the_exact_item_count() {
        let extractor = Arc::new(FixedExtractor {
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline_with(extractor.clone(), sheet_json(6));
        let result = pipeline
            .run(b"%PDF-...", 6, "en", "gpt-4.1", Some("Biology Quiz"))
            .await
            .unwrap();
        assert_eq!(result.item_count, 6);
        assert_eq!(result.edit_url, "https://docs.google.com/forms/d/f1/edit");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn out_of_range_count_is_rejected_before_extraction() {
        let extractor = Arc::new(FixedExtractor {
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline_with(extractor.clone(), sheet_json(1));
        let err = pipeline
            .run(b"%PDF-...", 51, "en", "gpt-4.1", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_language_is_rejected_before_extraction() {
        let extractor = Arc::new(FixedExtractor {
            calls: AtomicUsize::new(0),
        });
        let pipeline = pipeline_with(extractor.clone(), sheet_json(1));
        let err = pipeline
            .run(b"%PDF-...", 3, "klingon", "gpt-4.1", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    struct StalledForms;

    #[async_trait]
    impl FormsApi for StalledForms {
        async fn create_form(
            &self,
            _title: &str,
            _document_title: &str,
        ) -> Result<CreatedForm, FormsApiError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            unreachable!("the deadline fires first")
        }

        async fn enable_quiz(&self, _form_id: &str) -> Result<(), FormsApiError> {
            Ok(())
        }

        async fn add_items(
            &self,
            _form_id: &str,
            _items: &[QuizItem],
        ) -> Result<BatchOutcome, FormsApiError> {
            Ok(BatchOutcome::Committed)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn assembly_deadline_hit_warns_about_a_possible_partial_form() {
        let pipeline = Pipeline::new(
            Arc::new(FixedExtractor {
                calls: AtomicUsize::new(0),
            }),
            QuestionGenerator::new(
                Arc::new(FixedModel {
                    reply: sheet_json(2),
                }),
                Duration::from_secs(120),
            ),
            FormAssembler::new(Arc::new(StalledForms)),
            4,
            Duration::from_secs(30),
        );
        let err = pipeline
            .run(b"%PDF-...", 2, "en", "gpt-4.1", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "timeout");
        let message = err.to_string();
        assert!(message.contains("assembly"), "got: {message}");
        assert!(
            message.contains("partially populated remote form may exist"),
            "got: {message}"
        );
    }

    #[test]
    fn orphaned_form_with_auth_cause_keeps_the_edit_url_visible() {
        let err = map_assembly_error(AssemblyError::OrphanedForm {
            form_id: "f1".to_string(),
            edit_url: "https://docs.google.com/forms/d/f1/edit".to_string(),
            requested: 6,
            source: FormsApiError::Auth("token expired".to_string()),
        });
        assert_eq!(err.kind(), "auth_failed");
        let message = err.to_string();
        assert!(message.contains("token expired"), "got: {message}");
        assert!(
            message.contains("https://docs.google.com/forms/d/f1/edit"),
            "got: {message}"
        );
    }

    #[test]
    fn partial_assembly_keeps_counts_and_edit_url() {
        let err = map_assembly_error(AssemblyError::PartialBatch {
            form_id: "f1".to_string(),
            edit_url: "https://docs.google.com/forms/d/f1/edit".to_string(),
            succeeded: 2,
            failed: 4,
        });
        match err {
            PipelineError::AssemblyPartial {
                succeeded,
                failed,
                edit_url,
            } => {
                assert_eq!((succeeded, failed), (2, 4));
                assert!(edit_url.contains("f1"));
            }
            other => panic!("expected AssemblyPartial, got {other:?}"),
        }
        assert_eq!(
            map_assembly_error(AssemblyError::Api(FormsApiError::Auth("expired".into())))
                .kind(),
            "auth_failed"
        );
    }
}
