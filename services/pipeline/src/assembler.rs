//! services/pipeline/src/assembler.rs
//!
//! Turns a validated `QuestionSet` into a live graded quiz form through the
//! `FormsApi` port: create the form shell, flip it into quiz mode, then push
//! all questions as one item batch in source order.
//!
//! Failure after the form shell exists is never reported as a plain error:
//! the caller gets the orphaned form's edit URL so a human can delete or
//! finish it by hand.

use quizform_core::domain::{FormResult, QuestionSet, ValidationError};
use quizform_core::ports::{BatchOutcome, FormsApi, FormsApiError, QuizItem};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Every graded question is worth the same fixed score.
pub const POINTS_PER_QUESTION: u32 = 1;

/// A failure while assembling the remote form.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// The question set no longer satisfies its invariants. Nothing was
    /// sent to the API.
    #[error("refusing to assemble an invalid question set: {0}")]
    Invalid(#[from] ValidationError),

    /// The API rejected the request before any form existed.
    #[error("forms API call failed: {0}")]
    Api(FormsApiError),

    /// A form shell was created but could not be completed. The remote
    /// artifact still exists at `edit_url`.
    #[error("form {form_id} was created but left incomplete ({edit_url}): {source}")]
    OrphanedForm {
        form_id: String,
        edit_url: String,
        requested: usize,
        source: FormsApiError,
    },

    /// The item batch only partially committed; the form holds fewer
    /// graded questions than requested.
    #[error("form {form_id} holds {succeeded} of {} requested item(s) ({edit_url})", .succeeded + .failed)]
    PartialBatch {
        form_id: String,
        edit_url: String,
        succeeded: usize,
        failed: usize,
    },
}

/// Assembles graded quiz forms from validated question sets.
pub struct FormAssembler {
    forms: Arc<dyn FormsApi>,
}

impl FormAssembler {
    pub fn new(forms: Arc<dyn FormsApi>) -> Self {
        Self { forms }
    }

    /// Creates a quiz form holding every question in `set`, in order.
    ///
    /// The set is revalidated first so a bug elsewhere cannot push a
    /// malformed quiz to the remote API.
    pub async fn create_quiz_form(
        &self,
        set: &QuestionSet,
        title: &str,
    ) -> Result<FormResult, AssemblyError> {
        set.revalidate()?;

        let created = self
            .forms
            .create_form(title, title)
            .await
            .map_err(AssemblyError::Api)?;
        let edit_url = edit_url(&created.form_id);
        info!(form_id = %created.form_id, "created form shell");

        if let Err(err) = self.forms.enable_quiz(&created.form_id).await {
            error!(form_id = %created.form_id, "failed to enable quiz mode: {err}");
            return Err(AssemblyError::OrphanedForm {
                form_id: created.form_id,
                edit_url,
                requested: set.len(),
                source: err,
            });
        }

        let items: Vec<QuizItem> = set
            .questions
            .iter()
            .map(|q| QuizItem {
                prompt: q.prompt.clone(),
                options: q.options.clone(),
                correct_index: q.correct_index,
                point_value: POINTS_PER_QUESTION,
            })
            .collect();

        match self.forms.add_items(&created.form_id, &items).await {
            Ok(BatchOutcome::Committed) => {
                info!(form_id = %created.form_id, items = items.len(), "quiz form assembled");
                Ok(FormResult {
                    edit_url,
                    responder_url: created.responder_url,
                    item_count: set.len(),
                })
            }
            Ok(BatchOutcome::Partial { succeeded, failed }) => {
                warn!(
                    form_id = %created.form_id,
                    succeeded, failed, "item batch only partially committed"
                );
                Err(AssemblyError::PartialBatch {
                    form_id: created.form_id,
                    edit_url,
                    succeeded,
                    failed,
                })
            }
            Err(err) => {
                error!(form_id = %created.form_id, "item batch failed: {err}");
                Err(AssemblyError::OrphanedForm {
                    form_id: created.form_id,
                    edit_url,
                    requested: set.len(),
                    source: err,
                })
            }
        }
    }
}

/// The canonical editor URL for a form id.
pub fn edit_url(form_id: &str) -> String {
    format!("https://docs.google.com/forms/d/{form_id}/edit")
}
