//! services/pipeline/src/adapters/google_forms.rs
//!
//! This module contains the adapter for the Google Forms REST API.
//! It implements the `FormsApi` port from the core crate: form creation,
//! the quiz-settings toggle, and the ordered item batch.
//!
//! Every call obtains a freshly resolved bearer token from the
//! `CredentialStore`, so a token refreshed mid-pipeline is picked up
//! without any coordination here.

use crate::credentials::CredentialStore;
use async_trait::async_trait;
use quizform_core::ports::{BatchOutcome, CreatedForm, FormsApi, FormsApiError, QuizItem};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Production endpoint; tests point this at a local stub.
pub const DEFAULT_FORMS_BASE_URL: &str = "https://forms.googleapis.com/v1";

pub struct GoogleFormsClient {
    store: Arc<CredentialStore>,
    base_url: String,
}

impl GoogleFormsClient {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self::with_base_url(store, DEFAULT_FORMS_BASE_URL.to_string())
    }

    pub fn with_base_url(store: Arc<CredentialStore>, base_url: String) -> Self {
        Self { store, base_url }
    }

    /// POSTs a JSON body and returns the parsed JSON reply, translating
    /// HTTP-level failures into the port taxonomy.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, FormsApiError> {
        let client = self
            .store
            .authenticated_client()
            .await
            .map_err(|e| FormsApiError::Auth(e.to_string()))?;

        let response = client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| FormsApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(FormsApiError::Auth(format!("status {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FormsApiError::Rejected {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| FormsApiError::Network(format!("unreadable reply: {e}")))
    }

    fn batch_update_url(&self, form_id: &str) -> String {
        format!("{}/forms/{form_id}:batchUpdate", self.base_url)
    }
}

#[async_trait]
impl FormsApi for GoogleFormsClient {
    async fn create_form(
        &self,
        title: &str,
        document_title: &str,
    ) -> Result<CreatedForm, FormsApiError> {
        let body = json!({
            "info": {
                "title": title,
                "documentTitle": document_title,
            }
        });
        let reply = self
            .post_json(&format!("{}/forms", self.base_url), &body)
            .await?;

        let form_id = reply
            .get("formId")
            .and_then(Value::as_str)
            .ok_or_else(|| FormsApiError::Network("create reply carried no formId".to_string()))?
            .to_string();
        let responder_url = reply
            .get("responderUri")
            .and_then(Value::as_str)
            .map(str::to_string);

        info!(%form_id, "created remote form");
        Ok(CreatedForm {
            form_id,
            responder_url,
        })
    }

    async fn enable_quiz(&self, form_id: &str) -> Result<(), FormsApiError> {
        let body = json!({
            "requests": [{
                "updateSettings": {
                    "settings": { "quizSettings": { "isQuiz": true } },
                    "updateMask": "quizSettings.isQuiz",
                }
            }]
        });
        self.post_json(&self.batch_update_url(form_id), &body)
            .await?;
        debug!(%form_id, "quiz mode enabled");
        Ok(())
    }

    async fn add_items(
        &self,
        form_id: &str,
        items: &[QuizItem],
    ) -> Result<BatchOutcome, FormsApiError> {
        let requests: Vec<Value> = items
            .iter()
            .enumerate()
            .map(|(index, item)| create_item_request(index, item))
            .collect();
        let reply = self
            .post_json(&self.batch_update_url(form_id), &json!({ "requests": requests }))
            .await?;

        // The API acknowledges each committed request with one reply entry;
        // fewer entries than requests means a partial commit.
        let succeeded = reply
            .get("replies")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or(0);
        if succeeded < items.len() {
            return Ok(BatchOutcome::Partial {
                succeeded,
                failed: items.len() - succeeded,
            });
        }
        debug!(%form_id, items = items.len(), "item batch committed");
        Ok(BatchOutcome::Committed)
    }
}

/// One `createItem` request: a required radio question, graded inline, at
/// an explicit location so displayed order matches source order.
fn create_item_request(index: usize, item: &QuizItem) -> Value {
    let options: Vec<Value> = item
        .options
        .iter()
        .map(|value| json!({ "value": value }))
        .collect();
    json!({
        "createItem": {
            "item": {
                "title": item.prompt,
                "questionItem": {
                    "question": {
                        "required": true,
                        "grading": {
                            "pointValue": item.point_value,
                            "correctAnswers": {
                                "answers": [{ "value": item.options[item.correct_index] }]
                            }
                        },
                        "choiceQuestion": {
                            "type": "RADIO",
                            "options": options,
                            "shuffle": false,
                        }
                    }
                }
            },
            "location": { "index": index }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_item_request_marks_the_correct_option_and_pins_order() {
        let item = QuizItem {
            prompt: "What color is the sky?".to_string(),
            options: vec![
                "Green".to_string(),
                "Blue".to_string(),
                "Red".to_string(),
                "Yellow".to_string(),
            ],
            correct_index: 1,
            point_value: 1,
        };
        let request = create_item_request(4, &item);

        assert_eq!(request["createItem"]["location"]["index"], 4);
        let question = &request["createItem"]["item"]["questionItem"]["question"];
        assert_eq!(question["grading"]["pointValue"], 1);
        assert_eq!(
            question["grading"]["correctAnswers"]["answers"][0]["value"],
            "Blue"
        );
        assert_eq!(question["choiceQuestion"]["type"], "RADIO");
        assert_eq!(question["choiceQuestion"]["shuffle"], false);
        assert_eq!(
            question["choiceQuestion"]["options"]
                .as_array()
                .unwrap()
                .len(),
            4
        );
    }
}
