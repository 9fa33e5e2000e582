//! services/pipeline/src/adapters/question_llm.rs
//!
//! This module contains the adapter for the question-generation LLM.
//! It implements the `CompletionModel` port from the core crate against
//! the OpenAI chat completions API.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use quizform_core::ports::{CompletionModel, LlmError};
use std::time::Duration;
use tracing::debug;

/// An adapter that implements `CompletionModel` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiCompletionAdapter {
    client: Client<OpenAIConfig>,
}

impl OpenAiCompletionAdapter {
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompletionAdapter {
    async fn complete(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| LlmError::Api(e.to_string()))?,
        )];

        // Temperature 0 and JSON mode: the caller parses this reply
        // mechanically, creativity only hurts.
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .response_format(ResponseFormat::JsonObject)
            .temperature(0.0)
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let response = tokio::time::timeout(timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Network(format!("model call exceeded {}s", timeout.as_secs())))?
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::Api("model returned no message content".to_string()))?;

        debug!(model, chars = content.len(), "received model completion");
        Ok(content)
    }
}

/// Translates the client library's error into the port taxonomy, which is
/// what decides retryability upstream.
fn map_openai_error(err: OpenAIError) -> LlmError {
    match err {
        OpenAIError::Reqwest(e) => LlmError::Network(e.to_string()),
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.clone().unwrap_or_default();
            let code = api.code.clone().unwrap_or_default();
            if kind.contains("rate_limit") || code.contains("rate_limit") {
                LlmError::RateLimited { retry_after: None }
            } else if kind.contains("auth") || code.contains("invalid_api_key") {
                LlmError::Auth(api.message)
            } else {
                LlmError::Api(api.message)
            }
        }
        other => LlmError::Api(other.to_string()),
    }
}
