//! services/pipeline/src/bin/pipeline.rs

use async_openai::{config::OpenAIConfig, Client};
use pipeline_lib::{
    adapters::{GoogleFormsClient, InstalledAppConsent, OpenAiCompletionAdapter, PdfTextExtractor},
    config::{Config, ConfigError},
    credentials::CredentialStore,
    error::PipelineError,
    assembler::FormAssembler,
    generator::QuestionGenerator,
    pipeline::Pipeline,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting pipeline...");

    let openai_api_key = Config::require(&config.openai_api_key, "OPENAI_API_KEY")?;
    let google_client_id = Config::require(&config.google_client_id, "GOOGLE_CLIENT_ID")?;
    let google_client_secret = Config::require(&config.google_client_secret, "GOOGLE_CLIENT_SECRET")?;
    let document_path = config
        .document_path
        .clone()
        .ok_or_else(|| ConfigError::MissingVar("DOCUMENT_PATH".to_string()))?;

    // --- 2. Initialize Service Adapters ---
    let openai_client =
        Client::with_config(OpenAIConfig::new().with_api_key(openai_api_key));
    let model_adapter = Arc::new(OpenAiCompletionAdapter::new(openai_client));

    let consent = Arc::new(InstalledAppConsent::new(
        google_client_id.clone(),
        google_client_secret.clone(),
    ));
    let credential_store = Arc::new(CredentialStore::new(
        config.secret_token_path.clone(),
        config.cache_token_path.clone(),
        google_client_id,
        google_client_secret,
        consent,
    ));
    let forms_client = Arc::new(GoogleFormsClient::new(credential_store));

    // --- 3. Assemble the Pipeline ---
    let pipeline = Pipeline::new(
        Arc::new(PdfTextExtractor),
        QuestionGenerator::new(model_adapter, config.llm_timeout),
        FormAssembler::new(forms_client),
        config.options_per_question,
        config.pipeline_deadline,
    );

    // --- 4. Run It ---
    info!(path = %document_path.display(), "reading document");
    let document = tokio::fs::read(&document_path).await.map_err(|e| {
        PipelineError::ExtractionFailed(quizform_core::ports::ExtractionError::Unreadable(
            format!("{}: {e}", document_path.display()),
        ))
    })?;

    let result = pipeline
        .run(
            &document,
            config.question_count,
            &config.language,
            &config.generation_model,
            config.quiz_title.as_deref(),
        )
        .await?;

    info!(items = result.item_count, "quiz form ready");
    info!("Edit the form:   {}", result.edit_url);
    if let Some(responder_url) = &result.responder_url {
        info!("Share this link: {responder_url}");
    }
    Ok(())
}
