//! services/pipeline/src/adapters/mod.rs
//!
//! Declares the adapter modules. Each adapter implements one port trait
//! from `quizform_core` against a concrete external system.

pub mod consent;
pub mod extractor;
pub mod google_forms;
pub mod question_llm;

pub use consent::InstalledAppConsent;
pub use extractor::PdfTextExtractor;
pub use google_forms::GoogleFormsClient;
pub use question_llm::OpenAiCompletionAdapter;
