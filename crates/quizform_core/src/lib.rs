pub mod domain;
pub mod ports;

pub use domain::{
    Credential, FormResult, GenerationRequest, Language, Mcq, McqViolation, QuestionSet,
    ValidationError,
};
pub use ports::{
    BatchOutcome, CompletionModel, ConsentError, ConsentFlow, CreatedForm, ExtractionError,
    FormsApi, FormsApiError, LlmError, QuizItem, TextExtractor,
};
