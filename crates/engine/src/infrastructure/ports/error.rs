//! Error types for the infrastructure boundaries.

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ImageGenError {
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("Service unavailable")]
    Unavailable,
    #[error("Timed out")]
    TimedOut,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Database(format!("{context}: {err}"))
    }
}
