//! Unified error types for the domain layer
//!
//! Provides a common error type used across all domain operations,
//! enabling consistent error handling without forcing adapters to use
//! String or anyhow.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Session-level configuration is unusable (e.g., story too short)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A chapter was appended out of order
    #[error("Sequence error: expected chapter {expected}, got {actual}")]
    Sequence { expected: u32, actual: u32 },

    /// A structural invariant was violated by a mutation
    #[error("State validation failed: {0}")]
    StateValidation(String),

    /// The referenced chapter does not exist
    #[error("Chapter {0} not found")]
    ChapterNotFound(u32),

    /// A response of a different kind is already recorded for the chapter
    #[error("Conflicting response type for chapter {0}")]
    ConflictingResponse(u32),

    /// Parse error (for value objects crossing the storage boundary)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl DomainError {
    /// Creates a validation error for structural invariant violations.
    ///
    /// Use this when a mutation would leave the adventure in an invalid
    /// shape: wrong choice count for the chapter type, a schedule whose
    /// anchors are wrong, more chapters than the story allows.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::StateValidation(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates a parse error for string-to-type conversion failures.
    ///
    /// Use this in `FromStr` implementations when the input string
    /// doesn't match any known variant.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
