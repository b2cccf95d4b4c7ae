//! # AppError
//!
//! Centralized error handling for the Moodboard ecosystem.
//! Maps backend and domain failures to actionable error types.

use thiserror::Error;

/// The primary error type for all mb-core ports.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Board, Post, Comment)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty post body, malformed invite code)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The backend refused the write (e.g., not a member of the group)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Infrastructure failure (e.g., database unavailable)
    #[error("internal service error: {0}")]
    Internal(String),

    /// Resource already exists (e.g., same reaction twice, existing membership)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Change-feed or tagging transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound(entity.to_string(), id.to_string())
    }
}

/// A specialized Result type for Moodboard logic.
pub type Result<T> = std::result::Result<T, AppError>;
