//! Error types for the support engine

use thiserror::Error;

use crate::types::{ConversationStatus, MessageKind};

#[derive(Debug, Error)]
pub enum SupportError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Message kind {0} is not allowed for this author")]
    ForbiddenKind(MessageKind),

    #[error("Message kind SYSTEM is reserved for internal processes")]
    ReservedKind,

    #[error("Cannot move conversation from {from} to {to}")]
    InvalidTransition {
        from: ConversationStatus,
        to: ConversationStatus,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<sqlx::Error> for SupportError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        SupportError::Persistence(err.to_string())
    }
}

pub type SupportResult<T> = Result<T, SupportError>;
