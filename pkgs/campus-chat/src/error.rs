//! Error types for chat operations

use campus_store::RequestStatus;
use sea_orm::DbErr;
use thiserror::Error;

/// Errors that can occur in chat operations
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Invalid message: {0}")]
    Validation(String),
    #[error("Chat request already sent between {sender} and {receiver}")]
    DuplicateRequest { sender: String, receiver: String },
    #[error("Chat request {request_id} is already {status}")]
    InvalidState {
        request_id: String,
        status: RequestStatus,
    },
    #[error("Chat request not found: {0}")]
    RequestNotFound(String),
    #[error("Participant not found: {0}")]
    UnknownParticipant(String),
    #[error("{sender} needs an accepted chat request before messaging {receiver}")]
    ConsentRequired { sender: String, receiver: String },
    #[error("Not permitted: {0}")]
    NotPermitted(String),
    #[error("Transport error: {0}")]
    Transport(#[from] DbErr),
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Directory error: {0}")]
    Directory(String),
    #[error("Realtime feed unavailable: {0}")]
    Feed(String),
}

impl ChatError {
    /// Whether the error came from the backing store rather than from a rule
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
