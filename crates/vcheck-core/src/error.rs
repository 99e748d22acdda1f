//! Error types for the liveness pipeline

use thiserror::Error;

use crate::SessionId;

/// Core VCheck errors
#[derive(Error, Debug)]
pub enum VCheckError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    // Collaborator errors
    #[error("Face tracking session could not be created: {0}")]
    TrackingSetup(String),

    #[error("Face tracking failed: {0}")]
    Tracking(String),

    #[error("Video recorder error: {0}")]
    Recorder(String),

    // Lifecycle errors
    #[error("Session {0} is still active")]
    SessionActive(SessionId),

    #[error("No liveness session has been started")]
    SessionNotStarted,

    // Backend response errors
    #[error("Invalid verdict payload: {0}")]
    InvalidVerdict(String),
}

/// Result type for VCheck operations
pub type VCheckResult<T> = Result<T, VCheckError>;
