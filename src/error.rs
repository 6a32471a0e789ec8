//! Error types for roadmap-progress

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoadmapError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoadmapError {
    /// True for errors the caller can fix by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RoadmapError::NotFound(_)
                | RoadmapError::Conflict(_)
                | RoadmapError::PreconditionFailed(_)
                | RoadmapError::Unauthorized(_)
                | RoadmapError::Forbidden(_)
                | RoadmapError::InvalidInput(_)
                | RoadmapError::Json(_)
        )
    }
}
