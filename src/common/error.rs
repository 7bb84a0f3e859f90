use axum::http::StatusCode;
use thiserror::Error;

pub type PitchResult<T> = Result<T, PitchError>;

/// Failure taxonomy of the ingestion, transcode and delivery pipeline.
#[derive(Debug, Error)]
pub enum PitchError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    PaymentRequired(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl PitchError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PitchError::Validation(_) => StatusCode::BAD_REQUEST,
            PitchError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            PitchError::Forbidden(_) => StatusCode::FORBIDDEN,
            PitchError::NotFound(_) => StatusCode::NOT_FOUND,
            PitchError::Conflict(_) => StatusCode::CONFLICT,
            PitchError::Storage(_) => StatusCode::BAD_GATEWAY,
            PitchError::Transcode(_)
            | PitchError::Database(_)
            | PitchError::Io(_)
            | PitchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors raised by the pitch owner's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<aws_sdk_s3::Error> for PitchError {
    fn from(err: aws_sdk_s3::Error) -> Self {
        PitchError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(
            PitchError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PitchError::PaymentRequired("x".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            PitchError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            PitchError::Storage("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert!(!PitchError::Transcode("boom".into()).is_client_error());
    }

    #[test]
    fn transcode_message_carries_detail() {
        let err = PitchError::Transcode("ffmpeg exited with 1".into());
        assert_eq!(err.to_string(), "transcode failed: ffmpeg exited with 1");
    }
}
