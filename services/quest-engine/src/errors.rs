use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QuestEngineError>;

#[derive(Error, Debug)]
pub enum QuestEngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Completion timed out after {0} ms")]
    Timeout(u64),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Quest not found: {0}")]
    QuestNotFound(i64),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    #[error("Quest {quest_id} already completed by user {user_id}")]
    AlreadyCompleted { user_id: i64, quest_id: i64 },
}

impl From<validator::ValidationErrors> for QuestEngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        QuestEngineError::Validation(err.to_string())
    }
}

impl ResponseError for QuestEngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        // Storage failures are diagnostic only; the detail stays in the logs.
        let error_message = if self.is_storage_error() {
            "Internal storage failure".to_string()
        } else {
            self.to_string()
        };

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            QuestEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QuestEngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            QuestEngineError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            QuestEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            QuestEngineError::UserNotFound(_) => StatusCode::NOT_FOUND,
            QuestEngineError::QuestNotFound(_) => StatusCode::NOT_FOUND,
            QuestEngineError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            QuestEngineError::AlreadyCompleted { .. } => StatusCode::CONFLICT,
        }
    }
}

impl QuestEngineError {
    /// True for failures of the store itself rather than business outcomes.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            QuestEngineError::Database(_)
                | QuestEngineError::Storage(_)
                | QuestEngineError::Timeout(_)
        )
    }

    fn error_type(&self) -> &str {
        match self {
            QuestEngineError::Database(_) => "storage_error",
            QuestEngineError::Storage(_) => "storage_error",
            QuestEngineError::Timeout(_) => "storage_timeout",
            QuestEngineError::Validation(_) => "validation_error",
            QuestEngineError::UserNotFound(_) => "not_found",
            QuestEngineError::QuestNotFound(_) => "not_found",
            QuestEngineError::InsufficientBalance { .. } => "insufficient_balance",
            QuestEngineError::AlreadyCompleted { .. } => "already_completed",
        }
    }
}
