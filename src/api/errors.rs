use reqwest::StatusCode;
use thiserror::Error;

use crate::schemas::quiz::QuestionId;

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("session is not authorized")]
    Unauthorized,
    #[error("access forbidden")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no quiz is configured for course {course_id}")]
    NotConfigured { course_id: String },
    #[error("quiz is not available: {0}")]
    NotAvailable(String),
    #[error("answer for question {question_id} was not accepted: {reason}")]
    ValidationFailed { question_id: QuestionId, reason: String },
    #[error("unexpected status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Log the underlying transport error with context and return a `Network` variant.
    pub(crate) fn network(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::warn!(error = %err, "{context}");
        Self::Network(context.to_string())
    }

    pub(crate) fn from_status(status: StatusCode, detail: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::FORBIDDEN => Self::Forbidden,
            StatusCode::NOT_FOUND => Self::NotFound(detail),
            _ => Self::Status { status: status.as_u16(), detail },
        }
    }

    pub(crate) fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::Forbidden)
    }

    /// Transport failures and 5xx responses may succeed on a later attempt.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Canned text shown to the student.
    pub(crate) fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            Self::Unauthorized => "Your session has expired. Please log in again.".to_string(),
            Self::Forbidden => "You do not have access to this quiz.".to_string(),
            Self::NotFound(_) => "The requested quiz data was not found.".to_string(),
            Self::NotConfigured { .. } => "No quiz has been set up for your course yet.".to_string(),
            Self::NotAvailable(reason) => format!("The quiz is not available: {reason}."),
            Self::ValidationFailed { question_id, .. } => {
                format!("Your answer to question {question_id} could not be submitted.")
            }
            Self::Status { status, .. } => canned_status_message(*status).to_string(),
            Self::Decode(_) => "The server sent an unexpected response.".to_string(),
        }
    }
}

fn canned_status_message(status: u16) -> &'static str {
    match status {
        400 => "The request was rejected by the server.",
        409 => "The quiz state changed on the server. Reload and try again.",
        429 => "Too many requests. Please wait a moment.",
        500..=599 => "The server encountered an error. Please try again later.",
        _ => "Something went wrong. Please try again.",
    }
}
