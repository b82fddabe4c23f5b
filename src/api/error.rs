use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::handlers::MessageResponse;

/// Every failure an endpoint can answer with. Internal causes are logged,
/// never sent to the caller.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Email and password must not be empty.")]
    MissingFields,
    #[error("Email must be a single valid address.")]
    InvalidEmail,
    #[error("This email is already protected.")]
    AlreadyProtected,
    #[error("This email is not protected yet.")]
    NotProtected,
    #[error("Wrong password.")]
    WrongPassword,
    #[error("Gmail service is not ready, try again.")]
    MailboxUnavailable,
    #[error("Failed to retrieve emails from Gmail.")]
    Retrieval(anyhow::Error),
    #[error("An internal server error occurred.")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields | ApiError::InvalidEmail => StatusCode::BAD_REQUEST,
            ApiError::AlreadyProtected => StatusCode::CONFLICT,
            ApiError::NotProtected => StatusCode::NOT_FOUND,
            ApiError::WrongPassword => StatusCode::UNAUTHORIZED,
            ApiError::MailboxUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Retrieval(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Retrieval(e) => log::error!("Mailbox retrieval failed: {e:#}"),
            ApiError::Internal(e) => log::error!("Internal error: {e:#}"),
            _ => {}
        }
        let body = MessageResponse::new(self.to_string());
        (self.status(), Json(body)).into_response()
    }
}
