//! HTTP request handlers for the protect/login API.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::post,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::domain::account::{ProtectedAccount, normalize_email};
use crate::domain::email::RenderedEmail;
use crate::mail::inbox::fetch_inbox_for;
use crate::store::repo::{create_if_absent_blocking, find_blocking};

pub const PROTECTED: &str = "Email protected successfully!";
pub const INBOX_EMPTY: &str = "Login successful, inbox is empty.";
pub const EMAILS_RETRIEVED: &str = "Emails retrieved successfully.";

/// Build all API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/protect", post(protect))
        .route("/login", post(login))
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub emails: Vec<RenderedEmail>,
}

/// Normalized email and non-empty password.
///
/// `MissingFields` for an empty field or a body that is not the expected
/// JSON; `InvalidEmail` when the email is not a single address.
fn credentials(body: Result<Json<CredentialsRequest>, JsonRejection>) -> Result<(String, String), ApiError> {
    let Json(req) = body.map_err(|rejection| {
        log::debug!("rejected request body: {rejection}");
        ApiError::MissingFields
    })?;
    let email = req.email.filter(|e| !e.is_empty());
    let password = req.password.filter(|p| !p.is_empty());
    let (email, password) = email.zip(password).ok_or(ApiError::MissingFields)?;
    let email = normalize_email(&email).ok_or(ApiError::InvalidEmail)?;
    Ok((email, password))
}

async fn protect(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let (email, password) = credentials(body)?;

    // known emails answer without hashing
    if find_blocking(state.accounts.clone(), email.clone())
        .await?
        .is_some()
    {
        return Err(ApiError::AlreadyProtected);
    }

    let hash = hash_password_blocking(password).await?;
    let account = ProtectedAccount::new(email.as_str(), hash);
    if !create_if_absent_blocking(state.accounts.clone(), account).await? {
        return Err(ApiError::AlreadyProtected);
    }

    log::info!("Protected {email}");
    Ok((StatusCode::CREATED, Json(MessageResponse::new(PROTECTED))))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (email, password) = credentials(body)?;

    let account = find_blocking(state.accounts.clone(), email.clone())
        .await?
        .ok_or(ApiError::NotProtected)?;
    if !verify_password_blocking(password, account.password_hash).await? {
        log::info!("Wrong password for {email}");
        return Err(ApiError::WrongPassword);
    }

    let mailbox = state
        .mailbox
        .as_deref()
        .ok_or(ApiError::MailboxUnavailable)?;

    let emails = fetch_inbox_for(mailbox, &email, &state.inbox)
        .await
        .map_err(ApiError::Retrieval)?;

    let message = if emails.is_empty() {
        INBOX_EMPTY
    } else {
        EMAILS_RETRIEVED
    };
    log::info!("Login for {email}: {} messages", emails.len());

    Ok(Json(LoginResponse {
        message: message.to_string(),
        emails,
    }))
}
