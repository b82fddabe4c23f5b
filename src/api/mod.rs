//! JSON API: `POST /api/protect` and `POST /api/login`.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

use crate::mail::inbox::InboxOptions;
use crate::mail::mailbox::Mailbox;
use crate::store::repo::AccountRepository;

/// Shared state accessible by all API handlers. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountRepository>,
    /// `None` when mailbox credentials could not be loaded; login answers 503.
    pub mailbox: Option<Arc<dyn Mailbox>>,
    pub inbox: Arc<InboxOptions>,
}

/// Build the API router with all routes.
///
/// An empty `cors_origins` allows any origin; otherwise only the listed ones.
/// Origins come validated from [`crate::config::Config::allowed_origins`].
pub fn build_router(state: AppState, cors_origins: Vec<HeaderValue>) -> Router {
    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(cors_origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .nest("/api", handlers::api_routes())
        .layer(cors)
        .with_state(state)
}
