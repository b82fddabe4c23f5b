use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::api::{AppState, build_router};
use crate::auth::credentials::load_mailbox_secrets;
use crate::auth::token_manager::TokenManager;
use crate::config::{Config, process_env, resolve_db_path, resolve_secrets_dir};
use crate::mail::gmail_client::{DEFAULT_API_BASE, GmailClient};
use crate::mail::mailbox::Mailbox;
use crate::store::sqlite::SqliteRepo;

/// Run the HTTP API until Ctrl-C.
///
/// Invalid settings in `cfg` are returned before anything is opened.
/// The account store is required and any failure to open it is returned.
/// Mailbox credentials are not: without them the server still starts and
/// login answers 503.
pub async fn run(cfg: Config) -> Result<()> {
    let origins = cfg.allowed_origins()?;
    let inbox = cfg.inbox_options()?;

    let db_path = resolve_db_path(&cfg)?;
    let accounts = SqliteRepo::open(&db_path)?;
    log::info!("Account store ready at {}", db_path.display());

    let state = AppState {
        accounts: Arc::new(accounts),
        mailbox: connect_mailbox(&cfg, process_env),
        inbox: Arc::new(inbox),
    };
    let app = build_router(state, origins);

    let addr = format!("{}:{}", cfg.bind_address, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    log::info!("Backend server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Gmail client from env/file secrets, or `None` (logged) if they are unusable.
pub fn connect_mailbox<F>(cfg: &Config, env: F) -> Option<Arc<dyn Mailbox>>
where
    F: Fn(&str) -> Option<String>,
{
    let dir = resolve_secrets_dir(cfg);
    let client = load_mailbox_secrets(env, &dir)
        .and_then(|s| TokenManager::from_secrets(&s, cfg.token_url.as_deref()))
        .and_then(|tokens| {
            GmailClient::new(
                cfg.gmail_api_base.as_deref().unwrap_or(DEFAULT_API_BASE),
                tokens,
                Duration::from_secs(cfg.fetch_timeout_secs),
            )
        });

    match client {
        Ok(c) => {
            log::info!("Gmail client ready");
            Some(Arc::new(c) as Arc<dyn Mailbox>)
        }
        Err(e) => {
            log::error!("Gmail client unavailable, login will answer 503: {e:#}");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
