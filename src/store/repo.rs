use anyhow::{Context, Result};
use std::sync::Arc;

use crate::domain::account::ProtectedAccount;

pub trait AccountRepository: Send + Sync {
    fn find(&self, email: &str) -> Result<Option<ProtectedAccount>>;

    /// Inserts `account` unless a record for the same email exists.
    /// Returns `false` when the email was already taken. Atomic.
    fn create_if_absent(&self, account: &ProtectedAccount) -> Result<bool>;
}

/// Runs [`AccountRepository::find`] on the blocking pool.
pub async fn find_blocking(
    repo: Arc<dyn AccountRepository>,
    email: String,
) -> Result<Option<ProtectedAccount>> {
    tokio::task::spawn_blocking(move || repo.find(&email))
        .await
        .context("account lookup task failed")?
}

/// Runs [`AccountRepository::create_if_absent`] on the blocking pool.
pub async fn create_if_absent_blocking(
    repo: Arc<dyn AccountRepository>,
    account: ProtectedAccount,
) -> Result<bool> {
    tokio::task::spawn_blocking(move || repo.create_if_absent(&account))
        .await
        .context("account insert task failed")?
}
