use anyhow::{Result, anyhow};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

use crate::auth::credentials::MailboxSecrets;
use crate::auth::oauth::{self, DEFAULT_TOKEN_URL};

/// Refresh this many seconds before the provider's stated expiry.
const EXPIRY_SKEW_SECS: i64 = 60;
/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_LIFETIME_SECS: i64 = 3500;

#[derive(Debug, Clone)]
struct CachedAccess {
    token: String,
    expires_at_epoch: i64,
}

/// Hands out Gmail access tokens, refreshing through the token endpoint
/// when the cached one is about to expire.
pub struct TokenManager {
    client_id: String,
    client_secret: Option<String>,
    token_url: String,
    refresh_token: Option<String>,
    cached: Mutex<Option<CachedAccess>>,
}

fn now_epoch() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

impl TokenManager {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Option<String>,
        token_url: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            token_url: token_url.into(),
            refresh_token,
            cached: Mutex::new(None),
        }
    }

    /// Token endpoint precedence: `token_url_override`, then the
    /// credentials' `token_uri`, then Google's.
    pub fn from_secrets(secrets: &MailboxSecrets, token_url_override: Option<&str>) -> Result<Self> {
        let token_url = token_url_override
            .or(secrets.token_uri())
            .unwrap_or(DEFAULT_TOKEN_URL);

        let mut mgr = Self::new(
            secrets.client_id()?,
            secrets.client_secret(),
            token_url,
            secrets.token.refresh_token.clone(),
        );

        if let (Some(at), Some(exp_ms)) = (&secrets.token.access_token, secrets.token.expiry_date) {
            mgr = mgr.with_cached_token(at.clone(), exp_ms / 1000);
        }

        if mgr.refresh_token.is_none() && mgr.cached.get_mut().is_none() {
            return Err(anyhow!(
                "token has neither a refresh token nor an access token; run `temp_email_backend authorize`"
            ));
        }
        Ok(mgr)
    }

    pub fn with_cached_token(self, token: impl Into<String>, expires_at_epoch: i64) -> Self {
        Self {
            cached: Mutex::new(Some(CachedAccess {
                token: token.into(),
                expires_at_epoch,
            })),
            ..self
        }
    }

    /// Returns a valid access token; refreshes if needed.
    pub async fn get_access_token(&self) -> Result<String> {
        let now = now_epoch()?;

        // held across the refresh so concurrent callers share one exchange
        let mut cached = self.cached.lock().await;

        // 1) cached & not about to expire
        if let Some(c) = cached.as_ref()
            && now + EXPIRY_SKEW_SECS < c.expires_at_epoch
        {
            return Ok(c.token.clone());
        }

        // 2) refresh
        let rt = self.refresh_token.as_deref().ok_or_else(|| {
            anyhow!("access token expired and no refresh token available; run `temp_email_backend authorize`")
        })?;

        log::info!("Refreshing Gmail access token");
        let t = oauth::refresh_access_token(
            &self.client_id,
            self.client_secret.as_deref(),
            &self.token_url,
            rt,
        )
        .await?;

        let exp = t
            .expires_in
            .map(|s| now + s as i64)
            .unwrap_or(now + DEFAULT_LIFETIME_SECS);
        *cached = Some(CachedAccess {
            token: t.access_token.clone(),
            expires_at_epoch: exp,
        });
        Ok(t.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{ClientCredentials, ClientKey, StoredToken};

    fn token_body(access: &str) -> String {
        format!(r#"{{"access_token":"{access}","token_type":"Bearer","expires_in":3600}}"#)
    }

    #[tokio::test]
    async fn valid_cached_token_needs_no_network() {
        let far_future = now_epoch().unwrap() + 3600;
        // unroutable token url: any refresh attempt would fail
        let mgr = TokenManager::new("cid", None, "http://127.0.0.1:9/token", None)
            .with_cached_token("cached", far_future);
        assert_eq!(mgr.get_access_token().await.unwrap(), "cached");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("fresh"))
            .expect(1)
            .create_async()
            .await;

        let almost_expired = now_epoch().unwrap() + 10;
        let mgr = TokenManager::new(
            "cid",
            Some("secret".into()),
            format!("{}/token", server.url()),
            Some("rt".into()),
        )
        .with_cached_token("stale", almost_expired);

        assert_eq!(mgr.get_access_token().await.unwrap(), "fresh");
        assert_eq!(mgr.get_access_token().await.unwrap(), "fresh");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn no_refresh_token_and_expired_cache_fails() {
        let mgr = TokenManager::new("cid", None, DEFAULT_TOKEN_URL, None)
            .with_cached_token("old", 0);
        let err = mgr.get_access_token().await.unwrap_err();
        assert!(err.to_string().contains("no refresh token"));
    }

    fn secrets(token: StoredToken) -> MailboxSecrets {
        MailboxSecrets {
            credentials: ClientCredentials {
                installed: Some(ClientKey {
                    client_id: "cid".into(),
                    token_uri: Some("https://creds.example/token".into()),
                    ..Default::default()
                }),
                web: None,
            },
            token,
        }
    }

    #[test]
    fn from_secrets_picks_token_url() {
        let s = secrets(StoredToken {
            refresh_token: Some("rt".into()),
            ..Default::default()
        });
        let mgr = TokenManager::from_secrets(&s, None).unwrap();
        assert_eq!(mgr.token_url, "https://creds.example/token");

        let mgr = TokenManager::from_secrets(&s, Some("http://override/token")).unwrap();
        assert_eq!(mgr.token_url, "http://override/token");
    }

    #[tokio::test]
    async fn from_secrets_seeds_cache_from_expiry_date() {
        let exp_ms = (now_epoch().unwrap() + 3600) * 1000;
        let s = secrets(StoredToken {
            access_token: Some("seeded".into()),
            expiry_date: Some(exp_ms),
            ..Default::default()
        });
        let mgr = TokenManager::from_secrets(&s, None).unwrap();
        assert_eq!(mgr.get_access_token().await.unwrap(), "seeded");
    }

    #[test]
    fn from_secrets_without_any_token_fails() {
        assert!(TokenManager::from_secrets(&secrets(StoredToken::default()), None).is_err());
    }
}
