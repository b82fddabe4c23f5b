use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::auth::token_manager::TokenManager;
use crate::mail::mailbox::{GmailMessage, Mailbox, MessageRef};

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Longest slice of an error response body kept in error messages.
const ERROR_BODY_MAX_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Option<Vec<MessageRef>>,
}

/// Gmail REST client for the authorized account (`users/me`).
pub struct GmailClient {
    http: reqwest::Client,
    api_base: String,
    tokens: TokenManager,
}

impl GmailClient {
    /// `timeout` bounds each request, from connect to the end of the body.
    pub fn new(api_base: impl Into<String>, tokens: TokenManager, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build Gmail HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/users/me/{}", self.api_base, path);
        let access = self.tokens.get_access_token().await?;

        let resp = self
            .http
            .get(&url)
            .bearer_auth(access)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_MAX_CHARS).collect();
            bail!("Gmail API returned {status} for {url}: {body}");
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("decode response of {url}"))
    }
}

#[async_trait]
impl Mailbox for GmailClient {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageRef>> {
        let max = max_results.to_string();
        let list: MessageList = self
            .get_json("messages", &[("q", query), ("maxResults", max.as_str())])
            .await?;
        Ok(list.messages.unwrap_or_default())
    }

    async fn get_message(&self, id: &str) -> Result<GmailMessage> {
        self.get_json(&format!("messages/{id}"), &[("format", "full")])
            .await
    }
}
