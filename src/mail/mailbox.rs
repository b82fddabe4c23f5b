use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::email::MessageId;
use crate::mail::payload::PayloadNode;

/// Search hit; only the id is needed to fetch the full message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Epoch milliseconds, sent by Gmail as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadNode>,
}

/// A searchable mailbox the inbox view reads from.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Ids of messages matching a provider search query, newest first.
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<MessageRef>>;

    async fn get_message(&self, id: &str) -> Result<GmailMessage>;
}
