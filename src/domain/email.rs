use serde::{Deserialize, Serialize};

/// Id of a message as handed out by the mailbox provider.
pub type MessageId = String;

/// A message rendered for display in the inbox view. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedEmail {
    pub from: String,
    pub subject: String,
    /// HTML-safe body: raw HTML, or plain text with `<br>` line breaks.
    pub body: String,
    pub time: String,
}
