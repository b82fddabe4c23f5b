//! Gmail message payload trees and body extraction.
//!
//! A payload is the MIME structure of a message as the Gmail API exposes it:
//! every node may carry a `mimeType`, headers, an inline base64 `body.data`
//! and nested `parts`.

use serde::{Deserialize, Serialize};

use crate::mail::decoders::decode_body_data;

pub const NO_CONTENT_PLACEHOLDER: &str = "<i>(No content to display)</i>";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<PartBody>,
    /// Missing and empty are the same thing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<PayloadNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl PayloadNode {
    /// First header called `name`, compared ASCII case-insensitively.
    /// Empty values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .filter(|v| !v.is_empty())
    }

    fn inline_data(&self) -> Option<&str> {
        self.body.as_ref().and_then(|b| b.data.as_deref())
    }

    fn decoded(&self) -> String {
        self.inline_data().map(decode_body_data).unwrap_or_default()
    }
}

/// Depth-first search of the descendants of `node` for the first part whose
/// type is exactly `mime_type`. `node` itself is never tested, and the
/// children of a matching part are not visited.
pub fn find_part<'a>(node: &'a PayloadNode, mime_type: &str) -> Option<&'a PayloadNode> {
    for part in &node.parts {
        if part.mime_type.as_deref() == Some(mime_type) {
            return Some(part);
        }
        if let Some(found) = find_part(part, mime_type) {
            return Some(found);
        }
    }
    None
}

/// Best renderable body of a message.
///
/// HTML is returned as is. Plain text gets `<br>` for each newline. A root
/// without usable parts falls back to its own inline data, and anything else
/// yields [`NO_CONTENT_PLACEHOLDER`].
pub fn extract_body(root: &PayloadNode) -> String {
    if let Some(html) = find_part(root, "text/html") {
        return html.decoded();
    }
    if let Some(text) = find_part(root, "text/plain") {
        return text.decoded().replace('\n', "<br>");
    }
    if let Some(data) = root.inline_data().filter(|d| !d.is_empty()) {
        return decode_body_data(data);
    }
    NO_CONTENT_PLACEHOLDER.to_string()
}
