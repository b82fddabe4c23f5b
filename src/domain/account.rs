use chrono::{DateTime, Utc};

/// An email address gated by a password. Created once, never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedAccount {
    pub email: String,
    /// argon2 PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl ProtectedAccount {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            created_at: Utc::now(),
        }
    }
}

/// Characters that carry meaning in a mailbox search or in address syntax.
const FORBIDDEN_ADDRESS_CHARS: &[char] = &[
    '"', '\'', '(', ')', '<', '>', '[', ']', '{', '}', ',', ';', ':', '\\',
];

/// Canonical form of a single email address: trimmed and lowercased.
///
/// `None` unless `raw` is exactly one `local@domain` with a dotted domain and
/// no whitespace, control or quoting characters.
pub fn normalize_email(raw: &str) -> Option<String> {
    let addr = raw.trim();
    if addr
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_ADDRESS_CHARS.contains(&c))
    {
        return None;
    }

    let (local, domain) = addr.split_once('@')?;
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..");
    if local.is_empty() || domain.contains('@') || !domain_ok {
        return None;
    }
    Some(addr.to_lowercase())
}
