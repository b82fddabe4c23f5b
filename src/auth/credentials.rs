use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CREDENTIALS_ENV: &str = "CREDENTIALS_JSON";
pub const TOKEN_ENV: &str = "TOKEN_JSON";
pub const CREDENTIALS_FILE: &str = "credentials.json";
pub const TOKEN_FILE: &str = "token.json";

/// OAuth client as downloaded from the Google Cloud console.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<ClientKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<ClientKey>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientKey {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientCredentials {
    pub fn key(&self) -> Result<&ClientKey> {
        self.installed
            .as_ref()
            .or(self.web.as_ref())
            .ok_or_else(|| anyhow!("client credentials have neither an \"installed\" nor a \"web\" section"))
    }
}

/// Authorized-user token, as written by `authorize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<i64>,
}

impl StoredToken {
    pub fn authorized_user(
        client_id: &str,
        client_secret: Option<String>,
        refresh_token: String,
    ) -> Self {
        Self {
            kind: Some("authorized_user".to_string()),
            client_id: Some(client_id.to_string()),
            client_secret,
            refresh_token: Some(refresh_token),
            access_token: None,
            expiry_date: None,
        }
    }
}

/// Everything needed to build a mailbox client.
#[derive(Debug, Clone)]
pub struct MailboxSecrets {
    pub credentials: ClientCredentials,
    pub token: StoredToken,
}

impl MailboxSecrets {
    /// Client id, preferring the one baked into the token.
    pub fn client_id(&self) -> Result<String> {
        match &self.token.client_id {
            Some(id) => Ok(id.clone()),
            None => Ok(self.credentials.key()?.client_id.clone()),
        }
    }

    pub fn client_secret(&self) -> Option<String> {
        self.token.client_secret.clone().or_else(|| {
            self.credentials
                .key()
                .ok()
                .and_then(|k| k.client_secret.clone())
        })
    }

    pub fn token_uri(&self) -> Option<&str> {
        self.credentials
            .key()
            .ok()
            .and_then(|k| k.token_uri.as_deref())
    }
}

/// Load mailbox secrets from `CREDENTIALS_JSON`/`TOKEN_JSON`, falling back
/// to `credentials.json`/`token.json` under `dir`.
pub fn load_mailbox_secrets<F>(env: F, dir: &Path) -> Result<MailboxSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    if env(CREDENTIALS_ENV).is_some() {
        match secrets_from_env(&env) {
            Ok(s) => {
                log::info!("Mailbox secrets loaded from environment variables");
                return Ok(s);
            }
            Err(e) => log::warn!(
                "Mailbox secrets in environment unusable ({e:#}); trying files in {}",
                dir.display()
            ),
        }
    }

    let secrets = secrets_from_dir(dir)
        .with_context(|| format!("no usable mailbox secrets in environment or {}", dir.display()))?;
    log::info!("Mailbox secrets loaded from {}", dir.display());
    Ok(secrets)
}

/// Client credentials alone, for the authorization flow.
pub fn load_credentials<F>(env: F, dir: &Path) -> Result<ClientCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = env(CREDENTIALS_ENV) {
        return serde_json::from_str(&raw).with_context(|| format!("parse {CREDENTIALS_ENV}"));
    }
    read_json(&dir.join(CREDENTIALS_FILE))
}

/// Token file under `dir`, if present.
pub fn load_token_file(dir: &Path) -> Result<Option<StoredToken>> {
    let p = dir.join(TOKEN_FILE);
    if !p.exists() {
        return Ok(None);
    }
    Ok(Some(read_json(&p)?))
}

pub fn save_token(dir: &Path, token: &StoredToken) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let p = dir.join(TOKEN_FILE);
    let s = serde_json::to_string_pretty(token)?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(p)
}

fn secrets_from_env<F>(env: &F) -> Result<MailboxSecrets>
where
    F: Fn(&str) -> Option<String>,
{
    let creds = env(CREDENTIALS_ENV).ok_or_else(|| anyhow!("{CREDENTIALS_ENV} not set"))?;
    let token = env(TOKEN_ENV).ok_or_else(|| anyhow!("{TOKEN_ENV} not set"))?;
    let credentials: ClientCredentials =
        serde_json::from_str(&creds).with_context(|| format!("parse {CREDENTIALS_ENV}"))?;
    credentials.key()?;
    Ok(MailboxSecrets {
        credentials,
        token: serde_json::from_str(&token).with_context(|| format!("parse {TOKEN_ENV}"))?,
    })
}

fn secrets_from_dir(dir: &Path) -> Result<MailboxSecrets> {
    let credentials: ClientCredentials = read_json(&dir.join(CREDENTIALS_FILE))?;
    credentials.key()?;
    Ok(MailboxSecrets {
        credentials,
        token: read_json(&dir.join(TOKEN_FILE))?,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}
