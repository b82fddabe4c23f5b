use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use temp_email_backend::auth::credentials::{self, StoredToken};
use temp_email_backend::auth::oauth::{
    self, DEFAULT_AUTH_URL, DEFAULT_TOKEN_URL, GMAIL_READONLY_SCOPE,
};
use temp_email_backend::config::{Config, load_config, process_env, resolve_secrets_dir};
use temp_email_backend::server;

#[derive(Parser)]
#[command(name = "temp_email_backend")]
#[command(about = "Protected temporary inbox backend (HTTP API + Gmail authorization)", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/temp_email_backend/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Overrides config file and PORT
        #[arg(long)]
        port: Option<u16>,
    },

    /// Authorize Gmail read access and write token.json into the secrets dir
    Authorize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg =
        load_config(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {e:#}"))?;

    match cli.cmd {
        Command::Serve { port } => {
            if let Some(p) = port {
                cfg.port = p;
            }
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(server::run(cfg))
        }

        Command::Authorize => authorize(&cfg),
    }
}

fn authorize(cfg: &Config) -> Result<()> {
    let dir = resolve_secrets_dir(cfg);

    if let Some(existing) = credentials::load_token_file(&dir)?
        && existing.refresh_token.is_some()
    {
        println!(
            "{} already holds a refresh token; delete it to authorize again.",
            dir.join(credentials::TOKEN_FILE).display()
        );
        return Ok(());
    }

    let creds = credentials::load_credentials(process_env, &dir)?;
    let key = creds.key()?;
    let auth_url = key.auth_uri.as_deref().unwrap_or(DEFAULT_AUTH_URL);
    let token_url = cfg
        .token_url
        .as_deref()
        .or(key.token_uri.as_deref())
        .unwrap_or(DEFAULT_TOKEN_URL);

    let tokens = oauth::perform_pkce_flow(
        &key.client_id,
        key.client_secret.as_deref(),
        auth_url,
        token_url,
        cfg.redirect_uri(),
        GMAIL_READONLY_SCOPE,
    )?;

    let refresh = tokens.refresh_token.ok_or_else(|| {
        anyhow!("provider returned no refresh token; remove the app's access from your Google account and retry")
    })?;

    let token = StoredToken::authorized_user(&key.client_id, key.client_secret.clone(), refresh);
    let path = credentials::save_token(&dir, &token)?;
    println!("Authorization succeeded; wrote {}", path.display());
    println!("You can now start the server with `temp_email_backend serve`.");
    Ok(())
}
