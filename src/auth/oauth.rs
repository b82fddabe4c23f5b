use anyhow::{Result, anyhow};
use oauth2::TokenResponse;
use oauth2::basic::BasicClient;
use oauth2::reqwest::{async_http_client, http_client};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, PkceCodeChallenge, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, TokenUrl,
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tiny_http::{Response, Server};
use url::Url;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Tokens returned by the oauth flow (in-memory)
#[derive(Debug)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

fn build_client(
    client_id: &str,
    client_secret: Option<&str>,
    auth_url: &str,
    token_url: &str,
) -> Result<BasicClient> {
    let client_id = ClientId::new(client_id.to_string());
    let client_secret = client_secret.map(|s| ClientSecret::new(s.to_string()));

    let auth_url = AuthUrl::new(auth_url.to_string())?;
    let token_url = TokenUrl::new(token_url.to_string())?;

    Ok(BasicClient::new(client_id, client_secret, auth_url, Some(token_url)))
}

fn into_tokens(token: &impl TokenResponse<oauth2::basic::BasicTokenType>) -> Tokens {
    Tokens {
        access_token: token.access_token().secret().to_string(),
        refresh_token: token.refresh_token().map(|r| r.secret().to_string()),
        expires_in: token.expires_in().map(|d| d.as_secs()),
    }
}

/// Exchange a refresh token for a new access token using the oauth2 crate
pub async fn refresh_access_token(
    client_id: &str,
    client_secret: Option<&str>,
    token_url: &str,
    refresh_token: &str,
) -> Result<Tokens> {
    let oauth_client = build_client(client_id, client_secret, DEFAULT_AUTH_URL, token_url)?;

    let rt = RefreshToken::new(refresh_token.to_string());
    let token = oauth_client
        .exchange_refresh_token(&rt)
        .request_async(async_http_client)
        .await
        .map_err(|e| match e {
            RequestTokenError::ServerResponse(r) => anyhow!("token endpoint rejected refresh: {r}"),
            other => anyhow!("refresh token exchange failed: {other:?}"),
        })?;

    Ok(into_tokens(&token))
}

/// Perform Authorization Code + PKCE flow. Opens system browser and captures
/// the code via a loopback server bound to `redirect_uri`. Blocking.
pub fn perform_pkce_flow(
    client_id: &str,
    client_secret: Option<&str>,
    auth_url: &str,
    token_url: &str,
    redirect_uri: &str,
    scope: &str,
) -> Result<Tokens> {
    // Parse redirect_uri so bind address matches exactly
    let redirect = Url::parse(redirect_uri)
        .map_err(|e| anyhow!("Invalid redirect_uri '{redirect_uri}': {e}"))?;

    let host = redirect
        .host_str()
        .ok_or_else(|| anyhow!("redirect_uri missing host: {redirect_uri}"))?;

    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| anyhow!("redirect_uri missing/unknown port: {redirect_uri}"))?;

    let bind_ip: IpAddr = match host {
        "localhost" | "127.0.0.1" => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => other.parse::<IpAddr>().map_err(|_| {
            anyhow!("redirect_uri host must be localhost/127.0.0.1 or an IP: {other}")
        })?,
    };

    let bind_addr = SocketAddr::new(bind_ip, port);

    // listen before the browser can hit the callback
    let server = Server::http(bind_addr)
        .map_err(|e| anyhow!("Failed to bind OAuth callback server on {bind_addr}: {e:?}"))?;

    let oauth_client = build_client(client_id, client_secret, auth_url, token_url)?
        .set_redirect_uri(RedirectUrl::new(redirect_uri.to_string())?);

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    // Google only issues a refresh token with offline access and a consent prompt
    let (auth_url, csrf_token) = oauth_client
        .authorize_url(oauth2::CsrfToken::new_random)
        .add_scope(Scope::new(scope.to_string()))
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .set_pkce_challenge(pkce_challenge)
        .url();

    println!("Open this URL in your browser:\n{auth_url}");
    if let Err(e) = open::that(auth_url.as_str()) {
        log::warn!("could not open browser automatically: {e}");
    }

    let mut code_opt: Option<String> = None;
    let wait_until = Instant::now() + Duration::from_secs(120);

    while Instant::now() < wait_until {
        let Ok(maybe_request) = server.recv_timeout(Duration::from_millis(500)) else {
            continue;
        };

        let Some(request) = maybe_request else {
            continue;
        };

        // request.url() is a path+query like "/callback?code=...&state=..."
        let full = format!("http://{}:{}{}", host, port, request.url());

        let Ok(parsed) = Url::parse(&full) else {
            let _ = request.respond(Response::from_string("Bad redirect"));
            continue;
        };

        let mut state_ok = false;
        for (k, v) in parsed.query_pairs() {
            match k.as_ref() {
                "code" => code_opt = Some(v.into_owned()),
                "state" => state_ok = v == *csrf_token.secret(),
                _ => {}
            }
        }

        if code_opt.is_some() && state_ok {
            let _ = request.respond(Response::from_string(
                "Authorization received. You can close this tab.",
            ));
            break;
        }
        code_opt = None;
        let _ = request.respond(Response::from_string(
            "No valid code found in redirect. You can close this tab.",
        ));
    }

    let code = code_opt.ok_or_else(|| anyhow!("No code received within timeout"))?;

    let token = oauth_client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_verifier)
        .request(http_client)
        .map_err(|e| anyhow!("Token exchange failed: {e:?}"))?;

    Ok(into_tokens(&token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refresh_posts_refresh_grant_and_reads_tokens() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                mockito::Matcher::UrlEncoded("refresh_token".into(), "rt-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"ya29.fresh","token_type":"Bearer","expires_in":3599}"#)
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let t = refresh_access_token("cid", Some("secret"), &url, "rt-1")
            .await
            .unwrap();

        assert_eq!(t.access_token, "ya29.fresh");
        assert_eq!(t.expires_in, Some(3599));
        assert!(t.refresh_token.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_refresh_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let url = format!("{}/token", server.url());
        let err = refresh_access_token("cid", None, &url, "revoked")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn pkce_rejects_non_loopback_redirect() {
        let err = perform_pkce_flow(
            "cid",
            None,
            DEFAULT_AUTH_URL,
            DEFAULT_TOKEN_URL,
            "http://example.com/callback",
            GMAIL_READONLY_SCOPE,
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("must be localhost"));
    }
}
