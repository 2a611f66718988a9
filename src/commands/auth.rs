//! Google OAuth consent bootstrap.
//!
//! Opens the consent page in a browser and catches the redirect on a
//! localhost listener, then stores the tokens for subsequent runs.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;

use crate::config::{self, AccountTokens, Tokens};

const REDIRECT_PORT: u16 = 8085;
const REDIRECT_URI: &str = "http://localhost:8085/callback";
const SCOPE: &str = "https://www.googleapis.com/auth/calendar";

pub async fn run() -> Result<()> {
    let cfg = config::load_config()?;
    let creds = cfg.gcal()?;

    let state = format!("entsync-{}", Utc::now().timestamp_millis());

    let mut auth_url = url::Url::parse("https://accounts.google.com/o/oauth2/v2/auth")?;
    auth_url
        .query_pairs_mut()
        .append_pair("client_id", &creds.client_id)
        .append_pair("redirect_uri", REDIRECT_URI)
        .append_pair("response_type", "code")
        .append_pair("scope", SCOPE)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", &state);

    println!("\nOpen this URL in your browser to authenticate:\n");
    println!("{}\n", auth_url);

    // Try to open the browser automatically
    if open::that(auth_url.as_str()).is_err() {
        println!("(Could not open browser automatically, please copy the URL above)");
    }

    let (code, returned_state) = wait_for_callback()?;
    if returned_state != state {
        anyhow::bail!("OAuth state mismatch; aborting");
    }

    println!("\nReceived authorization code, exchanging for tokens...");

    #[derive(Deserialize)]
    struct TokenResponse {
        access_token: String,
        refresh_token: String,
        expires_in: i64,
    }

    let response: TokenResponse = reqwest::Client::new()
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .context("Failed to reach the token endpoint")?
        .error_for_status()
        .context("Failed to exchange code for tokens")?
        .json()
        .await
        .context("Failed to parse token response")?;

    config::save_tokens(&Tokens {
        gcal: Some(AccountTokens {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: Some(Utc::now() + Duration::seconds(response.expires_in)),
        }),
    })?;

    println!("Authentication successful!");
    println!("\nNow run `entsync sync` to sync your schedule.");

    Ok(())
}

/// Catch the single consent redirect on the loopback listener and pull
/// `code` and `state` out of its query string.
fn wait_for_callback() -> Result<(String, String)> {
    let listener = TcpListener::bind(("127.0.0.1", REDIRECT_PORT))
        .with_context(|| format!("Port {} is busy; close whatever holds it and retry", REDIRECT_PORT))?;

    println!("Waiting for Google to redirect to port {}...", REDIRECT_PORT);

    let (mut stream, _) = listener.accept().context("Callback connection failed")?;

    // Only the request line matters: "GET /callback?code=...&state=... HTTP/1.1"
    let mut request_line = String::new();
    BufReader::new(&stream).read_line(&mut request_line)?;
    let path = request_line
        .split_whitespace()
        .nth(1)
        .context("Malformed callback request")?;
    let url = url::Url::parse(&format!("http://localhost{}", path))?;

    let query_value = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    let code = query_value("code").context("Callback carried no authorization code")?;
    let state = query_value("state").context("Callback carried no state parameter")?;

    // Give the browser tab something to show before we hang up
    let page = "HTTP/1.1 200 OK\r\n\
        Content-Type: text/html\r\n\
        Connection: close\r\n\
        \r\n\
        <html><body>\
        <h1>entsync is authorized</h1>\
        <p>This tab is done; the rest happens in the terminal.</p>\
        </body></html>";
    stream.write_all(page.as_bytes())?;
    stream.flush()?;

    Ok((code, state))
}
