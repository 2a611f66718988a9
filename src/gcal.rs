//! Google Calendar collaborator.
//!
//! REST client over the Calendar v3 API implementing the engine's
//! `CalendarStore`. Every entry the engine creates carries two private
//! extended properties: a constant managed marker (used as the server-side
//! list filter, so foreign events never even cross the wire) and the sync
//! key itself.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use entsync_core::{CalendarEntry, CalendarStore, CanonicalEvent, SnapshotWindow, StoreError, SyncKey};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{self, AccountTokens, Config, GcalConfig};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Marker property present on every entry this engine owns.
const MANAGED_PROP: &str = "entsyncManaged";
const MANAGED_VALUE: &str = "1";
/// Property holding the sync key.
const KEY_PROP: &str = "entsyncKey";

pub struct GcalStore {
    client: reqwest::Client,
    api_base: String,
    access_token: String,
    calendar_id: String,
}

// ---------------------------------------------------------------------------
// Wire types (only the fields the engine reads)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<GcalEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GcalEvent {
    id: String,
    summary: String,
    location: Option<String>,
    status: String,
    start: Option<GcalTime>,
    end: Option<GcalTime>,
    extended_properties: Option<ExtendedProperties>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GcalTime {
    date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtendedProperties {
    private: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarList {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarListEntry {
    id: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

// ---------------------------------------------------------------------------
// Connection and calendar bootstrap
// ---------------------------------------------------------------------------

impl GcalStore {
    /// Build a store from saved tokens, refreshing the access token when
    /// needed and resolving (or creating) the target calendar by name.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let creds = cfg.gcal()?;

        let mut tokens = config::load_tokens()?;
        let account = tokens
            .gcal
            .take()
            .context("Not authenticated with Google yet. Run `entsync auth` first.")?;

        let client = reqwest::Client::new();
        let account = ensure_fresh(&client, creds, account).await?;

        // Persist the refreshed token for the next run
        config::save_tokens(&config::Tokens {
            gcal: Some(account.clone()),
        })?;

        let mut store = GcalStore {
            client,
            api_base: API_BASE.to_string(),
            access_token: account.access_token,
            calendar_id: String::new(),
        };
        store.calendar_id = store.ensure_calendar(&cfg.calendar_name, &cfg.timezone).await?;

        Ok(store)
    }

    /// Find the calendar named `name`, creating it when absent.
    async fn ensure_calendar(&self, name: &str, timezone: &str) -> Result<String> {
        let mut page_token: Option<String> = None;

        loop {
            let mut url = Url::parse(&format!("{}/users/me/calendarList", self.api_base))?;
            if let Some(ref token) = page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let list: CalendarList = self
                .client
                .get(url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .context("Failed to list calendars")?
                .error_for_status()
                .context("Calendar list request was refused")?
                .json()
                .await
                .context("Failed to parse calendar list")?;

            if let Some(found) = list.items.into_iter().find(|c| c.summary == name) {
                debug!(calendar_id = %found.id, "found existing calendar");
                return Ok(found.id);
            }

            match list.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(name, "calendar not found, creating it");
        let created: CreatedResource = self
            .client
            .post(format!("{}/calendars", self.api_base))
            .bearer_auth(&self.access_token)
            .json(&json!({ "summary": name, "timeZone": timezone }))
            .send()
            .await
            .context("Failed to create calendar")?
            .error_for_status()
            .context("Calendar creation was refused")?
            .json()
            .await
            .context("Failed to parse created calendar")?;

        Ok(created.id)
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{}/events", self.api_base, urlencode(&self.calendar_id))
    }

    fn event_body(event: &CanonicalEvent, with_tag: bool) -> serde_json::Value {
        let mut body = json!({
            "summary": event.title,
            "location": event.location,
            "description": event.description,
            "colorId": color_id(&event.title),
            "start": { "dateTime": rfc3339(event.start), "timeZone": "UTC" },
            "end": { "dateTime": rfc3339(event.end), "timeZone": "UTC" },
        });
        if with_tag {
            body["extendedProperties"] = json!({
                "private": {
                    MANAGED_PROP: MANAGED_VALUE,
                    KEY_PROP: event.key.as_str(),
                }
            });
        }
        body
    }
}

/// Calendar color per session kind, keyed on the title prefix the ENT
/// uses (CM lecture, TD/TP practicals, DS exams).
fn color_id(title: &str) -> &'static str {
    match title.get(..2) {
        Some("CM") => "6", // blue
        Some("TP") => "2", // green
        Some("TD") => "5", // violet
        Some("DS") => "9", // orange
        _ => "1",
    }
}

fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn urlencode(s: &str) -> String {
    // Calendar ids contain '@' and '#'
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Refresh the access token when it is about to expire.
async fn ensure_fresh(
    client: &reqwest::Client,
    creds: &GcalConfig,
    tokens: AccountTokens,
) -> Result<AccountTokens> {
    let still_valid = tokens
        .expires_at
        .map(|at| at > Utc::now() + Duration::seconds(60))
        .unwrap_or(false);
    if still_valid {
        return Ok(tokens);
    }

    info!("refreshing Google access token");

    #[derive(Deserialize)]
    struct TokenResponse {
        access_token: String,
        expires_in: i64,
    }

    let response: TokenResponse = client
        .post(TOKEN_URL)
        .form(&[
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("refresh_token", tokens.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .context("Failed to reach the token endpoint")?
        .error_for_status()
        .context("Token refresh was refused; run `entsync auth` again")?
        .json()
        .await
        .context("Failed to parse token response")?;

    Ok(AccountTokens {
        access_token: response.access_token,
        refresh_token: tokens.refresh_token,
        expires_at: Some(Utc::now() + Duration::seconds(response.expires_in)),
    })
}

// ---------------------------------------------------------------------------
// Error mapping for the store trait
// ---------------------------------------------------------------------------

/// Transport-level failure: worth retrying when it looks like a hiccup.
fn transport_error(context: &str, err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() {
        StoreError::Transient(format!("{}: {}", context, err))
    } else {
        StoreError::Rejected(format!("{}: {}", context, err))
    }
}

/// HTTP-level failure: rate limits and server errors are transient.
fn status_error(context: &str, status: StatusCode, body: String) -> StoreError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StoreError::Transient(format!("{}: HTTP {} - {}", context, status, body))
    } else {
        StoreError::Rejected(format!("{}: HTTP {} - {}", context, status, body))
    }
}

async fn check_status(
    context: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "(unreadable body)".to_string());
    Err(status_error(context, status, body))
}

#[async_trait]
impl CalendarStore for GcalStore {
    async fn list_tagged(&self, window: SnapshotWindow) -> Result<Vec<CalendarEntry>, StoreError> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = Url::parse(&self.events_url())
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            url.query_pairs_mut()
                .append_pair("timeMin", &rfc3339(window.from))
                .append_pair("timeMax", &rfc3339(window.to))
                .append_pair("singleEvents", "true")
                .append_pair("maxResults", "250")
                .append_pair(
                    "privateExtendedProperty",
                    &format!("{}={}", MANAGED_PROP, MANAGED_VALUE),
                );
            if let Some(ref token) = page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            // Any read failure aborts the run: a partial snapshot must
            // never masquerade as an empty calendar.
            let response = self
                .client
                .get(url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| StoreError::Unavailable(format!("list events: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "(unreadable body)".to_string());
                return Err(StoreError::Unavailable(format!(
                    "list events: HTTP {} - {}",
                    status, body
                )));
            }

            let page: EventList = response
                .json()
                .await
                .map_err(|e| StoreError::Unavailable(format!("list events: {}", e)))?;

            for event in page.items {
                if let Some(entry) = to_entry(event) {
                    entries.push(entry);
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = entries.len(), "snapshot read complete");
        Ok(entries)
    }

    async fn create(&self, event: &CanonicalEvent) -> Result<String, StoreError> {
        let response = self
            .client
            .post(self.events_url())
            .bearer_auth(&self.access_token)
            .json(&GcalStore::event_body(event, true))
            .send()
            .await
            .map_err(|e| transport_error("create event", e))?;

        let created: CreatedResource = check_status("create event", response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Rejected(format!("create event: {}", e)))?;

        Ok(created.id)
    }

    async fn update(&self, event_id: &str, event: &CanonicalEvent) -> Result<(), StoreError> {
        // PATCH rewrites only the display fields; the extended properties
        // (and with them the sync key tag) stay untouched.
        let url = format!("{}/{}", self.events_url(), urlencode(event_id));
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.access_token)
            .json(&GcalStore::event_body(event, false))
            .send()
            .await
            .map_err(|e| transport_error("update event", e))?;

        check_status("update event", response).await?;
        Ok(())
    }

    async fn delete(&self, event_id: &str) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.events_url(), urlencode(event_id));
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| transport_error("delete event", e))?;

        // Already gone is as good as deleted
        if response.status() == StatusCode::GONE || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        check_status("delete event", response).await?;
        Ok(())
    }
}

/// Convert a wire event into a `CalendarEntry`, dropping anything that
/// does not carry the engine's key tag.
fn to_entry(event: GcalEvent) -> Option<CalendarEntry> {
    if event.status == "cancelled" || event.id.is_empty() {
        return None;
    }

    // Second guard behind the server-side filter: no key tag, no entry.
    let key = event
        .extended_properties
        .as_ref()
        .and_then(|p| p.private.get(KEY_PROP))
        .map(|tag| SyncKey::from_tag(tag))?;

    let start = event.start.as_ref().and_then(|t| t.date_time);
    let end = event.end.as_ref().and_then(|t| t.date_time);
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            // All-day or malformed timing on a tagged entry; skip it
            // rather than guess at times the engine never writes.
            warn!(id = %event.id, "tagged entry without concrete times, skipping");
            return None;
        }
    };

    Some(CalendarEntry {
        id: event.id,
        key,
        title: event.summary,
        start,
        end,
        location: event.location.filter(|l| !l.is_empty()),
    })
}
