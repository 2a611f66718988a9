//! ENT portal collaborator: CAS login and timetable export download.
//!
//! The portal publishes the schedule as an iCal export behind a CAS
//! single-sign-on. This module logs in, downloads the export, and hands
//! the engine raw records; all interpretation (timezones, identity)
//! happens in the normalizer.

use anyhow::{Context, Result};
use entsync_core::RawRecord;
use icalendar::parser::{read_calendar, unfold};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::config::EntConfig;

/// Log into the portal and fetch the current schedule as raw records.
pub async fn fetch_schedule(config: &EntConfig) -> Result<Vec<RawRecord>> {
    let client = reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .context("Failed to build HTTP client")?;

    login(&client, config).await?;

    info!(url = %config.ics_url, "downloading timetable export");
    let ics = client
        .get(&config.ics_url)
        .send()
        .await
        .context("Failed to download the ICS export")?
        .error_for_status()
        .context("ICS export request was refused")?
        .text()
        .await
        .context("Failed to read the ICS export body")?;

    let records = parse_ics_records(&ics)?;
    info!(count = records.len(), "extracted schedule records");

    Ok(records)
}

/// Run the CAS form login: fetch the login page, lift the hidden
/// `execution` token, post the credentials.
async fn login(client: &reqwest::Client, config: &EntConfig) -> Result<()> {
    info!("logging into the ENT");

    let login_page = client
        .get(&config.login_url)
        .send()
        .await
        .context("Failed to reach the CAS login page")?
        .error_for_status()
        .context("CAS login page request was refused")?
        .text()
        .await
        .context("Failed to read the CAS login page")?;

    let execution = extract_execution_token(&login_page)
        .context("No execution token on the CAS login page; has the portal changed?")?;
    debug!("found CAS execution token");

    let response = client
        .post(&config.login_url)
        .form(&[
            ("username", config.username.as_str()),
            ("password", config.password.as_str()),
            ("execution", execution.as_str()),
            ("_eventId", "submit"),
        ])
        .send()
        .await
        .context("Failed to submit CAS credentials")?
        .error_for_status()
        .context("CAS rejected the login request")?;

    // CAS re-renders the login form (with a fresh execution token) when
    // the credentials are wrong; a successful login redirects away.
    let body = response.text().await.context("Failed to read CAS response")?;
    if extract_execution_token(&body).is_some() {
        anyhow::bail!("ENT login failed: check username/password in config.toml");
    }

    info!("ENT session established");
    Ok(())
}

// Attribute order varies between CAS versions
static EXECUTION_NAME_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name="execution"\s+value="([^"]+)""#).expect("valid regex"));
static EXECUTION_VALUE_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"value="([^"]+)"\s+name="execution""#).expect("valid regex"));

fn extract_execution_token(page: &str) -> Option<String> {
    for re in [&EXECUTION_NAME_FIRST, &EXECUTION_VALUE_FIRST] {
        if let Some(captures) = re.captures(page) {
            return Some(captures[1].to_string());
        }
    }
    None
}

/// Extract raw records from the ICS export.
///
/// Values are passed through as published; the normalizer owns parsing
/// and validation, so a broken VEVENT still reaches it (and gets counted)
/// instead of disappearing here.
pub fn parse_ics_records(content: &str) -> Result<Vec<RawRecord>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|err| anyhow::anyhow!("Failed to parse the ICS export: {}", err))?;

    let records = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .map(|vevent| {
            let prop = |name: &str| vevent.find_prop(name).map(|p| p.val.to_string());
            RawRecord {
                title: prop("SUMMARY"),
                start: prop("DTSTART"),
                end: prop("DTEND"),
                location: prop("LOCATION"),
                description: prop("DESCRIPTION"),
            }
        })
        .collect();

    Ok(records)
}
