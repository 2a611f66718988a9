use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Name of the Google Calendar the schedule lands in.
    #[serde(default = "default_calendar_name")]
    pub calendar_name: String,

    /// Timezone naive portal timestamps are interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// How many days past now the snapshot read always covers.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: i64,

    /// ENT portal access (CAS login + ICS export)
    pub ent: EntConfig,

    /// Provider configurations (OAuth credentials)
    #[serde(default)]
    pub providers: Providers,
}

#[derive(Debug, Default, Deserialize)]
pub struct Providers {
    pub gcal: Option<GcalConfig>,
}

/// OAuth credentials for Google Calendar
#[derive(Debug, Deserialize)]
pub struct GcalConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// ENT portal endpoints and credentials
#[derive(Debug, Deserialize)]
pub struct EntConfig {
    /// CAS login page (with the service redirect in the query string)
    pub login_url: String,
    /// iCal export endpoint of the timetable client
    pub ics_url: String,
    pub username: String,
    pub password: String,
}

fn default_calendar_name() -> String {
    "Cours".to_string()
}

fn default_timezone() -> String {
    "Europe/Paris".to_string()
}

fn default_horizon_days() -> i64 {
    60
}

impl Config {
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown timezone in config: {}", self.timezone))
    }

    pub fn gcal(&self) -> Result<&GcalConfig> {
        self.providers.gcal.as_ref().context(
            "No Google credentials in config.toml.\n\n\
            Add them under [providers.gcal] and run `entsync auth` again.",
        )
    }
}

/// Tokens for the authenticated Google account
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Tokens {
    pub gcal: Option<AccountTokens>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Get the config directory path (~/.config/entsync)
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("entsync");
    Ok(config_dir)
}

/// Get the config file path (~/.config/entsync/config.toml)
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the tokens file path (~/.config/entsync/tokens.json)
pub fn tokens_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("tokens.json"))
}

/// Load config from ~/.config/entsync/config.toml
pub fn load_config() -> Result<Config> {
    let path = config_path()?;

    if !path.exists() {
        anyhow::bail!(
            "Config file not found at {}\n\n\
            Create it with your ENT and Google credentials:\n\n\
            [ent]\n\
            login_url = \"https://cas.example.fr/cas/login?service=...\"\n\
            ics_url = \"https://edt.example.fr/export\"\n\
            username = \"jdoe\"\n\
            password = \"...\"\n\n\
            [providers.gcal]\n\
            client_id = \"your-client-id.apps.googleusercontent.com\"\n\
            client_secret = \"your-client-secret\"",
            path.display()
        );
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

    Ok(config)
}

/// Load tokens from ~/.config/entsync/tokens.json
pub fn load_tokens() -> Result<Tokens> {
    let path = tokens_path()?;

    if !path.exists() {
        return Ok(Tokens::default());
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read tokens file at {}", path.display()))?;

    let tokens: Tokens = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse tokens file at {}", path.display()))?;

    Ok(tokens)
}

/// Save tokens to ~/.config/entsync/tokens.json
pub fn save_tokens(tokens: &Tokens) -> Result<()> {
    let path = tokens_path()?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create config directory at {}", parent.display())
        })?;
    }

    let contents = serde_json::to_string_pretty(tokens).context("Failed to serialize tokens")?;

    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write tokens file at {}", path.display()))?;

    Ok(())
}
