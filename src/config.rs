use std::path::PathBuf;

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::Parser;

use crate::error::ConfigError;
use crate::navigator::FormInput;
use crate::types::{DEFAULT_MIN_DATE, DEFAULT_START_URL, DEFAULT_TIMEZONE, parse_date};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "cita-watch")]
#[command(about = "Check the appointment portal for a free slot and notify the operator")]
pub struct Cli {
    /// Run even outside the 08:00-18:00 window
    #[arg(long)]
    pub force: bool,

    /// Print the notification instead of sending it to Telegram
    #[arg(long)]
    pub dry_run: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

/// Everything a run needs, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub form: FormInput,
    pub min_date: NaiveDate,
    pub start_url: String,
    pub timezone: Tz,
    /// Set when checkpoint screenshots are wanted.
    pub artifacts_dir: Option<PathBuf>,
    pub chrome_path: Option<PathBuf>,
    /// `None` only when Telegram was not required.
    pub telegram: Option<TelegramConfig>,
}

impl Config {
    pub fn from_env(require_telegram: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), require_telegram)
    }

    /// Build from any key lookup; blank values count as missing.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        require_telegram: bool,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let form = FormInput {
            province: required("PROVINCIA_LABEL")?,
            office: required("OFICINA_MATCH")?,
            procedure: required("TRAMITE_MATCH")?,
            nie: required("NIE")?,
            full_name: required("FULL_NAME")?,
            phone: required("PHONE")?,
            email: required("EMAIL")?,
        };

        let raw_min_date = get("MIN_DATE").unwrap_or_else(|| DEFAULT_MIN_DATE.to_string());
        let min_date = parse_date(&raw_min_date).map_err(|e| ConfigError::Invalid {
            var: "MIN_DATE",
            value: raw_min_date.clone(),
            reason: e.to_string(),
        })?;

        let raw_tz = get("CHECK_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = raw_tz.parse().map_err(|e| ConfigError::Invalid {
            var: "CHECK_TIMEZONE",
            value: raw_tz.clone(),
            reason: format!("{}", e),
        })?;

        let artifacts_dir = match get("DEBUG_ARTIFACTS").as_deref() {
            Some("1") => Some(
                get("ARTIFACTS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
            ),
            _ => None,
        };

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(token), Some(chat_id)) => Some(TelegramConfig { token, chat_id }),
            (None, _) if require_telegram => return Err(ConfigError::Missing("TELEGRAM_BOT_TOKEN")),
            (_, None) if require_telegram => return Err(ConfigError::Missing("TELEGRAM_CHAT_ID")),
            _ => None,
        };

        Ok(Self {
            form,
            min_date,
            start_url: get("START_URL").unwrap_or_else(|| DEFAULT_START_URL.to_string()),
            timezone,
            artifacts_dir,
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
            telegram,
        })
    }
}
