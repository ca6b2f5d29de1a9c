// src/config.rs

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use url::Url;

use crate::error::ConfigError;

/// Timing and policy knobs for one exam session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Countdown tick period.
    pub tick_interval: Duration,
    /// Remote autosave period.
    pub autosave_interval: Duration,
    /// Inactivity span after which the candidate is reported idle.
    pub idle_timeout: Duration,
    /// Delay before a failed timeout submission is attempted again.
    pub timeout_retry_delay: Duration,
    pub max_timeout_retries: u32,
    /// Remaining-seconds thresholds that each raise one low-time notice.
    pub low_time_warnings: Vec<u64>,
    pub require_fullscreen: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            autosave_interval: Duration::from_millis(30_000),
            idle_timeout: Duration::from_secs(60),
            timeout_retry_delay: Duration::from_secs(5),
            max_timeout_retries: 3,
            low_time_warnings: vec![300, 60],
            require_fullscreen: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: Url,
    pub api_token: Option<String>,
    pub snapshot_dir: PathBuf,
    pub log_dir: PathBuf,
    pub rust_log: String,
    pub http_timeout: Duration,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let raw_url = env::var("EXAM_API_URL").map_err(|_| ConfigError::Missing("EXAM_API_URL"))?;
        let api_url = Url::parse(&raw_url).map_err(|_| ConfigError::Invalid {
            key: "EXAM_API_URL",
            value: raw_url.clone(),
        })?;

        let api_token = env::var("EXAM_API_TOKEN").ok().filter(|t| !t.is_empty());

        let snapshot_dir = env::var("EXAM_SNAPSHOT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".exam_snapshots"));

        let log_dir = env::var("EXAM_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"));

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            tick_interval: Duration::from_millis(parse_var("EXAM_TICK_INTERVAL_MS", 1000)?),
            autosave_interval: Duration::from_millis(parse_var(
                "EXAM_AUTOSAVE_INTERVAL_MS",
                30_000,
            )?),
            idle_timeout: Duration::from_secs(parse_var("EXAM_IDLE_TIMEOUT_SECS", 60)?),
            timeout_retry_delay: Duration::from_millis(parse_var(
                "EXAM_TIMEOUT_RETRY_DELAY_MS",
                5000,
            )?),
            max_timeout_retries: parse_var("EXAM_TIMEOUT_MAX_RETRIES", defaults.max_timeout_retries)?,
            low_time_warnings: match env::var("EXAM_LOW_TIME_WARNINGS") {
                Ok(raw) => parse_thresholds(&raw)?,
                Err(_) => defaults.low_time_warnings,
            },
            require_fullscreen: parse_var("EXAM_REQUIRE_FULLSCREEN", defaults.require_fullscreen)?,
        };

        if session.tick_interval.is_zero() || session.autosave_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "EXAM_TICK_INTERVAL_MS/EXAM_AUTOSAVE_INTERVAL_MS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            api_url,
            api_token,
            snapshot_dir,
            log_dir,
            rust_log,
            http_timeout: Duration::from_secs(parse_var("EXAM_HTTP_TIMEOUT_SECS", 15)?),
            session,
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

fn parse_thresholds(raw: &str) -> Result<Vec<u64>, ConfigError> {
    let mut thresholds = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>().map_err(|_| ConfigError::Invalid {
                key: "EXAM_LOW_TIME_WARNINGS",
                value: raw.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    thresholds.sort_unstable_by(|a, b| b.cmp(a));
    thresholds.dedup();
    Ok(thresholds)
}
