use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::registry::{validate_dormitory_id, Dormitory};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub dormitories: Vec<Dormitory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}

fn default_api_port() -> u16 {
    3001
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_portal_base_url")]
    pub base_url: String,
    #[serde(default = "default_portal_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl PortalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_portal_base_url(),
            timeout_secs: default_portal_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_portal_base_url() -> String {
    "https://wpp.nnnu.edu.cn".into()
}

fn default_portal_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Maximum number of snapshots kept per dormitory.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            retention: default_retention(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_retention() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// IANA timezone used for the schedule and for snapshot date/time labels.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Times of day ("HH:MM") at which a full collection run fires.
    #[serde(default = "default_schedule")]
    pub schedule: Vec<String>,
    /// Delay between two dormitories within one run.
    #[serde(default = "default_pacing_secs")]
    pub pacing_secs: u64,
    #[serde(default = "default_collect_on_startup")]
    pub collect_on_startup: bool,
    /// Balance under which a dormitory counts as running low in the stats.
    #[serde(default = "default_low_balance_threshold")]
    pub low_balance_threshold: f64,
}

impl CollectorConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| AppError::Config(format!("invalid timezone '{}': {}", self.timezone, e)))
    }

    pub fn times_of_day(&self) -> Result<Vec<NaiveTime>> {
        self.schedule
            .iter()
            .map(|s| {
                NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| {
                    AppError::Config(format!("invalid schedule time '{}': {}", s, e))
                })
            })
            .collect()
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.pacing_secs)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            schedule: default_schedule(),
            pacing_secs: default_pacing_secs(),
            collect_on_startup: default_collect_on_startup(),
            low_balance_threshold: default_low_balance_threshold(),
        }
    }
}

fn default_timezone() -> String {
    "Asia/Shanghai".into()
}

fn default_schedule() -> Vec<String> {
    vec!["06:00".into(), "12:00".into(), "18:00".into()]
}

fn default_pacing_secs() -> u64 {
    5
}

fn default_collect_on_startup() -> bool {
    true
}

fn default_low_balance_threshold() -> f64 {
    20.0
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let expanded = expand_env_placeholders(raw)?;
        let mut cfg: Self = serde_yaml::from_str(&expanded)?;

        // Optional: allow DATA_DIR env to override whatever YAML had
        if let Ok(dir) = std::env::var("DATA_DIR") {
            cfg.storage.data_dir = PathBuf::from(dir);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.api.port == 0 {
            return Err(AppError::Config("api.port cannot be 0".to_string()));
        }

        if self.storage.retention == 0 {
            return Err(AppError::Config(
                "storage.retention must be at least 1".to_string(),
            ));
        }

        self.collector.tz()?;
        self.collector.times_of_day()?;

        let mut seen = HashSet::new();
        for dorm in &self.dormitories {
            validate_dormitory_id(&dorm.id).map_err(|e| AppError::Config(e.to_string()))?;
            if !seen.insert(dorm.id.as_str()) {
                return Err(AppError::Config(format!(
                    "dormitory '{}' is configured twice",
                    dorm.id
                )));
            }
        }

        Ok(())
    }
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
fn expand_env_placeholders(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let close = match it.peek().copied() {
            Some('$') => {
                // "$$" -> "$"
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };

        it.next();
        let var = read_until(&mut it, close).ok_or_else(|| {
            AppError::Config(format!("unterminated env placeholder: missing '{}'", close))
        })?;
        let val = std::env::var(&var)
            .map_err(|_| AppError::Config(format!("missing environment variable: {}", var)))?;
        out.push_str(&val);
    }

    Ok(out)
}

fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}
