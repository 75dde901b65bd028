use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_NEWS_API_BASE_URL: &str = "https://api.thenewsapi.com";
const DEFAULT_SMS_API_BASE_URL: &str = "https://api.twilio.com";

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub sentry_dsn: Option<String>,
    pub environment: String,
    pub data_dir: PathBuf,
    pub news_config: Option<PathBuf>,
    pub fetch_timeout: Duration,
    pub news_api: NewsApiConfig,
    pub sms: Option<SmsConfig>,
}

#[derive(Debug, Clone)]
pub struct NewsApiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_key: String,
    pub account_sid: String,
    pub from_number: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a Config from a key lookup (as values would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let port = get("PORT").and_then(|v| v.parse().ok()).unwrap_or(8081);

        let environment = get("ENVIRONMENT").unwrap_or_else(|| "local".to_string());

        let data_dir = get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".news-alerts")
        });

        let fetch_timeout = get("FETCH_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let news_api = NewsApiConfig {
            api_key: get("NEWS_API_KEY"),
            base_url: get("NEWS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_NEWS_API_BASE_URL.to_string()),
        };

        // SMS delivery needs the whole credential set; anything less falls
        // back to the logging notifier.
        let sms = match (get("SMS_API_KEY"), get("SMS_ACCOUNT_SID"), get("SMS_FROM_NUMBER")) {
            (Some(api_key), Some(account_sid), Some(from_number)) => Some(SmsConfig {
                api_key,
                account_sid,
                from_number,
                base_url: get("SMS_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_SMS_API_BASE_URL.to_string()),
            }),
            _ => None,
        };

        Config {
            port,
            sentry_dsn: get("SENTRY_DSN"),
            environment,
            data_dir,
            news_config: get("NEWS_CONFIG").map(PathBuf::from),
            fetch_timeout,
            news_api,
            sms,
        }
    }

    /// Load news settings from `NEWS_CONFIG` when set, built-in defaults otherwise.
    pub fn news_settings(&self) -> Result<NewsSettings> {
        match &self.news_config {
            Some(path) => NewsSettings::load(path),
            None => Ok(NewsSettings::default()),
        }
    }
}

/// Feed list, category taxonomy and daily anchor hour.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsSettings {
    #[serde(default = "default_feeds")]
    pub feeds: Vec<String>,
    #[serde(default = "default_categories")]
    pub categories: HashMap<String, String>,
    #[serde(default = "default_category")]
    pub default_category: String,
    #[serde(default = "default_daily_hour")]
    pub daily_hour: u32,
}

impl Default for NewsSettings {
    fn default() -> Self {
        Self {
            feeds: default_feeds(),
            categories: default_categories(),
            default_category: default_category(),
            daily_hour: default_daily_hour(),
        }
    }
}

impl NewsSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read news settings: {}", path.display()))?;
        let settings: NewsSettings = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse news settings: {}", path.display()))?;
        if settings.daily_hour > 23 {
            anyhow::bail!("daily_hour must be between 0 and 23, got {}", settings.daily_hour);
        }
        Ok(settings)
    }
}

fn default_feeds() -> Vec<String> {
    [
        "https://techcrunch.com/feed/",
        "https://feeds.reuters.com/reuters/technologyNews",
        "https://hnrss.org/frontpage",
        "https://feeds.bloomberg.com/markets/news.rss",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_categories() -> HashMap<String, String> {
    [
        ("technology", "tech"),
        ("tech", "tech"),
        ("business", "business"),
        ("sports", "sports"),
        ("health", "health"),
        ("science", "science"),
        ("stocks", "business"),
        ("finance", "business"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_category() -> String {
    "general".to_string()
}

fn default_daily_hour() -> u32 {
    9
}
