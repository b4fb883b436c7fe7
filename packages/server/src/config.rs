use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub gemini_api_key: String,
    pub gemini_model: Option<String>,
    pub azure_openai: Option<AzureOpenAiConfig>,
    pub scheduler: SchedulerSettings,
}

/// Optional Azure OpenAI fallback for content generation.
#[derive(Debug, Clone)]
pub struct AzureOpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let azure_openai = match (
            env::var("AZURE_OPENAI_ENDPOINT"),
            env::var("AZURE_OPENAI_API_KEY"),
            env::var("AZURE_OPENAI_DEPLOYMENT"),
        ) {
            (Ok(endpoint), Ok(api_key), Ok(deployment)) => Some(AzureOpenAiConfig {
                endpoint,
                api_key,
                deployment,
            }),
            _ => None,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            google_client_id: env::var("GOOGLE_CLIENT_ID")
                .context("GOOGLE_CLIENT_ID must be set")?,
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET")
                .context("GOOGLE_CLIENT_SECRET must be set")?,
            gemini_api_key: env::var("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?,
            gemini_model: env::var("GEMINI_MODEL").ok().filter(|m| !m.is_empty()),
            azure_openai,
            scheduler: SchedulerSettings::from_env()?,
        })
    }
}

/// Timing knobs for the scheduler, leader election and external calls.
///
/// Defaults match production; every field can be overridden from the
/// environment (see [`SchedulerSettings::from_env`]).
#[derive(Debug, Clone, TypedBuilder)]
pub struct SchedulerSettings {
    /// Leader heartbeat period. The leadership timeout is three of these.
    #[builder(default = Duration::from_secs(30))]
    pub heartbeat_interval: Duration,
    #[builder(default = Duration::from_secs(60))]
    pub reconcile_interval: Duration,
    #[builder(default = Duration::from_secs(5 * 60))]
    pub settings_reload_interval: Duration,
    #[builder(default = Duration::from_secs(2 * 60))]
    pub review_poll_interval: Duration,
    /// Window during which a second claim on the same action is rejected.
    #[builder(default = Duration::from_secs(60))]
    pub dedupe_window: Duration,
    /// Credentials expiring within this buffer are refreshed before use.
    #[builder(default = Duration::from_secs(30 * 60))]
    pub token_refresh_buffer: Duration,
    #[builder(default = Duration::from_secs(10))]
    pub external_call_timeout: Duration,
    /// Deadline for every persistent-store call, also applied as the
    /// Postgres statement timeout.
    #[builder(default = Duration::from_secs(10))]
    pub store_timeout: Duration,
    /// Pause between consecutive review replies for one location.
    #[builder(default = Duration::from_millis(1500))]
    pub reply_delay: Duration,
    #[builder(default = 10)]
    pub max_replies_per_cycle: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SchedulerSettings {
    pub fn leader_timeout(&self) -> Duration {
        self.heartbeat_interval * 3
    }

    /// Defaults overridden by any of the scheduler env vars that are set.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            heartbeat_interval: env_secs("LEADER_HEARTBEAT_SECS")?
                .unwrap_or(defaults.heartbeat_interval),
            reconcile_interval: env_secs("RECONCILE_INTERVAL_SECS")?
                .unwrap_or(defaults.reconcile_interval),
            settings_reload_interval: env_secs("SETTINGS_RELOAD_SECS")?
                .unwrap_or(defaults.settings_reload_interval),
            review_poll_interval: env_secs("REVIEW_POLL_SECS")?
                .unwrap_or(defaults.review_poll_interval),
            dedupe_window: env_secs("DEDUPE_WINDOW_SECS")?.unwrap_or(defaults.dedupe_window),
            token_refresh_buffer: env_parse::<u64>("TOKEN_REFRESH_BUFFER_MINS")?
                .map(|mins| Duration::from_secs(mins * 60))
                .unwrap_or(defaults.token_refresh_buffer),
            external_call_timeout: env_secs("EXTERNAL_CALL_TIMEOUT_SECS")?
                .unwrap_or(defaults.external_call_timeout),
            store_timeout: env_secs("STORE_TIMEOUT_SECS")?.unwrap_or(defaults.store_timeout),
            reply_delay: env_parse::<u64>("REPLY_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.reply_delay),
            max_replies_per_cycle: defaults.max_replies_per_cycle,
        })
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be a valid number")),
        _ => Ok(None),
    }
}

fn env_secs(key: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_secs))
}
