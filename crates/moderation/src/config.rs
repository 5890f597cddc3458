//! Engine configuration loaded from environment variables.

use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use trailpost_events::RetryPolicy;
use trailpost_remote::ClientConfig;

/// Accepted notification retention, in days.
pub const RETENTION_DAYS: RangeInclusive<i64> = 1..=3650;

/// A configuration value could not be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Session configuration.
///
/// All fields have defaults suitable for local development; override via
/// environment variables.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    /// Remote store base URL, including the API prefix.
    pub api_url: String,
    /// Bearer token; `None` runs the session as a guest.
    pub api_token: Option<String>,
    /// Local profile store.
    pub database_url: String,
    pub request_timeout: Duration,
    /// Timeout used instead of `request_timeout` on constrained networks.
    pub constrained_timeout: Duration,
    pub constrained_network: bool,
    /// AI analysis service; `None` selects the local heuristic classifier.
    pub triage_url: Option<String>,
    /// Entries older than this are evicted before a moderation surface opens.
    pub stale_after: Duration,
    pub notification_retention_days: i64,
    pub notification_poll_interval: Duration,
    pub sweep: RetryPolicy,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".into(),
            api_token: None,
            database_url: "sqlite://trailpost.db".into(),
            request_timeout: Duration::from_secs(15),
            constrained_timeout: Duration::from_secs(45),
            constrained_network: false,
            triage_url: None,
            stale_after: Duration::from_secs(3600),
            notification_retention_days: 60,
            notification_poll_interval: Duration::from_secs(60),
            sweep: RetryPolicy::default(),
        }
    }
}

impl ModerationConfig {
    /// Load configuration from the environment, reading `.env` first.
    ///
    /// | Env Var                                 | Default                     |
    /// |-----------------------------------------|-----------------------------|
    /// | `TRAILPOST_API_URL`                     | `http://localhost:3000/api` |
    /// | `TRAILPOST_API_TOKEN`                   | unset                       |
    /// | `TRAILPOST_DATABASE_URL`                | `sqlite://trailpost.db`     |
    /// | `TRAILPOST_REQUEST_TIMEOUT_SECS`        | `15`                        |
    /// | `TRAILPOST_CONSTRAINED_TIMEOUT_SECS`    | `45`                        |
    /// | `TRAILPOST_CONSTRAINED_NETWORK`         | `false`                     |
    /// | `TRAILPOST_TRIAGE_URL`                  | unset                       |
    /// | `TRAILPOST_STALE_AFTER_SECS`            | `3600`                      |
    /// | `TRAILPOST_NOTIFICATION_RETENTION_DAYS` | `60`                        |
    /// | `TRAILPOST_NOTIFICATION_POLL_SECS`      | `60`                        |
    /// | `TRAILPOST_SWEEP_ATTEMPTS`              | `5`                         |
    /// | `TRAILPOST_SWEEP_INITIAL_MS`            | `500`                       |
    /// | `TRAILPOST_SWEEP_MAX_MS`                | `4500`                      |
    /// | `TRAILPOST_SWEEP_JITTER`                | `true`                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Values that parse but fall outside their usable range are
    /// rejected: zero intervals, thresholds and attempt counts, retention
    /// outside [`RETENTION_DAYS`], and a sweep cap below its first delay.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let initial_ms = parse_positive(
            &lookup,
            "TRAILPOST_SWEEP_INITIAL_MS",
            defaults.sweep.initial_delay.as_millis() as u64,
        )?;
        let max_ms = parse_or(
            &lookup,
            "TRAILPOST_SWEEP_MAX_MS",
            defaults.sweep.max_delay.as_millis() as u64,
        )?;
        if max_ms < initial_ms {
            return Err(ConfigError::Invalid {
                var: "TRAILPOST_SWEEP_MAX_MS",
                value: max_ms.to_string(),
            });
        }
        let sweep = RetryPolicy {
            attempts: parse_positive(&lookup, "TRAILPOST_SWEEP_ATTEMPTS", defaults.sweep.attempts)?,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter: parse_or(&lookup, "TRAILPOST_SWEEP_JITTER", defaults.sweep.jitter)?,
            ..defaults.sweep.clone()
        };

        let retention_days = parse_or(
            &lookup,
            "TRAILPOST_NOTIFICATION_RETENTION_DAYS",
            defaults.notification_retention_days,
        )?;
        if !RETENTION_DAYS.contains(&retention_days) {
            return Err(ConfigError::Invalid {
                var: "TRAILPOST_NOTIFICATION_RETENTION_DAYS",
                value: retention_days.to_string(),
            });
        }

        Ok(Self {
            api_url: text("TRAILPOST_API_URL").unwrap_or(defaults.api_url),
            api_token: text("TRAILPOST_API_TOKEN"),
            database_url: text("TRAILPOST_DATABASE_URL").unwrap_or(defaults.database_url),
            request_timeout: Duration::from_secs(parse_positive(
                &lookup,
                "TRAILPOST_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            constrained_timeout: Duration::from_secs(parse_positive(
                &lookup,
                "TRAILPOST_CONSTRAINED_TIMEOUT_SECS",
                defaults.constrained_timeout.as_secs(),
            )?),
            constrained_network: parse_or(
                &lookup,
                "TRAILPOST_CONSTRAINED_NETWORK",
                defaults.constrained_network,
            )?,
            triage_url: text("TRAILPOST_TRIAGE_URL"),
            stale_after: Duration::from_secs(parse_positive(
                &lookup,
                "TRAILPOST_STALE_AFTER_SECS",
                defaults.stale_after.as_secs(),
            )?),
            notification_retention_days: retention_days,
            notification_poll_interval: Duration::from_secs(parse_positive(
                &lookup,
                "TRAILPOST_NOTIFICATION_POLL_SECS",
                defaults.notification_poll_interval.as_secs(),
            )?),
            sweep,
        })
    }

    /// The transport timeout for the current network conditions.
    pub fn effective_timeout(&self) -> Duration {
        if self.constrained_network {
            self.constrained_timeout
        } else {
            self.request_timeout
        }
    }

    /// Client settings for the remote store.
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(&self.api_url).with_timeout(self.effective_timeout());
        match &self.api_token {
            Some(token) => config.with_token(token),
            None => config,
        }
    }
}

/// Parse a count or duration that must be non-zero.
fn parse_positive<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Default + PartialEq + ToString,
{
    let value = parse_or(lookup, var, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        _ => Ok(default),
    }
}
