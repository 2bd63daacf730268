use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use cagestats_storage::{HttpClientConfig, DEFAULT_DATABASE_URL, DEFAULT_USER_AGENT};
use serde::Serialize;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: String,
    pub base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            base_url: "http://ufcstats.com".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 20,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            base_url: std::env::var("CAGESTATS_BASE_URL").unwrap_or(defaults.base_url),
            user_agent: std::env::var("CAGESTATS_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("CAGESTATS_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            batch_size: std::env::var("CAGESTATS_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.batch_size),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Which traversal a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Every fighter under every index letter, then the upcoming snapshot.
    Full,
    /// Events newer than the latest stored one, then the upcoming snapshot.
    Update,
    /// Upcoming events and matchups only.
    Upcoming,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Full => "full",
            RunMode::Update => "update",
            RunMode::Upcoming => "upcoming",
        })
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(RunMode::Full),
            "update" => Ok(RunMode::Update),
            "upcoming" => Ok(RunMode::Upcoming),
            other => Err(format!("unknown run mode `{other}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_round_trips_through_its_name() {
        for mode in [RunMode::Full, RunMode::Update, RunMode::Upcoming] {
            assert_eq!(mode.to_string().parse::<RunMode>().unwrap(), mode);
        }
        assert!("weekly".parse::<RunMode>().is_err());
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.http_timeout_secs, 20);
        assert_eq!(config.base_url, "http://ufcstats.com");
        assert_eq!(config.http_client_config().timeout, Duration::from_secs(20));
    }
}
