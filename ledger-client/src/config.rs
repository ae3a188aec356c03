use std::time::Duration;

const API_PREFIX: &str = "/api/v1";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} is not a number of seconds: {value:?}")]
    InvalidSeconds { name: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Scheme and host of the ledger service, e.g. `https://ledger.example.com`.
    pub origin: String,
    pub request_timeout: Duration,
    /// `None` keeps entries fresh until something invalidates them.
    pub stale_after: Option<Duration>,
}

impl ClientConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stale_after: None,
        }
    }

    /// Reads `LEDGER_API_URL`, `LEDGER_REQUEST_TIMEOUT_SECS` and
    /// `LEDGER_STALE_AFTER_SECS`, loading a `.env` file first if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            log::debug!("No .env file loaded: {e}");
        }

        let origin =
            std::env::var("LEDGER_API_URL").map_err(|_| ConfigError::Missing("LEDGER_API_URL"))?;

        let mut config = Self::new(origin);
        if let Some(timeout) = seconds_from_env("LEDGER_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = timeout;
        }
        config.stale_after = seconds_from_env("LEDGER_STALE_AFTER_SECS")?;
        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Option<Duration>) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// `<origin>/api/v1`
    pub fn api_base(&self) -> String {
        format!("{}{API_PREFIX}", self.origin.trim_end_matches('/'))
    }
}

fn seconds_from_env(name: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|_| ConfigError::InvalidSeconds { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_trims_trailing_slash() {
        assert_eq!(
            ClientConfig::new("https://ledger.example.com/").api_base(),
            "https://ledger.example.com/api/v1"
        );
        assert_eq!(
            ClientConfig::new("http://localhost:8000").api_base(),
            "http://localhost:8000/api/v1"
        );
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.stale_after, None);
    }
}
