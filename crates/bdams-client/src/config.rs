use std::time::Duration;

use bdams_core::config::{ConfigError, optional, parse_or, process_env};

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_PROFILE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL. Env var: `BDAMS_API_URL`.
    pub api_url: String,
    /// Bound on the post-sign-in profile fetch (default 10s).
    /// Env var: `BDAMS_PROFILE_TIMEOUT_MS`.
    pub profile_load_timeout: Duration,
    /// Per-call transport timeout; unset means none. Env var: `BDAMS_HTTP_TIMEOUT_SECS`.
    pub http_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            profile_load_timeout: DEFAULT_PROFILE_TIMEOUT,
            http_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup<L>(lookup: &L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let timeout_ms = parse_or(
            lookup,
            "BDAMS_PROFILE_TIMEOUT_MS",
            DEFAULT_PROFILE_TIMEOUT.as_millis() as u64,
        )?;
        Ok(Self {
            api_url: lookup("BDAMS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_owned()),
            profile_load_timeout: Duration::from_millis(timeout_ms),
            http_timeout: optional::<_, u64>(lookup, "BDAMS_HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs),
        })
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_profile_load_timeout(mut self, timeout: Duration) -> Self {
        self.profile_load_timeout = timeout;
        self
    }
}
