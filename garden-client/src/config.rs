use crate::error::GardenClientError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

const API_URL_VAR: &str = "GARDEN_API_URL";
const CONNECT_TIMEOUT_VAR: &str = "GARDEN_CONNECT_TIMEOUT_SECS";
const REQUEST_TIMEOUT_VAR: &str = "GARDEN_REQUEST_TIMEOUT_SECS";
const DUE_CHECK_VAR: &str = "GARDEN_DUE_CHECK_SECS";
const SESSION_FILE_VAR: &str = "GARDEN_SESSION_FILE";

/// Connection and scheduling settings shared by the library and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    /// `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,
    pub due_check_period: Duration,
    pub session_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: None,
            due_check_period: Duration::from_secs(60),
            session_file: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reads `.env` (if present) and the `GARDEN_*` environment variables.
    pub fn from_env() -> Result<Self, GardenClientError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Some(url) = env_value(API_URL_VAR) {
            config.base_url = url;
        }
        if let Some(secs) = env_secs(CONNECT_TIMEOUT_VAR)? {
            config.connect_timeout = secs;
        }
        config.request_timeout = env_secs(REQUEST_TIMEOUT_VAR)?;
        if let Some(secs) = env_secs(DUE_CHECK_VAR)? {
            config.due_check_period = secs;
        }
        config.session_file = env_value(SESSION_FILE_VAR).map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<(), GardenClientError> {
        let uri: http::Uri = self.base_url.parse()?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(GardenClientError::Validation(format!(
                    "API URL must use http or https: {}",
                    self.base_url
                )))
            }
        }
        if uri.host().is_none() {
            return Err(GardenClientError::Validation(format!(
                "API URL has no host: {}",
                self.base_url
            )));
        }

        if self.connect_timeout.is_zero() || self.due_check_period.is_zero() {
            return Err(GardenClientError::Validation(
                "Timeouts and check periods must be positive".to_string(),
            ));
        }
        if matches!(self.request_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(GardenClientError::Validation(
                "Request timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Joins a resource path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_secs(name: &str) -> Result<Option<Duration>, GardenClientError> {
    match env_value(name) {
        Some(raw) => raw
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| {
                GardenClientError::Validation(format!("{} must be a whole number of seconds", name))
            }),
        None => Ok(None),
    }
}
