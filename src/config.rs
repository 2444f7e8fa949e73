use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use thiserror::Error;

/// Default request body ceiling: 200 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 200 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("OPENAI_API_KEY must not be empty")]
    MissingApiKey,

    #[error("OPENAI_API_KEY contains characters that cannot be sent in an HTTP header")]
    InvalidApiKey,

    #[error("OPENAI_BASE_URL must start with http:// or https://, got '{0}'")]
    InvalidBaseUrl(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),
}

/// Service settings, read from flags or the environment
#[derive(Args, Clone)]
pub struct ServiceConfig {
    /// Credential for the generation service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Base URL of the OpenAI compatible generation service
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub base_url: String,

    #[arg(long, env = "CASESMITH_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "CASESMITH_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Seconds to wait for the generation service
    #[arg(long, env = "CASESMITH_TIMEOUT_SECS", default_value_t = 300)]
    pub timeout_secs: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "CASESMITH_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Directory whose agent files replace the bundled ones
    #[arg(long, env = "CASESMITH_AGENTS_DIR")]
    pub agents_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("agents_dir", &self.agents_dir)
            .finish_non_exhaustive()
    }
}

impl ServiceConfig {
    /// Builds a config with defaults for everything but the credentials
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            timeout_secs: 300,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            agents_dir: None,
        }
    }

    /// Normalizes and checks the settings
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.api_key = self.api_key.trim().to_string();
        if self.api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !self.api_key.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ConfigError::InvalidApiKey);
        }

        self.base_url = self.base_url.trim().trim_end_matches('/').to_string();
        let scheme_ok = ["http://", "https://"].iter().any(|scheme| {
            self.base_url.starts_with(scheme) && self.base_url.len() > scheme.len()
        });
        if !scheme_ok {
            return Err(ConfigError::InvalidBaseUrl(self.base_url));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Zero("CASESMITH_TIMEOUT_SECS"));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Zero("CASESMITH_MAX_BODY_BYTES"));
        }
        self.host = self.host.trim().to_string();
        if self.host.is_empty() {
            return Err(ConfigError::InvalidAddress(self.listen_addr()));
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `host:port` as handed to the listener, which resolves host names
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
