use secrecy::{ExposeSecret, SecretBox};
use std::env;

use crate::error::{ClientError, Result};

const ENV_API_KEY: &str = "CONVOSTREAM_API_KEY";
const ENV_HOST: &str = "CONVOSTREAM_HOST";
const ENV_PATH: &str = "CONVOSTREAM_PATH";
const ENV_ALLOW_REDIRECTS: &str = "CONVOSTREAM_ALLOW_REDIRECTS";
const ENV_SKIP_SERVER_AUTH: &str = "CONVOSTREAM_SKIP_SERVER_AUTH";

/// Credentials and endpoint for one streaming session.
///
/// The path is expected to already carry the session identifier, e.g.
/// `v1/realtime/insights/<session-id>`. The REST collaborator that performs
/// authentication supplies these values; this crate only validates and uses
/// them.
#[derive(Debug)]
pub struct AccessConfig {
    /// Target host, with or without a scheme. A bare host dials `wss://`.
    pub host: String,
    /// Request path including the session identifier.
    pub path: String,
    /// API key, sent on every (re)dial via the `X-API-KEY` header.
    pub api_key: SecretBox<String>,
    /// Follow an HTTP redirect answer to the upgrade request once.
    pub allow_redirects: bool,
    /// Accept invalid server certificates (self-signed test endpoints).
    pub skip_server_auth: bool,
}

impl AccessConfig {
    pub fn new(host: impl Into<String>, path: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            api_key: SecretBox::new(Box::new(api_key.into())),
            allow_redirects: false,
            skip_server_auth: false,
        }
    }

    pub fn allow_redirects(mut self, allow: bool) -> Self {
        self.allow_redirects = allow;
        self
    }

    pub fn skip_server_auth(mut self, skip: bool) -> Self {
        self.skip_server_auth = skip;
        self
    }

    /// Load access configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (for development)
        dotenvy::dotenv().ok();

        let host = Self::required_var(ENV_HOST)?;
        let path = Self::required_var(ENV_PATH)?;
        let api_key = Self::required_var(ENV_API_KEY)?;

        let config = Self::new(host, path, api_key)
            .allow_redirects(Self::flag_var(ENV_ALLOW_REDIRECTS))
            .skip_server_auth(Self::flag_var(ENV_SKIP_SERVER_AUTH));
        config.validate()?;
        Ok(config)
    }

    /// Ensure host, path and key are all present before any dial happens.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::InvalidCredentials(
                "host cannot be empty".to_string(),
            ));
        }
        if self.path.trim().is_empty() {
            return Err(ClientError::InvalidCredentials(
                "path cannot be empty".to_string(),
            ));
        }
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(ClientError::InvalidCredentials(
                "API key cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the API key (use only when building the dial request).
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    fn required_var(name: &str) -> Result<String> {
        match env::var(name) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => {
                log::error!("Missing required environment variable: {}", name);
                log::error!("Create a .env file in the project root with:");
                log::error!("{}=your_value_here", name);
                Err(ClientError::InvalidCredentials(format!(
                    "missing environment variable {}",
                    name
                )))
            }
        }
    }

    fn flag_var(name: &str) -> bool {
        matches!(
            env::var(name).as_deref(),
            Ok("1") | Ok("true") | Ok("yes")
        )
    }
}
