use crate::error::{AssistError, Result};
use serde::Deserialize;
use std::env;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct AssistConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL of the assistant endpoint that answers with `text/event-stream`.
    pub endpoint: String,
    /// Applies to establishing the connection only; an open stream is never timed out.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_processor_id")]
    pub processor_id: String,
    /// Lets a cancelled prompt be edited and resubmitted.
    #[serde(default = "default_true")]
    pub editable_retry: bool,
    /// Buffered chunks per tee branch before the source is backpressured.
    #[serde(default = "default_tee_capacity")]
    pub tee_capacity: usize,
    /// Mirror the primary body to the diagnostics consumer.
    #[serde(default = "default_true")]
    pub diagnostics: bool,
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_processor_id() -> String {
    "assist-chat-client".to_string()
}

fn default_true() -> bool {
    true
}

fn default_tee_capacity() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/assist".to_string(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            processor_id: default_processor_id(),
            editable_retry: true,
            tee_capacity: default_tee_capacity(),
            diagnostics: true,
        }
    }
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl AssistConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = AssistConfig::default();

        if let Ok(listen_addr) = env::var("ASSIST_LISTEN_ADDR") {
            config.server.listen_addr = listen_addr;
        }

        if let Ok(timeout) = env::var("ASSIST_CONNECT_TIMEOUT") {
            config.upstream.connect_timeout_secs = timeout.parse::<u64>().map_err(|e| {
                AssistError::ConfigError(format!("Invalid connect timeout value: {}", e))
            })?;
        }

        config.apply_endpoint_override();
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AssistError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Allow environment variables to override file config
        config.apply_endpoint_override();

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| AssistError::ConfigError(format!("Failed to parse config file: {}", e)))
    }

    fn apply_endpoint_override(&mut self) {
        if let Ok(endpoint) = env::var("ASSIST_API_URL") {
            self.upstream.endpoint = endpoint;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.upstream.endpoint.is_empty() {
            return Err(AssistError::ConfigError("Endpoint is empty".to_string()));
        }

        if !self.upstream.endpoint.starts_with("http://")
            && !self.upstream.endpoint.starts_with("https://")
        {
            return Err(AssistError::ConfigError(format!(
                "Endpoint must be an http(s) URL: {}",
                self.upstream.endpoint
            )));
        }

        if self.server.listen_addr.is_empty() {
            return Err(AssistError::ConfigError(
                "Listen address is empty".to_string(),
            ));
        }

        if self.session.tee_capacity == 0 {
            return Err(AssistError::ConfigError(
                "Tee capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let valid_config = AssistConfig::default();
        assert!(valid_config.validate().is_ok());

        let mut invalid_config = AssistConfig::default();
        invalid_config.session.tee_capacity = 0;
        assert!(invalid_config.validate().is_err());

        let mut bad_endpoint = AssistConfig::default();
        bad_endpoint.upstream.endpoint = "localhost:8000".to_string();
        assert!(bad_endpoint.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AssistConfig::from_toml(
            r#"
            [upstream]
            endpoint = "https://assist.example.com/v1/assist"

            [session]
            editable_retry = false
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.endpoint, "https://assist.example.com/v1/assist");
        assert_eq!(config.upstream.connect_timeout_secs, 10);
        assert!(!config.session.editable_retry);
        assert!(config.session.diagnostics);
        assert_eq!(config.session.tee_capacity, 64);
        assert_eq!(config.server.listen_addr, "127.0.0.1:3000");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(AssistConfig::from_toml("[upstream\nendpoint = 1").is_err());
    }
}
