use options_store::config::OptionsStoreConfig;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "font-awesome/v1";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Invalid route namespace: {0:?}")]
    InvalidNamespace(String),

    #[error("At least one admin token is required")]
    NoAdminTokens,

    #[error("Empty admin token")]
    EmptyAdminToken,

    #[error("max_body_bytes cannot be 0")]
    InvalidBodyLimit,
}

/// Conflict detection service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for conflict reports
    #[serde(default)]
    pub listener: Listener,
    /// Listener for health and readiness probes
    #[serde(default = "Listener::default_admin")]
    pub admin_listener: Listener,
    /// Routes are registered under `/<namespace>/`
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Largest accepted report body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    pub auth: AuthConfig,
    #[serde(default)]
    pub options_store: OptionsStoreConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        let namespace_is_valid = !self.namespace.is_empty()
            && !self.namespace.starts_with('/')
            && !self.namespace.ends_with('/')
            && self
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
        if !namespace_is_valid {
            return Err(ValidationError::InvalidNamespace(self.namespace.clone()));
        }

        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }

        self.auth.validate()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }

    fn default_admin() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Bearer tokens that carry the admin capability
    pub admin_tokens: Vec<String>,
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.admin_tokens.is_empty() {
            return Err(ValidationError::NoAdminTokens);
        }
        if self.admin_tokens.iter().any(|token| token.trim().is_empty()) {
            return Err(ValidationError::EmptyAdminToken);
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}
