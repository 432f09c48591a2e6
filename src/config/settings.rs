//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Default server instance settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Security pipeline settings.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.name must not be empty".to_string(),
            });
        }

        if self.http.enabled && self.http.listen.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "http.listen must not be empty when the HTTP transport is enabled"
                    .to_string(),
            });
        }

        if let Some(ref auth) = self.security.basic_auth {
            if auth.username.is_empty() {
                return Err(ConfigError::ValidationError {
                    message: "security.basic_auth.username must not be empty".to_string(),
                });
            }
        }

        if self.security.allowed_origins.iter().any(String::is_empty) {
            return Err(ConfigError::ValidationError {
                message: "security.allowed_origins must not contain empty entries".to_string(),
            });
        }

        Ok(())
    }
}

/// Default server instance configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Instance name used when a transport call does not select a server.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Human-readable description advertised during discovery.
    #[serde(default)]
    pub description: String,

    /// Version string advertised during discovery; defaults to the crate
    /// version.
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            description: String::new(),
            version: None,
        }
    }
}

fn default_server_name() -> String {
    "default".to_string()
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Whether the HTTP transport is served instead of stdio.
    #[serde(default)]
    pub enabled: bool,

    /// Listen address, e.g. "127.0.0.1:8080".
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

/// Security pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes; 0 disables the check.
    #[serde(default)]
    pub max_body_bytes: usize,

    /// CORS origin allow-list: exact origins, `*`, or `*.suffix` patterns.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Basic authentication credentials.
    #[serde(default)]
    pub basic_auth: Option<BasicAuthConfig>,

    /// Whether to emit the strict-transport-security header.
    #[serde(default)]
    pub strict_transport_security: bool,
}

/// Basic authentication credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BasicAuthConfig {
    /// Expected username.
    pub username: String,
    /// Expected password.
    pub password: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
