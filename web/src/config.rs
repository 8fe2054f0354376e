//! Service configuration loaded from environment variables.
//!
//! | Variable               | Default            |
//! |------------------------|--------------------|
//! | `CQEA_HOST`            | `0.0.0.0`          |
//! | `CQEA_PORT`            | `8080`             |
//! | `CQEA_LOG`             | `info`             |
//! | `CQEA_BODY_LIMIT`      | `2097152`          |
//! | `CQEA_JWT_SECRET`      | unset (no JWT auth)|
//! | `CQEA_JWT_ALGORITHM`   | `HS256`            |
//! | `CQEA_PUBLIC_PATHS`    | `/docs,/openapi.json` |
//! | `CQEA_API_DOCUMENT`    | `/openapi.json`    |

use crate::state::DEFAULT_BODY_LIMIT;
use jsonwebtoken::Algorithm;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Malformed configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value '{value}' for {variable}: {reason}")]
    Invalid {
        /// Environment variable.
        variable: &'static str,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
}

/// Web service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
    /// Maximum request body size, in bytes.
    pub body_limit: usize,
    /// JWT secret; JWT authentication is off without one.
    pub jwt_secret: Option<String>,
    /// Expected JWT signing algorithm.
    pub jwt_algorithm: Algorithm,
    /// Path prefixes served without authentication.
    pub public_paths: Vec<String>,
    /// Path of the API document, if served.
    pub api_document: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_filter: "info".to_string(),
            body_limit: DEFAULT_BODY_LIMIT,
            jwt_secret: None,
            jwt_algorithm: Algorithm::HS256,
            public_paths: vec!["/docs".to_string(), "/openapi.json".to_string()],
            api_document: Some("/openapi.json".to_string()),
        }
    }
}

impl WebConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that do not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from `lookup` (variable name → value).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that do not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            host: text("CQEA_HOST").unwrap_or(defaults.host),
            port: parse("CQEA_PORT", text("CQEA_PORT"))?.unwrap_or(defaults.port),
            log_filter: text("CQEA_LOG").unwrap_or(defaults.log_filter),
            body_limit: parse("CQEA_BODY_LIMIT", text("CQEA_BODY_LIMIT"))?.unwrap_or(defaults.body_limit),
            jwt_secret: text("CQEA_JWT_SECRET"),
            jwt_algorithm: parse("CQEA_JWT_ALGORITHM", text("CQEA_JWT_ALGORITHM"))?
                .unwrap_or(defaults.jwt_algorithm),
            public_paths: text("CQEA_PUBLIC_PATHS").map_or(defaults.public_paths, |raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            }),
            api_document: match text("CQEA_API_DOCUMENT").as_deref() {
                Some("off" | "false" | "none") => None,
                Some(path) => Some(path.to_string()),
                None => defaults.api_document,
            },
        })
    }

    /// `host:port`.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(variable: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                variable,
                reason: e.to_string(),
                value: raw,
            })
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<WebConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        WebConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, WebConfig::default());
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("CQEA_PORT", "3000"),
            ("CQEA_JWT_SECRET", "s3cret"),
            ("CQEA_JWT_ALGORITHM", "HS512"),
            ("CQEA_PUBLIC_PATHS", "/health, /docs ,"),
            ("CQEA_API_DOCUMENT", "off"),
        ])
        .unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.jwt_algorithm, Algorithm::HS512);
        assert_eq!(config.public_paths, vec!["/health", "/docs"]);
        assert_eq!(config.api_document, None);
    }

    #[test]
    fn test_invalid_port() {
        let err = load(&[("CQEA_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { variable: "CQEA_PORT", ref value, .. } if value == "eighty"));
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[("CQEA_HOST", "  "), ("CQEA_JWT_SECRET", "")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.jwt_secret, None);
    }
}
