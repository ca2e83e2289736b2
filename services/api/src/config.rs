//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! Server settings are loaded from environment variables at startup. The `.env`
//! file is used for local development. Backend credentials are optional here:
//! without them the service starts in the config view and waits for the client
//! to submit them.

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;
use utoipa::ToSchema;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
    #[error("Invalid backend credentials: {0}")]
    InvalidCredentials(String),
}

/// Credentials for one of the two supported backends.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum BackendCredentials {
    /// The web config object of a Firebase project (only the fields we need).
    Firestore {
        #[serde(rename = "projectId")]
        project_id: String,
        #[serde(rename = "apiKey")]
        api_key: String,
    },
    /// The project URL and anon key of a Supabase project.
    Supabase {
        url: String,
        #[serde(rename = "anonKey", alias = "anon_key")]
        anon_key: String,
    },
}

impl BackendCredentials {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendCredentials::Firestore { .. } => "firestore",
            BackendCredentials::Supabase { .. } => "supabase",
        }
    }

    /// Rejects credentials that cannot possibly work, before any network call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            BackendCredentials::Firestore { project_id, api_key } => {
                if project_id.trim().is_empty() || api_key.trim().is_empty() {
                    return Err(ConfigError::InvalidCredentials(
                        "the Firebase config needs both projectId and apiKey".to_string(),
                    ));
                }
                if project_id.contains('/') {
                    return Err(ConfigError::InvalidCredentials(format!(
                        "'{}' is not a project id",
                        project_id
                    )));
                }
            }
            BackendCredentials::Supabase { url, anon_key } => {
                if !url.starts_with("http") || anon_key.trim().is_empty() {
                    return Err(ConfigError::InvalidCredentials(
                        "the Supabase config needs an http(s) project URL and the anon key"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Reads credentials from `BACKEND` and the matching variables.
    /// Returns `Ok(None)` when `BACKEND` is unset.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let backend = match std::env::var("BACKEND") {
            Ok(value) if !value.trim().is_empty() => value.trim().to_lowercase(),
            _ => return Ok(None),
        };
        let credentials = match backend.as_str() {
            "firestore" | "firebase" => BackendCredentials::Firestore {
                project_id: required_var("FIRESTORE_PROJECT_ID")?,
                api_key: required_var("FIRESTORE_API_KEY")?,
            },
            "supabase" => BackendCredentials::Supabase {
                url: required_var("SUPABASE_URL")?,
                anon_key: required_var("SUPABASE_ANON_KEY")?,
            },
            other => {
                return Err(ConfigError::InvalidValue(
                    "BACKEND".to_string(),
                    format!("'{}' is not one of firestore, supabase", other),
                ))
            }
        };
        credentials.validate()?;
        Ok(Some(credentials))
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub cors_origin: String,
    /// How long the probe may run before the client is offered the way out.
    pub probe_timeout: Duration,
    pub credentials: Option<BackendCredentials>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        let probe_timeout_str =
            std::env::var("PROBE_TIMEOUT_SECS").unwrap_or_else(|_| "10".to_string());
        let probe_timeout = probe_timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PROBE_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", probe_timeout_str),
                )
            })?;

        // --- Load Backend Credentials (optional) ---
        let credentials = BackendCredentials::from_env()?;

        Ok(Self {
            bind_address,
            log_level,
            cors_origin,
            probe_timeout,
            credentials,
        })
    }
}

impl Default for Config {
    /// The values `from_env` falls back to, with no backend configured.
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: Level::INFO,
            cors_origin: "http://localhost:5173".to_string(),
            probe_timeout: Duration::from_secs(10),
            credentials: None,
        }
    }
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firebase_config_json_is_accepted() {
        let json = r#"{
            "backend": "firestore",
            "apiKey": "AIza-test",
            "authDomain": "kiddos.firebaseapp.com",
            "projectId": "kiddos"
        }"#;
        let credentials: BackendCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(
            credentials,
            BackendCredentials::Firestore {
                project_id: "kiddos".to_string(),
                api_key: "AIza-test".to_string(),
            }
        );
        assert!(credentials.validate().is_ok());
    }

    #[test]
    fn firebase_config_without_project_is_invalid() {
        let credentials = BackendCredentials::Firestore {
            project_id: " ".to_string(),
            api_key: "key".to_string(),
        };
        assert!(matches!(
            credentials.validate(),
            Err(ConfigError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn supabase_config_needs_an_http_url_and_a_key() {
        let json = r#"{
            "backend": "supabase",
            "url": "https://example.supabase.co",
            "anonKey": "eyJhbGciOi-test"
        }"#;
        let good: BackendCredentials = serde_json::from_str(json).unwrap();
        assert_eq!(
            good,
            BackendCredentials::Supabase {
                url: "https://example.supabase.co".to_string(),
                anon_key: "eyJhbGciOi-test".to_string(),
            }
        );
        assert!(good.validate().is_ok());
        assert_eq!(good.kind(), "supabase");

        let postgres = BackendCredentials::Supabase {
            url: "postgresql://postgres:pw@db.example.supabase.co:5432/postgres".to_string(),
            anon_key: "key".to_string(),
        };
        let keyless = BackendCredentials::Supabase {
            url: "https://example.supabase.co".to_string(),
            anon_key: "  ".to_string(),
        };
        assert!(postgres.validate().is_err());
        assert!(keyless.validate().is_err());
    }
}
