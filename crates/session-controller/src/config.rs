//! Session Controller configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.
//!
//! Retention windows for stored state are design constants, not
//! configuration: see [`crate::store::retention`].

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default semantic classifier endpoint.
pub const DEFAULT_CLASSIFIER_URL: &str = "http://localhost:9090/v1/classify";

/// Default voice-synthesis provider endpoint.
pub const DEFAULT_VOICE_API_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Default maximum concurrent live sessions per controller instance.
pub const DEFAULT_MAX_SESSIONS: u32 = 200;

/// Default maximum participants in one session.
pub const DEFAULT_MAX_PARTICIPANTS_PER_SESSION: u32 = 50;

/// Default classifier request timeout in seconds.
pub const DEFAULT_CLASSIFIER_TIMEOUT_SECONDS: u64 = 8;

/// Default controller instance ID prefix.
pub const DEFAULT_SC_ID_PREFIX: &str = "sc";

/// Session Controller configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL (for shared session state).
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// Semantic classifier endpoint URL.
    pub classifier_url: String,

    /// Semantic classifier API key.
    /// Protected by `SecretString` to prevent accidental logging.
    pub classifier_api_key: SecretString,

    /// Classifier request timeout in seconds.
    pub classifier_timeout_seconds: u64,

    /// Voice-synthesis provider endpoint URL.
    pub voice_api_url: String,

    /// Voice-synthesis provider API key.
    /// Protected by `SecretString` to prevent accidental logging.
    pub voice_api_key: SecretString,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Deployment region identifier (e.g., "us-east-1").
    pub region: String,

    /// Unique identifier for this controller instance.
    pub sc_id: String,

    /// Maximum concurrent live sessions this instance can host.
    pub max_sessions: u32,

    /// Maximum participants in one session.
    pub max_participants_per_session: u32,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("classifier_url", &self.classifier_url)
            .field("classifier_api_key", &"[REDACTED]")
            .field(
                "classifier_timeout_seconds",
                &self.classifier_timeout_seconds,
            )
            .field("voice_api_url", &self.voice_api_url)
            .field("voice_api_key", &"[REDACTED]")
            .field("health_bind_address", &self.health_bind_address)
            .field("region", &self.region)
            .field("sc_id", &self.sc_id)
            .field("max_sessions", &self.max_sessions)
            .field(
                "max_participants_per_session",
                &self.max_participants_per_session,
            )
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let classifier_api_key = SecretString::from(
            vars.get("SC_CLASSIFIER_API_KEY")
                .ok_or_else(|| ConfigError::MissingEnvVar("SC_CLASSIFIER_API_KEY".to_string()))?
                .clone(),
        );

        // The voice provider is optional at the interface boundary; an
        // empty key disables synthesis and falls back to text delivery.
        let voice_api_key = SecretString::from(
            vars.get("SC_VOICE_API_KEY").cloned().unwrap_or_default(),
        );

        let classifier_url = vars
            .get("SC_CLASSIFIER_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_CLASSIFIER_URL.to_string());

        let classifier_timeout_seconds = vars
            .get("SC_CLASSIFIER_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CLASSIFIER_TIMEOUT_SECONDS);

        let voice_api_url = vars
            .get("SC_VOICE_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_VOICE_API_URL.to_string());

        let health_bind_address = vars
            .get("SC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let region = vars
            .get("SC_REGION")
            .cloned()
            .unwrap_or_else(|| "us-east-1".to_string());

        // Parse capacity limits
        let max_sessions = vars
            .get("SC_MAX_SESSIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_SESSIONS);

        let max_participants_per_session = vars
            .get("SC_MAX_PARTICIPANTS_PER_SESSION")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_PARTICIPANTS_PER_SESSION);

        if max_participants_per_session == 0 {
            return Err(ConfigError::InvalidValue(
                "SC_MAX_PARTICIPANTS_PER_SESSION must be at least 1".to_string(),
            ));
        }

        // Generate controller instance ID
        let sc_id = vars.get("SC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            redis_url,
            classifier_url,
            classifier_api_key,
            classifier_timeout_seconds,
            voice_api_url,
            voice_api_key,
            health_bind_address,
            region,
            sc_id,
            max_sessions,
            max_participants_per_session,
        })
    }
}
