//! Voice-synthesis provider boundary.
//!
//! The provider is consumed as an opaque capability: convert text to
//! audio given a voice identifier and stability/similarity/style
//! parameters. The core never inspects the audio; it logs success or
//! failure and keeps text delivery as the participant-visible fallback.

use crate::errors::ScError;
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Request timeout for synthesis calls.
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(15);

/// Per-participant voice configuration (transient, 1h retention).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// Provider voice identifier.
    pub voice_id: String,
    /// Timbre stability in [0, 1].
    pub stability: f64,
    /// Similarity boost in [0, 1].
    pub similarity_boost: f64,
    /// Style exaggeration in [0, 1].
    pub style: f64,
}

impl VoiceSettings {
    /// Validate parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Validation` with the offending field named.
    pub fn validate(&self) -> Result<(), ScError> {
        if self.voice_id.trim().is_empty() {
            return Err(ScError::Validation("voice_id must not be empty".to_string()));
        }
        for (name, value) in [
            ("stability", self.stability),
            ("similarity_boost", self.similarity_boost),
            ("style", self.style),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ScError::Validation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// HTTP client for the synthesis provider.
///
/// Built disabled when no API key is configured; calls then fail fast
/// with `ScError::Synthesis` and callers keep their text fallback.
pub struct SynthesisClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    enabled: bool,
}

impl SynthesisClient {
    /// Create a synthesis client.
    ///
    /// An empty API key produces a disabled client rather than an error:
    /// the provider is optional at the interface boundary.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Config` if the HTTP client cannot be built.
    pub fn new(endpoint: String, api_key: SecretString) -> Result<Self, ScError> {
        let enabled = !api_key.expose_secret().is_empty();
        let client = reqwest::Client::builder()
            .timeout(SYNTHESIS_TIMEOUT)
            .build()
            .map_err(|e| ScError::Config(format!("failed to build synthesis client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            enabled,
        })
    }

    /// Whether a provider key is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Convert text to audio with the given voice settings.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Synthesis` when disabled, on transport failure,
    /// or on a non-success provider status. Callers fall back to text
    /// delivery.
    pub async fn synthesize(
        &self,
        text: &str,
        settings: &VoiceSettings,
    ) -> Result<Vec<u8>, ScError> {
        if !self.enabled {
            return Err(ScError::Synthesis("no provider key configured".to_string()));
        }
        settings.validate()?;

        #[derive(Serialize)]
        struct SynthesisRequest<'a> {
            text: &'a str,
            voice_settings: VoiceParams,
        }
        #[derive(Serialize)]
        struct VoiceParams {
            stability: f64,
            similarity_boost: f64,
            style: f64,
        }

        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), settings.voice_id);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&SynthesisRequest {
                text,
                voice_settings: VoiceParams {
                    stability: settings.stability,
                    similarity_boost: settings.similarity_boost,
                    style: settings.style,
                },
            })
            .send()
            .await
            .map_err(|e| {
                warn!(
                    target: "sc.voice",
                    error = %e,
                    "Synthesis request failed"
                );
                ScError::Synthesis(format!("request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "sc.voice",
                status = %status,
                "Synthesis provider returned error status"
            );
            return Err(ScError::Synthesis(format!("status {status}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ScError::Synthesis(format!("body read failed: {e}")))?;

        debug!(
            target: "sc.voice",
            bytes = audio.len(),
            "Synthesis completed"
        );
        Ok(audio.to_vec())
    }
}
