use super::SynthesisError;

#[cfg(feature = "elevenlabs")]
mod imp {
    use reqwest::blocking::Client;
    use reqwest::header::{ACCEPT, CONTENT_TYPE};
    use serde::Serialize;
    use std::time::Duration;

    use crate::config::{PreconditionError, TtsConfig};
    use crate::tts::provider::Synthesizer;
    use crate::tts::SynthesisError;

    use super::classify_status;

    const USER_AGENT: &str = concat!("voiceline/", env!("CARGO_PKG_VERSION"));

    #[derive(Serialize)]
    struct VoiceSettings {
        stability: f32,
        similarity_boost: f32,
    }

    #[derive(Serialize)]
    struct SpeechRequest<'a> {
        text: &'a str,
        model_id: &'a str,
        voice_settings: VoiceSettings,
    }

    pub struct ElevenLabsBackend {
        http: Client,
        api_key: String,
        base_url: String,
        model_id: String,
        stability: f32,
        similarity_boost: f32,
    }

    impl ElevenLabsBackend {
        pub fn from_config(config: &TtsConfig) -> Result<Self, PreconditionError> {
            let el = &config.elevenlabs;
            let api_key = std::env::var(&el.api_key_env)
                .ok()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .ok_or_else(|| PreconditionError::MissingCredential {
                    env: el.api_key_env.clone(),
                })?;
            Self::new(api_key, config)
        }

        pub fn new(api_key: String, config: &TtsConfig) -> Result<Self, PreconditionError> {
            let http = Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
                .build()
                .map_err(|e| PreconditionError::InvalidConfig(format!("http client: {e}")))?;

            let el = &config.elevenlabs;
            Ok(Self {
                http,
                api_key,
                base_url: el.base_url.trim_end_matches('/').to_string(),
                model_id: el.model_id.clone(),
                stability: el.stability,
                similarity_boost: el.similarity_boost,
            })
        }
    }

    impl Synthesizer for ElevenLabsBackend {
        fn name(&self) -> &str {
            "elevenlabs"
        }

        fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
            let url = format!("{}/v1/text-to-speech/{}", self.base_url, voice_id);
            let body = SpeechRequest {
                text,
                model_id: &self.model_id,
                voice_settings: VoiceSettings {
                    stability: self.stability,
                    similarity_boost: self.similarity_boost,
                },
            };

            tracing::debug!(voice = voice_id, chars = text.chars().count(), "requesting speech");

            let response = self
                .http
                .post(&url)
                .header(ACCEPT, "audio/mpeg")
                .header(CONTENT_TYPE, "application/json")
                .header("xi-api-key", self.api_key.as_str())
                .json(&body)
                .send()
                .map_err(|e| SynthesisError::Transient(format!("request failed: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().unwrap_or_default();
                return Err(classify_status(status.as_u16(), &detail));
            }

            let audio = response
                .bytes()
                .map_err(|e| SynthesisError::Transient(format!("read response body: {e}")))?;
            Ok(audio.to_vec())
        }
    }
}

#[cfg(feature = "elevenlabs")]
pub use imp::ElevenLabsBackend;

#[cfg(not(feature = "elevenlabs"))]
pub struct ElevenLabsBackend;

#[cfg(not(feature = "elevenlabs"))]
impl ElevenLabsBackend {
    pub fn from_config(
        _config: &crate::config::TtsConfig,
    ) -> Result<Self, crate::config::PreconditionError> {
        Err(crate::config::PreconditionError::InvalidConfig(
            "elevenlabs backend not enabled; rebuild with --features elevenlabs".to_string(),
        ))
    }
}

#[cfg(not(feature = "elevenlabs"))]
impl super::provider::Synthesizer for ElevenLabsBackend {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
        Err(SynthesisError::Permanent(
            "elevenlabs backend not enabled".to_string(),
        ))
    }
}

/// Maps a non-success HTTP status to the failure taxonomy. The service reports
/// an exhausted quota as a 401 whose body names `quota_exceeded`.
#[cfg_attr(not(feature = "elevenlabs"), allow(dead_code))]
fn classify_status(status: u16, body: &str) -> SynthesisError {
    let detail = format!("HTTP {status}: {}", truncate(body, 300));
    match status {
        401 | 402 if body.contains("quota_exceeded") => SynthesisError::QuotaExceeded(detail),
        401 | 403 => SynthesisError::Auth(detail),
        408 | 429 => SynthesisError::Transient(detail),
        500..=599 => SynthesisError::Transient(detail),
        _ => SynthesisError::Permanent(detail),
    }
}

#[cfg_attr(not(feature = "elevenlabs"), allow(dead_code))]
fn truncate(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
