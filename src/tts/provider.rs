use crate::config::{Config, PreconditionError};

use super::command::CommandBackend;
use super::elevenlabs::ElevenLabsBackend;
use super::SynthesisError;

pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;
    fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError>;
}

impl<S: Synthesizer + ?Sized> Synthesizer for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
        (**self).synthesize(text, voice_id)
    }
}

/// Builds the configured backend. Credentials are resolved here, so a
/// missing key fails before the first line is attempted.
pub fn select_backend(config: &Config) -> Result<Box<dyn Synthesizer>, PreconditionError> {
    match config.backend_name() {
        "elevenlabs" => Ok(Box::new(ElevenLabsBackend::from_config(&config.tts)?)),
        "command" => Ok(Box::new(CommandBackend::from_config(&config.tts)?)),
        other => Err(PreconditionError::InvalidConfig(format!(
            "unknown backend: {other}"
        ))),
    }
}
