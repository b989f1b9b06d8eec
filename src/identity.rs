use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hex characters kept from the digest (64 bits).
pub const IDENTITY_HEX_LEN: usize = 16;

const DOMAIN_TAG: &[u8] = b"voiceline.identity.v1";

/// Content-derived key of a dialogue line.
///
/// Computed from the raw text and the speaker only, so canonicalization rule
/// changes never move an artifact to a new filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn of(raw_text: &str, speaker_id: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN_TAG);
        update_field(&mut hasher, raw_text);
        update_field(&mut hasher, speaker_id);
        let hex = hasher.finalize().to_hex();
        Self(hex[..IDENTITY_HEX_LEN].to_string())
    }

    /// Accepts any stored id, including ones minted by older tooling.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Validates an id typed by an operator.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn identity(raw_text: &str, speaker_id: &str) -> Identity {
    Identity::of(raw_text, speaker_id)
}

fn update_field(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
