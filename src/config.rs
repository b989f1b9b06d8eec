use anyhow::{bail, Context};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::canonical::{Canonicalizer, DEFAULT_SPEAKER_LABELS};

/// Conditions that must hold before any synthesis is attempted.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("no voice configured for speaker(s): {}", .speakers.join(", "))]
    MissingVoice { speakers: Vec<String> },
    #[error("credential missing: set the {env} environment variable")]
    MissingCredential { env: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default = "default_voice_map")]
    pub voice_map: BTreeMap<String, String>,
    #[serde(default = "default_speaker_labels")]
    pub speaker_labels: Vec<String>,
    #[serde(default)]
    pub extra_glyphs: String,
    #[serde(default)]
    pub audio_dir: Option<PathBuf>,
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default)]
    pub regenerate_stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
    #[serde(default)]
    pub command: CommandConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_stability")]
    pub stability: f32,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,
}

/// External program that writes audio for `{text}` spoken by `{voice}` to stdout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommandConfig {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Resolution order: explicit path, `./voiceline.json`, the user config
    /// dir, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        if let Some(path) = Self::project_path() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        if let Ok(path) = Self::default_path() {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("parse config at {}", path.display()))?;
        Ok(config)
    }

    pub fn init_default() -> anyhow::Result<PathBuf> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let config = Self::default();
        fs::write(&path, serde_json::to_string_pretty(&config)?)?;
        Ok(path)
    }

    pub fn default_path() -> anyhow::Result<PathBuf> {
        let base = BaseDirs::new().context("unable to resolve home directory")?;
        Ok(base.config_dir().join("voiceline").join("config.json"))
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.audio_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("audio"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(|| self.audio_dir().join("manifest.json"))
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn backend_name(&self) -> &str {
        self.tts.backend.as_deref().unwrap_or("elevenlabs")
    }

    pub fn canonicalizer(&self) -> anyhow::Result<Canonicalizer> {
        Canonicalizer::new(&self.speaker_labels, &self.extra_glyphs)
            .context("compile speaker label pattern")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend_name() {
            "elevenlabs" | "command" => {}
            other => bail!("unsupported backend: {other}"),
        }

        if self.backend_name() == "command" && self.tts.command.program.is_none() {
            bail!("command backend requires tts.command.program to be set");
        }

        let el = &self.tts.elevenlabs;
        if !(0.0..=1.0).contains(&el.stability) {
            bail!("tts.elevenlabs.stability must be between 0.0 and 1.0");
        }
        if !(0.0..=1.0).contains(&el.similarity_boost) {
            bail!("tts.elevenlabs.similarity_boost must be between 0.0 and 1.0");
        }

        let ext = self.artifact_extension.as_str();
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("artifact_extension must be a plain extension such as \"mp3\"");
        }

        for (speaker, voice) in &self.voice_map {
            if !is_safe_speaker_id(speaker) {
                bail!("speaker id {speaker:?} cannot be used in artifact filenames");
            }
            if voice.trim().is_empty() {
                bail!("voice for speaker {speaker:?} is empty");
            }
        }

        self.canonicalizer()?;
        Ok(())
    }

    fn project_path() -> Option<PathBuf> {
        Some(PathBuf::from("voiceline.json"))
    }
}

/// Speaker ids end up in filenames, so they must not carry path syntax.
pub fn is_safe_speaker_id(speaker: &str) -> bool {
    !speaker.is_empty()
        && speaker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tts: TtsConfig::default(),
            voice_map: default_voice_map(),
            speaker_labels: default_speaker_labels(),
            extra_glyphs: String::new(),
            audio_dir: None,
            manifest_path: None,
            artifact_extension: default_artifact_extension(),
            pacing_ms: default_pacing_ms(),
            regenerate_stale: false,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            backend: Some("elevenlabs".to_string()),
            timeout_seconds: default_timeout_seconds(),
            elevenlabs: ElevenLabsConfig::default(),
            command: CommandConfig::default(),
        }
    }
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model_id: default_model_id(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
        }
    }
}

fn default_voice_map() -> BTreeMap<String, String> {
    [
        ("narrator", "pNInz6obpgDQGcFmaJgB"),
        ("george", "VR6AewLTigWG4xSOukaG"),
        ("matilda", "jsCqWAovK2LkecY7zXl4"),
        ("moondog", "cgSgspJ2msm6clMCkdW9"),
    ]
    .into_iter()
    .map(|(speaker, voice)| (speaker.to_string(), voice.to_string()))
    .collect()
}

fn default_speaker_labels() -> Vec<String> {
    DEFAULT_SPEAKER_LABELS.iter().map(|s| s.to_string()).collect()
}

fn default_artifact_extension() -> String {
    "mp3".to_string()
}

fn default_pacing_ms() -> u64 {
    1000
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_api_key_env() -> String {
    "ELEVENLABS_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_model_id() -> String {
    "eleven_monolingual_v1".to_string()
}

fn default_stability() -> f32 {
    0.5
}

fn default_similarity_boost() -> f32 {
    0.5
}
