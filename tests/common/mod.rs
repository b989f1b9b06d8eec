#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use voiceline::canonical::Canonicalizer;
use voiceline::pipeline::{Pipeline, PipelineConfig};
use voiceline::tts::{SynthesisError, Synthesizer};

pub const CAST: &[&str] = &["George", "Matilda", "Moon Dog", "Narrator"];

/// Records every call and fails the texts it was told to fail.
#[derive(Default)]
pub struct ScriptedSynth {
    calls: Mutex<Vec<(String, String)>>,
    call_times: Mutex<Vec<Instant>>,
    failures: Mutex<HashMap<String, SynthesisError>>,
}

impl ScriptedSynth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(self, text: &str, err: SynthesisError) -> Self {
        self.failures.lock().unwrap().insert(text.to_string(), err);
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// When each call arrived, in call order.
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Synthesizer for ScriptedSynth {
    fn name(&self) -> &str {
        "scripted"
    }

    fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, SynthesisError> {
        self.call_times.lock().unwrap().push(Instant::now());
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice_id.to_string()));
        if let Some(err) = self.failures.lock().unwrap().get(text) {
            return Err(err.clone());
        }
        Ok(format!("audio:{voice_id}:{text}").into_bytes())
    }
}

pub fn voice_map() -> BTreeMap<String, String> {
    ["george", "matilda", "moondog", "narrator"]
        .into_iter()
        .map(|speaker| (speaker.to_string(), format!("v-{speaker}")))
        .collect()
}

pub fn pipeline_config(audio_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        voice_map: voice_map(),
        audio_dir: audio_dir.to_path_buf(),
        artifact_extension: "mp3".to_string(),
        pacing: Duration::ZERO,
        regenerate_stale: false,
    }
}

pub fn pipeline(audio_dir: &Path) -> Pipeline {
    pipeline_with_labels(audio_dir, CAST)
}

pub fn pipeline_with_labels(audio_dir: &Path, labels: &[&str]) -> Pipeline {
    Pipeline::new(
        pipeline_config(audio_dir),
        Canonicalizer::new(labels, "").unwrap(),
    )
}
