use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::dialogue::CanonicalLine;
use crate::identity::Identity;
use crate::manifest::{now_timestamp, ArtifactDescriptor, ManifestError, ManifestStore};
use crate::pipeline::PipelineConfig;
use crate::tts::{FailureKind, SynthesisError, Synthesizer};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("write artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobReason {
    /// Not in the manifest yet.
    New,
    /// Cached, but its canonical text changed and stale audio is being redone.
    Stale,
    /// Named by the operator.
    Explicit,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub line: CanonicalLine,
    pub reason: JobReason,
}

impl Job {
    pub fn new(line: CanonicalLine) -> Self {
        Self {
            line,
            reason: JobReason::New,
        }
    }

    /// Forced jobs overwrite an existing artifact instead of reusing it.
    pub fn is_forced(&self) -> bool {
        self.reason != JobReason::New
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedLine {
    pub id: Identity,
    pub speaker_id: String,
    pub canonical_text: String,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub generated: usize,
    pub reused_existing: usize,
    pub failed: Vec<FailedLine>,
    pub not_attempted: usize,
    pub halted: Option<String>,
}

/// Keeps consecutive synthesis calls at least `min_interval` apart.
struct Pacer {
    last_call: Option<Instant>,
    min_interval: Duration,
}

impl Pacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_call: None,
            min_interval,
        }
    }

    fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "pacing synthesis calls");
                thread::sleep(wait);
            }
        }
    }

    fn mark(&mut self) {
        self.last_call = Some(Instant::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactState {
    Missing,
    /// A zero-length file, e.g. from an interrupted external tool.
    Empty,
    Usable,
    /// Something other than a regular file sits at the path.
    Blocked,
}

impl ArtifactState {
    fn of(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Err(_) => ArtifactState::Missing,
            Ok(meta) if !meta.is_file() => ArtifactState::Blocked,
            Ok(meta) if meta.len() == 0 => ArtifactState::Empty,
            Ok(_) => ArtifactState::Usable,
        }
    }
}

pub fn artifact_filename(speaker_id: &str, id: &Identity, extension: &str) -> String {
    format!("{speaker_id}_{id}.{extension}")
}

/// Works through pending lines one at a time, persisting the manifest after
/// each line that lands.
pub struct Generator<'a, S: Synthesizer + ?Sized> {
    synth: &'a S,
    config: &'a PipelineConfig,
}

impl<'a, S: Synthesizer + ?Sized> Generator<'a, S> {
    pub fn new(synth: &'a S, config: &'a PipelineConfig) -> Self {
        Self { synth, config }
    }

    /// A cached line keeps the filename it was stored under.
    pub fn artifact_path(&self, line: &CanonicalLine, store: &ManifestStore) -> (String, PathBuf) {
        let filename = match store.lookup(&line.id) {
            Some(stored) => stored.filename.clone(),
            None => artifact_filename(&line.speaker_id, &line.id, &self.config.artifact_extension),
        };
        let path = self.config.audio_dir.join(&filename);
        (filename, path)
    }

    pub fn run(
        &self,
        jobs: &[Job],
        store: &mut ManifestStore,
    ) -> Result<GenerationReport, GenerateError> {
        let mut report = GenerationReport::default();
        let mut pacer = Pacer::new(self.config.pacing);
        let total = jobs.len();

        for (idx, job) in jobs.iter().enumerate() {
            let line = &job.line;
            let (filename, path) = self.artifact_path(line, store);
            let on_disk = ArtifactState::of(&path);

            if !job.is_forced() && on_disk == ArtifactState::Usable {
                tracing::info!(id = %line.id, file = %filename, "artifact already on disk; recording");
                record(store, line, &filename, false)?;
                store.save_if_dirty()?;
                report.reused_existing += 1;
                continue;
            }

            let Some(voice_id) = self.config.voice_map.get(&line.speaker_id) else {
                tracing::error!(id = %line.id, speaker = %line.speaker_id, "no voice for speaker");
                report.failed.push(failed_line(
                    line,
                    &SynthesisError::Permanent(format!("no voice for speaker {}", line.speaker_id)),
                ));
                continue;
            };

            tracing::info!(
                n = idx + 1,
                total,
                id = %line.id,
                speaker = %line.speaker_id,
                reason = ?job.reason,
                "synthesizing"
            );

            pacer.wait();
            let outcome = self.synth.synthesize(&line.canonical_text, voice_id);
            pacer.mark();

            let outcome = match outcome {
                Ok(audio) if audio.is_empty() => Err(SynthesisError::Transient(
                    "service returned no audio".to_string(),
                )),
                other => other,
            };

            match outcome {
                Ok(audio) => {
                    let overwrite = job.is_forced() || on_disk == ArtifactState::Empty;
                    if let Err(err) = write_artifact(&path, &audio, overwrite) {
                        tracing::error!(id = %line.id, error = %err, "could not store audio; stopping");
                        report.failed.push(FailedLine {
                            id: line.id.clone(),
                            speaker_id: line.speaker_id.clone(),
                            canonical_text: line.canonical_text.clone(),
                            kind: FailureKind::Artifact,
                            message: err.to_string(),
                        });
                        report.not_attempted = total - idx - 1;
                        report.halted = Some(err.to_string());
                        break;
                    }
                    record(store, line, &filename, job.is_forced())?;
                    store.save()?;
                    report.generated += 1;
                    tracing::info!(id = %line.id, file = %filename, bytes = audio.len(), "generated");
                }
                Err(err) => {
                    match err.kind() {
                        FailureKind::Permanent => tracing::error!(
                            id = %line.id,
                            error = %err,
                            "line rejected; it stays pending until its text or config changes"
                        ),
                        _ => tracing::warn!(id = %line.id, error = %err, "synthesis failed; line stays pending"),
                    }
                    report.failed.push(failed_line(line, &err));

                    if !err.is_per_line() {
                        report.not_attempted = total - idx - 1;
                        report.halted = Some(err.to_string());
                        tracing::error!(
                            remaining = report.not_attempted,
                            error = %err,
                            "stopping: no further call can succeed"
                        );
                        break;
                    }
                }
            }
        }

        Ok(report)
    }
}

fn failed_line(line: &CanonicalLine, err: &SynthesisError) -> FailedLine {
    FailedLine {
        id: line.id.clone(),
        speaker_id: line.speaker_id.clone(),
        canonical_text: line.canonical_text.clone(),
        kind: err.kind(),
        message: err.to_string(),
    }
}

fn record(
    store: &mut ManifestStore,
    line: &CanonicalLine,
    filename: &str,
    regenerated: bool,
) -> Result<(), ManifestError> {
    if store.lookup(&line.id).is_some() {
        store.patch_canonical_text(&line.id, &line.canonical_text)?;
        if regenerated {
            store.touch(&line.id)?;
        }
        return Ok(());
    }

    store.append(ArtifactDescriptor {
        id: line.id.clone(),
        speaker_id: line.speaker_id.clone(),
        filename: filename.to_string(),
        raw_text: line.raw_text.clone(),
        canonical_text: line.canonical_text.clone(),
        generated_at: Some(now_timestamp()),
    })
}

/// Temp file plus rename. Without `overwrite` an existing file is left alone
/// and reported as an error.
fn write_artifact(path: &Path, audio: &[u8], overwrite: bool) -> Result<(), GenerateError> {
    let artifact_err = |source: std::io::Error| GenerateError::Artifact {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(artifact_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(artifact_err)?;
    tmp.write_all(audio).map_err(artifact_err)?;
    if overwrite {
        tmp.persist(path).map_err(|e| artifact_err(e.error))?;
    } else {
        tmp.persist_noclobber(path).map_err(|e| artifact_err(e.error))?;
    }
    Ok(())
}
