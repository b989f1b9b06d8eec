//! Wires the stages together: canonicalize, identify, diff against the
//! manifest, patch stale text, generate what is missing.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::canonical::Canonicalizer;
use crate::config::{is_safe_speaker_id, Config, PreconditionError};
use crate::dialogue::{CanonicalLine, DialogueLine};
use crate::diff::{self, CorpusDiff, TextChange};
use crate::generator::{artifact_filename, FailedLine, GenerateError, Generator, Job, JobReason};
use crate::identity::Identity;
use crate::manifest::{ArtifactDescriptor, ManifestError, ManifestStore};
use crate::tts::{FailureKind, Synthesizer};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
}

/// Everything a run needs from configuration, fixed for the run's lifetime.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub voice_map: BTreeMap<String, String>,
    pub audio_dir: PathBuf,
    pub artifact_extension: String,
    pub pacing: Duration,
    /// When set, a changed canonical text also regenerates the audio instead
    /// of only patching the manifest.
    pub regenerate_stale: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            voice_map: config.voice_map.clone(),
            audio_dir: config.audio_dir(),
            artifact_extension: config.artifact_extension.clone(),
            pacing: config.pacing(),
            regenerate_stale: config.regenerate_stale,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Ids whose audio is redone even though it exists.
    pub regenerate: Vec<Identity>,
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub diff: CorpusDiff,
    pub jobs: Vec<Job>,
    /// Text changes applied to the manifest without touching audio.
    pub patches: Vec<TextChange>,
    pub unknown_regenerate: Vec<Identity>,
}

impl SyncPlan {
    pub fn needs_synthesis(&self) -> bool {
        !self.jobs.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub generated: usize,
    pub reused_existing: usize,
    pub text_patched: usize,
    pub unchanged: usize,
    pub skipped_empty: usize,
    pub duplicates: usize,
    pub failed: Vec<FailedLine>,
    pub not_attempted: usize,
    pub halted: Option<String>,
    pub unknown_regenerate: Vec<Identity>,
}

impl RunSummary {
    pub fn permanent_failures(&self) -> impl Iterator<Item = &FailedLine> {
        self.failed
            .iter()
            .filter(|f| f.kind == FailureKind::Permanent)
    }

    /// False when the operator has to act: the run halted or a line was rejected.
    pub fn is_clean(&self) -> bool {
        self.halted.is_none() && self.permanent_failures().next().is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneReport {
    pub removed: Vec<ArtifactDescriptor>,
    pub deleted_files: usize,
}

pub struct Pipeline {
    config: PipelineConfig,
    canonicalizer: Canonicalizer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, canonicalizer: Canonicalizer) -> Self {
        Self {
            config,
            canonicalizer,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn canonical_lines(&self, lines: &[DialogueLine]) -> Vec<CanonicalLine> {
        lines
            .iter()
            .map(|line| CanonicalLine::from_line(line, &self.canonicalizer))
            .collect()
    }

    pub fn plan(&self, lines: &[DialogueLine], store: &ManifestStore, options: &SyncOptions) -> SyncPlan {
        let canonical = self.canonical_lines(lines);
        let diff = diff::classify(&canonical, store.manifest());

        let mut jobs: Vec<Job> = diff.to_generate.iter().cloned().map(Job::new).collect();
        let mut patches = Vec::new();
        for change in &diff.text_changed {
            if self.config.regenerate_stale && !change.line.canonical_text.is_empty() {
                jobs.push(Job {
                    line: change.line.clone(),
                    reason: JobReason::Stale,
                });
            } else {
                patches.push(change.clone());
            }
        }

        let mut unknown_regenerate = Vec::new();
        let by_id: HashMap<&Identity, &CanonicalLine> = canonical.iter().map(|l| (&l.id, l)).collect();
        for id in dedup(&options.regenerate) {
            if jobs.iter().any(|job| &job.line.id == id) {
                continue;
            }
            let Some(stored) = store.lookup(id) else {
                tracing::warn!(id = %id, "cannot regenerate: id not in manifest");
                unknown_regenerate.push(id.clone());
                continue;
            };

            let line = match by_id.get(id) {
                Some(line) => (*line).clone(),
                None => CanonicalLine {
                    id: stored.id.clone(),
                    raw_text: stored.raw_text.clone(),
                    speaker_id: stored.speaker_id.clone(),
                    canonical_text: self.canonicalizer.canonicalize(&stored.raw_text),
                },
            };
            if line.canonical_text.is_empty() {
                tracing::warn!(id = %id, "cannot regenerate: nothing left to speak");
                continue;
            }

            patches.retain(|change| &change.line.id != id);
            jobs.push(Job {
                line,
                reason: JobReason::Explicit,
            });
        }

        SyncPlan {
            diff,
            jobs,
            patches,
            unknown_regenerate,
        }
    }

    /// Every job must have a voice and a speaker id usable in a filename.
    pub fn check_preconditions(&self, plan: &SyncPlan) -> Result<(), PreconditionError> {
        let mut missing = BTreeSet::new();
        for job in &plan.jobs {
            let speaker = &job.line.speaker_id;
            if !is_safe_speaker_id(speaker) {
                return Err(PreconditionError::InvalidConfig(format!(
                    "speaker id {speaker:?} cannot be used in artifact filenames"
                )));
            }
            if !self.config.voice_map.contains_key(speaker) {
                missing.insert(speaker.clone());
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(PreconditionError::MissingVoice {
                speakers: missing.into_iter().collect(),
            })
        }
    }

    /// Applies text patches, then generates the planned jobs. `synth` may be
    /// `None` only when the plan has no jobs.
    pub fn execute<S: Synthesizer + ?Sized>(
        &self,
        plan: &SyncPlan,
        store: &mut ManifestStore,
        synth: Option<&S>,
    ) -> Result<RunSummary, SyncError> {
        let synth = if plan.needs_synthesis() {
            self.check_preconditions(plan)?;
            Some(synth.ok_or_else(|| {
                PreconditionError::InvalidConfig("no synthesis backend available".to_string())
            })?)
        } else {
            None
        };

        let mut summary = RunSummary {
            unchanged: plan.diff.unchanged.len(),
            skipped_empty: plan.diff.empty.len(),
            duplicates: plan.diff.duplicates,
            unknown_regenerate: plan.unknown_regenerate.clone(),
            ..RunSummary::default()
        };

        store.record_voice_map(&self.config.voice_map);

        for change in &plan.patches {
            if store.patch_canonical_text(&change.line.id, &change.line.canonical_text)? {
                tracing::info!(
                    id = %change.line.id,
                    old = %change.stored_text,
                    new = %change.line.canonical_text,
                    "patched canonical text"
                );
                summary.text_patched += 1;
            }
        }
        store.save_if_dirty()?;

        if let Some(synth) = synth {
            tracing::info!(
                backend = synth.name(),
                jobs = plan.jobs.len(),
                rules = Canonicalizer::RULES_VERSION,
                "generating"
            );
            let report = Generator::new(synth, &self.config).run(&plan.jobs, store)?;
            summary.generated = report.generated;
            summary.reused_existing = report.reused_existing;
            summary.failed = report.failed;
            summary.not_attempted = report.not_attempted;
            summary.halted = report.halted;
        }

        store.save_if_dirty()?;
        Ok(summary)
    }

    /// Plan, check and execute in one go.
    pub fn sync<S: Synthesizer + ?Sized>(
        &self,
        lines: &[DialogueLine],
        store: &mut ManifestStore,
        synth: &S,
        options: &SyncOptions,
    ) -> Result<RunSummary, SyncError> {
        let plan = self.plan(lines, store, options);
        self.execute(&plan, store, Some(synth))
    }

    /// Re-runs the Canonicalizer over every stored raw text, whether or not
    /// the latest extraction visits the entry. Changed entries are patched,
    /// or with `regenerate` queued for new audio under the same id and
    /// filename. Entries that clean to nothing are only ever patched.
    pub fn plan_recanonicalize(&self, store: &ManifestStore, regenerate: bool) -> SyncPlan {
        let mut plan = SyncPlan::default();
        for stored in &store.manifest().files {
            let line = CanonicalLine {
                id: stored.id.clone(),
                raw_text: stored.raw_text.clone(),
                speaker_id: stored.speaker_id.clone(),
                canonical_text: self.canonicalizer.canonicalize(&stored.raw_text),
            };
            if line.canonical_text == stored.canonical_text {
                plan.diff.unchanged.push(line.id);
                continue;
            }

            let change = TextChange {
                line,
                stored_text: stored.canonical_text.clone(),
            };
            if regenerate && !change.line.canonical_text.is_empty() {
                plan.jobs.push(Job {
                    line: change.line.clone(),
                    reason: JobReason::Stale,
                });
            } else {
                plan.patches.push(change.clone());
            }
            plan.diff.text_changed.push(change);
        }
        plan
    }

    /// Manifest entries the given extraction no longer mentions.
    pub fn orphans(&self, lines: &[DialogueLine], store: &ManifestStore) -> Vec<Identity> {
        diff::orphans(&self.canonical_lines(lines), store.manifest())
    }

    /// Drops the given entries from the manifest and, if asked, their audio.
    pub fn prune(
        &self,
        ids: &[Identity],
        store: &mut ManifestStore,
        delete_artifacts: bool,
    ) -> Result<PruneReport, ManifestError> {
        let mut report = PruneReport::default();
        for id in ids {
            let Some(removed) = store.remove(id) else {
                continue;
            };
            if delete_artifacts {
                let path = self.config.audio_dir.join(&removed.filename);
                match std::fs::remove_file(&path) {
                    Ok(()) => report.deleted_files += 1,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "could not delete artifact")
                    }
                }
            }
            tracing::info!(id = %removed.id, file = %removed.filename, "pruned");
            report.removed.push(removed);
        }
        store.save_if_dirty()?;
        Ok(report)
    }

    pub fn artifact_path(&self, speaker_id: &str, id: &Identity) -> PathBuf {
        self.config
            .audio_dir
            .join(artifact_filename(speaker_id, id, &self.config.artifact_extension))
    }
}

fn dedup(ids: &[Identity]) -> Vec<&Identity> {
    let mut seen = BTreeSet::new();
    ids.iter().filter(|id| seen.insert(*id)).collect()
}
