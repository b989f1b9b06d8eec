//! The manifest is the durable index of generated artifacts and the only state
//! carried between runs.
//!
//! Only one process may write a given manifest at a time. Nothing here locks
//! the file; running two syncs against the same manifest must be prevented by
//! whoever schedules them.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::identity::Identity;

pub const MANIFEST_VERSION: &str = "2.0";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("manifest io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("manifest already has an entry for {0}")]
    DuplicateId(Identity),
    #[error("manifest has no entry for {0}")]
    UnknownId(Identity),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub id: Identity,
    #[serde(alias = "character")]
    pub speaker_id: String,
    pub filename: String,
    #[serde(alias = "text")]
    pub raw_text: String,
    #[serde(alias = "clean_text")]
    pub canonical_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    #[serde(alias = "generated_at", default)]
    pub generated_at: String,
    #[serde(alias = "voice_mappings", default)]
    pub voice_mappings: BTreeMap<String, String>,
    #[serde(alias = "total_files", default)]
    pub total_files: usize,
    #[serde(default)]
    pub files: Vec<ArtifactDescriptor>,
}

impl Manifest {
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            generated_at: String::new(),
            voice_mappings: BTreeMap::new(),
            total_files: 0,
            files: Vec::new(),
        }
    }
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Owns the in-memory manifest and the path it is persisted to.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    manifest: Manifest,
    index: HashMap<Identity, usize>,
    dirty: bool,
}

impl ManifestStore {
    /// Loads the manifest at `path`, or starts an empty one if no file exists.
    /// An unreadable or invalid file is never replaced implicitly.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ManifestError> {
        let path = path.into();
        let manifest = match fs::read_to_string(&path) {
            Ok(raw) => parse(&path, &raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no manifest yet; starting empty");
                Manifest::empty()
            }
            Err(err) => {
                return Err(ManifestError::Corrupt {
                    path,
                    reason: format!("unreadable: {err}"),
                })
            }
        };

        let index = build_index(&manifest);
        Ok(Self {
            path,
            manifest,
            index,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lookup(&self, id: &Identity) -> Option<&ArtifactDescriptor> {
        self.index.get(id).map(|&pos| &self.manifest.files[pos])
    }

    pub fn append(&mut self, descriptor: ArtifactDescriptor) -> Result<(), ManifestError> {
        if self.index.contains_key(&descriptor.id) {
            return Err(ManifestError::DuplicateId(descriptor.id));
        }
        self.index
            .insert(descriptor.id.clone(), self.manifest.files.len());
        self.manifest.files.push(descriptor);
        self.dirty = true;
        Ok(())
    }

    /// Updates the stored canonical text. Returns whether anything changed.
    pub fn patch_canonical_text(
        &mut self,
        id: &Identity,
        canonical_text: &str,
    ) -> Result<bool, ManifestError> {
        let entry = self.entry_mut(id)?;
        if entry.canonical_text == canonical_text {
            return Ok(false);
        }
        entry.canonical_text = canonical_text.to_string();
        self.dirty = true;
        Ok(true)
    }

    /// Refreshes the generation timestamp after the audio was rewritten.
    pub fn touch(&mut self, id: &Identity) -> Result<(), ManifestError> {
        let entry = self.entry_mut(id)?;
        entry.generated_at = Some(now_timestamp());
        self.dirty = true;
        Ok(())
    }

    /// Removes an entry. Only the explicit reconcile pass calls this.
    pub fn remove(&mut self, id: &Identity) -> Option<ArtifactDescriptor> {
        let pos = self.index.remove(id)?;
        let removed = self.manifest.files.remove(pos);
        self.index = build_index(&self.manifest);
        self.dirty = true;
        Some(removed)
    }

    pub fn record_voice_map(&mut self, voice_map: &BTreeMap<String, String>) {
        if &self.manifest.voice_mappings != voice_map {
            self.manifest.voice_mappings = voice_map.clone();
            self.dirty = true;
        }
    }

    /// Writes the manifest atomically: temp file in the same directory, then rename.
    pub fn save(&mut self) -> Result<(), ManifestError> {
        self.manifest.version = MANIFEST_VERSION.to_string();
        self.manifest.total_files = self.manifest.files.len();
        self.manifest.generated_at = now_timestamp();

        let mut json = serde_json::to_string_pretty(&self.manifest).map_err(|err| {
            ManifestError::Corrupt {
                path: self.path.clone(),
                reason: format!("serialize: {err}"),
            }
        })?;
        json.push('\n');

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|source| self.io_err(source))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|source| self.io_err(source))?;
        tmp.write_all(json.as_bytes())
            .map_err(|source| self.io_err(source))?;
        tmp.as_file()
            .sync_all()
            .map_err(|source| self.io_err(source))?;
        tmp.persist(&self.path)
            .map_err(|err| self.io_err(err.error))?;

        self.dirty = false;
        tracing::debug!(
            path = %self.path.display(),
            total_files = self.manifest.total_files,
            "manifest saved"
        );
        Ok(())
    }

    /// Saves only when something changed since the last load or save.
    pub fn save_if_dirty(&mut self) -> Result<bool, ManifestError> {
        if !self.dirty {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    fn entry_mut(&mut self, id: &Identity) -> Result<&mut ArtifactDescriptor, ManifestError> {
        match self.index.get(id) {
            Some(&pos) => Ok(&mut self.manifest.files[pos]),
            None => Err(ManifestError::UnknownId(id.clone())),
        }
    }

    fn io_err(&self, source: std::io::Error) -> ManifestError {
        ManifestError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn build_index(manifest: &Manifest) -> HashMap<Identity, usize> {
    manifest
        .files
        .iter()
        .enumerate()
        .map(|(pos, f)| (f.id.clone(), pos))
        .collect()
}

fn parse(path: &Path, raw: &str) -> Result<Manifest, ManifestError> {
    let manifest: Manifest = serde_json::from_str(raw).map_err(|err| ManifestError::Corrupt {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut seen = HashSet::new();
    for file in &manifest.files {
        if !seen.insert(&file.id) {
            return Err(ManifestError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("duplicate id {}", file.id),
            });
        }
    }

    Ok(manifest)
}

/// Moves an unreadable manifest aside so a fresh one can be started.
/// Returns where the old file went.
pub fn reset_corrupt(path: &Path) -> Result<PathBuf, ManifestError> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "manifest.json".to_string());
    let backup = path.with_file_name(format!("{name}.corrupt-{stamp}"));
    fs::rename(path, &backup).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(backup)
}
