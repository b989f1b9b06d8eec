use std::collections::{HashMap, HashSet};

use crate::dialogue::CanonicalLine;
use crate::identity::Identity;
use crate::manifest::{ArtifactDescriptor, Manifest};

/// A line whose identity is cached but whose canonical text moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub line: CanonicalLine,
    pub stored_text: String,
}

/// Classification of one extraction pass against the manifest.
///
/// The three sets are disjoint and keyed by identity. Manifest entries that the
/// extraction did not visit are not reported here; see [`orphans`].
#[derive(Debug, Clone, Default)]
pub struct CorpusDiff {
    pub to_generate: Vec<CanonicalLine>,
    pub text_changed: Vec<TextChange>,
    pub unchanged: Vec<Identity>,
    /// Lines with nothing left to speak after canonicalization.
    pub empty: Vec<CanonicalLine>,
    /// Repeats of an identity already classified in this pass.
    pub duplicates: usize,
}

pub fn classify(lines: &[CanonicalLine], manifest: &Manifest) -> CorpusDiff {
    let mut diff = CorpusDiff::default();
    let mut seen: HashSet<&Identity> = HashSet::new();
    let stored: HashMap<&Identity, &ArtifactDescriptor> =
        manifest.files.iter().map(|f| (&f.id, f)).collect();

    for line in lines {
        if !seen.insert(&line.id) {
            diff.duplicates += 1;
            continue;
        }

        match stored.get(&line.id) {
            None if line.canonical_text.is_empty() => diff.empty.push(line.clone()),
            None => diff.to_generate.push(line.clone()),
            Some(stored) if stored.canonical_text == line.canonical_text => {
                diff.unchanged.push(line.id.clone())
            }
            Some(stored) => diff.text_changed.push(TextChange {
                line: line.clone(),
                stored_text: stored.canonical_text.clone(),
            }),
        }
    }

    diff
}

/// Manifest ids that do not appear in `lines`, in manifest order.
///
/// An incomplete extraction makes live lines look orphaned, so this is only
/// ever acted upon by an explicit reconcile.
pub fn orphans(lines: &[CanonicalLine], manifest: &Manifest) -> Vec<Identity> {
    let present: HashSet<&Identity> = lines.iter().map(|l| &l.id).collect();
    manifest
        .files
        .iter()
        .filter(|f| !present.contains(&f.id))
        .map(|f| f.id.clone())
        .collect()
}
