use std::collections::BTreeMap;
use std::fs;

use voiceline::identity::{identity, Identity};
use voiceline::manifest::{
    reset_corrupt, ArtifactDescriptor, Manifest, ManifestError, ManifestStore, MANIFEST_VERSION,
};

fn descriptor(text: &str, speaker: &str) -> ArtifactDescriptor {
    let id = identity(text, speaker);
    ArtifactDescriptor {
        filename: format!("{speaker}_{id}.mp3"),
        id,
        speaker_id: speaker.to_string(),
        raw_text: text.to_string(),
        canonical_text: text.to_string(),
        generated_at: Some("2026-01-01T00:00:00Z".to_string()),
    }
}

#[test]
fn missing_file_opens_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = ManifestStore::open(dir.path().join("manifest.json")).unwrap();
    assert_eq!(store.manifest(), &Manifest::empty());
    assert!(!store.is_dirty());
}

#[test]
fn invalid_json_is_corrupt_and_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    fs::write(&path, "{ not json").unwrap();

    let err = ManifestStore::open(&path).unwrap_err();
    assert!(matches!(err, ManifestError::Corrupt { .. }));
    assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
}

#[test]
fn duplicate_ids_on_disk_are_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    let d = descriptor("Hi!", "george");
    let mut manifest = Manifest::empty();
    manifest.files = vec![d.clone(), d];
    manifest.total_files = 2;
    fs::write(&path, serde_json::to_string(&manifest).unwrap()).unwrap();

    let err = ManifestStore::open(&path).unwrap_err();
    assert!(matches!(err, ManifestError::Corrupt { reason, .. } if reason.contains("duplicate")));
}

#[test]
fn append_rejects_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ManifestStore::open(dir.path().join("manifest.json")).unwrap();
    store.append(descriptor("Hi!", "george")).unwrap();
    let err = store.append(descriptor("Hi!", "george")).unwrap_err();
    assert!(matches!(err, ManifestError::DuplicateId(_)));
    assert_eq!(store.manifest().files.len(), 1);
}

#[test]
fn save_keeps_total_in_step_and_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audio").join("manifest.json");
    let mut store = ManifestStore::open(&path).unwrap();
    store.append(descriptor("Hi!", "george")).unwrap();
    store.append(descriptor("Hello!", "matilda")).unwrap();
    let mut voices = BTreeMap::new();
    voices.insert("george".to_string(), "v1".to_string());
    store.record_voice_map(&voices);
    store.save().unwrap();
    assert!(!store.is_dirty());

    let raw = fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["totalFiles"], 2);
    assert_eq!(json["version"], MANIFEST_VERSION);
    assert_eq!(json["voiceMappings"]["george"], "v1");
    assert_eq!(json["files"][0]["speakerId"], "george");
    assert_eq!(json["files"][0]["canonicalText"], "Hi!");
    assert!(json["generatedAt"].as_str().unwrap().ends_with('Z'));

    let reopened = ManifestStore::open(&path).unwrap();
    assert_eq!(reopened.manifest(), store.manifest());
}

#[test]
fn save_leaves_no_temp_files_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    let mut store = ManifestStore::open(&path).unwrap();
    store.append(descriptor("Hi!", "george")).unwrap();
    store.save().unwrap();
    store.save().unwrap();

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["manifest.json".to_string()]);
}

#[test]
fn non_ascii_text_is_written_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    let mut store = ManifestStore::open(&path).unwrap();
    store.append(descriptor("🚀 George: Hi!", "george")).unwrap();
    store.save().unwrap();
    assert!(fs::read_to_string(&path).unwrap().contains("🚀 George: Hi!"));
}

#[test]
fn patch_changes_text_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ManifestStore::open(dir.path().join("manifest.json")).unwrap();
    let d = descriptor("Narrator: Welcome!", "narrator");
    let id = d.id.clone();
    store.append(d.clone()).unwrap();
    store.save().unwrap();

    assert!(store.patch_canonical_text(&id, "Welcome!").unwrap());
    assert!(store.is_dirty());
    let patched = store.lookup(&id).unwrap();
    assert_eq!(patched.canonical_text, "Welcome!");
    assert_eq!(patched.filename, d.filename);
    assert_eq!(patched.raw_text, d.raw_text);

    assert!(!store.patch_canonical_text(&id, "Welcome!").unwrap());
}

#[test]
fn patch_unknown_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ManifestStore::open(dir.path().join("manifest.json")).unwrap();
    let err = store
        .patch_canonical_text(&Identity::from_stored("00000000"), "x")
        .unwrap_err();
    assert!(matches!(err, ManifestError::UnknownId(_)));
}

#[test]
fn remove_keeps_lookup_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ManifestStore::open(dir.path().join("manifest.json")).unwrap();
    let a = descriptor("a", "george");
    let b = descriptor("b", "george");
    let c = descriptor("c", "george");
    for d in [&a, &b, &c] {
        store.append(d.clone()).unwrap();
    }

    assert_eq!(store.remove(&a.id).unwrap(), a);
    assert!(store.remove(&a.id).is_none());
    assert!(store.lookup(&a.id).is_none());
    assert_eq!(store.lookup(&c.id).unwrap(), &c);
    assert_eq!(store.lookup(&b.id).unwrap(), &b);
}

#[test]
fn unchanged_voice_map_does_not_dirty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    let mut voices = BTreeMap::new();
    voices.insert("george".to_string(), "v1".to_string());

    let mut store = ManifestStore::open(&path).unwrap();
    store.record_voice_map(&voices);
    assert!(store.save_if_dirty().unwrap());

    let mut store = ManifestStore::open(&path).unwrap();
    store.record_voice_map(&voices);
    assert!(!store.save_if_dirty().unwrap());
}

#[test]
fn legacy_layout_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    fs::write(
        &path,
        r#"{
  "version": "1.0",
  "generated_at": "2025-07-01 10:00:00",
  "total_files": 1,
  "voice_mappings": {"george": "VR6AewLTigWG4xSOukaG"},
  "files": [
    {
      "id": "5f6cfe01",
      "character": "george",
      "filename": "george_5f6cfe01.mp3",
      "text": "🚀 George: Hi!",
      "clean_text": "Hi!"
    }
  ]
}"#,
    )
    .unwrap();

    let store = ManifestStore::open(&path).unwrap();
    let entry = store.lookup(&Identity::from_stored("5f6cfe01")).unwrap();
    assert_eq!(entry.speaker_id, "george");
    assert_eq!(entry.canonical_text, "Hi!");
    assert_eq!(entry.generated_at, None);
    assert_eq!(store.manifest().generated_at, "2025-07-01 10:00:00");
}

#[test]
fn reset_corrupt_moves_file_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    fs::write(&path, "garbage").unwrap();

    let backup = reset_corrupt(&path).unwrap();
    assert!(!path.exists());
    assert_eq!(fs::read_to_string(&backup).unwrap(), "garbage");
    assert!(backup
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("manifest.json.corrupt-"));

    let store = ManifestStore::open(&path).unwrap();
    assert!(store.manifest().files.is_empty());
}
