pub mod canonical;
pub mod cli;
pub mod config;
pub mod dialogue;
pub mod diff;
pub mod generator;
pub mod identity;
pub mod manifest;
pub mod pipeline;
pub mod tts;

use anyhow::{bail, Context};
use cli::{Cli, Commands};
use config::Config;
use identity::Identity;
use manifest::{ManifestError, ManifestStore};
use pipeline::{Pipeline, PipelineConfig, RunSummary, SyncOptions, SyncPlan};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub fn run(cli: Cli) -> anyhow::Result<()> {
    setup_tracing(cli.verbose);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Sync(args) => sync(args, config_path),
        Commands::Status(args) => status(args, config_path),
        Commands::Reconcile(args) => reconcile(args, config_path),
        Commands::Recanonicalize(args) => recanonicalize(args, config_path),
        Commands::Clean(args) => clean(args, config_path),
        Commands::ResetManifest(args) => reset_manifest(args, config_path),
        Commands::Backends(args) => backends(args),
        Commands::Config(args) => config_cmd(args, config_path),
    }
}

fn setup_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::load(path).context("load config")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn open_manifest(config: &Config) -> anyhow::Result<ManifestStore> {
    match ManifestStore::open(config.manifest_path()) {
        Ok(store) => Ok(store),
        Err(err @ ManifestError::Corrupt { .. }) => Err(anyhow::Error::new(err).context(
            "refusing to continue with an unreadable manifest; inspect it, or run \
             `voiceline reset-manifest --confirm` to move it aside",
        )),
        Err(err) => Err(err).context("open manifest"),
    }
}

fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    Ok(Pipeline::new(
        PipelineConfig::from_config(config),
        config.canonicalizer()?,
    ))
}

fn sync(args: cli::SyncArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = Config::load(config_path).context("load config")?;
    if args.regenerate_stale {
        config.regenerate_stale = true;
    }
    if let Some(pacing_ms) = args.pacing_ms {
        config.pacing_ms = pacing_ms;
    }
    config.validate().context("invalid configuration")?;

    let mut regenerate = Vec::new();
    for raw in &args.regenerate {
        match Identity::parse(raw) {
            Some(id) => regenerate.push(id),
            None => bail!("--regenerate expects a hex id, got {raw:?}"),
        }
    }

    let lines = dialogue::read_lines(&args.input).context("read dialogue input")?;
    let pipeline = build_pipeline(&config)?;
    let mut store = open_manifest(&config)?;

    tracing::info!(
        lines = lines.len(),
        manifest = %store.path().display(),
        entries = store.manifest().files.len(),
        "loaded"
    );

    let plan = pipeline.plan(&lines, &store, &SyncOptions { regenerate });

    if args.dry_run {
        return print_plan(&plan, args.json);
    }

    pipeline.check_preconditions(&plan)?;
    let backend = if plan.needs_synthesis() {
        Some(tts::select_backend(&config)?)
    } else {
        None
    };

    let summary = pipeline.execute(&plan, &mut store, backend.as_deref())?;
    print_summary(&summary, args.json)?;
    finish_run(&summary)
}

fn finish_run(summary: &RunSummary) -> anyhow::Result<()> {
    if let Some(reason) = &summary.halted {
        bail!("run halted: {reason}");
    }
    let rejected = summary.permanent_failures().count();
    if rejected > 0 {
        bail!("{rejected} line(s) were rejected by the synthesis service and need attention");
    }
    Ok(())
}

#[derive(Serialize)]
struct PlanView<'a> {
    to_generate: Vec<JobView<'a>>,
    text_changed: usize,
    patches: usize,
    unchanged: usize,
    skipped_empty: usize,
    duplicates: usize,
    unknown_regenerate: &'a [Identity],
}

#[derive(Serialize)]
struct JobView<'a> {
    id: &'a Identity,
    speaker_id: &'a str,
    canonical_text: &'a str,
    reason: generator::JobReason,
}

fn print_plan(plan: &SyncPlan, json: bool) -> anyhow::Result<()> {
    let view = PlanView {
        to_generate: plan
            .jobs
            .iter()
            .map(|job| JobView {
                id: &job.line.id,
                speaker_id: &job.line.speaker_id,
                canonical_text: &job.line.canonical_text,
                reason: job.reason,
            })
            .collect(),
        text_changed: plan.diff.text_changed.len(),
        patches: plan.patches.len(),
        unchanged: plan.diff.unchanged.len(),
        skipped_empty: plan.diff.empty.len(),
        duplicates: plan.diff.duplicates,
        unknown_regenerate: &plan.unknown_regenerate,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("Would synthesize: {}", view.to_generate.len());
    for job in &view.to_generate {
        println!("  [{}] {} ({:?}): {}", job.speaker_id, job.id, job.reason, job.canonical_text);
    }
    println!("Text patches: {}", view.patches);
    println!("Unchanged: {}", view.unchanged);
    println!("Empty after cleaning: {}", view.skipped_empty);
    println!("Duplicates in input: {}", view.duplicates);
    for id in view.unknown_regenerate {
        println!("Unknown id for --regenerate: {id}");
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("Generated: {}", summary.generated);
    println!("Reused existing: {}", summary.reused_existing);
    println!("Text patched: {}", summary.text_patched);
    println!("Unchanged: {}", summary.unchanged);
    println!("Failed: {}", summary.failed.len());
    for failed in &summary.failed {
        println!(
            "  [{}] {} {:?}: {}",
            failed.speaker_id, failed.id, failed.kind, failed.message
        );
    }
    if summary.not_attempted > 0 {
        println!("Not attempted: {}", summary.not_attempted);
    }
    if let Some(reason) = &summary.halted {
        println!("Halted: {reason}");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    manifest: PathBuf,
    version: String,
    generated_at: String,
    total_files: usize,
    by_speaker: BTreeMap<String, usize>,
    missing_artifacts: Vec<String>,
    speakers_without_voice: Vec<String>,
}

fn status(args: cli::StatusArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let store = open_manifest(&config)?;
    let manifest = store.manifest();
    let audio_dir = config.audio_dir();

    let mut by_speaker: BTreeMap<String, usize> = BTreeMap::new();
    let mut missing_artifacts = Vec::new();
    for file in &manifest.files {
        *by_speaker.entry(file.speaker_id.clone()).or_default() += 1;
        if !audio_dir.join(&file.filename).exists() {
            missing_artifacts.push(file.filename.clone());
        }
    }
    let speakers_without_voice = by_speaker
        .keys()
        .filter(|speaker| !config.voice_map.contains_key(*speaker))
        .cloned()
        .collect();

    let report = StatusReport {
        manifest: store.path().to_path_buf(),
        version: manifest.version.clone(),
        generated_at: manifest.generated_at.clone(),
        total_files: manifest.files.len(),
        by_speaker,
        missing_artifacts,
        speakers_without_voice,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Manifest: {}", report.manifest.display());
    println!("Version: {}", report.version);
    if !report.generated_at.is_empty() {
        println!("Generated at: {}", report.generated_at);
    }
    println!("Total files: {}", report.total_files);
    for (speaker, count) in &report.by_speaker {
        println!("  {speaker}: {count}");
    }
    if !report.missing_artifacts.is_empty() {
        println!("Missing artifacts: {}", report.missing_artifacts.len());
        for file in &report.missing_artifacts {
            println!("  {file}");
        }
    }
    for speaker in &report.speakers_without_voice {
        println!("No voice configured for: {speaker}");
    }
    Ok(())
}

fn reconcile(args: cli::ReconcileArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let lines = dialogue::read_lines(&args.input).context("read dialogue input")?;
    if lines.is_empty() {
        bail!("refusing to reconcile against an empty extraction");
    }
    let pipeline = build_pipeline(&config)?;
    let mut store = open_manifest(&config)?;

    let orphans = pipeline.orphans(&lines, &store);
    if orphans.is_empty() {
        println!("No orphaned entries");
        return Ok(());
    }

    if !args.apply {
        println!("Orphaned entries: {}", orphans.len());
        for id in &orphans {
            if let Some(entry) = store.lookup(id) {
                println!("  [{}] {} {}", entry.speaker_id, entry.filename, entry.canonical_text);
            }
        }
        println!("Re-run with --apply to remove them");
        return Ok(());
    }

    let report = pipeline
        .prune(&orphans, &mut store, args.delete_artifacts)
        .context("prune manifest")?;
    println!("Removed entries: {}", report.removed.len());
    if args.delete_artifacts {
        println!("Deleted files: {}", report.deleted_files);
    }
    Ok(())
}

#[derive(Serialize)]
struct TextChangeView<'a> {
    id: &'a Identity,
    speaker_id: &'a str,
    stored_text: &'a str,
    canonical_text: &'a str,
}

fn recanonicalize(args: cli::RecanonicalizeArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = Config::load(config_path).context("load config")?;
    if let Some(pacing_ms) = args.pacing_ms {
        config.pacing_ms = pacing_ms;
    }
    config.validate().context("invalid configuration")?;

    let pipeline = build_pipeline(&config)?;
    let mut store = open_manifest(&config)?;
    let plan = pipeline.plan_recanonicalize(&store, args.regenerate);

    if !args.apply {
        let changes: Vec<TextChangeView> = plan
            .diff
            .text_changed
            .iter()
            .map(|change| TextChangeView {
                id: &change.line.id,
                speaker_id: &change.line.speaker_id,
                stored_text: &change.stored_text,
                canonical_text: &change.line.canonical_text,
            })
            .collect();
        if args.json {
            println!("{}", serde_json::to_string_pretty(&changes)?);
            return Ok(());
        }
        println!("Stale canonical text: {}", changes.len());
        for change in &changes {
            println!(
                "  [{}] {}: {:?} -> {:?}",
                change.speaker_id, change.id, change.stored_text, change.canonical_text
            );
        }
        if !changes.is_empty() {
            println!("Re-run with --apply to update them");
        }
        return Ok(());
    }

    pipeline.check_preconditions(&plan)?;
    let backend = if plan.needs_synthesis() {
        Some(tts::select_backend(&config)?)
    } else {
        None
    };

    let summary = pipeline.execute(&plan, &mut store, backend.as_deref())?;
    print_summary(&summary, args.json)?;
    finish_run(&summary)
}

fn clean(args: cli::CleanArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("load config")?;
    let canonicalizer = config.canonicalizer()?;
    println!("{}", canonicalizer.canonicalize(&args.text));

    if let Some(speaker) = args.speaker {
        let id = Identity::of(&args.text, &speaker);
        println!("id: {id}");
        println!(
            "file: {}",
            generator::artifact_filename(&speaker, &id, &config.artifact_extension)
        );
    }
    Ok(())
}

fn reset_manifest(args: cli::ResetManifestArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("load config")?;
    let path = config.manifest_path();

    match ManifestStore::open(&path) {
        Ok(store) => {
            println!(
                "Manifest at {} is readable ({} entries); nothing to reset",
                path.display(),
                store.manifest().files.len()
            );
            Ok(())
        }
        Err(ManifestError::Corrupt { reason, .. }) => {
            if !args.confirm {
                bail!(
                    "manifest at {} is corrupt ({reason}); pass --confirm to move it aside",
                    path.display()
                );
            }
            let backup = manifest::reset_corrupt(&path)?;
            tracing::warn!(backup = %backup.display(), "corrupt manifest moved aside");
            println!("Moved corrupt manifest to {}", backup.display());
            Ok(())
        }
        Err(err) => Err(err).context("open manifest"),
    }
}

fn backends(args: cli::BackendsArgs) -> anyhow::Result<()> {
    let info = tts::backends_info();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Available backends:");
    for backend in info {
        let status = if backend.available { "available" } else { "unavailable" };
        println!("- {} ({})", backend.name, status);
    }
    Ok(())
}

fn config_cmd(args: cli::ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    if args.init {
        let path = Config::init_default()?;
        println!("Initialized config at {}", path.display());
        return Ok(());
    }

    if args.show {
        let config = Config::load(config_path)?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if args.validate {
        let config = Config::load(config_path)?;
        config.validate()?;
        println!("Config OK");
        return Ok(());
    }

    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_path()?,
    };
    println!("{}", path.display());
    Ok(())
}
