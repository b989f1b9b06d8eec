use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "voiceline", version, about = "Keep synthesized dialogue audio in sync with the dialogue text")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, value_name = "PATH", help = "Config file (default: ./voiceline.json, then user config)")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Sync(SyncArgs),
    Status(StatusArgs),
    Reconcile(ReconcileArgs),
    Recanonicalize(RecanonicalizeArgs),
    Clean(CleanArgs),
    ResetManifest(ResetManifestArgs),
    Backends(BackendsArgs),
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    #[arg(long, value_name = "PATH", help = "Extracted dialogue JSON ('-' for stdin)")]
    pub input: PathBuf,

    #[arg(long, help = "Show what would happen without calling the synthesis backend")]
    pub dry_run: bool,

    #[arg(long, value_name = "ID", help = "Regenerate audio for this id even if it exists")]
    pub regenerate: Vec<String>,

    #[arg(long, help = "Regenerate audio for lines whose canonical text changed")]
    pub regenerate_stale: bool,

    #[arg(long, value_name = "MS", help = "Override the pause between synthesis calls")]
    pub pacing_ms: Option<u64>,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    #[arg(long, value_name = "PATH", help = "Latest complete extraction ('-' for stdin)")]
    pub input: PathBuf,

    #[arg(long, help = "Remove orphaned entries from the manifest")]
    pub apply: bool,

    #[arg(long, requires = "apply", help = "Also delete the orphaned audio files")]
    pub delete_artifacts: bool,
}

#[derive(Args, Debug)]
pub struct RecanonicalizeArgs {
    #[arg(long, help = "Write the refreshed canonical text to the manifest")]
    pub apply: bool,

    #[arg(long, requires = "apply", help = "Also regenerate audio for entries whose text changed")]
    pub regenerate: bool,

    #[arg(long, value_name = "MS", help = "Override the pause between synthesis calls")]
    pub pacing_ms: Option<u64>,

    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    #[arg(value_name = "TEXT", help = "Raw dialogue text")]
    pub text: String,

    #[arg(long, help = "Speaker id; also prints the identity and artifact filename")]
    pub speaker: Option<String>,
}

#[derive(Args, Debug)]
pub struct ResetManifestArgs {
    #[arg(long, help = "Confirm moving an unreadable manifest aside")]
    pub confirm: bool,
}

#[derive(Args, Debug)]
pub struct BackendsArgs {
    #[arg(long, help = "Output as JSON")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[arg(long, help = "Show current config as JSON")]
    pub show: bool,

    #[arg(long, help = "Create default config file")]
    pub init: bool,

    #[arg(long, help = "Validate configuration")]
    pub validate: bool,
}
