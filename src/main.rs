use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = voiceline::cli::Cli::parse();
    voiceline::run(cli)
}
