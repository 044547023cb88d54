use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    mangashelf::logging::init().context("init logging")?;

    let cli = mangashelf::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let global = &cli.global;
    match cli.command {
        mangashelf::cli::Command::Library => {
            mangashelf::commands::library(global)
                .await
                .context("library")?;
        }
        mangashelf::cli::Command::Chapters(args) => {
            mangashelf::commands::chapters(global, args)
                .await
                .context("chapters")?;
        }
        mangashelf::cli::Command::Read(args) => {
            mangashelf::commands::read(global, args)
                .await
                .context("read")?;
        }
        mangashelf::cli::Command::Progress(args) => {
            mangashelf::commands::progress(global, args)
                .await
                .context("progress")?;
        }
        mangashelf::cli::Command::Manifest {
            command: mangashelf::cli::ManifestCommand::Generate(args),
        } => {
            mangashelf::generate::run(args).context("manifest generate")?;
        }
    }

    Ok(())
}
