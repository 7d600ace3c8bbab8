//! Binary entry point for the `ami-vault` CLI.

mod cli;

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;

use ami_vault::{
    ArchiveError, ArchiveOrchestrator, AwsBackend, AwsBackendError, BackupResult, ConfigError,
    ConfigOverrides, ImageRecord, RestoreResult, SweepSummary, SystemClock, VaultConfig, logging,
};

use cli::{Cli, Command, GlobalArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("backend error: {0}")]
    Backend(#[from] AwsBackendError),
    #[error("{0}")]
    Archive(#[from] ArchiveError<AwsBackendError>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli.global)?;
    let settings = config.orchestrator_settings()?;
    let _log_guard = init_logging(&config);

    let backend = AwsBackend::connect(&config).await?;
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());
    let orchestrator =
        ArchiveOrchestrator::new(backend, SystemClock, settings).with_cancellation(cancel);

    let mut stdout = io::stdout();
    match cli.command {
        Command::List => {
            let images = orchestrator.find_eligible().await?;
            write_images(&mut stdout, &images);
        }
        Command::Backup(args) => {
            let results = match args.image_id {
                Some(image_id) => vec![orchestrator.backup_one(&image_id).await?],
                None => orchestrator.backup_all().await?,
            };
            write_backups(&mut stdout, &results);
        }
        Command::Restore(args) => {
            let restored = orchestrator.restore_one(&args.image_id).await?;
            write_restore(&mut stdout, &restored);
        }
        Command::Cleanup => {
            let summary = orchestrator.cleanup().await?;
            write_sweep(&mut stdout, &summary);
        }
    }
    Ok(())
}

fn load_config(global: &GlobalArgs) -> Result<VaultConfig, ConfigError> {
    let config = VaultConfig::load(global.config.as_deref().map(Utf8Path::new))?;
    Ok(config.with_overrides(ConfigOverrides {
        region: global.region.clone(),
        log_dir: global.log_dir.clone(),
    }))
}

fn init_logging(config: &VaultConfig) -> Option<WorkerGuard> {
    match logging::init(Utf8Path::new(&config.log_dir)) {
        Ok(guard) => Some(guard),
        Err(err) => {
            logging::init_stderr().ok();
            warn!(error = %err, "file logging disabled");
            None
        }
    }
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; abandoning task monitoring");
            cancel.cancel();
        }
    });
}

fn write_images(mut target: impl Write, images: &[ImageRecord]) {
    for image in images {
        let created = image.creation_date_raw.as_deref().unwrap_or("-");
        writeln!(
            target,
            "{}\t{}\t{created}",
            image.id,
            image.display_name().unwrap_or("-")
        )
        .ok();
    }
}

fn write_backups(mut target: impl Write, results: &[BackupResult]) {
    for result in results {
        writeln!(
            target,
            "{}\t{}\t{}",
            result.image_id, result.task_id, result.location
        )
        .ok();
    }
}

fn write_restore(mut target: impl Write, restored: &RestoreResult) {
    writeln!(
        target,
        "{} restored as {}",
        restored.source_image_id, restored.restored_image_id
    )
    .ok();
}

fn write_sweep(mut target: impl Write, summary: &SweepSummary) {
    writeln!(
        target,
        "scanned {}, deleted {}, failed {}",
        summary.scanned,
        summary.deleted.len(),
        summary.failed.len()
    )
    .ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod main_tests;
