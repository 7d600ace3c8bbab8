//! Command-line interface definitions for the `ami-vault` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `ami-vault` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ami-vault",
    about = "Archive machine images to object storage, restore them, and expire old archives",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) global: GlobalArgs,
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Options shared by every subcommand.
#[derive(Debug, Args)]
pub(crate) struct GlobalArgs {
    /// Read configuration from this TOML file instead of the discovered
    /// `ami-vault.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config: Option<String>,
    /// Override the configured provider region.
    #[arg(long, global = true, value_name = "REGION")]
    pub(crate) region: Option<String>,
    /// Override the configured log directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub(crate) log_dir: Option<String>,
}

/// Workflows exposed by the binary.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Print the images that would be archived.
    #[command(name = "list", about = "List images eligible for archival")]
    List,
    /// Archive every eligible image, or one image by identifier.
    #[command(name = "backup", about = "Archive eligible images to object storage")]
    Backup(BackupCommand),
    /// Restore an archived image.
    #[command(name = "restore", about = "Restore the latest archive of an image")]
    Restore(RestoreCommand),
    /// Delete archives past the retention window.
    #[command(name = "cleanup", about = "Delete archives older than the retention window")]
    Cleanup,
}

/// Arguments for `ami-vault backup`.
#[derive(Debug, Args)]
pub(crate) struct BackupCommand {
    /// Archive only this image, regardless of eligibility.
    #[arg(long, value_name = "IMAGE_ID")]
    pub(crate) image_id: Option<String>,
}

/// Arguments for `ami-vault restore`.
#[derive(Debug, Args)]
pub(crate) struct RestoreCommand {
    /// Identifier of the archived image.
    #[arg(value_name = "IMAGE_ID")]
    pub(crate) image_id: String,
}
