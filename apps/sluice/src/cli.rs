//! Command line interface definition

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// sluice - resumable range downloads with optional streaming decryption
#[derive(Parser)]
#[command(name = "sluice")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resumable range downloads with optional streaming decryption")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Emit log lines as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Write debug logs to a file in the log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Download one file, resuming after interruptions
    #[command(alias = "dl")]
    Download(DownloadArgs),
}

#[derive(Args)]
pub struct DownloadArgs {
    /// Remote location (absolute URL, or relative to network.base_url)
    #[arg(long, short = 's', value_name = "URL")]
    pub source: String,

    /// Destination file, or an existing directory to place it in
    #[arg(long, short = 'd', value_name = "PATH")]
    pub destination: PathBuf,

    /// Size of the remote file in bytes
    #[arg(long, value_name = "BYTES")]
    pub file_size: u64,

    /// Pipe the download through the decryption tool
    #[arg(long)]
    pub decrypt: bool,

    /// Secret key for decryption (overrides decrypt.secret_key_path)
    #[arg(long, value_name = "PATH", requires = "decrypt")]
    pub secret_key: Option<PathBuf>,

    /// Fail unless the downloaded file has this digest (MD5 or BLAKE3 hex)
    #[arg(long, value_name = "HEX", conflicts_with = "decrypt")]
    pub expected_digest: Option<String>,
}
