//! sluice - resumable range downloads with optional streaming decryption
//!
//! Wires configuration, credentials and the HTTP range source into a
//! [`TransferOrchestrator`], logs its events while it runs and turns the
//! outcome into the process exit status.

mod cli;
mod error;
mod logging;

use crate::cli::{Cli, Commands, DownloadArgs};
use crate::error::CliError;
use clap::Parser;
use sluice_config::Config;
use sluice_events::EventReceiver;
use sluice_hash::Hash;
use sluice_net::{parse_url, HttpRangeSource, NetClient};
use sluice_transfer::{
    resolve_destination, ExitStatus, TransferContext, TransferMode, TransferOrchestrator,
    TransferOutcome, TransferRequest,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            // Usage errors are input errors, not clap's default status
            let _ = e.print();
            process::exit(ExitStatus::InputProcessingError.code());
        }
        Err(e) => e.exit(),
    };
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    let status = match run(cli).await {
        Ok(status) => status,
        Err(e) => {
            error!("Application error: {}", e);
            if !json_mode {
                eprintln!("Error: {e}");
            }
            e.exit_status()
        }
    };
    process::exit(status.code());
}

/// Main application logic
async fn run(cli: Cli) -> Result<ExitStatus, CliError> {
    info!("Starting sluice v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration with proper precedence:
    // 1. Start with file config (or defaults)
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;

    // 2. Merge environment variables
    config.merge_env()?;

    // 3. CLI flags are applied while building the request and mode
    let Commands::Download(args) = cli.command;
    let request = build_request(&config, &args)?;
    let mode = transfer_mode(&config, &args, &request)?;

    let client = NetClient::new(&config.net_config()).map_err(CliError::Setup)?;
    let credentials = config.credential_provider(&client)?;
    let source = Arc::new(HttpRangeSource::new(client, credentials));

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let (event_sender, event_receiver) = sluice_events::channel();
    let ctx = TransferContext::new(source)
        .with_buffer_size(config.buffer_size()?)
        .with_progress(config.progress()?)
        .with_events(event_sender)
        .with_cancellation(cancel);
    let orchestrator = TransferOrchestrator::new(ctx, mode, config.retry_policy()?);

    let outcome = execute_with_events(&orchestrator, &request, event_receiver).await;
    render_outcome(&request, &outcome, cli.global.json);

    Ok(match outcome {
        TransferOutcome::Success { .. } => ExitStatus::Success,
        TransferOutcome::Failed { reason } => ExitStatus::for_error(&reason),
    })
}

fn build_request(config: &Config, args: &DownloadArgs) -> Result<TransferRequest, CliError> {
    let base = config.base_url()?;
    let source = parse_url(&args.source, base.as_ref())?;
    let destination = resolve_destination(&source, &args.destination);

    let mut request = TransferRequest::new(source, destination, args.file_size)?;
    if let Some(hex) = &args.expected_digest {
        request = request.with_expected_digest(Hash::from_hex(hex)?);
    }
    Ok(request)
}

fn transfer_mode(
    config: &Config,
    args: &DownloadArgs,
    request: &TransferRequest,
) -> Result<TransferMode, CliError> {
    if !args.decrypt {
        let algorithm = request
            .expected_digest()
            .map_or(config.checksum.algorithm, Hash::algorithm);
        return Ok(TransferMode::Direct(algorithm));
    }
    let decryption = config.decryption_context(args.secret_key.as_deref())?;
    Ok(TransferMode::Decrypt(decryption))
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling transfer");
            cancel.cancel();
        }
    });
}

/// Run the transfer while logging its events as they arrive
async fn execute_with_events(
    orchestrator: &TransferOrchestrator,
    request: &TransferRequest,
    mut event_receiver: EventReceiver,
) -> TransferOutcome {
    let mut transfer = Box::pin(orchestrator.run(request));

    loop {
        select! {
            outcome = &mut transfer => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    logging::log_event_with_tracing(&event);
                }
                return outcome;
            }

            event = event_receiver.recv() => {
                if let Some(event) = event {
                    logging::log_event_with_tracing(&event);
                }
            }
        }
    }
}

/// Print the result on stdout: `<digest>  <path>` or a JSON object
fn render_outcome(request: &TransferRequest, outcome: &TransferOutcome, json: bool) {
    let destination = request.destination().display().to_string();
    match outcome {
        TransferOutcome::Success { digest, bytes } => {
            if json {
                let value = serde_json::json!({
                    "status": "success",
                    "destination": destination,
                    "bytes": bytes,
                    "digest": digest.as_ref().map(Hash::to_hex),
                    "algorithm": digest.as_ref().map(|d| d.algorithm().to_string()),
                });
                println!("{value}");
            } else if let Some(digest) = digest {
                println!("{}  {destination}", digest.to_hex());
            } else {
                println!("{destination}");
            }
        }
        TransferOutcome::Failed { reason } => {
            if json {
                let failure = sluice_events::FailureContext::from_error(reason);
                let value = serde_json::json!({
                    "status": "failed",
                    "destination": destination,
                    "error": failure,
                });
                println!("{value}");
            } else {
                eprintln!(
                    "Error: {}",
                    sluice_errors::UserFacingError::user_message(reason)
                );
            }
        }
    }
}

/// Directory for `--debug` log files
fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sluice")
        .join("logs")
}

fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let filter = |default: &str| {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default))
    };

    if debug_enabled {
        // Debug mode: structured JSON logs to file
        let log_dir = log_dir();
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Failed to create log directory: {e}");
        }

        let log_file = log_dir.join(format!(
            "sluice-{}.log",
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        ));

        match std::fs::File::create(&log_file) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .json()
                    .with_writer(file)
                    .with_env_filter(filter(
                        "info,sluice=debug,sluice_net=debug,sluice_transfer=debug",
                    ))
                    .init();

                eprintln!("Debug logging enabled: {}", log_file.display());
                return;
            }
            Err(e) => {
                eprintln!("Warning: Failed to create log file: {e}");
            }
        }
    }

    if json_mode {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter("warn,sluice=info"))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter("warn,sluice=info"))
            .init();
    }
}
