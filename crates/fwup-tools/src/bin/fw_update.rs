//! Verify a firmware bundle and stream it to a bootloader over serial

use clap::Parser;
use fwup::{
    load_trusted_key, open_serial, Bundle, FwupError, TransferConfig, UpdateSession,
};
use fwup_tools::{init_tracing, report, secrets_paths};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "fw-update")]
#[command(about = "Send a firmware bundle to a device in update mode")]
#[command(version)]
struct Cli {
    /// Serial device, e.g. /dev/ttyACM0
    #[arg(long)]
    port: String,
    /// Bundle produced by fw-protect
    #[arg(long)]
    firmware: PathBuf,
    /// Verbose protocol logging; also skips the host-side version gate
    #[arg(long)]
    debug: bool,
    /// JSON transfer settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// PEM public key to verify against; defaults to the one in the secrets directory
    #[arg(long)]
    trusted_key: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<(), FwupError> {
    let config = match &cli.config {
        Some(path) => TransferConfig::from_file(path)?,
        None => TransferConfig::default(),
    };
    let key_path = cli
        .trusted_key
        .unwrap_or_else(|| secrets_paths(None).verifying_key);
    let trusted = load_trusted_key(&key_path)?;
    debug!(key = %key_path.display(), "loaded trusted key");

    let bundle = Bundle::decode(&fs::read(&cli.firmware)?)?;
    info!(
        version = bundle.metadata.version,
        size = bundle.metadata.firmware_size,
        note = %bundle.metadata.release_note,
        "loaded bundle"
    );

    let port = open_serial(&cli.port, &config)?;
    UpdateSession::new(port, config).run(&bundle, &trusted, cli.debug)?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    report(run(cli))
}
