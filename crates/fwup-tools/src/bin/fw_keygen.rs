//! Provision build secrets and the bootloader key header

use clap::Parser;
use fwup::{provision, FwupError};
use fwup_tools::{init_tracing, report, secrets_paths};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fw-keygen")]
#[command(about = "Generate the AES key, IV and signing keypair for a new device line")]
#[command(version)]
struct Cli {
    /// Directory to create the secrets in
    #[arg(long)]
    secrets_dir: Option<PathBuf>,
    /// C header for the bootloader build
    #[arg(long, default_value = "bootloader/inc/secrets.h")]
    header: PathBuf,
}

fn run(cli: Cli) -> Result<(), FwupError> {
    let paths = secrets_paths(cli.secrets_dir);
    provision(&paths, &cli.header)?;
    println!("{}", paths.verifying_key.display());
    Ok(())
}

fn main() -> ExitCode {
    init_tracing(false);
    report(run(Cli::parse()))
}
