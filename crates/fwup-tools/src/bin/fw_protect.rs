//! Encrypt and sign a firmware image into an update bundle

use clap::Parser;
use fwup::{checked_version, protect_firmware, FwupError, KeyMaterial};
use fwup_tools::{init_tracing, report, secrets_paths};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "fw-protect")]
#[command(about = "Produce a signed, encrypted firmware bundle")]
struct Cli {
    /// Path to the raw firmware image
    #[arg(long)]
    infile: PathBuf,
    /// Where to write the bundle; the manifest goes to <outfile>.json
    #[arg(long)]
    outfile: PathBuf,
    /// Firmware version, 0..=65535
    #[arg(long)]
    version: u64,
    /// Release note carried in the bundle metadata; may be empty
    #[arg(long)]
    message: String,
    /// Directory holding the build secrets
    #[arg(long)]
    secrets_dir: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<(), FwupError> {
    let version = checked_version(cli.version)?;
    let keys = KeyMaterial::load(&secrets_paths(cli.secrets_dir))?;

    let manifest = protect_firmware(&cli.infile, &cli.outfile, version, &cli.message, &keys)?;
    info!(
        version = manifest.version,
        firmware_size = manifest.firmware_size,
        bundle_size = manifest.bundle_size,
        "bundle ready"
    );
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

fn main() -> ExitCode {
    init_tracing(false);
    report(run(Cli::parse()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_required() {
        let base = ["fw-protect", "--infile", "fw.bin", "--outfile", "fw.bundle", "--version", "3"];
        assert!(Cli::try_parse_from(base).is_err());

        let cli = Cli::try_parse_from(base.iter().copied().chain(["--message", ""])).unwrap();
        assert_eq!(cli.message, "");
        assert_eq!(cli.version, 3);
    }
}
