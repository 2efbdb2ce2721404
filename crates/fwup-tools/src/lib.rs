//! Shared plumbing for the fw-protect, fw-update and fw-keygen binaries

use fwup::{FwupError, KeyPaths};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the stderr subscriber. `RUST_LOG` wins over `debug`.
pub fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();
}

/// `--secrets-dir` if given, else `FWUP_SECRETS_DIR`, else `./secrets`
pub fn secrets_paths(secrets_dir: Option<PathBuf>) -> KeyPaths {
    match secrets_dir {
        Some(dir) => KeyPaths::from_dir(dir),
        None => KeyPaths::from_env(),
    }
}

/// Log a fatal error with its hint and map it to the process exit code
pub fn report(result: Result<(), FwupError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            if let Some(hint) = e.suggestion() {
                error!("hint: {}", hint);
            }
            ExitCode::from(e.exit_code())
        }
    }
}
