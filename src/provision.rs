//! One-time trust root creation

use crate::codegen::{device_constants, render_header};
use crate::error::FwupError;
use crate::keys::{KeyMaterial, KeyPaths};
use std::fs;
use std::path::Path;
use tracing::info;

pub const HEADER_GUARD: &str = "FWUP_SECRETS_H";

/// Generate fresh key material, store it, and write the bootloader header.
///
/// Refuses to run when a signing key already exists at `paths`.
pub fn provision<P: AsRef<Path>>(paths: &KeyPaths, header_path: P) -> Result<KeyMaterial, FwupError> {
    if paths.signing_key.exists() {
        return Err(FwupError::AlreadyProvisioned(paths.signing_key.clone()));
    }

    let keys = KeyMaterial::generate();
    keys.store(paths)?;

    let header_path = header_path.as_ref();
    if let Some(parent) = header_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(header_path, render_header(HEADER_GUARD, &device_constants(&keys)))?;

    info!(
        secrets = %paths.signing_key.parent().unwrap_or(Path::new(".")).display(),
        header = %header_path.display(),
        "generated build secrets"
    );
    Ok(keys)
}
