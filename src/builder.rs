//! Bundle construction: firmware image + version + release note -> signed bundle

use crate::bundle::{Bundle, Metadata};
use crate::crypto::{self, FirmwareEncryption};
use crate::error::FwupError;
use crate::keys::KeyMaterial;
use crate::manifest::BundleManifest;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Build a signed, encrypted bundle from a raw firmware image
pub fn build_bundle(
    firmware: &[u8],
    version: u16,
    release_note: &str,
    keys: &KeyMaterial,
) -> Result<Bundle, FwupError> {
    let metadata = Metadata::new(version, firmware.len(), release_note)?;

    warn!(
        nonce = %FirmwareEncryption::from_key_material(keys).nonce_fingerprint(),
        "AES-GCM nonce is the fixed build IV; every bundle under this key reuses it"
    );

    let bundle = crypto::seal(metadata, firmware, keys)?;
    info!(
        version,
        firmware_size = bundle.metadata.firmware_size,
        bundle_size = bundle.encoded_len(),
        "built firmware bundle"
    );
    Ok(bundle)
}

/// Builder-style front end to [`build_bundle`]
#[derive(Debug)]
pub struct BundleBuilder<'k> {
    keys: &'k KeyMaterial,
    version: u16,
    release_note: String,
}

impl<'k> BundleBuilder<'k> {
    pub fn new(keys: &'k KeyMaterial) -> Self {
        Self {
            keys,
            version: 0,
            release_note: String::new(),
        }
    }

    pub fn version(mut self, version: u16) -> Self {
        self.version = version;
        self
    }

    pub fn release_note(mut self, note: impl Into<String>) -> Self {
        self.release_note = note.into();
        self
    }

    pub fn build(&self, firmware: &[u8]) -> Result<Bundle, FwupError> {
        build_bundle(firmware, self.version, &self.release_note, self.keys)
    }
}

/// Read `infile`, protect it, write the bundle to `outfile` and its manifest
/// to `outfile.json`.
pub fn protect_firmware<P: AsRef<Path>, Q: AsRef<Path>>(
    infile: P,
    outfile: Q,
    version: u16,
    release_note: &str,
    keys: &KeyMaterial,
) -> Result<BundleManifest, FwupError> {
    let firmware = fs::read(infile.as_ref())?;
    let bundle = build_bundle(&firmware, version, release_note, keys)?;

    let outfile = outfile.as_ref();
    fs::write(outfile, bundle.encode()?)?;

    let manifest = BundleManifest::describe(
        &bundle,
        FirmwareEncryption::from_key_material(keys).nonce_fingerprint(),
    );
    fs::write(BundleManifest::path_for(outfile), manifest.to_json()?)?;
    info!(path = %outfile.display(), "wrote bundle");
    Ok(manifest)
}

/// Device-side reference: verify the bundle, then decrypt the firmware
pub fn open_bundle(bundle: &Bundle, keys: &KeyMaterial) -> Result<Vec<u8>, FwupError> {
    crypto::verify_bundle(bundle, keys.verifying_key()).map_err(FwupError::Integrity)?;
    Ok(FirmwareEncryption::from_key_material(keys).decrypt(&bundle.payload)?)
}
