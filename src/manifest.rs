//! JSON build record written next to each bundle

use crate::bundle::Bundle;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub version: u16,
    pub release_note: String,
    pub firmware_size: u16,
    pub bundle_size: usize,
    /// Hex SHA-256 of the ciphertext as streamed to the device
    pub ciphertext_sha256: String,
    /// Base64 of the raw `r || s` signature
    pub signature: String,
    /// Identifies the IV used; equal values across releases mean the IV was reused
    pub nonce_fingerprint: String,
    pub built_at: DateTime<Utc>,
}

impl BundleManifest {
    pub fn describe(bundle: &Bundle, nonce_fingerprint: String) -> Self {
        let digest = Sha256::digest(&bundle.payload.ciphertext);
        Self {
            version: bundle.metadata.version,
            release_note: bundle.metadata.release_note.clone(),
            firmware_size: bundle.metadata.firmware_size,
            bundle_size: bundle.encoded_len(),
            ciphertext_sha256: format!("{:x}", digest),
            signature: BASE64.encode(bundle.signature),
            nonce_fingerprint,
            built_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// `firmware.bundle` -> `firmware.bundle.json`
    pub fn path_for(bundle_path: &Path) -> PathBuf {
        let mut name = bundle_path.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }
}
