//! Unified error type for the fwup public API
//!
//! Modules keep their own error enums for precise handling; this type wraps
//! them for callers such as the command-line tools.
//!
//! # Example
//!
//! ```no_run
//! use fwup::FwupError;
//!
//! fn run() -> Result<(), FwupError> {
//!     // Module errors convert with `?`
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for all fwup operations
///
/// # Error Categories
///
/// - **KeyMaterial**: key files missing, malformed or mismatched
/// - **Bundle**: a field overflows its width, or bundle bytes are malformed
/// - **Crypto**: AES-GCM or signing primitive failure
/// - **Integrity**: bundle signature rejected
/// - **Transfer**: the serial update session aborted
/// - **Config** / **Serial** / **Io**: environment problems
#[derive(Debug, Error)]
pub enum FwupError {
    #[error("Key material error: {0}")]
    KeyMaterial(#[from] crate::keys::KeyError),

    #[error("Bundle error: {0}")]
    Bundle(#[from] crate::bundle::BundleError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("Integrity error: bundle signature verification failed")]
    Integrity(#[source] p256::ecdsa::Error),

    #[error("Transfer error: {0}")]
    Transfer(#[from] crate::update::TransferError),

    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("refusing to overwrite existing signing key at {}", .0.display())]
    AlreadyProvisioned(PathBuf),
}

impl FwupError {
    /// Returns true if an operator re-run might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transfer(e) => e.is_retryable(),
            Self::Serial(_) => true,
            _ => false,
        }
    }

    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Transfer(e) => e.suggestion(),
            Self::KeyMaterial(_) => Some("Run fw-keygen or point FWUP_SECRETS_DIR at the secrets directory"),
            Self::Integrity(_) => Some("The bundle does not match the trusted public key"),
            Self::AlreadyProvisioned(_) => {
                Some("Move the existing secrets away first; devices only trust the key they were built with")
            }
            _ => None,
        }
    }

    pub fn is_key_error(&self) -> bool {
        matches!(self, Self::KeyMaterial(_) | Self::AlreadyProvisioned(_))
    }

    /// A value does not fit the fixed-width bundle layout
    pub fn is_encoding_error(&self) -> bool {
        matches!(self, Self::Bundle(e) if e.is_encoding())
    }

    /// Input bytes are not a well-formed bundle
    pub fn is_malformed_bundle(&self) -> bool {
        matches!(self, Self::Bundle(e) if e.is_malformed())
    }

    /// Signature verification failed, in the builder's self-check or in a transfer
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::Integrity(_) | Self::Transfer(crate::update::TransferError::Integrity(_))
        )
    }

    pub fn is_transfer_error(&self) -> bool {
        matches!(self, Self::Transfer(_))
    }

    /// Process exit code for the command-line tools
    pub fn exit_code(&self) -> u8 {
        use crate::update::TransferError;
        match self {
            Self::KeyMaterial(_) | Self::AlreadyProvisioned(_) => 2,
            Self::Bundle(_) => 3,
            Self::Integrity(_) | Self::Crypto(_) => 4,
            Self::Transfer(TransferError::Integrity(_)) => 4,
            Self::Transfer(TransferError::InvalidVersion { .. })
            | Self::Transfer(TransferError::DowngradeRejected { .. }) => 5,
            Self::Transfer(_) => 6,
            Self::Config(_) => 7,
            Self::Serial(_) | Self::Io(_) | Self::Manifest(_) => 1,
        }
    }
}
