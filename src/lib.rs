//! Signed, encrypted firmware bundles and a serial update client
//!
//! The host side of a small-bootloader update scheme:
//! - [`build_bundle`] encrypts a firmware image with AES-256-GCM and signs
//!   metadata and ciphertext with ECDSA P-256
//! - [`Bundle`] is the on-disk wire format shared with the bootloader
//! - [`send_update`] verifies a bundle against a trusted key and streams it
//!   over a serial channel in acknowledged 16-byte frames
//!
//! # Example
//!
//! ```no_run
//! use fwup::{build_bundle, load_trusted_key, open_serial, send_update, KeyMaterial, KeyPaths, TransferConfig};
//!
//! # fn example() -> Result<(), fwup::FwupError> {
//! let paths = KeyPaths::from_env();
//! let keys = KeyMaterial::load(&paths)?;
//! let bundle = build_bundle(b"firmware image", 3, "hello", &keys)?;
//!
//! let trusted = load_trusted_key(&paths.verifying_key)?;
//! let port = open_serial("/dev/ttyACM0", &TransferConfig::default())?;
//! send_update(port, &bundle, &trusted, false)?;
//! # Ok(())
//! # }
//! ```

pub mod binary;
mod builder;
pub mod bundle;
pub mod codegen;
pub mod config;
pub mod crypto;
mod error;
pub mod frame;
pub mod keys;
pub mod manifest;
pub mod provision;
mod transport;
pub mod update;

pub use builder::{build_bundle, open_bundle, protect_firmware, BundleBuilder};
pub use bundle::{checked_version, Bundle, BundleError, DeviceHeader, EncryptedFirmware, Metadata};
pub use config::{ConfigError, TransferConfig};
pub use crypto::{verify_bundle, CryptoError, FirmwareEncryption};
pub use error::FwupError;
pub use frame::{Frame, FrameError, OwnedFrame, FRAME_SIZE};
pub use keys::{load_trusted_key, KeyError, KeyMaterial, KeyPaths};
pub use manifest::BundleManifest;
pub use provision::provision;
pub use transport::open_serial;
pub use update::{send_update, Phase, SessionState, TransferError, UpdateSession};
