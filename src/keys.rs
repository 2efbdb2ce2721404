//! Key material for bundle protection and verification
//!
//! The host keeps the full [`KeyMaterial`] (symmetric key, IV and the ECDSA
//! signing key). The update client only ever needs the verifying key, which
//! is loaded from local trust storage with [`load_trusted_key`].
//!
//! On-disk layout inside a secrets directory:
//!
//! ```text
//! symmetric.key      48 raw bytes: AES-256 key (32) || IV (16)
//! signing_key.pem    PKCS#8 PEM, P-256 private key
//! verifying_key.pem  SPKI PEM, P-256 public key
//! ```

use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const AES_KEY_SIZE: usize = 32;
pub const IV_SIZE: usize = 16;

/// Environment variable overriding the secrets directory
pub const SECRETS_DIR_ENV: &str = "FWUP_SECRETS_DIR";
const DEFAULT_SECRETS_DIR: &str = "secrets";

const SYMMETRIC_FILE: &str = "symmetric.key";
const SIGNING_KEY_FILE: &str = "signing_key.pem";
const VERIFYING_KEY_FILE: &str = "verifying_key.pem";

/// AES-256 key (32 bytes) that zeroizes on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AesKey(pub(crate) [u8; AES_KEY_SIZE]);

impl AesKey {
    /// Create a new AES key from a 32-byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != AES_KEY_SIZE {
            return Err(KeyError::InvalidLength {
                what: "AES key",
                expected: AES_KEY_SIZE,
                got: bytes.len(),
            });
        }
        let mut key = [0u8; AES_KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(AesKey(key))
    }

    /// Get a reference to the key bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// 128-bit build IV shared with the device, zeroized on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Iv128(pub(crate) [u8; IV_SIZE]);

impl Iv128 {
    /// Create a new IV from a 16-byte slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != IV_SIZE {
            return Err(KeyError::InvalidLength {
                what: "IV",
                expected: IV_SIZE,
                got: bytes.len(),
            });
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(bytes);
        Ok(Iv128(iv))
    }

    /// Get a reference to the IV bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// Key-related errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key file {} could not be read: {source}", .path.display())]
    Missing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("key file {} could not be written: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid {what} length: expected {expected}, got {got}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("malformed key in {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("verifying key does not match the signing key")]
    Mismatch,
}

/// Locations of the key files inside a secrets directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub symmetric: PathBuf,
    pub signing_key: PathBuf,
    pub verifying_key: PathBuf,
}

impl KeyPaths {
    /// Standard file names inside `dir`
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            symmetric: dir.join(SYMMETRIC_FILE),
            signing_key: dir.join(SIGNING_KEY_FILE),
            verifying_key: dir.join(VERIFYING_KEY_FILE),
        }
    }

    /// Directory from `FWUP_SECRETS_DIR`, falling back to `./secrets`
    pub fn from_env() -> Self {
        let dir = std::env::var_os(SECRETS_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_DIR));
        Self::from_dir(dir)
    }
}

/// Everything the host needs to protect a firmware image.
///
/// Constructed once at process start and passed by reference; never mutated.
#[derive(Clone)]
pub struct KeyMaterial {
    aes_key: AesKey,
    iv: Iv128,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("aes_key", &"<redacted>")
            .field("iv", &"<redacted>")
            .field("signing_key", &"<redacted>")
            .field("verifying_key", &self.verifying_key)
            .finish()
    }
}

impl KeyMaterial {
    /// Assemble key material; the verifying key is derived from the signing key
    pub fn new(aes_key: AesKey, iv: Iv128, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key().clone();
        Self {
            aes_key,
            iv,
            signing_key,
            verifying_key,
        }
    }

    /// Assemble key material from independently stored halves.
    ///
    /// Fails with [`KeyError::Mismatch`] when the public key is not the
    /// counterpart of the private key.
    pub fn from_parts(
        aes_key: AesKey,
        iv: Iv128,
        signing_key: SigningKey,
        verifying_key: VerifyingKey,
    ) -> Result<Self, KeyError> {
        if signing_key.verifying_key() != &verifying_key {
            return Err(KeyError::Mismatch);
        }
        Ok(Self {
            aes_key,
            iv,
            signing_key,
            verifying_key,
        })
    }

    /// Generate a fresh trust root from the OS RNG
    pub fn generate() -> Self {
        let mut aes = [0u8; AES_KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut aes);
        OsRng.fill_bytes(&mut iv);

        let material = Self::new(AesKey(aes), Iv128(iv), SigningKey::random(&mut OsRng));
        aes.zeroize();
        iv.zeroize();
        material
    }

    /// Load all key files
    pub fn load(paths: &KeyPaths) -> Result<Self, KeyError> {
        let mut symmetric = read_file(&paths.symmetric)?;
        if symmetric.len() != AES_KEY_SIZE + IV_SIZE {
            let got = symmetric.len();
            symmetric.zeroize();
            return Err(KeyError::InvalidLength {
                what: "symmetric key file",
                expected: AES_KEY_SIZE + IV_SIZE,
                got,
            });
        }
        let aes_key = AesKey::from_slice(&symmetric[..AES_KEY_SIZE])?;
        let iv = Iv128::from_slice(&symmetric[AES_KEY_SIZE..])?;
        symmetric.zeroize();

        let pem = zeroize::Zeroizing::new(read_to_string(&paths.signing_key)?);
        let signing_key =
            SigningKey::from_pkcs8_pem(&pem).map_err(|e| KeyError::Malformed {
                path: paths.signing_key.clone(),
                reason: e.to_string(),
            })?;

        let verifying_key = load_trusted_key(&paths.verifying_key)?;

        Self::from_parts(aes_key, iv, signing_key, verifying_key)
    }

    /// Write all key files, creating the directory if needed
    pub fn store(&self, paths: &KeyPaths) -> Result<(), KeyError> {
        for path in [&paths.symmetric, &paths.signing_key, &paths.verifying_key] {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| KeyError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut symmetric = zeroize::Zeroizing::new(Vec::with_capacity(AES_KEY_SIZE + IV_SIZE));
        symmetric.extend_from_slice(self.aes_key.as_slice());
        symmetric.extend_from_slice(self.iv.as_slice());
        write_file(&paths.symmetric, &symmetric)?;

        let private_pem = self
            .signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| KeyError::Malformed {
                path: paths.signing_key.clone(),
                reason: e.to_string(),
            })?;
        write_file(&paths.signing_key, private_pem.as_bytes())?;

        let public_pem = self
            .verifying_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyError::Malformed {
                path: paths.verifying_key.clone(),
                reason: e.to_string(),
            })?;
        write_file(&paths.verifying_key, public_pem.as_bytes())
    }

    pub fn aes_key(&self) -> &AesKey {
        &self.aes_key
    }

    pub fn iv(&self) -> &Iv128 {
        &self.iv
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

/// Load the trusted verifying key from local trust storage.
///
/// The update client must use this key, never one carried by a bundle.
pub fn load_trusted_key<P: AsRef<Path>>(path: P) -> Result<VerifyingKey, KeyError> {
    let path = path.as_ref();
    let pem = read_to_string(path)?;
    VerifyingKey::from_public_key_pem(pem.trim()).map_err(|e| KeyError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, KeyError> {
    fs::read(path).map_err(|source| KeyError::Missing {
        path: path.to_path_buf(),
        source,
    })
}

fn read_to_string(path: &Path) -> Result<String, KeyError> {
    fs::read_to_string(path).map_err(|source| KeyError::Missing {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), KeyError> {
    fs::write(path, contents).map_err(|source| KeyError::Write {
        path: path.to_path_buf(),
        source,
    })
}
