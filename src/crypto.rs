//! Crypto envelope: AES-256-GCM firmware encryption and ECDSA P-256 signing
//!
//! The cipher uses the 128-bit IV shared with the bootloader as the GCM
//! nonce. That IV is fixed per trust root, so every bundle built from the same
//! key material reuses it. Each build logs a warning; the device decrypts
//! with the baked-in IV, so the nonce cannot vary per bundle.

use crate::bundle::{Bundle, EncryptedFirmware, Metadata, SIGNATURE_SIZE, TAG_SIZE};
use crate::error::FwupError;
use crate::keys::{AesKey, Iv128, KeyMaterial};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Key, Nonce, Tag};
use p256::ecdsa::signature::{DigestSigner, DigestVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// AES-256-GCM with a 128-bit nonce
pub type Aes256Gcm128 = AesGcm<Aes256, U16>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AES-GCM operation failed: {0}")]
    AeadError(aes_gcm::Error),
    #[error("signing failed: {0}")]
    SigningError(p256::ecdsa::Error),
}

/// Firmware cipher bound to one key/IV pair
pub struct FirmwareEncryption {
    cipher: Aes256Gcm128,
    iv: Iv128,
}

impl FirmwareEncryption {
    pub fn new(key: &AesKey, iv: &Iv128) -> Self {
        let cipher = Aes256Gcm128::new(Key::<Aes256Gcm128>::from_slice(key.as_slice()));
        Self {
            cipher,
            iv: iv.clone(),
        }
    }

    pub fn from_key_material(keys: &KeyMaterial) -> Self {
        Self::new(keys.aes_key(), keys.iv())
    }

    /// Encrypt the firmware image, keeping the tag detached from the ciphertext
    pub fn encrypt(&self, firmware: &[u8]) -> Result<EncryptedFirmware, CryptoError> {
        let mut ciphertext = firmware.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(self.nonce(), b"", &mut ciphertext)
            .map_err(CryptoError::AeadError)?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(tag.as_slice());
        Ok(EncryptedFirmware {
            tag: tag_bytes,
            ciphertext,
        })
    }

    /// Decrypt and authenticate, as the bootloader does after receiving frames
    pub fn decrypt(&self, payload: &EncryptedFirmware) -> Result<Vec<u8>, CryptoError> {
        let mut plaintext = payload.ciphertext.clone();
        self.cipher
            .decrypt_in_place_detached(
                self.nonce(),
                b"",
                &mut plaintext,
                Tag::<U16>::from_slice(&payload.tag),
            )
            .map_err(CryptoError::AeadError)?;
        Ok(plaintext)
    }

    /// Short, non-reversible identifier of the IV, for spotting reuse across builds
    pub fn nonce_fingerprint(&self) -> String {
        let digest = Sha256::new_with_prefix(self.iv.as_slice()).finalize();
        format!("{:x}", digest)[..16].to_string()
    }

    fn nonce(&self) -> &Nonce<U16> {
        Nonce::<U16>::from_slice(self.iv.as_slice())
    }
}

/// Sign `metadata || tag || ciphertext` with ECDSA P-256 over SHA-256
pub fn sign_span(signing_key: &SigningKey, span: &[u8]) -> Result<[u8; SIGNATURE_SIZE], CryptoError> {
    let signature: Signature = signing_key
        .try_sign_digest(Sha256::new_with_prefix(span))
        .map_err(CryptoError::SigningError)?;

    let mut out = [0u8; SIGNATURE_SIZE];
    out.copy_from_slice(&signature.to_bytes());
    Ok(out)
}

/// Verify a bundle against a trusted key.
///
/// The digest is recomputed from the bundle's own fields, so any change to
/// metadata, tag or ciphertext invalidates the signature. A bundle whose
/// fields cannot be serialized has no signed span and is rejected.
pub fn verify_bundle(bundle: &Bundle, trusted_key: &VerifyingKey) -> Result<(), p256::ecdsa::Error> {
    let span = bundle.signed_bytes().map_err(|_| p256::ecdsa::Error::new())?;
    let signature = Signature::from_slice(&bundle.signature)?;
    trusted_key.verify_digest(Sha256::new_with_prefix(span), &signature)
}

/// Seal firmware into a signed bundle
pub(crate) fn seal(
    metadata: Metadata,
    firmware: &[u8],
    keys: &KeyMaterial,
) -> Result<Bundle, FwupError> {
    let payload = FirmwareEncryption::from_key_material(keys).encrypt(firmware)?;
    let span = Bundle::signed_span(&metadata, &payload)?;
    let signature = sign_span(keys.signing_key(), &span)?;
    Ok(Bundle {
        signature,
        metadata,
        payload,
    })
}
