//! Bundle wire format
//!
//! ```text
//! ┌───────────────┬─────────────┬───────────┬──────────┬──────────────┬─────────┬────────────┐
//! │ signature (64)│ version (2) │ size N (2)│ note M(2)│ note (M)     │ tag (16)│ ciphertext │
//! │ r || s        │ u16 LE      │ u16 LE    │ u16 LE   │ UTF-8, no NUL│ GCM     │ (N)        │
//! └───────────────┴─────────────┴───────────┴──────────┴──────────────┴─────────┴────────────┘
//! ```
//!
//! The signature covers every byte after itself. This module is a pure codec
//! and performs no cryptography.

use crate::binary::{read_bytes, read_u16_le, write_bytes, write_u16_le, BinaryRead, BinaryWrite};
use std::io::{self, Cursor, Read, Write};

/// Raw ECDSA P-256 signature size (`r || s`)
pub const SIGNATURE_SIZE: usize = 64;
/// AES-GCM authentication tag size
pub const TAG_SIZE: usize = 16;
/// version + firmware size + note length
pub const METADATA_FIXED_SIZE: usize = 6;
/// Smallest possible bundle: empty note, empty firmware
pub const MIN_BUNDLE_SIZE: usize = SIGNATURE_SIZE + METADATA_FIXED_SIZE + TAG_SIZE;

pub const MAX_FIRMWARE_SIZE: usize = u16::MAX as usize;
pub const MAX_RELEASE_NOTE_SIZE: usize = u16::MAX as usize;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("{field} does not fit its fixed-width field: {value} > {max}")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("release note contains a NUL byte at offset {offset}")]
    ReleaseNoteContainsNul { offset: usize },

    #[error("bundle truncated: need at least {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("bundle {field} length mismatch: header declares {declared}, found {actual}")]
    LengthMismatch {
        field: &'static str,
        declared: usize,
        actual: usize,
    },

    #[error("release note is not valid UTF-8: {0}")]
    InvalidReleaseNote(#[from] std::string::FromUtf8Error),

    #[error("failed to serialize bundle: {0}")]
    Write(#[from] io::Error),
}

impl BundleError {
    /// A value could not be represented in the wire format (build time)
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            Self::FieldOverflow { .. } | Self::ReleaseNoteContainsNul { .. } | Self::Write(_)
        )
    }

    /// Input bytes are not a well-formed bundle (read time)
    pub fn is_malformed(&self) -> bool {
        !self.is_encoding()
    }
}

/// Narrow a version number to the 16-bit wire field
pub fn checked_version(version: u64) -> Result<u16, BundleError> {
    u16::try_from(version).map_err(|_| BundleError::FieldOverflow {
        field: "version",
        value: version,
        max: u16::MAX as u64,
    })
}

/// Firmware metadata carried in the bundle header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub version: u16,
    pub firmware_size: u16,
    pub release_note: String,
}

impl Metadata {
    /// Validate field widths and build the metadata for a firmware image
    pub fn new(version: u16, firmware_len: usize, release_note: &str) -> Result<Self, BundleError> {
        let firmware_size = u16::try_from(firmware_len).map_err(|_| BundleError::FieldOverflow {
            field: "firmware size",
            value: firmware_len as u64,
            max: MAX_FIRMWARE_SIZE as u64,
        })?;
        if release_note.len() > MAX_RELEASE_NOTE_SIZE {
            return Err(BundleError::FieldOverflow {
                field: "release note",
                value: release_note.len() as u64,
                max: MAX_RELEASE_NOTE_SIZE as u64,
            });
        }
        if let Some(offset) = release_note.bytes().position(|b| b == 0) {
            return Err(BundleError::ReleaseNoteContainsNul { offset });
        }
        Ok(Self {
            version,
            firmware_size,
            release_note: release_note.to_string(),
        })
    }

    /// Release note length as carried in the 16-bit wire field
    pub fn release_note_len(&self) -> Result<u16, BundleError> {
        u16::try_from(self.release_note.len()).map_err(|_| BundleError::FieldOverflow {
            field: "release note",
            value: self.release_note.len() as u64,
            max: MAX_RELEASE_NOTE_SIZE as u64,
        })
    }

    /// The fixed header the bootloader receives before the firmware frames
    pub fn device_header(&self) -> DeviceHeader {
        DeviceHeader {
            version: self.version,
            firmware_size: self.firmware_size,
        }
    }
}

impl BinaryRead for Metadata {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let version = read_u16_le(reader)?;
        let firmware_size = read_u16_le(reader)?;
        let note_len = read_u16_le(reader)? as usize;
        let note = read_bytes(reader, note_len)?;
        let release_note = String::from_utf8(note)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self {
            version,
            firmware_size,
            release_note,
        })
    }
}

impl BinaryWrite for Metadata {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let note_len = self
            .release_note_len()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        write_u16_le(writer, self.version)?;
        write_u16_le(writer, self.firmware_size)?;
        write_u16_le(writer, note_len)?;
        write_bytes(writer, self.release_note.as_bytes())
    }

    fn serialized_size(&self) -> usize {
        METADATA_FIXED_SIZE + self.release_note.len()
    }
}

/// Version and size as sent to the bootloader (4 bytes, little-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHeader {
    pub version: u16,
    pub firmware_size: u16,
}

impl BinaryRead for DeviceHeader {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Self {
            version: read_u16_le(reader)?,
            firmware_size: read_u16_le(reader)?,
        })
    }
}

impl BinaryWrite for DeviceHeader {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u16_le(writer, self.version)?;
        write_u16_le(writer, self.firmware_size)
    }

    fn serialized_size(&self) -> usize {
        4
    }
}

/// Detached AES-GCM output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFirmware {
    pub tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

/// Signed, encrypted firmware bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub signature: [u8; SIGNATURE_SIZE],
    pub metadata: Metadata,
    pub payload: EncryptedFirmware,
}

impl Bundle {
    /// The byte span covered by the signature: `metadata || tag || ciphertext`
    pub fn signed_bytes(&self) -> Result<Vec<u8>, BundleError> {
        Self::signed_span(&self.metadata, &self.payload)
    }

    /// Fails when the metadata does not describe `payload` or does not fit
    /// the wire format; a partial span is never returned.
    pub(crate) fn signed_span(
        metadata: &Metadata,
        payload: &EncryptedFirmware,
    ) -> Result<Vec<u8>, BundleError> {
        metadata.release_note_len()?;
        if payload.ciphertext.len() != metadata.firmware_size as usize {
            return Err(BundleError::LengthMismatch {
                field: "firmware",
                declared: metadata.firmware_size as usize,
                actual: payload.ciphertext.len(),
            });
        }

        let mut buf = Vec::with_capacity(
            metadata.serialized_size() + TAG_SIZE + payload.ciphertext.len(),
        );
        metadata.write_to(&mut buf)?;
        buf.extend_from_slice(&payload.tag);
        buf.extend_from_slice(&payload.ciphertext);
        Ok(buf)
    }

    /// Serialize to the on-disk layout
    pub fn encode(&self) -> Result<Vec<u8>, BundleError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.signature);
        buf.extend_from_slice(&self.signed_bytes()?);
        Ok(buf)
    }

    pub fn encoded_len(&self) -> usize {
        SIGNATURE_SIZE + self.metadata.serialized_size() + TAG_SIZE + self.payload.ciphertext.len()
    }

    /// Parse the on-disk layout.
    ///
    /// Every declared length must match the input exactly; trailing bytes
    /// are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, BundleError> {
        if bytes.len() < MIN_BUNDLE_SIZE {
            return Err(BundleError::Truncated {
                needed: MIN_BUNDLE_SIZE,
                actual: bytes.len(),
            });
        }

        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[..SIGNATURE_SIZE]);

        let mut cursor = Cursor::new(&bytes[SIGNATURE_SIZE..]);
        let version = read_u16_le(&mut cursor).map_err(|_| truncated(bytes.len()))?;
        let firmware_size = read_u16_le(&mut cursor).map_err(|_| truncated(bytes.len()))?;
        let note_len = read_u16_le(&mut cursor).map_err(|_| truncated(bytes.len()))? as usize;

        let rest = &bytes[SIGNATURE_SIZE + METADATA_FIXED_SIZE..];
        if rest.len() < note_len + TAG_SIZE {
            return Err(BundleError::LengthMismatch {
                field: "release note",
                declared: note_len,
                actual: rest.len().saturating_sub(TAG_SIZE),
            });
        }
        let (note, rest) = rest.split_at(note_len);
        let (tag_bytes, ciphertext) = rest.split_at(TAG_SIZE);
        if ciphertext.len() != firmware_size as usize {
            return Err(BundleError::LengthMismatch {
                field: "firmware",
                declared: firmware_size as usize,
                actual: ciphertext.len(),
            });
        }

        let release_note = String::from_utf8(note.to_vec())?;
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(tag_bytes);

        Ok(Self {
            signature,
            metadata: Metadata {
                version,
                firmware_size,
                release_note,
            },
            payload: EncryptedFirmware {
                tag,
                ciphertext: ciphertext.to_vec(),
            },
        })
    }
}

fn truncated(actual: usize) -> BundleError {
    BundleError::Truncated {
        needed: MIN_BUNDLE_SIZE,
        actual,
    }
}
