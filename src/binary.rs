//! Binary serialization helpers shared by the bundle and frame codecs
//!
//! Bundle metadata and the device header use little-endian integers, matching
//! the bootloader's native layout. Frame lengths on the wire are big-endian.

use std::io::{self, Read, Write};

/// Trait for types that can be read from binary format
pub trait BinaryRead: Sized {
    /// Read this type from a binary reader
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self>;
}

/// Trait for types that can be written to binary format
pub trait BinaryWrite {
    /// Write this type to a binary writer
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()>;

    /// Get the size in bytes when serialized
    fn serialized_size(&self) -> usize;

    /// Serialize into a freshly allocated buffer.
    ///
    /// Fails when a value does not fit its wire encoding.
    fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// Read a u8 from a reader
pub fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Read a u16 (big-endian) from a reader
pub fn read_u16_be<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Read a u16 (little-endian) from a reader
pub fn read_u16_le<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Read exactly n bytes from a reader
pub fn read_bytes<R: Read>(reader: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Write a u16 (big-endian) to a writer
pub fn write_u16_be<W: Write>(writer: &mut W, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

/// Write a u16 (little-endian) to a writer
pub fn write_u16_le<W: Write>(writer: &mut W, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Write bytes to a writer
pub fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes)
}
