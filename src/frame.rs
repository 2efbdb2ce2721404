//! Length-prefixed firmware frames
//!
//! ```text
//! ┌──────────────┬──────────────────┐
//! │ length (u16) │ data (0..=16)    │
//! │ big-endian   │                  │
//! └──────────────┴──────────────────┘
//! ```
//!
//! A zero length marks the end of the firmware stream.

use crate::binary::{read_bytes, read_u16_be, write_bytes, write_u16_be, BinaryRead, BinaryWrite};
use std::io::{self, Read, Write};

/// Maximum data bytes per frame
pub const FRAME_SIZE: usize = 16;

/// Carried inside `io::ErrorKind::InvalidData` when read off the wire
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame data too long: {len} bytes, at most 16 allowed")]
    TooLong { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    data: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, FrameError> {
        if data.len() > FRAME_SIZE {
            return Err(FrameError::TooLong { len: data.len() });
        }
        Ok(Self { data })
    }

    /// End-of-stream sentinel
    pub fn end() -> Frame<'static> {
        Frame { data: &[] }
    }

    pub fn is_end(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> u16 {
        self.data.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Split a payload into consecutive data frames; does not include the sentinel
    pub fn chunks(payload: &'a [u8]) -> impl ExactSizeIterator<Item = Frame<'a>> + 'a {
        payload.chunks(FRAME_SIZE).map(|data| Frame { data })
    }
}

impl BinaryWrite for Frame<'_> {
    fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write_u16_be(writer, self.len())?;
        write_bytes(writer, self.data)
    }

    fn serialized_size(&self) -> usize {
        2 + self.data.len()
    }
}

/// A frame read off the wire (owned)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrame {
    pub data: Vec<u8>,
}

impl OwnedFrame {
    pub fn is_end(&self) -> bool {
        self.data.is_empty()
    }
}

impl BinaryRead for OwnedFrame {
    fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let len = read_u16_be(reader)? as usize;
        if len > FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                FrameError::TooLong { len },
            ));
        }
        Ok(Self {
            data: read_bytes(reader, len)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_chunk_counts() {
        for n in [0usize, 1, 15, 16, 17, 32, 33, 1000] {
            let payload = vec![0x77; n];
            let frames: Vec<_> = Frame::chunks(&payload).collect();
            assert_eq!(frames.len(), n.div_ceil(FRAME_SIZE), "payload of {} bytes", n);
            assert!(frames.iter().all(|f| !f.is_end() && f.data().len() <= FRAME_SIZE));
            let total: usize = frames.iter().map(|f| f.data().len()).sum();
            assert_eq!(total, n);
        }
    }

    #[test]
    fn test_frame_encoding() {
        let frame = Frame::new(&[0xC0, 0xC1, 0xC2]).unwrap();
        assert_eq!(frame.to_bytes().unwrap(), vec![0x00, 0x03, 0xC0, 0xC1, 0xC2]);
        assert_eq!(Frame::end().to_bytes().unwrap(), vec![0x00, 0x00]);
    }

    #[test]
    fn test_frame_too_long() {
        assert!(matches!(
            Frame::new(&[0u8; 17]),
            Err(FrameError::TooLong { len: 17 })
        ));
    }

    #[test]
    fn test_read_frames_from_stream() {
        let mut wire = Vec::new();
        for frame in Frame::chunks(b"0123456789abcdefXYZ") {
            frame.write_to(&mut wire).unwrap();
        }
        Frame::end().write_to(&mut wire).unwrap();

        let mut cursor = Cursor::new(wire);
        let first = OwnedFrame::read_from(&mut cursor).unwrap();
        let second = OwnedFrame::read_from(&mut cursor).unwrap();
        let end = OwnedFrame::read_from(&mut cursor).unwrap();
        assert_eq!(first.data, b"0123456789abcdef");
        assert_eq!(second.data, b"XYZ");
        assert!(end.is_end());
    }

    #[test]
    fn test_read_rejects_oversized_length() {
        let mut cursor = Cursor::new(vec![0x00, 0x11]);
        let err = OwnedFrame::read_from(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let inner = err.get_ref().and_then(|e| e.downcast_ref::<FrameError>());
        assert!(matches!(inner, Some(FrameError::TooLong { len: 17 })));
    }
}
