//! Common test utilities for fwup integration tests
//!
//! Provides fixed key material and a simulated bootloader that speaks the
//! device side of the update protocol over an in-memory channel.

#![allow(dead_code)]

use fwup::binary::BinaryRead;
use fwup::keys::{AesKey, Iv128};
use fwup::{DeviceHeader, KeyMaterial, OwnedFrame, TransferConfig};
use p256::ecdsa::SigningKey;
use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};

/// Firmware used by the end-to-end scenario
pub const TEST_FIRMWARE: &[u8] = b"ABCD";

/// Deterministic key material so bundles are reproducible across runs
pub fn fixed_keys() -> KeyMaterial {
    let aes = AesKey::from_slice(&[0x2B; 32]).unwrap();
    let iv = Iv128::from_slice(&[0x7E; 16]).unwrap();
    let signing_key = SigningKey::from_slice(&[0x1D; 32]).unwrap();
    KeyMaterial::new(aes, iv, signing_key)
}

/// Unrelated key material, for forged-bundle scenarios
pub fn other_keys() -> KeyMaterial {
    let aes = AesKey::from_slice(&[0x2B; 32]).unwrap();
    let iv = Iv128::from_slice(&[0x7E; 16]).unwrap();
    let signing_key = SigningKey::from_slice(&[0x5C; 32]).unwrap();
    KeyMaterial::new(aes, iv, signing_key)
}

/// Transfer settings with no inter-frame delay
pub fn fast_config() -> TransferConfig {
    TransferConfig {
        frame_delay_ms: 0,
        handshake_attempts: 3,
        ..TransferConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    AwaitHandshake,
    AwaitHeader,
    AwaitFrames,
    Finished,
}

/// In-memory bootloader.
///
/// Echoes the handshake, acknowledges the header and each frame with `0x00`
/// (or a configured error byte), and records everything the host sent.
pub struct MockBootloader {
    /// Every byte written by the host, in order
    pub written: Vec<u8>,
    /// Each individual `write` call
    pub writes: Vec<Vec<u8>>,
    pub header: Option<DeviceHeader>,
    pub frames: Vec<Vec<u8>>,
    pub sentinel_received: bool,
    echo_handshake: bool,
    reject_frame: Option<(usize, u8)>,
    reject_header: Option<u8>,
    state: DeviceState,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
}

impl MockBootloader {
    pub fn new() -> Self {
        Self {
            written: Vec::new(),
            writes: Vec::new(),
            header: None,
            frames: Vec::new(),
            sentinel_received: false,
            echo_handshake: true,
            reject_frame: None,
            reject_header: None,
            state: DeviceState::AwaitHandshake,
            inbox: Vec::new(),
            outbox: VecDeque::new(),
        }
    }

    /// Never answer the handshake
    pub fn silent() -> Self {
        Self {
            echo_handshake: false,
            ..Self::new()
        }
    }

    /// Reply with noise instead of the handshake echo
    pub fn noisy() -> Self {
        Self {
            echo_handshake: false,
            outbox: VecDeque::from(vec![0xFF; 8]),
            ..Self::new()
        }
    }

    /// Answer frame `index` with `response` instead of OK
    pub fn rejecting_frame(index: usize, response: u8) -> Self {
        Self {
            reject_frame: Some((index, response)),
            ..Self::new()
        }
    }

    /// Answer the metadata header with `response` instead of OK
    pub fn rejecting_header(response: u8) -> Self {
        Self {
            reject_header: Some(response),
            ..Self::new()
        }
    }

    fn process(&mut self) {
        loop {
            match self.state {
                DeviceState::AwaitHandshake => {
                    let Some(pos) = self.inbox.iter().position(|&b| b == b'U') else {
                        self.inbox.clear();
                        return;
                    };
                    self.inbox.drain(..=pos);
                    if !self.echo_handshake {
                        return;
                    }
                    self.outbox.push_back(b'U');
                    self.state = DeviceState::AwaitHeader;
                }
                DeviceState::AwaitHeader => {
                    if self.inbox.len() < 4 {
                        return;
                    }
                    let bytes: Vec<u8> = self.inbox.drain(..4).collect();
                    self.header = Some(DeviceHeader::read_from(&mut Cursor::new(bytes)).unwrap());
                    match self.reject_header {
                        Some(response) => {
                            self.outbox.push_back(response);
                            self.state = DeviceState::Finished;
                        }
                        None => {
                            self.outbox.push_back(0x00);
                            self.state = DeviceState::AwaitFrames;
                        }
                    }
                }
                DeviceState::AwaitFrames => {
                    if self.inbox.len() < 2 {
                        return;
                    }
                    let len = u16::from_be_bytes([self.inbox[0], self.inbox[1]]) as usize;
                    if self.inbox.len() < 2 + len {
                        return;
                    }
                    let bytes: Vec<u8> = self.inbox.drain(..2 + len).collect();
                    let frame = OwnedFrame::read_from(&mut Cursor::new(bytes)).unwrap();
                    if frame.is_end() {
                        self.sentinel_received = true;
                        self.state = DeviceState::Finished;
                        continue;
                    }

                    let index = self.frames.len();
                    self.frames.push(frame.data);
                    match self.reject_frame {
                        Some((bad, response)) if bad == index => {
                            self.outbox.push_back(response);
                            self.state = DeviceState::Finished;
                        }
                        _ => self.outbox.push_back(0x00),
                    }
                }
                DeviceState::Finished => {
                    self.inbox.clear();
                    return;
                }
            }
        }
    }

    /// Concatenated data of every received frame
    pub fn received_payload(&self) -> Vec<u8> {
        self.frames.concat()
    }
}

impl Default for MockBootloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for MockBootloader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.outbox.pop_front() {
            Some(byte) => {
                buf[0] = byte;
                Ok(1)
            }
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "device silent")),
        }
    }
}

impl Write for MockBootloader {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        self.writes.push(buf.to_vec());
        self.inbox.extend_from_slice(buf);
        self.process();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
