//! Update transfer client
//!
//! Drives one update over an exclusively owned channel:
//!
//! ```text
//! Idle -> Verifying -> VersionCheck -> Handshaking -> SendingMetadata -> Streaming -> Done
//!                                 (any failure) -> Aborted
//! ```
//!
//! The bundle signature is checked and the version gate applied before a
//! single byte is written, so a rejected bundle never reaches the device.
//! Failures are not retried inside a session; the device's partial state is
//! undefined and the operator re-runs the whole update.

use crate::binary::BinaryWrite;
use crate::bundle::Bundle;
use crate::config::TransferConfig;
use crate::crypto;
use crate::frame::{Frame, FRAME_SIZE};
use p256::ecdsa::VerifyingKey;
use std::fmt;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Byte that asks the bootloader to enter update mode; echoed back on entry
pub const HANDSHAKE_BYTE: u8 = b'U';
/// Acknowledgment meaning success
pub const RESP_OK: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Verifying,
    VersionCheck,
    Handshaking,
    SendingMetadata,
    Streaming,
    Done,
    Aborted,
}

/// Where in the exchange an error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Handshake,
    Metadata,
    Frame { index: usize, offset: usize },
    EndOfStream,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Handshake => write!(f, "handshake"),
            Phase::Metadata => write!(f, "metadata"),
            Phase::Frame { index, offset } => write!(f, "frame {} (offset {})", index, offset),
            Phase::EndOfStream => write!(f, "end of stream"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("bundle signature verification failed; nothing was sent")]
    Integrity(#[source] p256::ecdsa::Error),

    #[error("version 0 is reserved for debug builds")]
    InvalidVersion { version: u16 },

    #[error("version {version} is older than the minimum allowed version {minimum}")]
    DowngradeRejected { version: u16, minimum: u16 },

    #[error("bootloader did not echo the handshake after {attempts} reads ({elapsed:?})")]
    HandshakeTimeout { attempts: u32, elapsed: Duration },

    #[error("bootloader rejected {phase} with response {received:#04x}")]
    Protocol { phase: Phase, received: u8 },

    #[error("no acknowledgment from bootloader during {phase}")]
    NoAcknowledgement { phase: Phase },

    #[error("serial I/O failed during {phase}: {source}")]
    Io {
        phase: Phase,
        #[source]
        source: io::Error,
    },
}

impl TransferError {
    /// Whether the failure happened before any byte reached the device
    pub fn is_pre_transfer(&self) -> bool {
        matches!(
            self,
            Self::Integrity(_) | Self::InvalidVersion { .. } | Self::DowngradeRejected { .. }
        )
    }

    /// Operator re-run may succeed (device or link trouble rather than a bad bundle)
    pub fn is_retryable(&self) -> bool {
        !self.is_pre_transfer()
    }

    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Integrity(_) => {
                Some("Check that the bundle was built with the signing key matching the trusted public key")
            }
            Self::InvalidVersion { .. } => Some("Use --debug to install a version 0 build"),
            Self::HandshakeTimeout { .. } => {
                Some("Reset the device into the bootloader and check the serial port")
            }
            Self::Protocol { .. } | Self::NoAcknowledgement { .. } => {
                Some("Re-run the update from the beginning; partial transfers cannot be resumed")
            }
            _ => None,
        }
    }
}

/// One update session. Owns the channel until dropped or [`into_inner`](Self::into_inner).
pub struct UpdateSession<C> {
    channel: C,
    config: TransferConfig,
    state: SessionState,
}

impl<C: Read + Write> UpdateSession<C> {
    pub fn new(channel: C, config: TransferConfig) -> Self {
        Self {
            channel,
            config,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Run the full exchange for `bundle`
    pub fn run(
        &mut self,
        bundle: &Bundle,
        trusted_key: &VerifyingKey,
        debug: bool,
    ) -> Result<(), TransferError> {
        let result = self.drive(bundle, trusted_key, debug);
        match &result {
            Ok(()) => {
                self.state = SessionState::Done;
                info!("done writing firmware");
            }
            Err(e) => {
                warn!(state = ?self.state, error = %e, "update aborted");
                self.state = SessionState::Aborted;
            }
        }
        result
    }

    fn drive(
        &mut self,
        bundle: &Bundle,
        trusted_key: &VerifyingKey,
        debug: bool,
    ) -> Result<(), TransferError> {
        self.state = SessionState::Verifying;
        crypto::verify_bundle(bundle, trusted_key).map_err(TransferError::Integrity)?;
        debug!("bundle signature verified");

        self.state = SessionState::VersionCheck;
        self.check_version(bundle.metadata.version, debug)?;
        info!(version = bundle.metadata.version, "request to install version");

        self.state = SessionState::Handshaking;
        self.handshake()?;

        self.state = SessionState::SendingMetadata;
        self.send_metadata(bundle, debug)?;

        self.state = SessionState::Streaming;
        self.stream_firmware(&bundle.payload.ciphertext, debug)?;
        self.finish()
    }

    fn check_version(&self, version: u16, debug: bool) -> Result<(), TransferError> {
        if debug {
            return Ok(());
        }
        if version == 0 {
            return Err(TransferError::InvalidVersion { version });
        }
        match self.config.minimum_version {
            Some(minimum) if version < minimum => {
                Err(TransferError::DowngradeRejected { version, minimum })
            }
            _ => Ok(()),
        }
    }

    fn handshake(&mut self) -> Result<(), TransferError> {
        self.write(Phase::Handshake, &[HANDSHAKE_BYTE])?;
        info!("waiting for bootloader to enter update mode");

        let started = Instant::now();
        let mut attempts = 0;
        // At least one read, whatever the bounds
        loop {
            attempts += 1;
            match self.read_byte(Phase::Handshake)? {
                Some(HANDSHAKE_BYTE) => {
                    debug!(attempts, "handshake echoed");
                    return Ok(());
                }
                Some(other) => trace!(byte = other, "discarding byte while waiting for echo"),
                None => trace!(attempts, "no handshake echo yet"),
            }
            if attempts >= self.config.handshake_attempts
                || started.elapsed() >= self.config.handshake_timeout()
            {
                break;
            }
        }

        Err(TransferError::HandshakeTimeout {
            attempts,
            elapsed: started.elapsed(),
        })
    }

    fn send_metadata(&mut self, bundle: &Bundle, debug: bool) -> Result<(), TransferError> {
        let header = bundle.metadata.device_header();
        if debug {
            debug!(header = ?header, "sending metadata");
        }
        self.send(Phase::Metadata, &header)?;
        self.read_ack(Phase::Metadata)
    }

    fn stream_firmware(&mut self, payload: &[u8], debug: bool) -> Result<(), TransferError> {
        let delay = self.config.frame_delay();
        for (index, frame) in Frame::chunks(payload).enumerate() {
            let phase = Phase::Frame {
                index,
                offset: index * FRAME_SIZE,
            };
            if debug {
                debug!(index, len = frame.len(), "writing frame");
            }

            self.send(phase, &frame)?;
            pause(delay);
            let ack = self.read_ack(phase);
            pause(delay);
            ack?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TransferError> {
        // A zero-length frame tells the bootloader to finalize its write
        self.send(Phase::EndOfStream, &Frame::end())?;
        if self.config.confirm_commit {
            self.read_ack(Phase::EndOfStream)?;
            debug!("bootloader confirmed commit");
        }
        Ok(())
    }

    /// Serialize `item` and write it in a single call
    fn send<T: BinaryWrite>(&mut self, phase: Phase, item: &T) -> Result<(), TransferError> {
        let bytes = item
            .to_bytes()
            .map_err(|source| TransferError::Io { phase, source })?;
        self.write(phase, &bytes)
    }

    fn write(&mut self, phase: Phase, bytes: &[u8]) -> Result<(), TransferError> {
        self.channel
            .write_all(bytes)
            .and_then(|_| self.channel.flush())
            .map_err(|source| TransferError::Io { phase, source })
    }

    /// `None` when the read timed out without data
    fn read_byte(&mut self, phase: Phase) -> Result<Option<u8>, TransferError> {
        let mut buf = [0u8; 1];
        loop {
            match self.channel.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                    ) =>
                {
                    return Ok(None)
                }
                Err(source) => return Err(TransferError::Io { phase, source }),
            }
        }
    }

    fn read_ack(&mut self, phase: Phase) -> Result<(), TransferError> {
        match self.read_byte(phase)? {
            Some(RESP_OK) => Ok(()),
            Some(received) => Err(TransferError::Protocol { phase, received }),
            None => Err(TransferError::NoAcknowledgement { phase }),
        }
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

/// Send `bundle` with the default transfer configuration.
///
/// The channel is consumed and closed when the session ends, whatever the outcome.
pub fn send_update<C: Read + Write>(
    channel: C,
    bundle: &Bundle,
    trusted_key: &VerifyingKey,
    debug: bool,
) -> Result<(), TransferError> {
    UpdateSession::new(channel, TransferConfig::default()).run(bundle, trusted_key, debug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_bundle;
    use crate::keys::{AesKey, Iv128, KeyMaterial};
    use p256::ecdsa::SigningKey;
    use std::collections::VecDeque;

    /// Replies with a scripted byte sequence and records everything written
    #[derive(Default)]
    struct ScriptedPort {
        replies: VecDeque<u8>,
        written: Vec<u8>,
    }

    impl ScriptedPort {
        fn new(replies: &[u8]) -> Self {
            Self {
                replies: replies.iter().copied().collect(),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.replies.pop_front() {
                Some(b) => {
                    buf[0] = b;
                    Ok(1)
                }
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "no reply")),
            }
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn keys() -> KeyMaterial {
        KeyMaterial::new(
            AesKey([0x10; 32]),
            Iv128([0x20; 16]),
            SigningKey::from_slice(&[0x30; 32]).unwrap(),
        )
    }

    fn fast_config() -> TransferConfig {
        TransferConfig {
            frame_delay_ms: 0,
            handshake_attempts: 4,
            ..TransferConfig::default()
        }
    }

    #[test]
    fn test_states_on_success() {
        let keys = keys();
        let bundle = build_bundle(&[0xAA; 20], 2, "", &keys).unwrap();
        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0\0"), fast_config());
        assert_eq!(session.state(), SessionState::Idle);

        session.run(&bundle, keys.verifying_key(), false).unwrap();
        assert_eq!(session.state(), SessionState::Done);

        let port = session.into_inner();
        // U + header + 16-byte frame + 4-byte frame + sentinel
        assert_eq!(port.written.len(), 1 + 4 + 18 + 6 + 2);
        assert!(port.replies.is_empty());
    }

    #[test]
    fn test_version_zero_allowed_in_debug() {
        let keys = keys();
        let bundle = build_bundle(b"dbg", 0, "debug build", &keys).unwrap();
        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0"), fast_config());
        session.run(&bundle, keys.verifying_key(), true).unwrap();
        assert_eq!(&session.into_inner().written[1..5], &[0, 0, 3, 0]);
    }

    #[test]
    fn test_version_zero_rejected_without_debug() {
        let keys = keys();
        let bundle = build_bundle(b"dbg", 0, "", &keys).unwrap();
        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0"), fast_config());
        let err = session.run(&bundle, keys.verifying_key(), false).unwrap_err();
        assert!(matches!(err, TransferError::InvalidVersion { version: 0 }));
        assert_eq!(session.state(), SessionState::Aborted);
        assert!(session.into_inner().written.is_empty());
    }

    #[test]
    fn test_downgrade_floor() {
        let keys = keys();
        let bundle = build_bundle(b"old", 3, "", &keys).unwrap();
        let config = TransferConfig {
            minimum_version: Some(5),
            ..fast_config()
        };

        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0"), config.clone());
        let err = session.run(&bundle, keys.verifying_key(), false).unwrap_err();
        assert!(matches!(err, TransferError::DowngradeRejected { version: 3, minimum: 5 }));
        assert!(err.is_pre_transfer());
        assert!(session.into_inner().written.is_empty());

        // Debug builds bypass the floor
        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0"), config);
        session.run(&bundle, keys.verifying_key(), true).unwrap();
    }

    #[test]
    fn test_handshake_skips_noise_then_times_out() {
        let keys = keys();
        let bundle = build_bundle(b"fw", 1, "", &keys).unwrap();

        // Noise before the echo is tolerated
        let mut session = UpdateSession::new(ScriptedPort::new(b"xyU\0\0"), fast_config());
        session.run(&bundle, keys.verifying_key(), false).unwrap();

        // Noise beyond the attempt budget is not
        let mut session = UpdateSession::new(ScriptedPort::new(b"xxxxxxU"), fast_config());
        let err = session.run(&bundle, keys.verifying_key(), false).unwrap_err();
        assert!(matches!(err, TransferError::HandshakeTimeout { attempts: 4, .. }));
        assert_eq!(session.into_inner().written, vec![HANDSHAKE_BYTE]);
    }

    #[test]
    fn test_handshake_reads_once_with_zero_bounds() {
        let keys = keys();
        let bundle = build_bundle(b"fw", 1, "", &keys).unwrap();
        let config = TransferConfig {
            handshake_attempts: 0,
            handshake_timeout_ms: 0,
            ..fast_config()
        };

        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0"), config.clone());
        session.run(&bundle, keys.verifying_key(), false).unwrap();
        assert_eq!(session.state(), SessionState::Done);

        let mut session = UpdateSession::new(ScriptedPort::new(b""), config);
        let err = session.run(&bundle, keys.verifying_key(), false).unwrap_err();
        assert!(matches!(err, TransferError::HandshakeTimeout { attempts: 1, .. }));
    }

    #[test]
    fn test_metadata_rejection_reports_byte() {
        let keys = keys();
        let bundle = build_bundle(b"fw", 1, "", &keys).unwrap();
        let mut session = UpdateSession::new(ScriptedPort::new(b"UE"), fast_config());
        let err = session.run(&bundle, keys.verifying_key(), false).unwrap_err();
        assert!(matches!(
            err,
            TransferError::Protocol { phase: Phase::Metadata, received: b'E' }
        ));
        assert!(err.to_string().contains("0x45"));
        // Handshake and header only; no frames
        assert_eq!(session.into_inner().written.len(), 5);
    }

    #[test]
    fn test_commit_confirmation() {
        let keys = keys();
        let bundle = build_bundle(b"fw", 1, "", &keys).unwrap();
        let config = TransferConfig {
            confirm_commit: true,
            ..fast_config()
        };

        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0\0"), config.clone());
        session.run(&bundle, keys.verifying_key(), false).unwrap();

        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0"), config);
        let err = session.run(&bundle, keys.verifying_key(), false).unwrap_err();
        assert!(matches!(
            err,
            TransferError::NoAcknowledgement { phase: Phase::EndOfStream }
        ));
    }

    #[test]
    fn test_silent_frame_ack() {
        let keys = keys();
        let bundle = build_bundle(&[1u8; 40], 1, "", &keys).unwrap();
        let mut session = UpdateSession::new(ScriptedPort::new(b"U\0\0"), fast_config());
        let err = session.run(&bundle, keys.verifying_key(), false).unwrap_err();
        assert!(matches!(
            err,
            TransferError::NoAcknowledgement { phase: Phase::Frame { index: 1, offset: 16 } }
        ));
    }

    #[test]
    fn test_error_classification() {
        let err = TransferError::HandshakeTimeout {
            attempts: 1,
            elapsed: Duration::from_secs(2),
        };
        assert!(err.is_retryable());
        assert!(err.suggestion().is_some());
        assert!(!TransferError::InvalidVersion { version: 0 }.is_retryable());
    }
}
