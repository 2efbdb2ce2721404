//! Serial transport
//!
//! Any `Read + Write` value can carry an update session; this module opens
//! the real serial port with the configured line settings.

use crate::config::TransferConfig;
use serialport::SerialPort;
use tracing::info;

/// Open `port` at the configured baud rate with the per-read timeout applied
pub fn open_serial(port: &str, config: &TransferConfig) -> serialport::Result<Box<dyn SerialPort>> {
    info!(port, baud = config.baud_rate, "opening serial port");
    serialport::new(port, config.baud_rate)
        .timeout(config.read_timeout())
        .open()
}
