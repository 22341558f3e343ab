//! Serial link settings for talking to the MMPSU.
//!
//! The MMPSU UART runs at 115200 baud, 8 data bits, 1 stop bit, no parity.

use fugit::MillisDurationU32;

/// Default baud rate of the MMPSU UART.
pub const MMPSU_UART_BAUD: u32 = 115_200;

/// How long to wait for a reply before giving up on a transaction.
pub const DEFAULT_TIMEOUT: MillisDurationU32 = MillisDurationU32::millis(250);

/// Where and how to open the serial port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub path: String,
    pub baud_rate: u32,
    /// Read timeout applied to every read of the reply.
    pub timeout: MillisDurationU32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: MMPSU_UART_BAUD,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PortConfig {
    /// Default settings for the port at `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.timeout = timeout;
        self
    }

    /// The read timeout as a std duration, for serial port APIs.
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout.to_millis() as u64)
    }
}
