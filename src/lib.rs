//! This crate provides an interface for communicating with and controlling the MMPSU v2 multi-phase
//! power supply over its serial link.
//!
//! Every exchange is one request packet from the host answered by one reply packet from the device:
//!
//! | Offset    | Size | Content                                  |
//! |-----------|------|------------------------------------------|
//! | 0         | 1    | Start byte, `0xA5`                       |
//! | 1         | 1    | Command, see [`packet::Command`]         |
//! | 2         | 2    | Payload length, little-endian            |
//! | 4         | N    | Payload                                  |
//! | 4 + N     | 2    | Checksum over the payload, big-endian    |
//!
//! Read and write payloads are made of 5 byte units: a register number followed by its 4 byte
//! little-endian value. The registers and their types are listed in [`register::Register`].
//!
//! The serial port used for PSU comms should be configured like so:
//! * Default baud rate: 115200
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! With the `serial` feature, [`transport::SerialTransport`] opens a host serial port configured this way.
//!
//! ```no_run
//! # #[cfg(feature = "serial")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use mmpsu_v2::{Mmpsu, PortConfig, transport::SerialTransport};
//!
//! let port = SerialTransport::open(&PortConfig::new("/dev/ttyUSB0"))?;
//! let psu = Mmpsu::new(port);
//! psu.write_field("VOUT_SETPOINT", 12_000)?;
//! psu.write_field("OUTPUT_ENABLED", true)?;
//! println!("{}", psu.read_field("VOUT_MEASURED")?);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "serial"))]
//! # fn main() {}
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod packet;
pub mod psu;
pub mod register;
pub mod transport;

#[cfg(test)]
mod mock_serial;

pub use checksum::{Checksum, ChecksumKind};
pub use config::PortConfig;
pub use error::{Error, Result};
pub use psu::{FieldValues, Mmpsu};
pub use register::{FieldCatalog, FieldDescriptor, Register, RegisterValue, ValueKind};
