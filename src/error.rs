//! Our error types for the MMPSU v2.

use thiserror::Error;

use crate::packet::{ErrorCode, PacketError};
use crate::register::FieldError;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Failure of a transaction with the MMPSU.
///
/// `I` is the error type of the serial interface.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    #[error("Serial communication error")]
    SerialError(I),
    #[error("Communication timeout")]
    Timeout,
    #[error("Reply failed checksum")]
    Checksum,
    #[error("Device reported {0}")]
    Device(ErrorCode),
    #[error("Unexpected reply packet type 0x{0:02X}")]
    UnexpectedReply(u8),
    #[error("Malformed reply: {0}")]
    MalformedReply(PacketError),
    #[error("Packed {actual} payload bytes, expected {expected}")]
    Encoding { expected: usize, actual: usize },
    #[error("Field {0} is read only")]
    ReadOnlyField(&'static str),
    #[error("Reply did not include field {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Field(FieldError),
    #[error("Could not frame request: {0}")]
    Packet(PacketError),
}

impl<I: embedded_io::Error> From<FieldError> for Error<I> {
    fn from(err: FieldError) -> Self {
        Error::Field(err)
    }
}

impl<I: embedded_io::Error> From<PacketError> for Error<I> {
    fn from(err: PacketError) -> Self {
        Error::Packet(err)
    }
}

impl<I: embedded_io::Error> Error<I> {
    /// Whether this failure came from a reply with a bad checksum, on either end of the link.
    pub fn is_checksum_error(&self) -> bool {
        matches!(self, Error::Checksum | Error::Device(ErrorCode::Crc))
    }
}
