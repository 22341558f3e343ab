//! Wire framing for the MMPSU v2 protocol.
//!
//! Packet format:
//! - START (1 byte): `0xA5`
//! - COMMAND (1 byte): see [`Command`]
//! - LENGTH (2 bytes): payload length, little-endian
//! - PAYLOAD (LENGTH bytes)
//! - CHECKSUM (2 bytes): checksum of the payload only, big-endian

use core::fmt;

use strum_macros::{EnumIter, FromRepr};
use thiserror::Error;

use crate::checksum::Checksum;

/// Packet synchronization byte.
pub const START_BYTE: u8 = 0xA5;
/// Size of START + COMMAND + LENGTH.
pub const HEADER_SIZE: usize = 4;
/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = 2;
/// A packet with an empty payload.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

const COMMAND_INDEX: usize = 1;
const LENGTH_INDEX: usize = 2;

/// Command set, doubling as the message type of replies.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter, FromRepr)]
#[repr(u8)]
pub enum Command {
    None = 0,
    /// Read the registers listed in the payload.
    Read = 1,
    /// Write the register/value units in the payload.
    Write = 2,
    /// Read every register.
    ReadAll = 3,
    /// Echo the payload back.
    TestComms = 4,
    /// Sent by the device instead of the expected reply, payload is an [`ErrorCode`].
    Error = 5,
}

impl From<Command> for u8 {
    fn from(value: Command) -> Self {
        value as u8
    }
}

/// Error codes the device reports in the payload of a [`Command::Error`] packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    None,
    /// The device received a packet with a bad checksum.
    Crc,
    /// The device did not recognise the command.
    UnknownCommand,
    /// A code this driver does not know about.
    Unrecognized(u8),
}

impl From<u8> for ErrorCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::None,
            0x01 => Self::Crc,
            0x02 => Self::UnknownCommand,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(value: ErrorCode) -> Self {
        match value {
            ErrorCode::None => 0x00,
            ErrorCode::Crc => 0x01,
            ErrorCode::UnknownCommand => 0x02,
            ErrorCode::Unrecognized(other) => other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("ERR_NONE"),
            Self::Crc => f.write_str("ERR_CRC"),
            Self::UnknownCommand => f.write_str("ERR_UNKNOWN_CMD"),
            Self::Unrecognized(code) => write!(f, "unrecognized error code 0x{code:02X}"),
        }
    }
}

/// Structural problems with a packet.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    #[error("Packet of {0} bytes is shorter than a header and checksum")]
    TooShort(usize),
    #[error("Bad start byte 0x{0:02X}")]
    BadStartByte(u8),
    #[error("Header declares a {declared} byte packet, got {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("Payload of {0} bytes does not fit in the packet buffer")]
    PayloadTooLarge(usize),
    #[error("Error packet carries no error code")]
    MissingErrorCode,
    #[error("Payload of {0} bytes is not a whole number of fields")]
    PartialField(usize),
}

/// Read the payload length from a packet. A header alone is enough.
///
/// # Panics
///
/// Panics if `buffer` is shorter than [`HEADER_SIZE`].
pub fn payload_length(buffer: &[u8]) -> u16 {
    u16::from_le_bytes([buffer[LENGTH_INDEX], buffer[LENGTH_INDEX + 1]])
}

/// Total size of a packet as declared by its header.
///
/// # Panics
///
/// Panics if `buffer` is shorter than [`HEADER_SIZE`].
pub fn total_packet_length(buffer: &[u8]) -> usize {
    payload_length(buffer) as usize + HEADER_SIZE + CHECKSUM_SIZE
}

/// Write the payload length into a packet header.
///
/// # Panics
///
/// Panics if `buffer` is shorter than [`HEADER_SIZE`].
pub fn set_payload_length(buffer: &mut [u8], length: u16) {
    buffer[LENGTH_INDEX..LENGTH_INDEX + 2].copy_from_slice(&length.to_le_bytes());
}

/// Read the checksum stored after the payload.
///
/// # Panics
///
/// Panics if `buffer` is shorter than the length declared in its header.
pub fn checksum_value(buffer: &[u8]) -> u16 {
    let index = HEADER_SIZE + payload_length(buffer) as usize;
    u16::from_be_bytes([buffer[index], buffer[index + 1]])
}

/// Compute the checksum over the payload and store it after the payload.
///
/// # Panics
///
/// Panics if `buffer` is shorter than the length declared in its header.
pub fn append_checksum(buffer: &mut [u8], checksum: &impl Checksum) {
    let index = HEADER_SIZE + payload_length(buffer) as usize;
    let value = checksum.compute(&buffer[HEADER_SIZE..index]);
    buffer[index..index + CHECKSUM_SIZE].copy_from_slice(&value.to_be_bytes());
}

/// Check the stored checksum against one computed over the payload.
///
/// A buffer too short to hold its declared payload and checksum never verifies.
pub fn verify_checksum(buffer: &[u8], checksum: &impl Checksum) -> bool {
    if buffer.len() < HEADER_SIZE || buffer.len() < total_packet_length(buffer) {
        return false;
    }
    let index = HEADER_SIZE + payload_length(buffer) as usize;
    checksum.compute(&buffer[HEADER_SIZE..index]) == checksum_value(buffer)
}

/// A complete packet, held in a fixed capacity buffer of `L` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet<const L: usize> {
    bytes: heapless::Vec<u8, L>,
}

impl<const L: usize> Packet<L> {
    /// Frame `payload` as a `command` packet and fill in its checksum.
    pub fn new(
        command: Command,
        payload: &[u8],
        checksum: &impl Checksum,
    ) -> Result<Self, PacketError> {
        let length =
            u16::try_from(payload.len()).map_err(|_| PacketError::PayloadTooLarge(payload.len()))?;

        let mut bytes: heapless::Vec<u8, L> = heapless::Vec::new();
        bytes
            .resize(MIN_PACKET_SIZE + payload.len(), 0x00)
            .map_err(|_| PacketError::PayloadTooLarge(payload.len()))?;

        bytes[0] = START_BYTE;
        bytes[COMMAND_INDEX] = command.into();
        set_payload_length(&mut bytes, length);
        bytes[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
        append_checksum(&mut bytes, checksum);

        Ok(Self { bytes })
    }

    /// Check the structure of received bytes and copy them into a packet.
    ///
    /// The checksum is not verified here, see [`Packet::verify_checksum`].
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        check_structure(bytes)?;
        let bytes = heapless::Vec::from_slice(bytes)
            .map_err(|_| PacketError::PayloadTooLarge(bytes.len() - MIN_PACKET_SIZE))?;
        Ok(Self { bytes })
    }

    pub fn command_byte(&self) -> u8 {
        self.bytes[COMMAND_INDEX]
    }

    /// The command of this packet, if it is one we know.
    pub fn command(&self) -> Option<Command> {
        Command::from_repr(self.command_byte())
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..self.bytes.len() - CHECKSUM_SIZE]
    }

    pub fn checksum_value(&self) -> u16 {
        checksum_value(&self.bytes)
    }

    pub fn verify_checksum(&self, checksum: &impl Checksum) -> bool {
        verify_checksum(&self.bytes, checksum)
    }

    /// The complete packet as sent on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false, a packet holds at least a header and checksum.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<const L: usize> TryFrom<heapless::Vec<u8, L>> for Packet<L> {
    type Error = PacketError;

    fn try_from(bytes: heapless::Vec<u8, L>) -> Result<Self, Self::Error> {
        check_structure(&bytes)?;
        Ok(Self { bytes })
    }
}

fn check_structure(bytes: &[u8]) -> Result<(), PacketError> {
    if bytes.len() < MIN_PACKET_SIZE {
        return Err(PacketError::TooShort(bytes.len()));
    }
    if bytes[0] != START_BYTE {
        return Err(PacketError::BadStartByte(bytes[0]));
    }
    let declared = total_packet_length(bytes);
    if declared != bytes.len() {
        return Err(PacketError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Format bytes as space separated hex for logging.
pub(crate) struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}
