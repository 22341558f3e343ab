use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::{
    checksum::{Checksum, ChecksumKind},
    error::{Error, Result},
    packet::{Command, ErrorCode, HEADER_SIZE, Hex, MIN_PACKET_SIZE, Packet, PacketError},
    register::{FIELD_UNIT_SIZE, FieldCatalog, RegisterValue},
    transport,
};

/// Field name to value, as decoded from a read reply.
pub type FieldValues = BTreeMap<&'static str, RegisterValue>;

/// Payload of a TEST_COMMS request. The device echoes it back unchanged.
pub const TEST_COMMS_PATTERN: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// You can create a Mmpsu using any interface which implements [embedded_io::Read] & [embedded_io::Write],
/// as long as its reads time out. See [`crate::transport`].
///
/// Every method performs one complete request/reply transaction. Transactions are serialized by an
/// internal lock, so a `Mmpsu` can be shared between threads (e.g. in an `Arc`) and only ever has
/// one request in flight on the wire.
///
/// `L` is the capacity in bytes of the packet buffers, and so bounds the size of any request or reply.
pub struct Mmpsu<
    S: embedded_io::Read + embedded_io::Write,
    C: Checksum = ChecksumKind,
    const L: usize = 512,
> {
    link: Mutex<Link<S>>,
    checksum: C,
    catalog: &'static FieldCatalog,
}

/// State guarded by the transaction lock.
struct Link<S> {
    interface: S,
    /// Replies we received with a bad checksum.
    rx_crc_errors: u32,
    /// Requests the device received with a bad checksum.
    device_crc_errors: u32,
}

impl<S: embedded_io::Read + embedded_io::Write> Mmpsu<S> {
    /// Create a new Mmpsu using the default CRC-16/MODBUS checksum.
    pub fn new(interface: S) -> Self {
        Self::with_checksum(interface, ChecksumKind::default())
    }
}

impl<S: embedded_io::Read + embedded_io::Write, C: Checksum, const L: usize> Mmpsu<S, C, L> {
    /// Create a new Mmpsu with the given packet checksum, which must match the device firmware.
    pub fn with_checksum(interface: S, checksum: C) -> Self {
        Self {
            link: Mutex::new(Link {
                interface,
                rx_crc_errors: 0,
                device_crc_errors: 0,
            }),
            checksum,
            catalog: FieldCatalog::mmpsu_v2(),
        }
    }

    /// Use a different register map than the MMPSU v2 one.
    pub fn with_catalog(mut self, catalog: &'static FieldCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn catalog(&self) -> &'static FieldCatalog {
        self.catalog
    }

    /// Release the serial interface.
    pub fn into_inner(self) -> S {
        self.link
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .interface
    }

    /// Check the link by sending a known pattern and comparing the echo.
    ///
    /// Returns `Ok(false)` if the device replied correctly framed but did not echo the pattern.
    pub fn test_comms(&self) -> Result<bool, S::Error> {
        let request = self.packet(Command::TestComms, &TEST_COMMS_PATTERN)?;
        let reply = self.transact(&request)?;
        let echoed = reply.payload() == request.payload();
        if !echoed {
            warn!(echo = %Hex(reply.payload()), "Test comms echo mismatch.");
        }
        Ok(echoed)
    }

    /// Write several fields in one transaction, in the order given.
    ///
    /// Nothing is sent if any name is unknown, read only, or given a value of the wrong type.
    pub fn write_fields<N, V>(&self, values: impl IntoIterator<Item = (N, V)>) -> Result<(), S::Error>
    where
        N: AsRef<str>,
        V: Into<RegisterValue>,
    {
        let mut payload: heapless::Vec<u8, L> = heapless::Vec::new();
        let mut count = 0;
        for (name, value) in values {
            let field = self.catalog.lookup_by_name(name.as_ref())?;
            if !field.writable {
                return Err(Error::ReadOnlyField(field.name));
            }
            let offset = payload.len();
            payload
                .resize(offset + FIELD_UNIT_SIZE, 0x00)
                .map_err(|_| PacketError::PayloadTooLarge(offset + FIELD_UNIT_SIZE))?;
            let written = field.pack(&value.into(), &mut payload, offset)?;
            payload.truncate(offset + written);
            count += 1;
        }

        if payload.len() != FIELD_UNIT_SIZE * count {
            return Err(Error::Encoding {
                expected: FIELD_UNIT_SIZE * count,
                actual: payload.len(),
            });
        }

        let request = self.packet(Command::Write, &payload)?;
        // The reply carries nothing we need, only that it is valid.
        self.transact(&request)?;
        Ok(())
    }

    /// Write a single field.
    pub fn write_field(&self, name: &str, value: impl Into<RegisterValue>) -> Result<(), S::Error> {
        self.write_fields([(name, value.into())])
    }

    /// Read several fields in one transaction.
    pub fn read_fields<N: AsRef<str>>(
        &self,
        names: impl IntoIterator<Item = N>,
    ) -> Result<FieldValues, S::Error> {
        let mut payload: heapless::Vec<u8, L> = heapless::Vec::new();
        for name in names {
            let field = self.catalog.lookup_by_name(name.as_ref())?;
            payload
                .push(field.register)
                .map_err(|_| PacketError::PayloadTooLarge(payload.len() + 1))?;
        }

        let request = self.packet(Command::Read, &payload)?;
        let reply = self.transact(&request)?;
        self.decode_fields(reply.payload())
    }

    /// Read a single field.
    pub fn read_field(&self, name: &str) -> Result<RegisterValue, S::Error> {
        let field = self.catalog.lookup_by_name(name)?;
        self.read_fields([name])?
            .remove(field.name)
            .ok_or(Error::MissingField(field.name))
    }

    /// Read every field the device has.
    pub fn read_all_fields(&self) -> Result<FieldValues, S::Error> {
        let request = self.packet(Command::ReadAll, &[])?;
        let reply = self.transact(&request)?;
        self.decode_fields(reply.payload())
    }

    /// Count of replies received with a bad checksum since the last call.
    pub fn take_rx_crc_error_count(&self) -> u32 {
        core::mem::take(&mut self.lock().rx_crc_errors)
    }

    /// Count of bad checksums reported by the device since the last call.
    pub fn take_device_crc_error_count(&self) -> u32 {
        core::mem::take(&mut self.lock().device_crc_errors)
    }

    fn packet(&self, command: Command, payload: &[u8]) -> Result<Packet<L>, S::Error> {
        Ok(Packet::new(command, payload, &self.checksum)?)
    }

    fn lock(&self) -> MutexGuard<'_, Link<S>> {
        // A panic mid-transaction leaves nothing half updated except the byte stream itself.
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a request and wait for its validated reply, holding the lock throughout.
    fn transact(&self, request: &Packet<L>) -> Result<Packet<L>, S::Error> {
        let mut link = self.lock();

        debug!(packet = %Hex(request.as_bytes()), "Tx");
        transport::send(&mut link.interface, request.as_bytes())?;

        let reply = match Self::receive(&mut link.interface) {
            Ok(reply) => reply,
            Err(Error::Timeout) => {
                warn!("Read packet timeout.");
                return Err(Error::Timeout);
            }
            Err(e) => return Err(e),
        };
        debug!(packet = %Hex(&reply), "Rx");

        self.verify_reply(&mut link, request.command_byte(), &reply)
    }

    /// Read one packet: the header first, then as many bytes as it declares.
    fn receive(interface: &mut S) -> Result<heapless::Vec<u8, L>, S::Error> {
        let mut header = [0u8; HEADER_SIZE];
        transport::receive_exact(interface, &mut header)?;

        let total = crate::packet::total_packet_length(&header);
        let mut reply: heapless::Vec<u8, L> = heapless::Vec::new();
        if reply.resize(total, 0x00).is_err() {
            // Skip the rest so the next reply is read from its start.
            transport::discard(interface, total - HEADER_SIZE)?;
            return Err(Error::MalformedReply(PacketError::PayloadTooLarge(
                total - MIN_PACKET_SIZE,
            )));
        }
        reply[..HEADER_SIZE].copy_from_slice(&header);
        transport::receive_exact(interface, &mut reply[HEADER_SIZE..])?;
        Ok(reply)
    }

    /// Check a reply for structure, checksum and type, counting checksum failures.
    fn verify_reply(
        &self,
        link: &mut Link<S>,
        request_command: u8,
        reply: &[u8],
    ) -> Result<Packet<L>, S::Error> {
        let reply = Packet::<L>::parse(reply).map_err(Error::MalformedReply)?;

        if !reply.verify_checksum(&self.checksum) {
            link.rx_crc_errors += 1;
            warn!("Rx CRC Error.");
            return Err(Error::Checksum);
        }

        if reply.command_byte() != request_command {
            if reply.command() == Some(Command::Error) {
                let code = reply
                    .payload()
                    .first()
                    .copied()
                    .map(ErrorCode::from)
                    .ok_or(Error::MalformedReply(PacketError::MissingErrorCode))?;
                if code == ErrorCode::Crc {
                    link.device_crc_errors += 1;
                }
                warn!(%code, "Comms error.");
                return Err(Error::Device(code));
            }
            warn!(command = reply.command_byte(), "Received unexpected packet type.");
            return Err(Error::UnexpectedReply(reply.command_byte()));
        }

        Ok(reply)
    }

    /// Decode a read reply payload made of register/value units.
    fn decode_fields(&self, payload: &[u8]) -> Result<FieldValues, S::Error> {
        if payload.len() % FIELD_UNIT_SIZE != 0 {
            return Err(Error::MalformedReply(PacketError::PartialField(payload.len())));
        }

        let mut values = FieldValues::new();
        for unit in payload.chunks_exact(FIELD_UNIT_SIZE) {
            let field = self.catalog.lookup_by_register(unit[0])?;
            values.insert(field.name, field.unpack(unit, 1)?);
        }
        Ok(values)
    }
}
