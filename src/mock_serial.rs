//! We use this mocking module in unit tests to emulate a serial port, and optionally the MMPSU on
//! the other end of it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use crate::checksum::ChecksumKind;
use crate::packet::{Command, ErrorCode, HEADER_SIZE, Packet, total_packet_length};
use crate::register::{FIELD_UNIT_SIZE, FieldCatalog, VALUE_SIZE};

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Something that happened on the mock port, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A complete request packet was written.
    Sent { thread: ThreadId, command: u8 },
    /// A read returned this many bytes.
    Received { thread: ThreadId, len: usize },
}

/// Our mock type used to emulate a serial port.
pub struct MockSerial {
    /// Data written to the mock serial port
    write_buffer: Vec<u8>,
    /// Bytes of the request currently being written, when a responder is set
    request: Vec<u8>,
    /// Data to be returned by read()
    read_buffer: VecDeque<u8>,
    /// Builds the reply to each complete request packet
    responder: Option<Responder>,
    /// Shared record of writes and reads
    events: Option<Arc<Mutex<Vec<Event>>>>,
    /// Sleep before each read
    read_delay: Option<Duration>,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Error to return from read
    read_error: Option<MockSerialError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockSerialError {
    /// Simulated timeout error
    Timeout,
    /// Generic simulated error for testing
    SimulatedError,
}

impl core::fmt::Display for MockSerialError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl core::error::Error for MockSerialError {}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }

        self.write_buffer.extend_from_slice(buf);

        if self.responder.is_some() {
            self.request.extend_from_slice(buf);
            self.answer_complete_requests();
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }

        if let Some(err) = self.read_error {
            return Err(err);
        }

        // Out of data, behave like a port whose read timeout expired.
        let bytes_to_read = buf.len().min(self.read_buffer.len());
        for (slot, byte) in buf.iter_mut().zip(self.read_buffer.drain(..bytes_to_read)) {
            *slot = byte;
        }

        self.record(|thread| Event::Received {
            thread,
            len: bytes_to_read,
        });
        Ok(bytes_to_read)
    }
}

impl MockSerial {
    /// Create a new MockSerial instance with empty buffers
    pub fn new() -> Self {
        Self {
            write_buffer: Vec::new(),
            request: Vec::new(),
            read_buffer: VecDeque::new(),
            responder: None,
            events: None,
            read_delay: None,
            should_error_on_write: false,
            read_error: None,
        }
    }

    /// A port with an emulated MMPSU attached, see [`MockDevice`].
    pub fn with_device(mut device: MockDevice) -> Self {
        let mut mock = Self::new();
        mock.set_responder(move |request| device.respond(request));
        mock
    }

    /// Set the data that will be returned when read() is called
    pub fn set_read_data(&mut self, data: &[u8]) {
        self.read_buffer.clear();
        self.read_buffer.extend(data);
    }

    /// Reply to each complete request packet with the bytes returned by `responder`.
    pub fn set_responder(&mut self, responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) {
        self.responder = Some(Box::new(responder));
    }

    /// Record writes and reads into `events`.
    pub fn set_event_log(&mut self, events: Arc<Mutex<Vec<Event>>>) {
        self.events = Some(events);
    }

    pub fn set_read_delay(&mut self, delay: Duration) {
        self.read_delay = Some(delay);
    }

    /// Get a reference to the data that was written to this mock serial port
    pub fn written_data(&self) -> &[u8] {
        &self.write_buffer
    }

    /// Clear the write buffer
    pub fn clear_written_data(&mut self) {
        self.write_buffer.clear();
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&mut self, should_error: bool) {
        self.should_error_on_write = should_error;
    }

    /// Configure an error for read operations to fail with
    pub fn set_read_error(&mut self, error: Option<MockSerialError>) {
        self.read_error = error;
    }

    fn answer_complete_requests(&mut self) {
        while self.request.len() >= HEADER_SIZE {
            let length = total_packet_length(&self.request);
            if self.request.len() < length {
                return;
            }
            let request: Vec<u8> = self.request.drain(..length).collect();
            self.record(|thread| Event::Sent {
                thread,
                command: request[1],
            });
            if let Some(responder) = self.responder.as_mut() {
                let reply = responder(&request);
                self.read_buffer.extend(reply);
            }
        }
    }

    fn record(&self, event: impl FnOnce(ThreadId) -> Event) {
        if let Some(events) = &self.events {
            events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event(std::thread::current().id()));
        }
    }
}

/// Emulates the MMPSU end of the link: a register store that answers requests.
pub struct MockDevice {
    registers: BTreeMap<u8, [u8; VALUE_SIZE]>,
    checksum: ChecksumKind,
}

impl MockDevice {
    /// Every register of the MMPSU v2 set to zero.
    pub fn new() -> Self {
        let registers = FieldCatalog::mmpsu_v2()
            .iter()
            .map(|field| (field.register, [0u8; VALUE_SIZE]))
            .collect();
        Self {
            registers,
            checksum: ChecksumKind::default(),
        }
    }

    pub fn with_register(mut self, register: u8, value: [u8; VALUE_SIZE]) -> Self {
        self.registers.insert(register, value);
        self
    }

    pub fn register(&self, register: u8) -> Option<[u8; VALUE_SIZE]> {
        self.registers.get(&register).copied()
    }

    /// Build the reply to one request packet.
    pub fn respond(&mut self, request: &[u8]) -> Vec<u8> {
        let Ok(request) = Packet::<1024>::parse(request) else {
            return self.error(ErrorCode::Crc);
        };
        if !request.verify_checksum(&self.checksum) {
            return self.error(ErrorCode::Crc);
        }

        let payload = request.payload();
        match request.command() {
            Some(Command::TestComms) => self.reply(Command::TestComms, payload),
            Some(Command::Read) => {
                let reply = self.read(payload.iter().copied());
                self.reply(Command::Read, &reply)
            }
            Some(Command::ReadAll) => {
                let all: Vec<u8> = self.registers.keys().copied().collect();
                let reply = self.read(all);
                self.reply(Command::ReadAll, &reply)
            }
            Some(Command::Write) => {
                for unit in payload.chunks_exact(FIELD_UNIT_SIZE) {
                    let mut value = [0u8; VALUE_SIZE];
                    value.copy_from_slice(&unit[1..]);
                    self.registers.insert(unit[0], value);
                }
                self.reply(Command::Write, &[])
            }
            _ => self.error(ErrorCode::UnknownCommand),
        }
    }

    fn read(&self, registers: impl IntoIterator<Item = u8>) -> Vec<u8> {
        let mut reply = Vec::new();
        for register in registers {
            if let Some(value) = self.registers.get(&register) {
                reply.push(register);
                reply.extend_from_slice(value);
            }
        }
        reply
    }

    fn reply(&self, command: Command, payload: &[u8]) -> Vec<u8> {
        Packet::<1024>::new(command, payload, &self.checksum)
            .map(|packet| packet.as_bytes().to_vec())
            .unwrap_or_default()
    }

    fn error(&self, code: ErrorCode) -> Vec<u8> {
        self.reply(Command::Error, &[code.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    #[test]
    fn test_write_data() {
        let mut mock = MockSerial::new();
        let test_data = b"Hello, World!";

        let result = mock.write(test_data);
        assert_eq!(result, Ok(test_data.len()));
        assert_eq!(mock.written_data(), test_data);

        mock.clear_written_data();
        assert!(mock.written_data().is_empty());
    }

    #[test]
    fn test_read_partial_data() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Long response data");

        let mut buffer = [0u8; 5];
        assert_eq!(mock.read(&mut buffer), Ok(5));
        assert_eq!(&buffer, b"Long ");
    }

    #[test]
    fn test_read_returns_zero_when_exhausted() {
        let mut mock = MockSerial::new();
        mock.set_read_data(b"Hi");

        let mut buffer = [0u8; 10];
        assert_eq!(mock.read(&mut buffer), Ok(2));
        assert_eq!(mock.read(&mut buffer), Ok(0));
    }

    #[test]
    fn test_error_simulation() {
        let mut mock = MockSerial::new();
        mock.set_write_error(true);
        assert_eq!(mock.write(b"test"), Err(MockSerialError::SimulatedError));
        assert_eq!(mock.flush(), Err(MockSerialError::SimulatedError));
        assert!(mock.written_data().is_empty());

        mock.set_read_data(b"data");
        mock.set_read_error(Some(MockSerialError::Timeout));
        let mut buffer = [0u8; 10];
        assert_eq!(mock.read(&mut buffer), Err(MockSerialError::Timeout));
        mock.set_read_error(None);
        assert_eq!(mock.read(&mut buffer), Ok(4));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(MockSerialError::Timeout.kind(), embedded_io::ErrorKind::TimedOut);
        assert_eq!(MockSerialError::SimulatedError.kind(), embedded_io::ErrorKind::Other);
    }

    #[test]
    fn test_responder_sees_whole_packets() {
        let mut mock = MockSerial::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_responder = Arc::clone(&seen);
        mock.set_responder(move |request| {
            seen_by_responder.lock().unwrap().push(request.to_vec());
            vec![0xAB]
        });

        // A packet split across writes, followed by a second packet in the same write.
        mock.write(&[0xA5, 0x01, 0x01]).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        mock.write(&[0x00, 0x02, 0x00, 0x00, 0xA5, 0x03, 0x00, 0x00, 0x00, 0x00])
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], [0xA5, 0x01, 0x01, 0x00, 0x02, 0x00, 0x00]);
        assert_eq!(seen[1], [0xA5, 0x03, 0x00, 0x00, 0x00, 0x00]);

        let mut buffer = [0u8; 4];
        assert_eq!(mock.read(&mut buffer), Ok(2));
        assert_eq!(buffer[..2], [0xAB, 0xAB]);
    }

    #[test]
    fn test_device_echo_and_write() {
        let mut device = MockDevice::new();

        let request = Packet::<16>::new(Command::TestComms, &[1, 2, 3, 4], &ChecksumKind::default())
            .unwrap();
        let reply = device.respond(request.as_bytes());
        assert_eq!(reply, request.as_bytes());

        let request = Packet::<16>::new(
            Command::Write,
            &[0x02, 0x10, 0x27, 0x00, 0x00],
            &ChecksumKind::default(),
        )
        .unwrap();
        device.respond(request.as_bytes());
        assert_eq!(device.register(2), Some([0x10, 0x27, 0x00, 0x00]));
    }

    #[test]
    fn test_device_rejects_bad_checksum() {
        let mut device = MockDevice::new();
        let request = Packet::<16>::new(Command::ReadAll, &[], &ChecksumKind::Zero).unwrap();
        let reply = Packet::<16>::parse(&device.respond(request.as_bytes())).unwrap();
        assert_eq!(reply.command(), Some(Command::Error));
        assert_eq!(reply.payload(), [0x01]);
    }
}
