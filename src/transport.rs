//! The byte stream underneath the protocol.
//!
//! Any interface implementing [`embedded_io::Read`] and [`embedded_io::Write`] can carry the
//! protocol, provided its reads give up after a timeout: either by returning an error of kind
//! [`embedded_io::ErrorKind::TimedOut`] or by returning `Ok(0)`. The command engine reads each
//! reply in two exact-sized chunks, the header and then the payload plus checksum.

use embedded_io::{Error as _, ErrorKind, ReadExactError};

use crate::error::{Error, Result};

/// Write all of `bytes` and flush.
pub(crate) fn send<S: embedded_io::Write>(interface: &mut S, bytes: &[u8]) -> Result<(), S::Error> {
    interface.write_all(bytes).map_err(Error::SerialError)?;
    interface.flush().map_err(Error::SerialError)
}

/// Fill `buffer` completely. Running out of data before it is full is a timeout.
pub(crate) fn receive_exact<S: embedded_io::Read>(
    interface: &mut S,
    buffer: &mut [u8],
) -> Result<(), S::Error> {
    interface.read_exact(buffer).map_err(|e| match e {
        ReadExactError::UnexpectedEof => Error::Timeout,
        ReadExactError::Other(e) if e.kind() == ErrorKind::TimedOut => Error::Timeout,
        ReadExactError::Other(e) => Error::SerialError(e),
    })
}

/// Read and drop `count` bytes so the next reply starts on a packet boundary.
pub(crate) fn discard<S: embedded_io::Read>(
    interface: &mut S,
    mut count: usize,
) -> Result<(), S::Error> {
    let mut scratch = [0u8; 32];
    while count > 0 {
        let chunk = count.min(scratch.len());
        receive_exact(interface, &mut scratch[..chunk])?;
        count -= chunk;
    }
    Ok(())
}

#[cfg(feature = "serial")]
pub use self::serial::{IoError, SerialTransport};

#[cfg(feature = "serial")]
mod serial {
    use serialport::SerialPort;

    use crate::config::PortConfig;

    /// A host serial port opened with [`serialport`].
    pub struct SerialTransport(Box<dyn SerialPort>);

    impl SerialTransport {
        /// Open the port described by `config`, 8N1 with the configured read timeout.
        pub fn open(config: &PortConfig) -> Result<Self, serialport::Error> {
            let port = serialport::new(&config.path, config.baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None)
                .timeout(config.timeout_duration())
                .open()?;
            Ok(Self(port))
        }

        /// Wrap an already opened port.
        pub fn from_port(port: Box<dyn SerialPort>) -> Self {
            Self(port)
        }
    }

    #[derive(Debug)]
    pub struct IoError(pub std::io::Error);

    impl core::fmt::Display for IoError {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for IoError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    impl embedded_io::Error for IoError {
        fn kind(&self) -> embedded_io::ErrorKind {
            use embedded_io::ErrorKind as EK;
            use std::io::ErrorKind as SK;
            match self.0.kind() {
                SK::NotFound => EK::NotFound,
                SK::PermissionDenied => EK::PermissionDenied,
                SK::BrokenPipe => EK::BrokenPipe,
                SK::InvalidInput => EK::InvalidInput,
                SK::InvalidData => EK::InvalidData,
                // Serial ports report an expired read timeout as either of these.
                SK::TimedOut | SK::WouldBlock => EK::TimedOut,
                SK::Interrupted => EK::Interrupted,
                SK::Unsupported => EK::Unsupported,
                SK::OutOfMemory => EK::OutOfMemory,
                _ => EK::Other,
            }
        }
    }

    impl embedded_io::ErrorType for SerialTransport {
        type Error = IoError;
    }

    impl embedded_io::Read for SerialTransport {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            std::io::Read::read(&mut self.0, buf).map_err(IoError)
        }
    }

    impl embedded_io::Write for SerialTransport {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            std::io::Write::write(&mut self.0, buf).map_err(IoError)
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            std::io::Write::flush(&mut self.0).map_err(IoError)
        }
    }

}
