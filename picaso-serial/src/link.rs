//! The transport seam.
//!
//! [`SerialLink`] is the minimal surface the channel and driver need
//! from a serial device. [`SystemPort`] implements it over the
//! `serialport` crate; the test mock implements it over byte queues.

use std::io::{Read, Write};
use std::time::Duration;

use crate::config::{DataBits, Parity, SerialConfig, StopBits};

/// Transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("could not open port '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    #[error("port not open")]
    NotOpen,
    /// The hardware or OS silently substituted a different rate.
    #[error("speed not supported by hardware ({0} baud)")]
    SpeedNotSupported(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Port(#[from] serialport::Error),
}

/// A byte-oriented duplex serial device.
///
/// `read` is bounded: it returns as soon as at least one byte is
/// available or the timeout expires (`Ok(0)`); it never blocks past the
/// timeout. `write` queues as many bytes as the OS will take right now
/// and reports transient back-pressure as `Ok(0)`, not as an error.
pub trait SerialLink: Send {
    /// Queue bytes for transmission; returns the number accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize, SerialError>;

    /// Read available bytes, waiting up to `timeout` for the first one.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError>;

    /// Switch the bit rate in place, verifying the achieved rate.
    fn set_baud(&mut self, baud: u32) -> Result<(), SerialError>;

    /// The currently configured bit rate.
    fn baud(&mut self) -> Result<u32, SerialError>;

    /// Discard everything in the OS receive queue.
    fn clear_input(&mut self) -> Result<(), SerialError>;

    /// Block until the OS transmit queue has drained onto the wire.
    fn drain(&mut self) -> Result<(), SerialError>;

    /// Close and reopen the device with the same parameters.
    fn reopen(&mut self) -> Result<(), SerialError>;
}

/// A real serial device.
pub struct SystemPort {
    port: Box<dyn serialport::SerialPort>,
    path: String,
    config: SerialConfig,
}

impl SystemPort {
    /// Open `path` with the given parameters.
    ///
    /// The port is opened raw (no line discipline, no flow control, no
    /// controlling terminal) and the achieved output rate is read back;
    /// if the hardware substituted a different rate the open fails.
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, SerialError> {
        let port = serialport::new(path, config.baud)
            .data_bits(data_bits(config.data_bits))
            .parity(parity(config.parity))
            .stop_bits(stop_bits(config.stop_bits))
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|source| SerialError::Open {
                path: path.to_owned(),
                source,
            })?;

        let achieved = port.baud_rate()?;
        if achieved != config.baud {
            return Err(SerialError::SpeedNotSupported(config.baud));
        }

        log::debug!("opened {} at {} baud", path, config.baud);
        Ok(Self {
            port,
            path: path.to_owned(),
            config: *config,
        })
    }

    /// The device path this port was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl SerialLink for SystemPort {
    fn write(&mut self, buf: &[u8]) -> Result<usize, SerialError> {
        match self.port.write(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, SerialError> {
        // serialport expresses "wait for the first byte" as the port
        // timeout; a zero timeout would mean "wait forever" on some
        // platforms, so clamp to 1 ms.
        self.port.set_timeout(timeout.max(Duration::from_millis(1)))?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if is_transient(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn set_baud(&mut self, baud: u32) -> Result<(), SerialError> {
        self.port.set_baud_rate(baud)?;
        if self.port.baud_rate()? != baud {
            return Err(SerialError::SpeedNotSupported(baud));
        }
        // Discard anything mangled by the rate transient, both ways.
        self.port.clear(serialport::ClearBuffer::All)?;
        self.config.baud = baud;
        log::debug!("{} now at {} baud", self.path, baud);
        Ok(())
    }

    fn baud(&mut self) -> Result<u32, SerialError> {
        Ok(self.port.baud_rate()?)
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        Ok(self.port.clear(serialport::ClearBuffer::Input)?)
    }

    fn drain(&mut self) -> Result<(), SerialError> {
        Ok(self.port.flush()?)
    }

    fn reopen(&mut self) -> Result<(), SerialError> {
        let fresh = SystemPort::open(&self.path, &self.config)?;
        self.port = fresh.port;
        Ok(())
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted
    )
}

fn data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

fn stop_bits(bits: StopBits) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
    }
}
