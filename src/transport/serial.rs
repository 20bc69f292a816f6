use super::Transport;
use crate::error::TransportError;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

const READ_CHUNK: usize = 64;

// Some drivers return zero bytes instead of timing out.
const EMPTY_READ_PAUSE: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    #[default]
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(format!("stop bits must be 1 or 2, got {}", other)),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

/// Port name and line parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub data_bits: u8,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            parity: Parity::None,
            stop_bits: StopBits::One,
            data_bits: 8,
        }
    }
}

impl SerialSettings {
    pub(crate) fn serial_data_bits(&self) -> Option<serialport::DataBits> {
        match self.data_bits {
            5 => Some(serialport::DataBits::Five),
            6 => Some(serialport::DataBits::Six),
            7 => Some(serialport::DataBits::Seven),
            8 => Some(serialport::DataBits::Eight),
            _ => None,
        }
    }

    fn serial_parity(&self) -> serialport::Parity {
        match self.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }

    fn serial_stop_bits(&self) -> serialport::StopBits {
        match self.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// A [`Transport`] over a system serial port.
pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Opens and configures the port described by `settings`.
    pub fn open(settings: &SerialSettings) -> Result<Self, TransportError> {
        let data_bits = settings.serial_data_bits().ok_or_else(|| TransportError::Open {
            port: settings.port.clone(),
            source: serialport::Error::new(
                serialport::ErrorKind::InvalidInput,
                format!("unsupported data bits {}", settings.data_bits),
            ),
        })?;

        let port = serialport::new(&settings.port, settings.baud_rate)
            .parity(settings.serial_parity())
            .stop_bits(settings.serial_stop_bits())
            .data_bits(data_bits)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|source| TransportError::Open {
                port: settings.port.clone(),
                source,
            })?;

        debug!(
            "Opened {} at {} baud ({:?} parity, {:?} stop bits)",
            settings.port, settings.baud_rate, settings.parity, settings.stop_bits
        );

        Ok(Self {
            name: settings.port.clone(),
            port: Some(port),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// Errors that mean the device or adapter has gone away.
fn link_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => TransportError::Closed,
        _ => TransportError::Io(e),
    }
}

fn empty_read_pause(now: Instant, deadline: Instant) -> Duration {
    deadline.saturating_duration_since(now).min(EMPTY_READ_PAUSE)
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        trace!("{} <- {:02X?}", self.name, bytes);
        port.write_all(bytes).map_err(link_error)?;
        port.flush().map_err(link_error)
    }

    fn read_with_deadline(&mut self, deadline: Instant) -> Result<Vec<u8>, TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Closed)?;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(TransportError::DeadlineExceeded);
            }
            port.set_timeout(deadline - now)
                .map_err(|e| link_error(e.into()))?;

            match port.read(&mut buf) {
                Ok(0) => thread::sleep(empty_read_pause(Instant::now(), deadline)),
                Ok(n) => {
                    trace!("{} -> {:02X?}", self.name, &buf[..n]);
                    return Ok(buf[..n].to_vec());
                }
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(TransportError::DeadlineExceeded)
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(link_error(e)),
            }
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.name);
        }
    }
}
