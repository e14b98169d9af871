//! Byte channel the meter session talks through.
//!
//! The session only needs blocking writes and sized reads. A read returning
//! fewer bytes than requested means the line timed out.

use crate::metering_energomera::EnergomeraError;
use log::{debug, info};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Line settings are fixed by the meter's optical port
pub const BAUD_RATE: u32 = 300;
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

pub trait ByteChannel: Send {
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read up to `size` bytes, a shorter result means the timeout fired
    fn read(&mut self, size: usize) -> io::Result<Vec<u8>>;

    fn close(&mut self) -> io::Result<()>;
}

/// Hands out a fresh channel for every poll cycle
pub trait ChannelOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn ByteChannel>, EnergomeraError>;
}

pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl ByteChannel for SerialChannel {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        debug!("TX {}", hex::encode(data));
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read(&mut self, size: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        debug!("RX {}", hex::encode(&buf));
        Ok(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

pub struct SerialChannelOpener {
    path: String,
}

impl SerialChannelOpener {
    pub fn new(path: String) -> Self {
        SerialChannelOpener { path }
    }
}

impl ChannelOpener for SerialChannelOpener {
    fn open(&self) -> Result<Box<dyn ByteChannel>, EnergomeraError> {
        let port = serialport::new(self.path.clone(), BAUD_RATE)
            .data_bits(DataBits::Seven)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| EnergomeraError::ChannelOpenFailure(e.into()))?;

        info!("Serial port {} opened", self.path);
        Ok(Box::new(SerialChannel { port }))
    }
}
