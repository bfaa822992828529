// src/transport/serial.rs
//! Serial-port transport for wired amplifiers.

use std::io::ErrorKind;
use std::time::Duration;

use tracing::debug;

use crate::error::TransportError;
use crate::transport::{Transport, READ_CHUNK_SIZE};

/// Serial device link.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    handle: Option<Box<dyn serialport::SerialPort>>,
}

impl SerialTransport {
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            handle: None,
        }
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let handle = serialport::new(&self.port_name, self.baud_rate)
            // Short read timeout keeps poll_receive effectively non-blocking.
            .timeout(Duration::from_millis(1))
            .open()
            .map_err(|e| {
                TransportError::EndpointUnreachable(format!("{}: {e}", self.port_name))
            })?;
        debug!(port = %self.port_name, baud = self.baud_rate, "serial port opened");
        self.handle = Some(handle);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::Closed)?;
        handle.write_all(bytes)?;
        Ok(())
    }

    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let handle = self.handle.as_mut().ok_or(TransportError::Closed)?;
        let pending = handle
            .bytes_to_read()
            .map_err(|e| TransportError::IoFailure(std::io::Error::from(e)))?;
        if pending == 0 {
            return Ok(None);
        }

        let mut chunk = vec![0u8; (pending as usize).min(READ_CHUNK_SIZE)];
        match handle.read(&mut chunk) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                chunk.truncate(n);
                Ok(Some(chunk))
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {
                Ok(None)
            }
            Err(e) => Err(TransportError::IoFailure(e)),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.handle.take().is_some() {
            debug!(port = %self.port_name, "serial port closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}
