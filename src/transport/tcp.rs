// src/transport/tcp.rs
//! TCP transports.
//!
//! Two roles exist in the field: amplifiers the host dials
//! (Quattrocento-style, [`TcpClientTransport`]) and wireless amplifiers
//! that dial the host (Muovi-style, [`TcpServerTransport`] — listen, accept
//! exactly one device, then stream).

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::TransportError;
use crate::transport::{Transport, DEFAULT_CONNECT_TIMEOUT, READ_CHUNK_SIZE};

/// Interval between accept attempts while waiting for a device.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outbound TCP connection to a device.
pub struct TcpClientTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpClientTransport {
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Transport for TcpClientTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                TransportError::EndpointUnreachable(format!("{}:{}: {e}", self.host, self.port))
            })?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    let _ = stream.set_nodelay(true);
                    debug!(%addr, "tcp client connected");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    last_error = Some(TransportError::Timeout);
                }
                Err(e) => {
                    last_error = Some(TransportError::EndpointUnreachable(format!("{addr}: {e}")));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TransportError::EndpointUnreachable(format!(
                "{}:{} did not resolve",
                self.host, self.port
            ))
        }))
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let timeout = self.connect_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        write_all_nonblocking(stream, bytes, timeout)
    }

    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        read_available(stream)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("tcp client closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Listening TCP endpoint that accepts exactly one device connection.
pub struct TcpServerTransport {
    bind: String,
    port: u16,
    accept_timeout: Duration,
    client: Option<TcpStream>,
}

impl TcpServerTransport {
    pub fn new(bind: String, port: u16) -> Self {
        Self {
            bind,
            port,
            accept_timeout: DEFAULT_CONNECT_TIMEOUT,
            client: None,
        }
    }

    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = timeout;
        self
    }
}

impl Transport for TcpServerTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let listener = TcpListener::bind((self.bind.as_str(), self.port)).map_err(|e| {
            TransportError::EndpointUnreachable(format!("{}:{}: {e}", self.bind, self.port))
        })?;
        listener.set_nonblocking(true)?;

        // The device initiates; give it until the accept deadline.
        let deadline = Instant::now() + self.accept_timeout;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(true)?;
                    let _ = stream.set_nodelay(true);
                    debug!(%peer, "device connected to tcp server");
                    self.client = Some(stream);
                    // Single-client contract: stop listening once paired.
                    drop(listener);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout);
                    }
                    std::thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => return Err(TransportError::IoFailure(e)),
            }
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let timeout = self.accept_timeout;
        let stream = self.client.as_mut().ok_or(TransportError::Closed)?;
        write_all_nonblocking(stream, bytes, timeout)
    }

    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let stream = self.client.as_mut().ok_or(TransportError::Closed)?;
        read_available(stream)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.client.take() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("tcp server link closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }
}

/// Non-blocking read of whatever is currently buffered.
fn read_available(stream: &mut TcpStream) -> Result<Option<Vec<u8>>, TransportError> {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    match stream.read(&mut chunk) {
        Ok(0) => Err(TransportError::Closed),
        Ok(n) => Ok(Some(chunk[..n].to_vec())),
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
            Ok(None)
        }
        Err(e) => Err(TransportError::IoFailure(e)),
    }
}

/// Complete write on a non-blocking stream, bounded by `timeout`.
/// Command payloads are tiny (1-40 bytes); the retry path is for a full
/// socket buffer, not a slow link.
fn write_all_nonblocking(
    stream: &mut TcpStream,
    bytes: &[u8],
    timeout: Duration,
) -> Result<(), TransportError> {
    let deadline = Instant::now() + timeout;
    let mut written = 0;
    while written < bytes.len() {
        match stream.write(&bytes[written..]) {
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                if Instant::now() >= deadline {
                    return Err(TransportError::Timeout);
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) => return Err(TransportError::IoFailure(e)),
        }
    }
    Ok(())
}
