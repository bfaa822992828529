// src/transport/udp.rs
//! UDP transport. Datagram-oriented devices push frames to a bound port;
//! commands go out to the configured remote.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

use tracing::debug;

use crate::error::TransportError;
use crate::transport::Transport;

/// Largest datagram we accept in one poll.
const MAX_DATAGRAM_SIZE: usize = 65_536;

/// UDP device link bound to a local port.
pub struct UdpTransport {
    bind: String,
    port: u16,
    remote: Option<String>,
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    pub fn new(bind: String, port: u16) -> Self {
        Self {
            bind,
            port,
            remote: None,
            socket: None,
        }
    }

    /// Set the peer commands are sent to ("host:port").
    pub fn with_remote(mut self, remote: String) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Local address after `open` (useful when bound to port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl Transport for UdpTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let socket = UdpSocket::bind((self.bind.as_str(), self.port)).map_err(|e| {
            TransportError::EndpointUnreachable(format!("{}:{}: {e}", self.bind, self.port))
        })?;
        socket.set_nonblocking(true)?;

        if let Some(remote) = &self.remote {
            socket
                .connect(remote.as_str())
                .map_err(|e| TransportError::EndpointUnreachable(format!("{remote}: {e}")))?;
        }

        debug!(bind = %self.bind, port = self.port, "udp socket bound");
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        if self.remote.is_none() {
            return Err(TransportError::EndpointUnreachable(
                "no remote endpoint configured for send".to_string(),
            ));
        }
        socket.send(bytes)?;
        Ok(())
    }

    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let mut chunk = vec![0u8; MAX_DATAGRAM_SIZE];
        match socket.recv(&mut chunk) {
            Ok(n) => {
                chunk.truncate(n);
                Ok(Some(chunk))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(None)
            }
            Err(e) => Err(TransportError::IoFailure(e)),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.socket.take().is_some() {
            debug!("udp socket closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn datagram_round_trip() {
        let mut receiver = UdpTransport::new("127.0.0.1".to_string(), 0);
        receiver.open().unwrap();
        let addr = receiver.local_addr().unwrap();

        let mut sender =
            UdpTransport::new("127.0.0.1".to_string(), 0).with_remote(addr.to_string());
        sender.open().unwrap();
        sender.send(&[7, 7, 7]).unwrap();

        let received = loop {
            if let Some(bytes) = receiver.poll_receive().unwrap() {
                break bytes;
            }
            thread::sleep(Duration::from_millis(1));
        };
        assert_eq!(received, vec![7, 7, 7]);
    }

    #[test]
    fn send_without_remote_is_rejected() {
        let mut transport = UdpTransport::new("127.0.0.1".to_string(), 0);
        transport.open().unwrap();
        assert!(matches!(
            transport.send(&[0]),
            Err(TransportError::EndpointUnreachable(_))
        ));
    }

    #[test]
    fn poll_with_nothing_pending_returns_none() {
        let mut transport = UdpTransport::new("127.0.0.1".to_string(), 0);
        transport.open().unwrap();
        assert!(transport.poll_receive().unwrap().is_none());
        transport.close().unwrap();
        assert!(!transport.is_open());
    }
}
