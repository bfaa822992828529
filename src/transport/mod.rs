// src/transport/mod.rs
//! Byte-channel abstraction for device links.
//!
//! Every device talks through the same [`Transport`] contract regardless of
//! the medium. The state machine never learns which variant backs a
//! session: a wireless amplifier that connects *to* the host (TCP server),
//! an amplifier the host dials (TCP client), a UDP peer or a serial port
//! all look identical behind `open`/`send`/`poll_receive`/`close`.

pub mod tcp;
pub mod udp;

#[cfg(feature = "serial")]
pub mod serial;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub use tcp::{TcpClientTransport, TcpServerTransport};
pub use udp::UdpTransport;

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// Read chunk size for one `poll_receive` call on stream transports.
pub(crate) const READ_CHUNK_SIZE: usize = 4096;

/// Default connection-establishment deadline. Amplifiers get one second
/// to show up before the open attempt is abandoned.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Kind of channel a descriptor expects by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    TcpClient,
    TcpServer,
    Udp,
    Serial,
}

/// Concrete endpoint parameters for one device link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Endpoint {
    /// Dial the device at `host:port`.
    TcpClient { host: String, port: u16 },
    /// Listen on `bind:port` and accept exactly one device connection.
    TcpServer { bind: String, port: u16 },
    /// Bind `bind:port`; datagrams are sent to `remote` when set.
    Udp {
        bind: String,
        port: u16,
        remote: Option<String>,
    },
    /// Serial line at `port` with the given baud rate.
    Serial { port: String, baud_rate: u32 },
}

/// Uniform send/receive contract over a byte-oriented channel.
///
/// `poll_receive` is non-blocking: it returns whatever bytes are currently
/// available, or `None`. Blocking is confined to `open`, which honors the
/// variant's connect timeout. Implementations own their OS resource
/// exclusively; nothing is shared across sessions.
pub trait Transport: Send {
    /// Establish the channel. For server-style variants this includes
    /// waiting (up to the configured timeout) for the device to connect.
    fn open(&mut self) -> Result<(), TransportError>;

    /// Write all of `bytes` to the channel.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Return available bytes, or `None` when nothing is pending.
    /// `Err(TransportError::Closed)` once the peer has gone away.
    fn poll_receive(&mut self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Tear the channel down. Idempotent.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Whether the channel is currently established.
    fn is_open(&self) -> bool;
}

/// Build the matching (unopened) transport for an endpoint.
pub fn transport_for(endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError> {
    match endpoint {
        Endpoint::TcpClient { host, port } => {
            Ok(Box::new(TcpClientTransport::new(host.clone(), *port)))
        }
        Endpoint::TcpServer { bind, port } => {
            Ok(Box::new(TcpServerTransport::new(bind.clone(), *port)))
        }
        Endpoint::Udp { bind, port, remote } => {
            let mut transport = UdpTransport::new(bind.clone(), *port);
            if let Some(remote) = remote {
                transport = transport.with_remote(remote.clone());
            }
            Ok(Box::new(transport))
        }
        #[cfg(feature = "serial")]
        Endpoint::Serial { port, baud_rate } => {
            Ok(Box::new(SerialTransport::new(port.clone(), *baud_rate)))
        }
        #[cfg(not(feature = "serial"))]
        Endpoint::Serial { .. } => Err(TransportError::EndpointUnreachable(
            "serial transport support not compiled in".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_serde_round_trip() {
        let endpoint = Endpoint::TcpServer {
            bind: "0.0.0.0".to_string(),
            port: 54321,
        };
        let json = serde_json::to_string(&endpoint).unwrap();
        assert_eq!(serde_json::from_str::<Endpoint>(&json).unwrap(), endpoint);
    }

    #[test]
    fn factory_builds_unopened_transports() {
        let transport = transport_for(&Endpoint::TcpClient {
            host: "192.168.14.1".to_string(),
            port: 54321,
        })
        .unwrap();
        assert!(!transport.is_open());
    }
}
