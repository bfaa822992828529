//! Host-side acquisition core for multi-channel biosignal amplifiers.
//!
//! This library drives streaming EMG/EEG acquisition hardware over
//! pluggable byte transports. It provides:
//!
//! - A transport abstraction covering TCP (client and server roles), UDP
//!   and serial links
//! - A pure binary frame decoder with frame-boundary resynchronization
//! - Descriptor-driven configuration resolution (validate, never clamp)
//! - A per-device session state machine with corruption fault handling
//! - A registry for managing multiple concurrent device sessions
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use biosignal_core::device::{DeviceConfiguration, DeviceModel, SessionRegistry};
//! use biosignal_core::transport::Endpoint;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SessionRegistry::new();
//!     let (_id, session) = registry.open(
//!         DeviceModel::Muovi,
//!         &Endpoint::TcpServer { bind: "0.0.0.0".into(), port: 54321 },
//!     )?;
//!
//!     let mut session = session.lock();
//!     session.connect()?;
//!     session.configure(&DeviceConfiguration::default())?;
//!     session.start_streaming()?;
//!
//!     while let Some(batch) = session.receive_tick()? {
//!         println!("frame 0 biosignal: {:?}", batch.biosignal(0));
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod decode;
pub mod device;
pub mod error;
pub mod transport;
pub mod types;

// Re-export commonly used types for convenience
pub use device::{
    DeviceConfiguration, DeviceModel, DeviceSession, SessionRegistry, WorkingMode,
};
pub use error::{ConfigError, DecodeError, SessionError, TransportError};
pub use transport::{Endpoint, Transport};
pub use types::{ConnectionState, DeviceInformation, SampleBatch, WireLayout};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
