// src/error.rs
//! Error taxonomy for the acquisition core.
//!
//! Three leaf error families map onto the three layers that can fail
//! independently: the byte channel ([`TransportError`]), configuration
//! validation ([`ConfigError`]) and frame decoding ([`DecodeError`]).
//! [`SessionError`] is what the state machine surfaces to callers.

use crate::device::configuration::{DetectionMode, WorkingMode};
use crate::types::ConnectionState;
use thiserror::Error;

/// Errors raised by the byte-channel layer.
///
/// `Timeout` is retryable at the caller's discretion; `Closed` and `Io`
/// are fatal to the session and transition it to `Faulted`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote endpoint could not be reached or bound.
    #[error("endpoint unreachable: {0}")]
    EndpointUnreachable(String),

    /// An operation did not complete within the transport's deadline.
    #[error("transport timed out")]
    Timeout,

    /// The channel was closed by the peer or was never opened.
    #[error("transport closed")]
    Closed,

    /// An OS-level I/O failure.
    #[error("i/o failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

impl TransportError {
    /// Whether this error must fault the owning session.
    ///
    /// Timeouts are surfaced but recoverable; everything else means the
    /// byte channel can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Timeout)
    }
}

/// Errors raised while validating a [`DeviceConfiguration`] against a
/// descriptor. Always recoverable: the session state is left untouched and
/// `configure` may be retried with corrected input.
///
/// [`DeviceConfiguration`]: crate::device::configuration::DeviceConfiguration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The requested rate is not one of the descriptor's discrete rates
    /// for the selected working mode.
    #[error("unsupported sampling rate {requested} Hz (supported: {supported:?})")]
    UnsupportedSamplingRate {
        requested: u32,
        supported: Vec<u32>,
    },

    /// The descriptor does not support the selected working mode at all.
    #[error("working mode {0:?} not supported by this device")]
    UnsupportedWorkingMode(WorkingMode),

    /// A channel index lies outside `[0, capacity)`.
    #[error("channel index {index} out of range (capacity {capacity})")]
    ChannelIndexOutOfRange { index: u16, capacity: u16 },

    /// A channel index appears more than once in the enabled set.
    #[error("duplicate channel index {0}")]
    DuplicateChannelIndex(u16),

    /// The (detection mode, gain) pair is absent from the descriptor's
    /// supported-pair table for the selected working mode.
    #[error("detection mode {detection:?} with gain x{gain} not supported in {working:?} mode")]
    IncompatibleModePair {
        working: WorkingMode,
        detection: DetectionMode,
        gain: u16,
    },
}

/// Errors raised by the frame decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer does not hold a complete frame. Expected during normal
    /// streaming; the caller waits for more bytes.
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    IncompleteFrame { needed: usize, available: usize },

    /// The frame's status byte flags dropped samples. Exactly this frame
    /// is discarded; decoding resumes at the next frame boundary.
    #[error("corrupt frame: status byte 0x{status:02X}")]
    CorruptFrame { status: u8 },
}

/// Errors surfaced by [`DeviceSession`] operations.
///
/// [`DeviceSession`]: crate::device::session::DeviceSession
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying byte channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The supplied configuration was rejected; state is unchanged.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The operation is not legal in the session's current state.
    #[error("operation '{operation}' not valid in state {state:?}")]
    InvalidState {
        state: ConnectionState,
        operation: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_fatality() {
        assert!(!TransportError::Timeout.is_fatal());
        assert!(TransportError::Closed.is_fatal());
        assert!(TransportError::EndpointUnreachable("10.0.0.1:54321".into()).is_fatal());
    }

    #[test]
    fn config_error_display_names_the_offender() {
        let err = ConfigError::ChannelIndexOutOfRange {
            index: 40,
            capacity: 32,
        };
        let text = err.to_string();
        assert!(text.contains("40"));
        assert!(text.contains("32"));
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TransportError>();
        assert_send_sync::<ConfigError>();
        assert_send_sync::<DecodeError>();
        assert_send_sync::<SessionError>();
    }
}
