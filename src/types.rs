// src/types.rs
//! Core data types shared between the resolver, decoder and state machine.

use serde::{Deserialize, Serialize};

use crate::device::configuration::{DetectionMode, WorkingMode};

/// Byte order of multi-byte samples on the wire.
///
/// The Muovi family transmits big-endian; the Quattrocento transmits
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

/// Resolved byte-level description of how to parse one frame.
///
/// Produced by the configuration resolver, consumed by the frame decoder.
/// A layout is never mutated in place: reconfiguration installs a complete
/// new value (and bumps the session's layout revision) before any further
/// decode call sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct WireLayout {
    /// Width of one raw sample in bytes (2 = 16-bit, 3 = 24-bit).
    pub bytes_per_sample: usize,
    /// Byte order of each raw sample.
    pub byte_order: ByteOrder,
    /// Number of biosignal slots the device puts on the wire per frame.
    /// The device always streams its full capacity; `enabled_biosignal`
    /// selects which of these slots are emitted.
    pub biosignal_slots: usize,
    /// Number of auxiliary slots (accelerometer, buffer level, ...) per
    /// frame. All auxiliary slots are always emitted.
    pub auxiliary_slots: usize,
    /// Enabled biosignal slot indices, ascending, no duplicates.
    pub enabled_biosignal: Vec<u16>,
    /// Total frame length in bytes, including any trailing status byte.
    pub frame_length: usize,
    /// Offset of the status byte within a frame, if the device has one.
    pub status_offset: Option<usize>,
    /// Scale factor for biosignal slots, in millivolts per LSB.
    pub scale_biosignal: f32,
    /// Scale factor for auxiliary slots, in millivolts per LSB.
    pub scale_auxiliary: f32,
}

impl WireLayout {
    /// Number of values emitted per decoded frame.
    pub fn samples_per_frame(&self) -> usize {
        self.enabled_biosignal.len() + self.auxiliary_slots
    }

    /// Declared bit width of a raw sample.
    pub fn bit_width(&self) -> u8 {
        (self.bytes_per_sample * 8) as u8
    }
}

/// An ordered batch of decoded frames.
///
/// One inner vector per frame: enabled biosignal channels in ascending
/// index order, followed by all auxiliary channels, in millivolts. Owned by
/// the subscriber after emission; nothing aliases the receive buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    /// Strictly increasing per session, in receive order.
    pub sequence: u64,
    /// Revision of the [`WireLayout`] this batch was decoded under.
    pub layout_revision: u32,
    /// Decoded sample vectors, one per frame.
    pub frames: Vec<Vec<f32>>,
    /// Number of biosignal values at the front of each frame vector.
    pub biosignal_channels: usize,
}

impl SampleBatch {
    /// Biosignal portion of one frame.
    pub fn biosignal(&self, frame: usize) -> &[f32] {
        &self.frames[frame][..self.biosignal_channels]
    }

    /// Auxiliary portion of one frame.
    pub fn auxiliary(&self, frame: usize) -> &[f32] {
        &self.frames[frame][self.biosignal_channels..]
    }
}

/// Lifecycle state of one device session.
///
/// Transitions are owned exclusively by the state machine; every state has
/// a defined reaction to transport closure and malformed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Configuring,
    Configured,
    Streaming,
    Disconnecting,
    Faulted,
}

/// Snapshot of a session's identity, configuration and health counters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInformation {
    /// Human-readable model name, e.g. "Muovi Plus".
    pub model: &'static str,
    /// Enabled biosignal channel count (None until configured).
    pub biosignal_channels: Option<usize>,
    /// Auxiliary channel count (None until configured).
    pub auxiliary_channels: Option<usize>,
    /// Effective sampling rate in Hz (None until configured).
    pub sampling_rate_hz: Option<u32>,
    /// Amplifier gain (None until configured).
    pub gain: Option<u16>,
    /// Installed working mode (None until configured).
    pub working_mode: Option<WorkingMode>,
    /// Installed detection mode (None until configured).
    pub detection_mode: Option<DetectionMode>,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Frames discarded because of corruption markers, session lifetime.
    pub dropped_frame_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> WireLayout {
        WireLayout {
            bytes_per_sample: 2,
            byte_order: ByteOrder::BigEndian,
            biosignal_slots: 32,
            auxiliary_slots: 6,
            enabled_biosignal: (0..32).collect(),
            frame_length: 38 * 2 + 1,
            status_offset: Some(38 * 2),
            scale_biosignal: 0.5,
            scale_auxiliary: 0.25,
        }
    }

    #[test]
    fn samples_per_frame_counts_enabled_plus_aux() {
        let mut l = layout();
        assert_eq!(l.samples_per_frame(), 38);
        l.enabled_biosignal = vec![0, 5, 9];
        assert_eq!(l.samples_per_frame(), 9);
        assert_eq!(l.bit_width(), 16);
    }

    #[test]
    fn batch_splits_biosignal_and_auxiliary() {
        let batch = SampleBatch {
            sequence: 1,
            layout_revision: 1,
            frames: vec![vec![1.0, 2.0, 3.0, 9.0, 8.0]],
            biosignal_channels: 3,
        };
        assert_eq!(batch.biosignal(0), &[1.0, 2.0, 3.0]);
        assert_eq!(batch.auxiliary(0), &[9.0, 8.0]);
    }
}
