// src/device/configuration.rs
//! User-facing device configuration.
//!
//! A closed, enumerated field set per device descriptor — no string-keyed
//! dictionaries. Construction is cheap and unvalidated; the configuration
//! resolver validates the whole value against a descriptor before a single
//! byte goes to the device.

use serde::{Deserialize, Serialize};

/// Device-level acquisition mode. Selects frame layout, sample width and
/// the set of legal sampling rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkingMode {
    Emg,
    Eeg,
}

/// Electrode/front-end configuration. Together with the gain it must form
/// a pair the descriptor lists as supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    Monopolar,
    ImpedanceCheck,
    Test,
}

/// Requested acquisition settings for one device session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub working_mode: WorkingMode,
    pub detection_mode: DetectionMode,
    /// Amplifier gain multiplier.
    pub gain: u16,
    /// Requested sampling rate; must be one of the descriptor's discrete
    /// rates for the working mode.
    pub sampling_rate_hz: u32,
    /// Enabled biosignal channel indices. Empty means all channels.
    #[serde(default)]
    pub channels: Vec<u16>,
    /// Drive the common-mode rejection circuit.
    #[serde(default)]
    pub common_mode_rejection: bool,
    /// Enable the device-side high-pass filter.
    #[serde(default)]
    pub high_pass_filter: bool,
}

impl Default for DeviceConfiguration {
    /// Monopolar EMG at 2000 Hz, all channels — the Muovi-family default.
    fn default() -> Self {
        Self {
            working_mode: WorkingMode::Emg,
            detection_mode: DetectionMode::Monopolar,
            gain: 4,
            sampling_rate_hz: 2000,
            channels: Vec::new(),
            common_mode_rejection: false,
            high_pass_filter: false,
        }
    }
}
