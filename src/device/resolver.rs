// src/device/resolver.rs
//! Configuration resolver.
//!
//! Pure mapping from (descriptor, configuration) to the wire parameters
//! the transport and decoder need: the [`WireLayout`] and the command
//! bytes that install the configuration on the device. Identical inputs
//! always produce byte-identical output.

use crate::device::configuration::{DetectionMode, DeviceConfiguration, WorkingMode};
use crate::device::descriptor::{DeviceDescriptor, DeviceFamily, ModeCharacteristics};
use crate::error::ConfigError;
use crate::types::WireLayout;

/// Command bytes for one accepted configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    /// Installs the configuration with streaming off.
    pub configure: Vec<u8>,
    /// Same configuration with the GO bit set.
    pub start_streaming: Vec<u8>,
    /// Same configuration with the GO bit cleared.
    pub stop_streaming: Vec<u8>,
}

/// Result of a successful `resolve` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub layout: WireLayout,
    pub commands: CommandSet,
}

/// Validate `configuration` against `descriptor` and derive the wire
/// parameters. Rejects rather than clamps: any unsupported rate, channel
/// or mode/gain combination is an error.
pub fn resolve(
    descriptor: &DeviceDescriptor,
    configuration: &DeviceConfiguration,
) -> Result<Resolution, ConfigError> {
    let mode = descriptor
        .mode(configuration.working_mode)
        .ok_or(ConfigError::UnsupportedWorkingMode(
            configuration.working_mode,
        ))?;

    if !mode
        .sampling_rates_hz
        .contains(&configuration.sampling_rate_hz)
    {
        return Err(ConfigError::UnsupportedSamplingRate {
            requested: configuration.sampling_rate_hz,
            supported: mode.sampling_rates_hz.to_vec(),
        });
    }

    let enabled = enabled_channels(descriptor, configuration)?;

    if !descriptor.supports_pair(
        configuration.working_mode,
        configuration.detection_mode,
        configuration.gain,
    ) {
        return Err(ConfigError::IncompatibleModePair {
            working: configuration.working_mode,
            detection: configuration.detection_mode,
            gain: configuration.gain,
        });
    }

    let slots = (descriptor.biosignal_capacity + descriptor.auxiliary_channels) as usize;
    let sample_bytes = slots * mode.bytes_per_sample;
    let status_offset = descriptor.has_status_byte.then_some(sample_bytes);
    let frame_length = sample_bytes + usize::from(descriptor.has_status_byte);

    let layout = WireLayout {
        bytes_per_sample: mode.bytes_per_sample,
        byte_order: mode.byte_order,
        biosignal_slots: descriptor.biosignal_capacity as usize,
        auxiliary_slots: descriptor.auxiliary_channels as usize,
        enabled_biosignal: enabled,
        frame_length,
        status_offset,
        scale_biosignal: descriptor.biosignal_scale_mv(mode, configuration.gain),
        scale_auxiliary: descriptor.auxiliary_scale_mv(mode, configuration.gain),
    };

    let commands = match descriptor.family {
        DeviceFamily::Muovi => muovi_commands(configuration),
        DeviceFamily::Sessantaquattro => sessantaquattro_commands(configuration, mode),
        DeviceFamily::Quattrocento => quattrocento_commands(configuration, mode),
    };

    Ok(Resolution { layout, commands })
}

/// Validate the enabled channel set and return it sorted ascending.
/// An empty request enables every biosignal channel.
fn enabled_channels(
    descriptor: &DeviceDescriptor,
    configuration: &DeviceConfiguration,
) -> Result<Vec<u16>, ConfigError> {
    if configuration.channels.is_empty() {
        return Ok((0..descriptor.biosignal_capacity).collect());
    }

    let mut enabled = configuration.channels.clone();
    for &index in &enabled {
        if index >= descriptor.biosignal_capacity {
            return Err(ConfigError::ChannelIndexOutOfRange {
                index,
                capacity: descriptor.biosignal_capacity,
            });
        }
    }
    enabled.sort_unstable();
    for pair in enabled.windows(2) {
        if pair[0] == pair[1] {
            return Err(ConfigError::DuplicateChannelIndex(pair[0]));
        }
    }
    Ok(enabled)
}

// Muovi control byte: bit 3 selects EMG (1) vs EEG (0), bits 1-2 the
// detection setting, bit 0 is GO. Detection values provisional pending
// firmware documentation.
fn muovi_commands(configuration: &DeviceConfiguration) -> CommandSet {
    let working_bit = match configuration.working_mode {
        WorkingMode::Emg => 1u8,
        WorkingMode::Eeg => 0u8,
    };
    let detection = match (configuration.detection_mode, configuration.gain) {
        (DetectionMode::Monopolar, 4) => 0u8,
        (DetectionMode::Monopolar, _) => 1,
        (DetectionMode::ImpedanceCheck, _) => 2,
        (DetectionMode::Test, _) => 3,
    };
    let control = (working_bit << 3) | (detection << 1);
    CommandSet {
        configure: vec![control],
        start_streaming: vec![control | 0x01],
        stop_streaming: vec![control],
    }
}

// Sessantaquattro control word, sent as two big-endian bytes. Low byte:
// bit 0 GO, bit 1 REC, bits 2-3 trigger, bits 4-5 gain setting, bit 6
// high-pass filter, bit 7 resolution (0 = 16-bit). High byte: bits 0-2
// detection setting, bits 3-4 channel count, bits 5-6 sampling-rate
// selector, bit 7 get/set (0 = set).
const SQ_FILTER_BIT: u16 = 1 << 6;
const SQ_CHANNELS_64: u16 = 3 << 11;

fn sessantaquattro_commands(
    configuration: &DeviceConfiguration,
    mode: &ModeCharacteristics,
) -> CommandSet {
    let gain_setting = match configuration.gain {
        4 => 1u16,
        6 => 2,
        8 => 3,
        _ => 0,
    };
    let detection = match configuration.detection_mode {
        DetectionMode::Monopolar => 0u16,
        DetectionMode::ImpedanceCheck => 6,
        DetectionMode::Test => 7,
    };
    // resolve() already checked membership.
    let rate_index = mode
        .sampling_rates_hz
        .iter()
        .position(|&r| r == configuration.sampling_rate_hz)
        .unwrap_or(0) as u16;

    let mut control = (gain_setting << 4) | (detection << 8) | SQ_CHANNELS_64 | (rate_index << 13);
    if configuration.high_pass_filter {
        control |= SQ_FILTER_BIT;
    }

    CommandSet {
        configure: control.to_be_bytes().to_vec(),
        start_streaming: (control | 0x01).to_be_bytes().to_vec(),
        stop_streaming: control.to_be_bytes().to_vec(),
    }
}

/// Length of the Quattrocento configuration block, CRC included.
pub const QUATTROCENTO_COMMAND_LENGTH: usize = 40;

// ACQ_SETT byte layout (provisional bit positions): bit 7 always set,
// sampling-rate selector in bits 3-4, channel-count selector in bits 1-2,
// GO in bit 0.
const ACQ_SETT_BASE: u8 = 0x80;
const ACQ_SETT_ALL_CHANNELS: u8 = 3;

// Third byte of each input configuration block.
const IN_CONF_HIGH_PASS: u8 = 0x10;
const IN_CONF_COMMON_MODE: u8 = 0x08;

fn quattrocento_commands(
    configuration: &DeviceConfiguration,
    mode: &ModeCharacteristics,
) -> CommandSet {
    // resolve() already checked membership.
    let rate_index = mode
        .sampling_rates_hz
        .iter()
        .position(|&r| r == configuration.sampling_rate_hz)
        .unwrap_or(0) as u8;

    let mut command = vec![0u8; QUATTROCENTO_COMMAND_LENGTH];
    command[0] = ACQ_SETT_BASE | (rate_index << 3) | (ACQ_SETT_ALL_CHANNELS << 1);

    // Bytes 1-2: analog-out source/channel selection, unused here.
    // Bytes 3..39: eight 3-byte input blocks then four 3-byte
    // multiple-input blocks, all monopolar with the filter flags applied.
    let mut flags = 0u8;
    if configuration.high_pass_filter {
        flags |= IN_CONF_HIGH_PASS;
    }
    if configuration.common_mode_rejection {
        flags |= IN_CONF_COMMON_MODE;
    }
    for block in 0..12 {
        command[3 + block * 3 + 2] = flags;
    }

    seal(&mut command);
    let configure = command;

    let mut start_streaming = configure.clone();
    start_streaming[0] |= 0x01;
    seal(&mut start_streaming);

    CommandSet {
        stop_streaming: configure.clone(),
        configure,
        start_streaming,
    }
}

/// Write the CRC over bytes 0..39 into byte 39.
fn seal(command: &mut [u8]) {
    let len = command.len();
    command[len - 1] = crc8(&command[..len - 1]);
}

/// OT Bioelettronica command checksum: reflected CRC-8 with polynomial
/// 0x8C, as shipped in the manufacturer's example code.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut byte = byte;
        for _ in 0..8 {
            let mix = (crc ^ byte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            byte >>= 1;
        }
    }
    crc
}
