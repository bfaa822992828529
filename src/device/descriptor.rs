// src/device/descriptor.rs
//! Static device descriptor tables.
//!
//! One `&'static DeviceDescriptor` per supported model. Adding a device
//! means adding a table entry here — no new trait impls, no subclassing
//! chain. Numeric wire constants follow OT Bioelettronica documentation;
//! scale derivations are provisional pending firmware confirmation and are
//! kept in this one file so they can be patched in a single place.

use serde::{Deserialize, Serialize};

use crate::device::configuration::{DetectionMode, WorkingMode};
use crate::transport::TransportKind;
use crate::types::ByteOrder;

/// ADC reference voltage shared by the supported amplifier families.
pub const ADC_REFERENCE_VOLTS: f32 = 5.0;

/// Supported device models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceModel {
    Muovi,
    MuoviPlus,
    Sessantaquattro,
    Quattrocento,
}

/// Protocol family a model speaks. Selects the command encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFamily {
    Muovi,
    Sessantaquattro,
    Quattrocento,
}

/// Per-working-mode wire characteristics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeCharacteristics {
    pub working_mode: WorkingMode,
    /// Discrete sampling rates legal in this mode.
    pub sampling_rates_hz: &'static [u32],
    /// Raw sample width on the wire.
    pub bytes_per_sample: usize,
    pub byte_order: ByteOrder,
}

/// How auxiliary slots are scaled relative to biosignal slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuxiliaryScale {
    /// Auxiliary channels share the biosignal scale factor.
    SameAsBiosignal,
    /// Auxiliary channels go through a fixed input divider instead of the
    /// programmable gain.
    Divider(f32),
}

/// Immutable identity and capability table of one device variant.
#[derive(Debug, PartialEq)]
pub struct DeviceDescriptor {
    pub model: DeviceModel,
    pub family: DeviceFamily,
    pub manufacturer: &'static str,
    pub name: &'static str,
    /// Fixed biosignal channel capacity; every frame carries this many
    /// biosignal slots.
    pub biosignal_capacity: u16,
    /// Auxiliary slot count per frame (IMU, buffer level, counters).
    pub auxiliary_channels: u16,
    pub default_transport: TransportKind,
    pub default_port: u16,
    /// Working modes this model supports.
    pub modes: &'static [ModeCharacteristics],
    /// Supported (working mode, detection mode, gain) triples. Membership
    /// is the whole validation — nothing is computed or clamped.
    pub mode_pairs: &'static [(WorkingMode, DetectionMode, u16)],
    pub auxiliary_scale: AuxiliaryScale,
    /// Whether frames end with a status byte carrying the overrun marker.
    pub has_status_byte: bool,
}

impl DeviceDescriptor {
    /// Characteristics for a working mode, if the model supports it.
    pub fn mode(&self, working_mode: WorkingMode) -> Option<&'static ModeCharacteristics> {
        self.modes.iter().find(|m| m.working_mode == working_mode)
    }

    /// Whether the (working, detection, gain) triple is in the supported
    /// pair table.
    pub fn supports_pair(
        &self,
        working_mode: WorkingMode,
        detection_mode: DetectionMode,
        gain: u16,
    ) -> bool {
        self.mode_pairs
            .contains(&(working_mode, detection_mode, gain))
    }

    /// Biosignal scale factor in millivolts per LSB for a mode/gain.
    ///
    /// `V_ref / 2^bits / gain * 1000`, the derivation the Quattrocento
    /// documentation states for its fixed preamplifier.
    pub fn biosignal_scale_mv(&self, mode: &ModeCharacteristics, gain: u16) -> f32 {
        let full_scale = (1u64 << (mode.bytes_per_sample * 8)) as f32;
        ADC_REFERENCE_VOLTS / full_scale / gain as f32 * 1000.0
    }

    /// Auxiliary scale factor in millivolts per LSB.
    pub fn auxiliary_scale_mv(&self, mode: &ModeCharacteristics, gain: u16) -> f32 {
        match self.auxiliary_scale {
            AuxiliaryScale::SameAsBiosignal => self.biosignal_scale_mv(mode, gain),
            AuxiliaryScale::Divider(divider) => {
                let full_scale = (1u64 << (mode.bytes_per_sample * 8)) as f32;
                ADC_REFERENCE_VOLTS / full_scale / divider * 1000.0
            }
        }
    }
}

const MUOVI_MODES: &[ModeCharacteristics] = &[
    ModeCharacteristics {
        working_mode: WorkingMode::Emg,
        sampling_rates_hz: &[2000],
        bytes_per_sample: 2,
        byte_order: ByteOrder::BigEndian,
    },
    ModeCharacteristics {
        working_mode: WorkingMode::Eeg,
        sampling_rates_hz: &[500],
        bytes_per_sample: 3,
        byte_order: ByteOrder::BigEndian,
    },
];

// EEG with monopolar gain 4 is deliberately absent: the front end cannot
// run it, and requesting it is an error rather than a silent promotion to
// gain 8.
const MUOVI_MODE_PAIRS: &[(WorkingMode, DetectionMode, u16)] = &[
    (WorkingMode::Emg, DetectionMode::Monopolar, 4),
    (WorkingMode::Emg, DetectionMode::Monopolar, 8),
    (WorkingMode::Eeg, DetectionMode::Monopolar, 8),
    (WorkingMode::Emg, DetectionMode::ImpedanceCheck, 1),
    (WorkingMode::Eeg, DetectionMode::ImpedanceCheck, 1),
    (WorkingMode::Emg, DetectionMode::Test, 1),
    (WorkingMode::Eeg, DetectionMode::Test, 1),
];

const SESSANTAQUATTRO_MODES: &[ModeCharacteristics] = &[ModeCharacteristics {
    working_mode: WorkingMode::Emg,
    sampling_rates_hz: &[500, 1000, 2000],
    bytes_per_sample: 2,
    byte_order: ByteOrder::BigEndian,
}];

// Monopolar gains map onto the front end's x4/x6/x8 settings.
const SESSANTAQUATTRO_MODE_PAIRS: &[(WorkingMode, DetectionMode, u16)] = &[
    (WorkingMode::Emg, DetectionMode::Monopolar, 4),
    (WorkingMode::Emg, DetectionMode::Monopolar, 6),
    (WorkingMode::Emg, DetectionMode::Monopolar, 8),
    (WorkingMode::Emg, DetectionMode::ImpedanceCheck, 1),
    (WorkingMode::Emg, DetectionMode::Test, 1),
];

const QUATTROCENTO_MODES: &[ModeCharacteristics] = &[ModeCharacteristics {
    working_mode: WorkingMode::Emg,
    sampling_rates_hz: &[512, 2048, 5120, 10240],
    bytes_per_sample: 2,
    byte_order: ByteOrder::LittleEndian,
}];

const QUATTROCENTO_MODE_PAIRS: &[(WorkingMode, DetectionMode, u16)] =
    &[(WorkingMode::Emg, DetectionMode::Monopolar, 150)];

static MUOVI: DeviceDescriptor = DeviceDescriptor {
    model: DeviceModel::Muovi,
    family: DeviceFamily::Muovi,
    manufacturer: "OT Bioelettronica",
    name: "Muovi",
    biosignal_capacity: 32,
    auxiliary_channels: 6,
    default_transport: TransportKind::TcpServer,
    default_port: 54321,
    modes: MUOVI_MODES,
    mode_pairs: MUOVI_MODE_PAIRS,
    auxiliary_scale: AuxiliaryScale::SameAsBiosignal,
    has_status_byte: true,
};

static MUOVI_PLUS: DeviceDescriptor = DeviceDescriptor {
    model: DeviceModel::MuoviPlus,
    family: DeviceFamily::Muovi,
    manufacturer: "OT Bioelettronica",
    name: "Muovi Plus",
    biosignal_capacity: 64,
    auxiliary_channels: 6,
    default_transport: TransportKind::TcpServer,
    default_port: 54321,
    modes: MUOVI_MODES,
    mode_pairs: MUOVI_MODE_PAIRS,
    auxiliary_scale: AuxiliaryScale::SameAsBiosignal,
    has_status_byte: true,
};

static SESSANTAQUATTRO: DeviceDescriptor = DeviceDescriptor {
    model: DeviceModel::Sessantaquattro,
    family: DeviceFamily::Sessantaquattro,
    manufacturer: "OT Bioelettronica",
    name: "Sessantaquattro",
    biosignal_capacity: 64,
    auxiliary_channels: 6,
    default_transport: TransportKind::TcpServer,
    default_port: 45454,
    modes: SESSANTAQUATTRO_MODES,
    mode_pairs: SESSANTAQUATTRO_MODE_PAIRS,
    auxiliary_scale: AuxiliaryScale::Divider(0.5),
    has_status_byte: false,
};

static QUATTROCENTO: DeviceDescriptor = DeviceDescriptor {
    model: DeviceModel::Quattrocento,
    family: DeviceFamily::Quattrocento,
    manufacturer: "OT Bioelettronica",
    name: "Quattrocento",
    biosignal_capacity: 408,
    auxiliary_channels: 16,
    default_transport: TransportKind::TcpClient,
    default_port: 23456,
    modes: QUATTROCENTO_MODES,
    mode_pairs: QUATTROCENTO_MODE_PAIRS,
    auxiliary_scale: AuxiliaryScale::Divider(0.5),
    has_status_byte: false,
};

/// Look up the descriptor for a model.
pub fn descriptor(model: DeviceModel) -> &'static DeviceDescriptor {
    match model {
        DeviceModel::Muovi => &MUOVI,
        DeviceModel::MuoviPlus => &MUOVI_PLUS,
        DeviceModel::Sessantaquattro => &SESSANTAQUATTRO,
        DeviceModel::Quattrocento => &QUATTROCENTO,
    }
}

/// All registered models.
pub fn models() -> &'static [DeviceModel] {
    &[
        DeviceModel::Muovi,
        DeviceModel::MuoviPlus,
        DeviceModel::Sessantaquattro,
        DeviceModel::Quattrocento,
    ]
}
