// src/device/mod.rs
//! Device layer: descriptors, configuration, resolution and sessions.

pub mod configuration;
pub mod descriptor;
pub mod registry;
pub mod resolver;
pub mod session;

pub use configuration::{DetectionMode, DeviceConfiguration, WorkingMode};
pub use descriptor::{descriptor, models, DeviceDescriptor, DeviceFamily, DeviceModel};
pub use registry::{SessionId, SessionRegistry};
pub use resolver::{resolve, CommandSet, Resolution};
pub use session::{
    run_receive_loop, DeviceSession, ReceiveLoop, CORRUPT_FRAME_FAULT_THRESHOLD,
};
