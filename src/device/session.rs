// src/device/session.rs
//! Device session state machine.
//!
//! One [`DeviceSession`] owns one transport and is the only place that
//! mutates lifecycle state. Callers drive it through explicit operations
//! (`connect`, `configure`, `start_streaming`, ...); the session validates
//! each operation against its current state and rejects illegal ones
//! without side effects.
//!
//! Receiving is pull-based: `receive_tick` drains the transport, decodes
//! complete frames and publishes a [`SampleBatch`]. [`run_receive_loop`]
//! wraps that in a background thread for callers that want push delivery.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::decode::decode;
use crate::device::configuration::DeviceConfiguration;
use crate::device::descriptor::{descriptor, DeviceDescriptor, DeviceModel};
use crate::device::resolver::{resolve, CommandSet};
use crate::error::{SessionError, TransportError};
use crate::transport::Transport;
use crate::types::{ConnectionState, DeviceInformation, SampleBatch, WireLayout};

/// Consecutive corrupt frames that fault a session. Isolated corruption is
/// dropped and counted; a run this long means the stream position can no
/// longer be trusted.
pub const CORRUPT_FRAME_FAULT_THRESHOLD: u32 = 3;

/// Callback invoked on every state transition with (previous, next).
pub type StateListener = Box<dyn Fn(ConnectionState, ConnectionState) + Send>;

/// Callback invoked for every published sample batch.
pub type BatchListener = Box<dyn FnMut(&SampleBatch) + Send>;

/// State machine for one device connection.
pub struct DeviceSession {
    descriptor: &'static DeviceDescriptor,
    transport: Box<dyn Transport>,
    state: ConnectionState,
    /// Unconsumed wire bytes carried between ticks.
    buffer: Vec<u8>,
    layout: Option<WireLayout>,
    commands: Option<CommandSet>,
    configuration: Option<DeviceConfiguration>,
    layout_revision: u32,
    sequence: u64,
    dropped_frame_count: u64,
    /// Consecutive corrupt frames, carried across ticks.
    corrupt_run: u32,
    state_listeners: Vec<StateListener>,
    batch_listeners: Vec<BatchListener>,
    batch_senders: Vec<Sender<SampleBatch>>,
}

impl DeviceSession {
    /// Create a disconnected session for `model` over `transport`.
    pub fn new(model: DeviceModel, transport: Box<dyn Transport>) -> Self {
        Self {
            descriptor: descriptor(model),
            transport,
            state: ConnectionState::Disconnected,
            buffer: Vec::new(),
            layout: None,
            commands: None,
            configuration: None,
            layout_revision: 0,
            sequence: 0,
            dropped_frame_count: 0,
            corrupt_run: 0,
            state_listeners: Vec::new(),
            batch_listeners: Vec::new(),
            batch_senders: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Descriptor of the model this session drives.
    pub fn descriptor(&self) -> &'static DeviceDescriptor {
        self.descriptor
    }

    /// Register a listener for state transitions.
    pub fn on_state_changed(
        &mut self,
        listener: impl Fn(ConnectionState, ConnectionState) + Send + 'static,
    ) {
        self.state_listeners.push(Box::new(listener));
    }

    /// Register a callback invoked for every published sample batch.
    pub fn on_sample_batch(&mut self, listener: impl FnMut(&SampleBatch) + Send + 'static) {
        self.batch_listeners.push(Box::new(listener));
    }

    /// Subscribe to decoded sample batches over a channel. Each subscriber
    /// gets its own unbounded channel; dropped receivers are pruned on the
    /// next publish.
    pub fn sample_batches(&mut self) -> Receiver<SampleBatch> {
        let (tx, rx) = unbounded();
        self.batch_senders.push(tx);
        rx
    }

    /// Snapshot of identity, effective configuration and health counters.
    pub fn device_information(&self) -> DeviceInformation {
        DeviceInformation {
            model: self.descriptor.name,
            biosignal_channels: self.layout.as_ref().map(|l| l.enabled_biosignal.len()),
            auxiliary_channels: self.layout.as_ref().map(|l| l.auxiliary_slots),
            sampling_rate_hz: self.configuration.as_ref().map(|c| c.sampling_rate_hz),
            gain: self.configuration.as_ref().map(|c| c.gain),
            working_mode: self.configuration.as_ref().map(|c| c.working_mode),
            detection_mode: self.configuration.as_ref().map(|c| c.detection_mode),
            state: self.state,
            dropped_frame_count: self.dropped_frame_count,
        }
    }

    /// Open the transport. `Disconnected` -> `Connecting` -> `Connected`;
    /// an open failure falls back to `Disconnected`.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        self.require(&[ConnectionState::Disconnected], "connect")?;
        self.transition(ConnectionState::Connecting);
        match self.transport.open() {
            Ok(()) => {
                self.transition(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.transition(ConnectionState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Validate `configuration`, install the resolved layout and send the
    /// configure command. Legal from `Connected` and `Configured` (devices
    /// accept reconfiguration while idle). A rejected configuration leaves
    /// state, layout and buffer exactly as they were.
    pub fn configure(&mut self, configuration: &DeviceConfiguration) -> Result<(), SessionError> {
        self.require(
            &[ConnectionState::Connected, ConnectionState::Configured],
            "configure",
        )?;

        // Validation happens before any transition so a bad configuration
        // is observable only through the returned error.
        let resolution = resolve(self.descriptor, configuration)?;

        let prior = self.state;
        self.transition(ConnectionState::Configuring);
        self.send_command(&resolution.commands.configure, prior)?;

        self.layout = Some(resolution.layout);
        self.commands = Some(resolution.commands);
        self.configuration = Some(configuration.clone());
        self.layout_revision += 1;
        self.buffer.clear();
        self.corrupt_run = 0;
        info!(
            model = self.descriptor.name,
            revision = self.layout_revision,
            "configuration installed"
        );
        self.transition(ConnectionState::Configured);
        Ok(())
    }

    /// Send the start command and enter `Streaming`. Any bytes still
    /// buffered from a previous run are discarded first.
    pub fn start_streaming(&mut self) -> Result<(), SessionError> {
        self.require(&[ConnectionState::Configured], "start_streaming")?;
        let command = self.command_set()?.start_streaming.clone();
        self.send_command(&command, ConnectionState::Configured)?;
        self.buffer.clear();
        self.corrupt_run = 0;
        self.transition(ConnectionState::Streaming);
        Ok(())
    }

    /// Send the stop command and return to `Configured`. The receive
    /// buffer is discarded so a later restart never replays stale frames.
    pub fn stop_streaming(&mut self) -> Result<(), SessionError> {
        self.require(&[ConnectionState::Streaming], "stop_streaming")?;
        let command = self.command_set()?.stop_streaming.clone();
        self.send_command(&command, ConnectionState::Streaming)?;
        self.buffer.clear();
        self.corrupt_run = 0;
        self.transition(ConnectionState::Configured);
        Ok(())
    }

    /// Drain the transport once and decode whatever complete frames are
    /// buffered. Returns the published batch, or `None` when no complete
    /// valid frame was available.
    ///
    /// A run of [`CORRUPT_FRAME_FAULT_THRESHOLD`] consecutive corrupt
    /// frames faults the session; valid frames decoded before the fault
    /// are still published and returned.
    pub fn receive_tick(&mut self) -> Result<Option<SampleBatch>, SessionError> {
        self.require(&[ConnectionState::Streaming], "receive_tick")?;

        match self.transport.poll_receive() {
            Ok(Some(bytes)) => self.buffer.extend_from_slice(&bytes),
            Ok(None) => {}
            Err(TransportError::Timeout) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "transport failed while streaming");
                self.fault();
                return Err(e.into());
            }
        }

        // Layout is always present in Streaming.
        let layout = match self.layout.as_ref() {
            Some(layout) => layout,
            None => {
                return Err(SessionError::InvalidState {
                    state: self.state,
                    operation: "receive_tick",
                })
            }
        };

        let decoded = decode(layout, &self.buffer);
        self.buffer.drain(..decoded.consumed);
        self.dropped_frame_count += u64::from(decoded.corrupt_frames);

        if decoded.frames.is_empty() {
            self.corrupt_run += decoded.corrupt_frames;
        } else {
            self.corrupt_run = decoded.trailing_corrupt_run;
        }

        let batch = if decoded.frames.is_empty() {
            None
        } else {
            let batch = SampleBatch {
                sequence: self.sequence,
                layout_revision: self.layout_revision,
                frames: decoded.frames,
                biosignal_channels: layout.enabled_biosignal.len(),
            };
            self.sequence += 1;
            self.publish(&batch);
            Some(batch)
        };

        if self.corrupt_run >= CORRUPT_FRAME_FAULT_THRESHOLD {
            warn!(
                run = self.corrupt_run,
                dropped = self.dropped_frame_count,
                "consecutive corrupt frames exceeded threshold"
            );
            self.fault();
        }

        Ok(batch)
    }

    /// Tear the connection down from any state except `Disconnected`.
    /// Buffered bytes and the installed configuration are discarded; a
    /// reconnected session must be configured again before streaming. From
    /// `Faulted` this doubles as recovery, like [`DeviceSession::reset`]
    /// but without clearing the dropped-frame counter.
    pub fn disconnect(&mut self) -> Result<(), SessionError> {
        self.require(
            &[
                ConnectionState::Connected,
                ConnectionState::Configuring,
                ConnectionState::Configured,
                ConnectionState::Streaming,
                ConnectionState::Faulted,
            ],
            "disconnect",
        )?;
        self.transition(ConnectionState::Disconnecting);
        let result = self.transport.close();
        self.clear_session_state();
        self.transition(ConnectionState::Disconnected);
        result.map_err(SessionError::from)
    }

    /// Explicit recovery from `Faulted` back to `Disconnected`. Nothing
    /// leaves the faulted state implicitly.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.require(&[ConnectionState::Faulted], "reset")?;
        let _ = self.transport.close();
        self.clear_session_state();
        self.dropped_frame_count = 0;
        self.transition(ConnectionState::Disconnected);
        Ok(())
    }

    fn command_set(&self) -> Result<&CommandSet, SessionError> {
        self.commands.as_ref().ok_or(SessionError::InvalidState {
            state: self.state,
            operation: "command lookup before configure",
        })
    }

    /// Send a control command. A timeout restores `prior` and surfaces the
    /// error; a fatal transport failure faults the session.
    fn send_command(&mut self, command: &[u8], prior: ConnectionState) -> Result<(), SessionError> {
        match self.transport.send(command) {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                warn!(error = %e, "transport failed while sending command");
                self.fault();
                Err(e.into())
            }
            Err(e) => {
                if self.state != prior {
                    self.transition(prior);
                }
                Err(e.into())
            }
        }
    }

    fn publish(&mut self, batch: &SampleBatch) {
        for listener in &mut self.batch_listeners {
            listener(batch);
        }
        self.batch_senders
            .retain(|sender| sender.send(batch.clone()).is_ok());
    }

    fn fault(&mut self) {
        let _ = self.transport.close();
        self.buffer.clear();
        self.transition(ConnectionState::Faulted);
    }

    fn clear_session_state(&mut self) {
        self.buffer.clear();
        self.layout = None;
        self.commands = None;
        self.configuration = None;
        self.corrupt_run = 0;
    }

    fn require(
        &self,
        allowed: &[ConnectionState],
        operation: &'static str,
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        let previous = self.state;
        if previous == next {
            return;
        }
        self.state = next;
        debug!(model = self.descriptor.name, ?previous, ?next, "state transition");
        for listener in &self.state_listeners {
            listener(previous, next);
        }
    }
}

/// Handle to a background receive loop. Dropping it without calling
/// [`ReceiveLoop::stop`] detaches the thread.
pub struct ReceiveLoop {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ReceiveLoop {
    /// Signal the loop to exit and join its thread.
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Drive `receive_tick` on a shared session every `interval` until stopped
/// or until the session leaves the streaming lifecycle (disconnect or
/// fault). Subscribers registered on the session receive batches as usual.
pub fn run_receive_loop(session: Arc<Mutex<DeviceSession>>, interval: Duration) -> ReceiveLoop {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let handle = thread::spawn(move || loop {
        if stop_rx.try_recv().is_ok() {
            break;
        }
        {
            let mut session = session.lock();
            match session.state() {
                ConnectionState::Streaming => {
                    // Fatal errors fault the session; the next iteration
                    // observes that and exits.
                    let _ = session.receive_tick();
                }
                ConnectionState::Disconnected | ConnectionState::Faulted => break,
                _ => {}
            }
        }
        thread::sleep(interval);
    });
    ReceiveLoop {
        stop: stop_tx,
        handle: Some(handle),
    }
}
