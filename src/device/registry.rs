// src/device/registry.rs
//! Session registry and factory.
//!
//! Owns every live [`DeviceSession`] behind a handle so callers can open,
//! look up and close sessions by id. Sessions are shared as
//! `Arc<Mutex<DeviceSession>>` to cooperate with [`run_receive_loop`].
//!
//! [`run_receive_loop`]: crate::device::session::run_receive_loop

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::device::descriptor::DeviceModel;
use crate::device::session::DeviceSession;
use crate::error::SessionError;
use crate::transport::{transport_for, Endpoint, Transport};
use crate::types::ConnectionState;

/// Opaque handle to a registered session.
pub type SessionId = u64;

/// Thread-safe collection of live device sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<DeviceSession>>>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a session for `model` over the transport matching `endpoint`
    /// and register it. The session starts `Disconnected`; the caller
    /// drives `connect` and the rest of the lifecycle.
    pub fn open(
        &self,
        model: DeviceModel,
        endpoint: &Endpoint,
    ) -> Result<(SessionId, Arc<Mutex<DeviceSession>>), SessionError> {
        let transport = transport_for(endpoint)?;
        Ok(self.open_with_transport(model, transport))
    }

    /// Register a session over a caller-supplied transport. Used by tests
    /// and by callers with transports outside the built-in endpoint kinds.
    pub fn open_with_transport(
        &self,
        model: DeviceModel,
        transport: Box<dyn Transport>,
    ) -> (SessionId, Arc<Mutex<DeviceSession>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Mutex::new(DeviceSession::new(model, transport)));
        self.sessions.write().insert(id, Arc::clone(&session));
        info!(id, ?model, "session registered");
        (id, session)
    }

    /// Look up a registered session.
    pub fn get(&self, id: SessionId) -> Option<Arc<Mutex<DeviceSession>>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Deregister a session, disconnecting it first if it is still live.
    /// Unknown ids are a no-op.
    pub fn close(&self, id: SessionId) -> Result<(), SessionError> {
        let session = match self.sessions.write().remove(&id) {
            Some(session) => session,
            None => return Ok(()),
        };
        let mut session = session.lock();
        let result = match session.state() {
            ConnectionState::Disconnected => Ok(()),
            _ => session.disconnect(),
        };
        info!(id, "session closed");
        result
    }
}
