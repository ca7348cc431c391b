use crate::error::TransportError;
use ocpp_core::{SessionId, TransportKind};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

/// A peer dialing in: the two directions of its connection plus a slot for the
/// session id the server assigns.
#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) identifier: String,
    /// Frames from the peer to the server.
    pub(crate) inbound: mpsc::Receiver<String>,
    /// Frames from the server to the peer.
    pub(crate) outbound: mpsc::Sender<String>,
    pub(crate) accepted: oneshot::Sender<SessionId>,
}

#[derive(Debug, Clone)]
pub(crate) struct Listener {
    pub(crate) kind: TransportKind,
    pub(crate) connect_tx: mpsc::Sender<Connection>,
}

/// Formats the key servers are registered under.
pub fn address(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

/// A shared address book standing in for the network within a test context.
#[derive(Debug, Clone, Default)]
pub struct TransportRegistry {
    // std RwLock so Drop can unregister synchronously
    listeners: Arc<RwLock<HashMap<String, Listener>>>,
}

impl TransportRegistry {
    /// Creates a new, empty transport registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, addr: &str, listener: Listener) -> Result<(), TransportError> {
        let mut guard = self.listeners.write().expect("Registry lock poisoned");
        if guard.contains_key(addr) {
            return Err(TransportError::AddressInUse(addr.to_string()));
        }
        guard.insert(addr.to_string(), listener);
        tracing::trace!(addr, "Registered listener");
        Ok(())
    }

    pub(crate) fn unregister(&self, addr: &str) {
        let mut guard = self.listeners.write().expect("Registry lock poisoned");
        if guard.remove(addr).is_some() {
            tracing::trace!(addr, "Unregistered listener");
        }
    }

    pub(crate) fn lookup(&self, addr: &str) -> Option<Listener> {
        self.listeners
            .read()
            .expect("Registry lock poisoned")
            .get(addr)
            .cloned()
    }

    /// Whether a server is currently open on `addr`, and with which encoding.
    pub fn listening_kind(&self, addr: &str) -> Option<TransportKind> {
        self.lookup(addr).map(|listener| listener.kind)
    }
}
