use crate::codec::{Frame, WireCodec};
use crate::error::TransportError;
use crate::network::NetworkOptions;
use crate::pending::PendingCalls;
use crate::registry::{address, Connection, Listener, TransportRegistry};
use anyhow::Result;
use async_trait::async_trait;
use ocpp_core::{
    Action, Confirmation, FeatureProfile, Request, Server, ServerEvents, ServerFactory, SessionId,
    TransportKind,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Buffer size of the per-server connection queue.
const ACCEPT_BACKLOG: usize = 16;

/// Server side of one connected peer.
struct SessionHandle {
    outbound: mpsc::Sender<String>,
    pending: PendingCalls,
    shutdown: Option<oneshot::Sender<()>>,
    /// Fires once the session task has torn down and reported the loss.
    done: oneshot::Receiver<()>,
}

#[derive(Default)]
struct ServerState {
    address: Option<String>,
    accept_task: Option<JoinHandle<()>>,
    sessions: HashMap<SessionId, SessionHandle>,
}

/// State shared between the server handle and its accept and session tasks.
#[derive(Clone)]
struct Shared {
    kind: TransportKind,
    codec: WireCodec,
    options: NetworkOptions,
    profiles: Arc<RwLock<Vec<FeatureProfile>>>,
    state: Arc<Mutex<ServerState>>,
}

/// An OCPP server living entirely in memory.
///
/// Peers reach it through a shared [`TransportRegistry`] by address, and every
/// frame crosses the connection encoded with the server's [`WireCodec`].
pub struct InMemoryServer {
    registry: Arc<TransportRegistry>,
    shared: Shared,
}

impl Drop for InMemoryServer {
    fn drop(&mut self) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if let Some(addr) = state.address.take() {
            self.registry.unregister(&addr);
        }
        if let Some(task) = state.accept_task.take() {
            task.abort();
        }
        // Dropping the handles drops their shutdown senders, which ends each session task.
        state.sessions.clear();
    }
}

impl InMemoryServer {
    pub fn new(
        kind: TransportKind,
        registry: Arc<TransportRegistry>,
        options: NetworkOptions,
    ) -> Self {
        Self {
            registry,
            shared: Shared {
                kind,
                codec: WireCodec::new(kind),
                options,
                profiles: Arc::new(RwLock::new(Vec::new())),
                state: Arc::new(Mutex::new(ServerState::default())),
            },
        }
    }

    /// Address the server is open on, if any.
    pub fn address(&self) -> Option<String> {
        self.shared.lock_state().address.clone()
    }

    pub fn session_count(&self) -> usize {
        self.shared.lock_state().sessions.len()
    }

    fn supports_outbound(&self, action: Action) -> bool {
        self.shared
            .profiles
            .read()
            .expect("Profiles lock poisoned")
            .iter()
            .any(|profile| profile.outbound_actions().contains(&action))
    }
}

impl Shared {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().expect("Server state lock poisoned")
    }

    fn inbound_profile(&self, action: Action) -> Option<FeatureProfile> {
        self.profiles
            .read()
            .expect("Profiles lock poisoned")
            .iter()
            .find(|profile| profile.inbound_actions().contains(&action))
            .cloned()
    }

    async fn accept_loop(
        self,
        mut connect_rx: mpsc::Receiver<Connection>,
        events: Arc<dyn ServerEvents>,
    ) {
        while let Some(connection) = connect_rx.recv().await {
            let session = Uuid::new_v4();
            let pending = PendingCalls::default();
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let (done_tx, done_rx) = oneshot::channel();

            {
                // A connection still queued when the server closed is refused.
                let mut state = self.lock_state();
                if state.address.is_none() {
                    tracing::debug!(
                        identifier = %connection.identifier,
                        "Refusing connection to a closed server"
                    );
                    continue;
                }
                state.sessions.insert(
                    session,
                    SessionHandle {
                        outbound: connection.outbound.clone(),
                        pending: pending.clone(),
                        shutdown: Some(shutdown_tx),
                        done: done_rx,
                    },
                );
            }

            tracing::debug!(
                %session,
                identifier = %connection.identifier,
                kind = ?self.kind,
                "Accepted new session"
            );
            events.new_session(session, &connection.identifier);
            let _ = connection.accepted.send(session);

            tokio::spawn(self.clone().session_loop(
                session,
                connection.inbound,
                connection.outbound,
                pending,
                shutdown_rx,
                done_tx,
                events.clone(),
            ));
        }
        tracing::trace!(kind = ?self.kind, "Accept loop finished");
    }

    #[allow(clippy::too_many_arguments)]
    async fn session_loop(
        self,
        session: SessionId,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<String>,
        pending: PendingCalls,
        mut shutdown: oneshot::Receiver<()>,
        done: oneshot::Sender<()>,
        events: Arc<dyn ServerEvents>,
    ) {
        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(text) => self.handle_frame(session, &text, &outbound, &pending).await,
                    None => {
                        tracing::debug!(%session, "Peer closed the connection");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    tracing::debug!(%session, "Session closed by server");
                    break;
                }
            }
        }

        self.lock_state().sessions.remove(&session);
        pending.fail_all(TransportError::ChannelClosed(session));
        drop(outbound);
        events.lost_session(session);
        let _ = done.send(());
    }

    async fn handle_frame(
        &self,
        session: SessionId,
        text: &str,
        outbound: &mpsc::Sender<String>,
        pending: &PendingCalls,
    ) {
        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(%session, error = %e, "Dropping undecodable frame");
                return;
            }
        };
        tracing::trace!(%session, message_id = frame.message_id(), "Received frame");

        match frame {
            Frame::Call {
                message_id,
                action,
                payload,
            } => {
                let Some(reply) = self.dispatch_call(session, message_id, action, payload) else {
                    return;
                };
                match self.codec.encode(&reply) {
                    Ok(text) => {
                        if outbound.send(text).await.is_err() {
                            tracing::warn!(
                                %session,
                                %action,
                                "Peer went away before the reply was sent"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!(%session, %action, error = %e, "Failed to encode reply")
                    }
                }
            }
            answer => pending.resolve(answer),
        }
    }

    /// Runs an inbound call through the registered profiles. `None` means no
    /// reply goes out.
    fn dispatch_call(
        &self,
        session: SessionId,
        message_id: String,
        action: Action,
        payload: serde_json::Value,
    ) -> Option<Frame> {
        let Some(profile) = self.inbound_profile(action) else {
            tracing::warn!(%session, %action, "No profile handles inbound action");
            return Some(call_error(
                message_id,
                "NotSupported",
                format!("{action} is not supported"),
            ));
        };

        let request = match Request::from_payload(action, payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%session, %action, error = %e, "Inbound payload failed to decode");
                return Some(call_error(message_id, "FormationViolation", e.to_string()));
            }
        };

        match profile.handle_request(session, request) {
            Ok(Some(confirmation)) => match confirmation.to_payload() {
                Ok(payload) => Some(Frame::CallResult {
                    message_id,
                    payload,
                }),
                Err(e) => Some(call_error(message_id, "InternalError", e.to_string())),
            },
            Ok(None) => {
                tracing::debug!(
                    %session,
                    %action,
                    %message_id,
                    "Handler withheld the confirmation"
                );
                None
            }
            Err(e) => Some(call_error(message_id, "NotSupported", e.to_string())),
        }
    }
}

fn call_error(message_id: String, code: &str, description: String) -> Frame {
    Frame::CallError {
        message_id,
        code: code.to_string(),
        description,
    }
}

#[async_trait]
impl Server for InMemoryServer {
    fn kind(&self) -> TransportKind {
        self.shared.kind
    }

    fn add_feature_profile(&self, profile: FeatureProfile) {
        if self.shared.lock_state().address.is_some() {
            tracing::warn!(profile = profile.name(), "Profile added after the server opened");
        }
        tracing::debug!(
            profile = profile.name(),
            kind = ?self.shared.kind,
            "Added feature profile"
        );
        self.shared
            .profiles
            .write()
            .expect("Profiles lock poisoned")
            .push(profile);
    }

    async fn open(&self, host: &str, port: u16, events: Arc<dyn ServerEvents>) -> Result<()> {
        let addr = address(host, port);
        let (connect_tx, connect_rx) = mpsc::channel(ACCEPT_BACKLOG);
        {
            let mut state = self.shared.lock_state();
            if let Some(existing) = &state.address {
                return Err(TransportError::AlreadyOpen(existing.clone()).into());
            }
            self.registry.register(
                &addr,
                Listener {
                    kind: self.shared.kind,
                    connect_tx,
                },
            )?;
            state.address = Some(addr.clone());
            let accept = self.shared.clone().accept_loop(connect_rx, events);
            state.accept_task = Some(tokio::spawn(accept));
        }
        tracing::info!(%addr, kind = ?self.shared.kind, "Server open");
        Ok(())
    }

    async fn close(&self) {
        let (addr, accept_task, sessions) = {
            let mut state = self.shared.lock_state();
            (
                state.address.take(),
                state.accept_task.take(),
                std::mem::take(&mut state.sessions),
            )
        };
        let Some(addr) = addr else {
            tracing::debug!("Server already closed");
            return;
        };

        self.registry.unregister(&addr);
        if let Some(task) = accept_task {
            task.abort();
        }
        for (session, handle) in sessions {
            shutdown_session(session, handle).await;
        }
        tracing::info!(%addr, "Server closed");
    }

    async fn send(&self, session: SessionId, request: Request) -> Result<Confirmation> {
        let action = request.action();
        if !self.supports_outbound(action) {
            return Err(TransportError::NotSupported(action).into());
        }

        let message_id = Uuid::new_v4().to_string();
        let payload = request
            .to_payload()
            .map_err(|e| TransportError::Codec(e.to_string()))?;
        let text = self.shared.codec.encode(&Frame::Call {
            message_id: message_id.clone(),
            action,
            payload,
        })?;

        // Register under the state lock so a concurrent teardown either misses
        // the session entirely or fails this call along with the rest.
        let (outbound, pending, response) = {
            let state = self.shared.lock_state();
            if state.address.is_none() {
                return Err(TransportError::NotOpen.into());
            }
            let handle = state
                .sessions
                .get(&session)
                .ok_or(TransportError::SessionNotFound(session))?;
            let response = handle.pending.register(message_id.clone(), action);
            (handle.outbound.clone(), handle.pending.clone(), response)
        };

        tracing::trace!(%session, %action, %message_id, "Sending request");
        self.shared.options.simulate_delay().await;

        if self.shared.options.should_drop_message() {
            tracing::warn!(%session, %action, "Request dropped due to simulated loss");
            pending.forget(&message_id);
            return Err(TransportError::MessageDropped(action).into());
        }

        if outbound.send(text).await.is_err() {
            pending.forget(&message_id);
            return Err(TransportError::ChannelClosed(session).into());
        }
        drop(outbound);

        match tokio::time::timeout(self.shared.options.response_timeout, response).await {
            Ok(Ok(outcome)) => Ok(outcome?),
            Ok(Err(_)) => Err(TransportError::ChannelClosed(session).into()),
            Err(_) => {
                pending.forget(&message_id);
                tracing::warn!(
                    %session,
                    %action,
                    %message_id,
                    "Timed out waiting for confirmation"
                );
                Err(TransportError::NoResponse(action).into())
            }
        }
    }

    async fn close_session(&self, session: SessionId) {
        let handle = self.shared.lock_state().sessions.remove(&session);
        match handle {
            Some(handle) => shutdown_session(session, handle).await,
            None => tracing::debug!(%session, "close_session for unknown session"),
        }
    }
}

async fn shutdown_session(session: SessionId, mut handle: SessionHandle) {
    if let Some(shutdown) = handle.shutdown.take() {
        let _ = shutdown.send(());
    }
    // An error means the task already finished.
    let _ = handle.done.await;
    tracing::trace!(%session, "Session shut down");
}

/// Builds [`InMemoryServer`]s that share one registry and network profile.
#[derive(Debug, Clone, Default)]
pub struct InMemoryServerFactory {
    registry: Arc<TransportRegistry>,
    options: NetworkOptions,
}

impl InMemoryServerFactory {
    pub fn new(registry: Arc<TransportRegistry>, options: NetworkOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }
}

impl ServerFactory for InMemoryServerFactory {
    fn build(&self, kind: TransportKind, core: FeatureProfile) -> Arc<dyn Server> {
        let server = InMemoryServer::new(kind, self.registry.clone(), self.options.clone());
        server.add_feature_profile(core);
        Arc::new(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingEvents {
        new_sessions: AtomicUsize,
    }

    impl ServerEvents for CountingEvents {
        fn new_session(&self, _session: SessionId, _identifier: &str) {
            self.new_sessions.fetch_add(1, Ordering::SeqCst);
        }

        fn lost_session(&self, _session: SessionId) {}
    }

    fn dial(identifier: &str) -> (Connection, oneshot::Receiver<SessionId>, mpsc::Sender<String>) {
        let (to_server_tx, to_server_rx) = mpsc::channel(1);
        let (to_client_tx, _to_client_rx) = mpsc::channel(1);
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let connection = Connection {
            identifier: identifier.to_string(),
            inbound: to_server_rx,
            outbound: to_client_tx,
            accepted: accepted_tx,
        };
        (connection, accepted_rx, to_server_tx)
    }

    #[tokio::test]
    async fn test_connection_queued_past_close_is_refused() {
        let registry = Arc::new(TransportRegistry::new());
        let server = InMemoryServer::new(TransportKind::Json, registry, NetworkOptions::default());
        let events = Arc::new(CountingEvents::default());
        server.open("localhost", 8887, events.clone()).await.unwrap();
        server.close().await;

        // A connection that was already queued reaches an accept loop after close
        let (connect_tx, connect_rx) = mpsc::channel(1);
        let (connection, accepted, _to_server) = dial("CP-1");
        connect_tx.send(connection).await.unwrap();
        drop(connect_tx);
        server.shared.clone().accept_loop(connect_rx, events.clone()).await;

        assert!(accepted.await.is_err(), "Peer must not be told it was accepted");
        assert_eq!(events.new_sessions.load(Ordering::SeqCst), 0);
        assert_eq!(server.session_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_to_open_server_is_accepted() {
        let registry = Arc::new(TransportRegistry::new());
        let server = InMemoryServer::new(TransportKind::Json, registry, NetworkOptions::default());
        let events = Arc::new(CountingEvents::default());
        server.open("localhost", 8887, events.clone()).await.unwrap();

        let (connect_tx, connect_rx) = mpsc::channel(1);
        let (connection, accepted, _to_server) = dial("CP-1");
        connect_tx.send(connection).await.unwrap();
        drop(connect_tx);
        server.shared.clone().accept_loop(connect_rx, events.clone()).await;

        let session = accepted.await.expect("Open server should accept");
        assert_eq!(events.new_sessions.load(Ordering::SeqCst), 1);
        assert_eq!(server.session_count(), 1);

        server.close_session(session).await;
        assert_eq!(server.session_count(), 0);
    }
}
