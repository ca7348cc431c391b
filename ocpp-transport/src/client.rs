use crate::codec::{Frame, WireCodec};
use crate::error::TransportError;
use crate::network::NetworkOptions;
use crate::pending::PendingCalls;
use crate::registry::{address, Connection, TransportRegistry};
use ocpp_core::{Confirmation, Request, SessionId, TransportKind};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Buffer size of each direction of a connection.
const CHANNEL_CAPACITY: usize = 64;

/// Responder for a server initiated request. Sending `None`, or dropping the
/// responder, leaves the request unanswered.
pub type Responder = oneshot::Sender<Option<Confirmation>>;

/// Type alias for the receiver of server initiated requests.
pub type IncomingRequestReceiver = mpsc::Receiver<(Request, Responder)>;

/// Holds the receiver channels for a connected charge point.
#[derive(Debug)]
pub struct PeerReceivers {
    pub requests: IncomingRequestReceiver,
}

/// A simulated charge point connected to an [`crate::InMemoryServer`].
#[derive(Debug)]
pub struct ChargePointClient {
    identifier: String,
    session: SessionId,
    codec: WireCodec,
    options: NetworkOptions,
    outbound: mpsc::Sender<String>,
    pending: PendingCalls,
    shutdown: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

impl Drop for ChargePointClient {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl ChargePointClient {
    /// Dials the server registered on `host:port` and waits until it has
    /// accepted the session.
    pub async fn connect(
        registry: &TransportRegistry,
        host: &str,
        port: u16,
        kind: TransportKind,
        identifier: impl Into<String>,
        options: NetworkOptions,
    ) -> Result<(Self, PeerReceivers), TransportError> {
        let addr = address(host, port);
        let identifier = identifier.into();
        let listener = registry
            .lookup(&addr)
            .ok_or_else(|| TransportError::NoListener(addr.clone()))?;
        if listener.kind != kind {
            return Err(TransportError::KindMismatch {
                addr,
                server: listener.kind,
                client: kind,
            });
        }

        let (to_server_tx, to_server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (to_client_tx, to_client_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (accepted_tx, accepted_rx) = oneshot::channel();

        listener
            .connect_tx
            .send(Connection {
                identifier: identifier.clone(),
                inbound: to_server_rx,
                outbound: to_client_tx,
                accepted: accepted_tx,
            })
            .await
            .map_err(|_| TransportError::NoListener(addr.clone()))?;
        let session = accepted_rx
            .await
            .map_err(|_| TransportError::NoListener(addr.clone()))?;

        let codec = WireCodec::new(kind);
        let pending = PendingCalls::default();
        let (requests_tx, requests_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let reader = tokio::spawn(read_loop(
            session,
            codec,
            to_client_rx,
            to_server_tx.clone(),
            pending.clone(),
            requests_tx,
            shutdown_rx,
        ));

        tracing::debug!(%session, %identifier, %addr, "Charge point connected");
        let client = ChargePointClient {
            identifier,
            session,
            codec,
            options,
            outbound: to_server_tx,
            pending,
            shutdown: Some(shutdown_tx),
            reader: Some(reader),
        };
        Ok((
            client,
            PeerReceivers {
                requests: requests_rx,
            },
        ))
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Session id the server assigned on connect.
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// False once the server has ended the session.
    pub fn is_connected(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Sends a request and waits for the confirmation.
    pub async fn call(&self, request: impl Into<Request>) -> Result<Confirmation, TransportError> {
        let request = request.into();
        let action = request.action();
        let message_id = Uuid::new_v4().to_string();
        let payload = request
            .to_payload()
            .map_err(|e| TransportError::Codec(e.to_string()))?;
        let text = self.codec.encode(&Frame::Call {
            message_id: message_id.clone(),
            action,
            payload,
        })?;

        let response = self.pending.register(message_id.clone(), action);
        self.options.simulate_delay().await;

        if self.options.should_drop_message() {
            tracing::warn!(
                session = %self.session,
                %action,
                "Request dropped due to simulated loss"
            );
            self.pending.forget(&message_id);
            return Err(TransportError::MessageDropped(action));
        }

        tracing::trace!(session = %self.session, %action, %message_id, "Calling server");
        if self.outbound.send(text).await.is_err() {
            self.pending.forget(&message_id);
            return Err(TransportError::ChannelClosed(self.session));
        }

        match tokio::time::timeout(self.options.response_timeout, response).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::ChannelClosed(self.session)),
            Err(_) => {
                self.pending.forget(&message_id);
                tracing::debug!(session = %self.session, %action, "No response before timeout");
                Err(TransportError::NoResponse(action))
            }
        }
    }

    /// Closes the connection. The server reports the session as lost.
    pub async fn disconnect(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        tracing::debug!(session = %self.session, "Charge point disconnected");
    }
}

async fn read_loop(
    session: SessionId,
    codec: WireCodec,
    mut inbound: mpsc::Receiver<String>,
    outbound: mpsc::Sender<String>,
    pending: PendingCalls,
    requests: mpsc::Sender<(Request, Responder)>,
    mut shutdown: oneshot::Receiver<()>,
) {
    // Replies come back through this channel so that answering tasks never
    // hold the connection open on their own.
    let (replies_tx, mut replies_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);

    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(text) = frame else {
                    tracing::debug!(%session, "Server closed the connection");
                    break;
                };
                match codec.decode(&text) {
                    Ok(Frame::Call { message_id, action, payload }) => {
                        let reply = match Request::from_payload(action, payload) {
                            Ok(request) => {
                                forward_request(request, message_id, &requests, replies_tx.clone());
                                None
                            }
                            Err(e) => Some(Frame::CallError {
                                message_id,
                                code: "FormationViolation".to_string(),
                                description: e.to_string(),
                            }),
                        };
                        if let Some(reply) = reply {
                            let _ = replies_tx.send(reply).await;
                        }
                    }
                    Ok(answer) => pending.resolve(answer),
                    Err(e) => tracing::warn!(%session, error = %e, "Dropping undecodable frame"),
                }
            }
            Some(reply) = replies_rx.recv() => {
                match codec.encode(&reply) {
                    Ok(text) => {
                        if outbound.send(text).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(%session, error = %e, "Failed to encode reply"),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    pending.fail_all(TransportError::ChannelClosed(session));
}

/// Hands a server request to the test and waits for its answer off the read loop.
fn forward_request(
    request: Request,
    message_id: String,
    requests: &mpsc::Sender<(Request, Responder)>,
    replies: mpsc::Sender<Frame>,
) {
    let action = request.action();
    let (responder, answer) = oneshot::channel();
    if requests.try_send((request, responder)).is_err() {
        tracing::warn!(%action, "Nobody is receiving server requests, rejecting");
        let reply = Frame::CallError {
            message_id,
            code: "NotImplemented".to_string(),
            description: format!("{action} is not handled by this charge point"),
        };
        tokio::spawn(async move {
            let _ = replies.send(reply).await;
        });
        return;
    }

    tokio::spawn(async move {
        let Ok(Some(confirmation)) = answer.await else {
            tracing::debug!(%action, "Charge point left the request unanswered");
            return;
        };
        let reply = match confirmation.to_payload() {
            Ok(payload) => Frame::CallResult {
                message_id,
                payload,
            },
            Err(e) => Frame::CallError {
                message_id,
                code: "InternalError".to_string(),
                description: e.to_string(),
            },
        };
        let _ = replies.send(reply).await;
    });
}
