use ocpp_core::{Action, SessionId};
use thiserror::Error;

/// Errors that can occur during in-memory transport operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Server is not open")]
    NotOpen,

    #[error("Server is already open on {0}")]
    AlreadyOpen(String),

    #[error("Address {0} is already in use")]
    AddressInUse(String),

    #[error("No server listening on {0}")]
    NoListener(String),

    #[error("Server on {addr} speaks {server:?}, client expected {client:?}")]
    KindMismatch {
        addr: String,
        server: ocpp_core::TransportKind,
        client: ocpp_core::TransportKind,
    },

    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    #[error("Connection for session {0} is closed")]
    ChannelClosed(SessionId),

    #[error("No response received for {0}")]
    NoResponse(Action),

    #[error("Peer answered with {code}: {description}")]
    CallError { code: String, description: String },

    #[error("No registered feature profile supports {0}")]
    NotSupported(Action),

    #[error("Network simulation error: {0} frame dropped")]
    MessageDropped(Action),

    #[error("Malformed frame: {0}")]
    Codec(String),
}
