//! Typed OCPP 1.6 vocabulary and the transport abstraction a central system sits on.

pub mod error;
pub mod messages;
pub mod profile;
pub mod server;

pub use error::CoreError;
pub use messages::{Action, Confirmation, Request};
pub use profile::{
    FeatureProfile, ServerCoreEventHandler, ServerRemoteTriggerHandler,
    ServerSmartChargingHandler,
};
pub use server::{Server, ServerEvents, ServerFactory, TransportKind};

/// Identifies one connected charge point session on a server.
pub type SessionId = uuid::Uuid;
