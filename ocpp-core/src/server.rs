use crate::messages::{Confirmation, Request};
use crate::profile::FeatureProfile;
use crate::SessionId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Wire encoding a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TransportKind {
    /// JSON frames over a WebSocket style connection.
    #[default]
    Json,
    /// SOAP envelopes.
    Soap,
}

impl TransportKind {
    pub fn default_port(self) -> u16 {
        match self {
            TransportKind::Json => 8887,
            TransportKind::Soap => 8890,
        }
    }
}

/// Session lifecycle notifications a server delivers while open.
pub trait ServerEvents: Send + Sync {
    fn new_session(&self, session: SessionId, identifier: &str);

    fn lost_session(&self, session: SessionId);
}

/// The central system side of an OCPP transport.
#[async_trait]
pub trait Server: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Registers a profile. Must be called before [`Server::open`].
    fn add_feature_profile(&self, profile: FeatureProfile);

    async fn open(
        &self,
        host: &str,
        port: u16,
        events: Arc<dyn ServerEvents>,
    ) -> anyhow::Result<()>;

    /// Ends every session and stops accepting new ones. Closing twice is a no-op.
    async fn close(&self);

    /// Sends a request to one session and waits for its confirmation.
    async fn send(&self, session: SessionId, request: Request) -> anyhow::Result<Confirmation>;

    async fn close_session(&self, session: SessionId);
}

/// Builds servers for a given encoding, already carrying their Core profile.
pub trait ServerFactory: Send + Sync {
    fn build(&self, kind: TransportKind, core: FeatureProfile) -> Arc<dyn Server>;
}
