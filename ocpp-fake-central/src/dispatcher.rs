use crate::capture::Capture;
use crate::error::CentralError;
use crate::session::SessionTracker;
use ocpp_core::{Action, Confirmation, Request, Server};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Completion of an outbound request. The capture slot is already written by
/// the time this resolves.
#[derive(Debug)]
pub struct PendingConfirmation {
    action: Action,
    task: JoinHandle<Option<Confirmation>>,
}

impl PendingConfirmation {
    pub fn action(&self) -> Action {
        self.action
    }

    /// Waits for the exchange to settle. `None` when the peer never confirmed.
    pub async fn settled(self) -> Option<Confirmation> {
        match self.task.await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                tracing::warn!(action = %self.action, error = %e, "Completion task did not finish");
                None
            }
        }
    }
}

/// Sends requests to the tracked charge point and captures what comes back.
#[derive(Debug, Clone)]
pub struct OutboundDispatcher {
    sessions: SessionTracker,
    capture: Capture,
}

impl OutboundDispatcher {
    pub fn new(sessions: SessionTracker, capture: Capture) -> Self {
        Self { sessions, capture }
    }

    /// Starts the exchange and returns without waiting for it.
    ///
    /// Whatever the exchange ends in overwrites the captured confirmation;
    /// a failed exchange records absence.
    pub fn send(
        &self,
        server: &Arc<dyn Server>,
        request: Request,
    ) -> Result<PendingConfirmation, CentralError> {
        let action = request.action();
        let Some(session) = self.sessions.current_session() else {
            tracing::warn!(%action, "Cannot send without a connected charge point");
            return Err(CentralError::NoActiveSession);
        };

        tracing::debug!(%session, %action, "Sending request to charge point");
        let server = server.clone();
        let capture = self.capture.clone();
        let task = tokio::spawn(async move {
            let confirmation = match server.send(session, request).await {
                Ok(confirmation) => {
                    tracing::debug!(
                        %session,
                        %action,
                        status = confirmation.status(),
                        "Charge point confirmed"
                    );
                    Some(confirmation)
                }
                Err(e) => {
                    tracing::warn!(%session, %action, error = %e, "Outbound exchange failed");
                    None
                }
            };
            capture.record_confirmation(confirmation.clone());
            confirmation
        });

        Ok(PendingConfirmation { action, task })
    }
}
