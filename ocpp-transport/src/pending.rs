use crate::codec::Frame;
use crate::error::TransportError;
use ocpp_core::{Action, Confirmation};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub(crate) type CallOutcome = Result<Confirmation, TransportError>;

#[derive(Debug)]
struct PendingCall {
    action: Action,
    responder: oneshot::Sender<CallOutcome>,
}

/// Outstanding calls on one connection, keyed by message id.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingCalls {
    calls: Arc<Mutex<HashMap<String, PendingCall>>>,
}

impl PendingCalls {
    pub(crate) fn register(
        &self,
        message_id: String,
        action: Action,
    ) -> oneshot::Receiver<CallOutcome> {
        let (responder, rx) = oneshot::channel();
        self.calls
            .lock()
            .expect("Pending calls lock poisoned")
            .insert(message_id, PendingCall { action, responder });
        rx
    }

    pub(crate) fn forget(&self, message_id: &str) {
        self.calls
            .lock()
            .expect("Pending calls lock poisoned")
            .remove(message_id);
    }

    /// Completes the call a result or error frame answers.
    pub(crate) fn resolve(&self, frame: Frame) {
        let message_id = frame.message_id().to_string();
        let Some(call) = self
            .calls
            .lock()
            .expect("Pending calls lock poisoned")
            .remove(&message_id)
        else {
            tracing::warn!(%message_id, "Answer for unknown or expired call");
            return;
        };

        let outcome = match frame {
            Frame::CallResult { payload, .. } => Confirmation::from_payload(call.action, payload)
                .map_err(|e| TransportError::Codec(e.to_string())),
            Frame::CallError {
                code, description, ..
            } => Err(TransportError::CallError { code, description }),
            Frame::Call { .. } => return,
        };
        tracing::trace!(%message_id, action = %call.action, ok = outcome.is_ok(), "Call answered");
        let _ = call.responder.send(outcome);
    }

    /// Fails every outstanding call, e.g. when the connection goes away.
    pub(crate) fn fail_all(&self, error: TransportError) {
        let drained: Vec<PendingCall> = self
            .calls
            .lock()
            .expect("Pending calls lock poisoned")
            .drain()
            .map(|(_, call)| call)
            .collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), %error, "Failing in-flight calls");
        }
        for call in drained {
            let _ = call.responder.send(Err(error.clone()));
        }
    }
}
