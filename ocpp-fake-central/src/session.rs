use crate::capture::Capture;
use ocpp_core::{Server, ServerEvents, SessionId};
use std::sync::{Arc, Mutex, MutexGuard};

/// Connection state of the single charge point slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected {
        session: SessionId,
        identifier: String,
    },
}

/// Tracks the one connected charge point and clears captured state when it goes away.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    state: Arc<Mutex<SessionState>>,
    capture: Capture,
}

impl SessionTracker {
    pub fn new(capture: Capture) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
            capture,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("Session state lock poisoned")
    }

    pub fn state(&self) -> SessionState {
        self.lock().clone()
    }

    pub fn current_session(&self) -> Option<SessionId> {
        match &*self.lock() {
            SessionState::Connected { session, .. } => Some(*session),
            SessionState::Disconnected => None,
        }
    }

    pub fn identifier(&self) -> Option<String> {
        match &*self.lock() {
            SessionState::Connected { identifier, .. } => Some(identifier.clone()),
            SessionState::Disconnected => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.lock(), SessionState::Connected { .. })
    }

    /// Asks the server to drop the tracked session. No-op when disconnected.
    pub async fn force_disconnect(&self, server: &dyn Server) {
        let Some(session) = self.current_session() else {
            tracing::debug!("No session to disconnect");
            return;
        };
        tracing::info!(%session, "Forcing charge point disconnect");
        server.close_session(session).await;
    }
}

impl ServerEvents for SessionTracker {
    fn new_session(&self, session: SessionId, identifier: &str) {
        let previous = std::mem::replace(
            &mut *self.lock(),
            SessionState::Connected {
                session,
                identifier: identifier.to_string(),
            },
        );
        if let SessionState::Connected { session: old, .. } = previous {
            tracing::warn!(%old, new = %session, "Replacing connected session");
        }
        tracing::info!(%session, identifier, "Charge point connected");
    }

    fn lost_session(&self, session: SessionId) {
        let previous = std::mem::take(&mut *self.lock());
        match previous {
            SessionState::Connected { session: tracked, .. } if tracked != session => {
                tracing::warn!(%session, %tracked, "Lost a session other than the tracked one");
            }
            SessionState::Disconnected => {
                tracing::debug!(%session, "Lost session while already disconnected");
            }
            SessionState::Connected { .. } => {
                tracing::info!(%session, "Charge point disconnected");
            }
        }
        self.capture.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpp_core::messages::HeartbeatRequest;
    use uuid::Uuid;

    #[test]
    fn test_starts_disconnected() {
        let tracker = SessionTracker::new(Capture::new());
        assert!(!tracker.is_connected());
        assert_eq!(tracker.state(), SessionState::Disconnected);
        assert_eq!(tracker.current_session(), None);
    }

    #[test]
    fn test_connect_then_lose() {
        let capture = Capture::new();
        let tracker = SessionTracker::new(capture.clone());
        let session = Uuid::new_v4();

        tracker.new_session(session, "CP-1");
        assert!(tracker.is_connected());
        assert_eq!(tracker.current_session(), Some(session));
        assert_eq!(tracker.identifier().as_deref(), Some("CP-1"));

        capture.record_request(HeartbeatRequest::default().into());
        capture.record_confirmation(None);
        tracker.lost_session(session);

        assert!(!tracker.is_connected());
        assert_eq!(tracker.identifier(), None);
        assert!(capture.last_request().is_none());
        assert!(capture.last_confirmation().is_none());
    }

    #[test]
    fn test_new_session_replaces_the_slot() {
        let tracker = SessionTracker::new(Capture::new());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        tracker.new_session(first, "CP-1");
        tracker.new_session(second, "CP-2");
        assert_eq!(
            tracker.state(),
            SessionState::Connected {
                session: second,
                identifier: "CP-2".to_string()
            }
        );
    }

    #[test]
    fn test_lost_session_always_clears() {
        let capture = Capture::new();
        let tracker = SessionTracker::new(capture.clone());
        tracker.new_session(Uuid::new_v4(), "CP-1");
        capture.record_request(HeartbeatRequest::default().into());

        // Even a loss reported for a different id resets everything
        tracker.lost_session(Uuid::new_v4());
        assert!(!tracker.is_connected());
        assert!(capture.last_request().is_none());
    }
}
