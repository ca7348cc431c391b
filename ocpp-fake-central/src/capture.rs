use ocpp_core::{Confirmation, Request};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Slots {
    request: Option<Request>,
    confirmation: Option<Confirmation>,
}

/// The most recent inbound request and the most recent confirmation to an
/// outbound request. Each write overwrites; there is no history.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    slots: Arc<Mutex<Slots>>,
}

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().expect("Capture lock poisoned")
    }

    pub(crate) fn record_request(&self, request: Request) {
        tracing::trace!(action = %request.action(), "Captured inbound request");
        self.lock().request = Some(request);
    }

    /// `None` records that the exchange produced no confirmation.
    pub(crate) fn record_confirmation(&self, confirmation: Option<Confirmation>) {
        tracing::trace!(
            action = confirmation.as_ref().map(|c| c.action().as_str()),
            "Captured outbound confirmation"
        );
        self.lock().confirmation = confirmation;
    }

    pub(crate) fn clear(&self) {
        let mut slots = self.lock();
        slots.request = None;
        slots.confirmation = None;
    }

    pub fn last_request(&self) -> Option<Request> {
        self.lock().request.clone()
    }

    pub fn last_confirmation(&self) -> Option<Confirmation> {
        self.lock().confirmation.clone()
    }

    pub fn with_request<R>(&self, f: impl FnOnce(Option<&Request>) -> R) -> R {
        f(self.lock().request.as_ref())
    }

    pub fn with_confirmation<R>(&self, f: impl FnOnce(Option<&Confirmation>) -> R) -> R {
        f(self.lock().confirmation.as_ref())
    }
}
