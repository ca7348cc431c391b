use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Single-shot switch that swallows the next confirmation once armed.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    armed: Arc<AtomicBool>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the injector. Arming twice still suppresses only one confirmation.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
        tracing::debug!("Next confirmation will be suppressed");
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Returns `None` and disarms if armed, otherwise hands the confirmation back.
    pub fn consume_if_armed<T>(&self, confirmation: T) -> Option<T> {
        if self.armed.swap(false, Ordering::SeqCst) {
            tracing::debug!(
                confirmation = std::any::type_name::<T>(),
                "Suppressing confirmation"
            );
            None
        } else {
            Some(confirmation)
        }
    }
}
