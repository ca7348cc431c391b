use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Options to configure simulated network behavior for the in-memory transport.
#[derive(Clone, Debug)]
pub struct NetworkOptions {
    /// Probability (0.0 to 1.0) of dropping a request frame.
    pub message_loss_probability: f64,
    /// Minimum delay to add to frame delivery.
    pub min_delay: Duration,
    /// Maximum delay to add to frame delivery (delay will be uniform random between min and max).
    pub max_delay: Duration,
    /// How long a caller waits for a confirmation before giving up.
    pub response_timeout: Duration,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            message_loss_probability: 0.0,
            min_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            response_timeout: Duration::from_secs(5),
        }
    }
}

impl NetworkOptions {
    /// Fixed delay on every frame.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            min_delay: delay,
            max_delay: delay,
            ..Default::default()
        }
    }

    /// Checks if a frame should be dropped due to loss probability.
    pub fn should_drop_message(&self) -> bool {
        self.message_loss_probability > 0.0 && rand::random::<f64>() < self.message_loss_probability
    }

    /// Simulates the frame delay, if configured.
    pub async fn simulate_delay(&self) {
        let delay = if self.min_delay == Duration::ZERO && self.max_delay == Duration::ZERO {
            None
        } else if self.min_delay == self.max_delay {
            Some(self.min_delay)
        } else if self.min_delay > self.max_delay {
            tracing::warn!(
                min = ?self.min_delay,
                max = ?self.max_delay,
                "min_delay > max_delay, using min_delay"
            );
            Some(self.min_delay)
        } else {
            Some(rand::rng().random_range(self.min_delay..=self.max_delay))
        };

        if let Some(d) = delay {
            if d > Duration::ZERO {
                tracing::trace!(delay = ?d, "Applying simulated network delay");
                sleep(d).await;
            }
        }
    }
}
