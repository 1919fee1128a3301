use std::time::Duration;
use tokio::time::sleep;

/// Fixed pause between consecutive items of a sequential loop.
///
/// The first call returns immediately; each later call sleeps for the delay.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    delay: Duration,
    started: bool,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay, started: false }
    }

    pub fn from_millis(delay_ms: u64) -> Self {
        Self::new(Duration::from_millis(delay_ms))
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn wait(&mut self) {
        if self.started && !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.started = true;
    }
}
