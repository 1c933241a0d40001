//! Fixed-delay throttle for marketplace API calls.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between consecutive calls.
///
/// The sync phases process items in a sequential loop and wait on this
/// before each marketplace call; there is deliberately no concurrent
/// fan-out against either external system.
pub struct CallThrottle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl CallThrottle {
    /// Creates a throttle with the given minimum inter-call interval.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// A throttle that never waits, for tests.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Waits until the interval since the previous call has elapsed.
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spaces_out_calls() {
        let throttle = CallThrottle::new(Duration::from_millis(20));
        let start = Instant::now();
        throttle.wait().await;
        throttle.wait().await;
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn unlimited_does_not_wait() {
        let throttle = CallThrottle::unlimited();
        let start = Instant::now();
        for _ in 0..10 {
            throttle.wait().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
