use rand::Rng;
use tokio::time::{sleep, Duration};

/// Jittered pause after each real fetch, so lookups against a rate-limited
/// source do not arrive in a regular burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchThrottle {
    min: Duration,
    max: Duration,
}

impl FetchThrottle {
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn is_disabled(&self) -> bool {
        self.max.is_zero()
    }

    pub fn next_delay(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let millis = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    pub async fn pause(&self) {
        if self.is_disabled() {
            return;
        }
        let delay = self.next_delay();
        sleep(delay).await;
    }
}

impl Default for FetchThrottle {
    fn default() -> Self {
        Self::from_millis(50, 5500)
    }
}
