use std::time::Duration;

use backon::ExponentialBuilder;

/// Tuning knobs shared by the saga, the lifecycle and the reconciler.
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Upper bound for every single remote call (inventory, order store,
    /// journal). Expiry is treated as a dependency failure.
    pub call_timeout: Duration,

    /// Extra read-check-write attempts after a stock conflict.
    pub conflict_retries: usize,

    pub conflict_min_delay: Duration,
    pub conflict_max_delay: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(3),
            conflict_retries: 3,
            conflict_min_delay: Duration::from_millis(10),
            conflict_max_delay: Duration::from_millis(200),
        }
    }
}

impl SagaConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_conflict_retries(mut self, retries: usize) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Backoff between attempts of a conflicting stock update.
    pub fn conflict_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.conflict_min_delay)
            .with_max_delay(self.conflict_max_delay)
            .with_max_times(self.conflict_retries)
            .with_jitter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SagaConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(3));
        assert_eq!(config.conflict_retries, 3);
    }

    #[test]
    fn builders() {
        let config = SagaConfig::default()
            .with_call_timeout(Duration::from_millis(50))
            .with_conflict_retries(0);
        assert_eq!(config.call_timeout, Duration::from_millis(50));
        assert_eq!(config.conflict_retries, 0);
    }
}
