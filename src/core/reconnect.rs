use std::time::Duration;

/// Abstract reconnect strategy trait.
///
/// The connection actor asks the strategy for a delay each time an open socket drops or
/// an unattended reconnect attempt fails. Policy lives here, not in the actor.
pub trait WsReconnectStrategy: Send + Sync + 'static {
    fn next_delay(&mut self) -> Duration;
    fn reset(&mut self);
    fn should_retry(&self) -> bool;
}

/// Fixed-delay, unbounded reconnect: no growth, no jitter.
#[derive(Clone, Debug)]
pub struct FixedDelayReconnect {
    delay: Duration,
    retry: bool,
}

/// Delay between a drop and the next reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

impl FixedDelayReconnect {
    pub fn new(delay: Duration) -> Self {
        Self { delay, retry: true }
    }

    pub fn abort(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedDelayReconnect {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl WsReconnectStrategy for FixedDelayReconnect {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }

    fn reset(&mut self) {}

    fn should_retry(&self) -> bool {
        self.retry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_grows() {
        let mut strategy = FixedDelayReconnect::default();
        for _ in 0..10 {
            assert_eq!(strategy.next_delay(), Duration::from_secs(5));
        }
        strategy.reset();
        assert_eq!(strategy.next_delay(), Duration::from_secs(5));
        assert!(strategy.should_retry());
    }

    #[test]
    fn abort_disables_retry() {
        let strategy = FixedDelayReconnect::new(Duration::from_millis(10)).abort();
        assert!(!strategy.should_retry());
        assert_eq!(strategy.delay(), Duration::from_millis(10));
    }
}
