use rand::Rng;
use std::time::Duration;

/// Counts bounded retries and picks randomized delays between them.
#[derive(Clone, Debug)]
pub(crate) struct Retries {
    attempts: u32,
    max: u32,
    max_wait: Duration,
}

// === impl Retries ===

impl Retries {
    pub(crate) fn new(max: u32, max_wait: Duration) -> Self {
        Self {
            attempts: 0,
            max,
            max_wait,
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn max(&self) -> u32 {
        self.max
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.attempts >= self.max
    }

    /// Records a retry and returns how long to wait before it, or `None` when
    /// no retries remain.
    pub(crate) fn next(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(self.jitter())
    }

    fn jitter(&self) -> Duration {
        if self.max_wait.is_zero() {
            return Duration::ZERO;
        }
        rand::thread_rng().gen_range(Duration::ZERO..self.max_wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded() {
        let mut retries = Retries::new(3, Duration::from_secs(2));
        for _ in 0..3 {
            let wait = retries.next().expect("retry must be permitted");
            assert!(wait < Duration::from_secs(2), "{wait:?}");
        }
        assert!(retries.is_exhausted());
        assert_eq!(retries.next(), None);
        assert_eq!(retries.attempts(), 3);
    }

    #[test]
    fn zero_wait() {
        let mut retries = Retries::new(1, Duration::ZERO);
        assert_eq!(retries.next(), Some(Duration::ZERO));
    }

    #[test]
    fn no_retries() {
        let mut retries = Retries::new(0, Duration::from_secs(2));
        assert!(retries.is_exhausted());
        assert_eq!(retries.next(), None);
    }
}
