use rand::Rng;
use std::time::Duration;

/// Exponential backoff schedule: `base, 2*base, 4*base, ...` capped at
/// `cap`, with up to 10% jitter, exhausted after `max_attempts`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// The default reconnect schedule: 1s, 2s, 4s, ... capped at 30s,
    /// ten attempts before giving up.
    pub fn reconnect() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 10)
    }

    /// Short publish-retry schedule.
    pub fn publish() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(8), 3)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Next delay to sleep before retrying, or `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let exp = self.base.saturating_mul(1u32 << self.attempt.min(16));
        let capped = exp.min(self.cap);
        self.attempt += 1;

        let jitter = rand::thread_rng().gen_range(0.0..=0.1);
        Some(capped.mul_f64(1.0 + jitter))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_cap() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 10);
        let d0 = b.next_delay().unwrap();
        let d1 = b.next_delay().unwrap();
        let d2 = b.next_delay().unwrap();
        assert!(d0 >= Duration::from_secs(1) && d0 <= Duration::from_millis(1100));
        assert!(d1 >= Duration::from_secs(2) && d1 <= Duration::from_millis(2200));
        assert!(d2 >= Duration::from_secs(4) && d2 <= Duration::from_millis(4400));

        // Push past the cap
        for _ in 0..5 {
            b.next_delay();
        }
        let capped = b.next_delay().unwrap();
        assert!(capped <= Duration::from_secs(33));
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut b = Backoff::new(Duration::from_millis(1), Duration::from_millis(10), 3);
        assert!(b.next_delay().is_some());
        assert!(b.next_delay().is_some());
        assert!(b.next_delay().is_some());
        assert!(b.next_delay().is_none());
        assert!(b.exhausted());

        b.reset();
        assert!(b.next_delay().is_some());
    }
}
