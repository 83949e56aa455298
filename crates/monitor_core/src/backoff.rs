use std::time::Duration;

/// Capped exponential backoff: `min(cap, base * 2^(attempt - 1))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before reconnecting after an abnormal close.
    pub const fn reconnect() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(15_000))
    }

    /// Delay between readiness probe attempts.
    pub const fn probe() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_millis(5_000))
    }

    /// Delay for the given 1-based attempt. Attempt 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base.saturating_mul(factor).min(self.cap)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::reconnect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_attempts_stay_capped() {
        let policy = BackoffPolicy::reconnect();
        assert_eq!(policy.delay(u32::MAX), Duration::from_millis(15_000));
    }

    #[test]
    fn attempt_zero_uses_base() {
        assert_eq!(BackoffPolicy::probe().delay(0), Duration::from_millis(500));
    }
}
