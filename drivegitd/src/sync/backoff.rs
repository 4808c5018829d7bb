use std::time::Duration;

use rand::Rng;

/// Exponential backoff with an upper cap and optional full jitter, used
/// between content-fetch retry attempts.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: bool) -> Self {
        Self { base, cap, jitter }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let cap_ms = self.cap.as_millis().min(u128::from(u64::MAX)) as u64;
        let exp_ms = self
            .base
            .as_millis()
            .min(u128::from(u64::MAX))
            .checked_shl(attempt.min(20))
            .map(|ms| ms.min(u128::from(cap_ms)) as u64)
            .unwrap_or(cap_ms);
        if self.jitter {
            Duration::from_millis(rng.gen_range(0..=exp_ms))
        } else {
            Duration::from_millis(exp_ms)
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(10), true)
    }
}
