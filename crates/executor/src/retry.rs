use std::time::Duration;

use rand_core::{OsRng, RngCore};

/// Exponential backoff with symmetric random jitter.
///
/// The delay before retrying after attempt `n` (1-based) is
/// `base_delay * multiplier^(n-1)`, scaled by a random factor in
/// `[1 - jitter_ratio, 1 + jitter_ratio]`, and never more than `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the nominal delay used as jitter amplitude. `0.0`
    /// disables jitter.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            multiplier: 2.0,
            jitter_ratio: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Nominal delay for the 1-based `attempt`, before jitter, clamped to
    /// `max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use hookline_executor::RetryPolicy;
    ///
    /// let policy = RetryPolicy {
    ///     base_delay: Duration::from_secs(10),
    ///     ..RetryPolicy::default()
    /// };
    /// assert_eq!(policy.nominal_delay(1), Duration::from_secs(10));
    /// assert_eq!(policy.nominal_delay(3), Duration::from_secs(40));
    /// ```
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Self::clamp(raw, self.max_delay)
    }

    /// Delay for the 1-based `attempt` with random jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, unit_sample())
    }

    /// Delay for `attempt` using `sample` in `[0, 1)` as the jitter draw.
    /// `0.5` yields the nominal delay.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let nominal = self.nominal_delay(attempt).as_secs_f64();
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        let factor = 1.0 + ratio * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
        Self::clamp(nominal * factor, self.max_delay)
    }

    /// Check the policy for values that would make scheduling meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay.is_zero() {
            return Err("base_delay must be greater than zero".into());
        }
        if self.max_delay < self.base_delay {
            return Err("max_delay must be at least base_delay".into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err("multiplier must be a finite number >= 1.0".into());
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err("jitter_ratio must be between 0.0 and 1.0".into());
        }
        Ok(())
    }

    fn clamp(secs: f64, max: Duration) -> Duration {
        if !secs.is_finite() || secs >= max.as_secs_f64() {
            return max;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Uniform draw in `[0, 1)` from the OS RNG.
fn unit_sample() -> f64 {
    // 53 random mantissa bits.
    #[allow(clippy::cast_precision_loss)]
    let sample = (OsRng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
    sample
}
