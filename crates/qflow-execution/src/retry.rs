//! Retry budget accounting: business and infrastructure faults retry
//! independently, so a flaky node never costs a step one of its declared
//! business attempts.

use std::time::Duration;

use qflow_flow::RetryPolicy;
use rand::Rng;

use crate::attempt::{FaultKind, StepAttempt};

/// Count how many of `attempts` were business failures versus
/// infrastructure faults. A step's `RetryPolicy::max_attempts` budget only
/// ever counts against the business count.
#[must_use]
pub fn business_attempt_count(attempts: &[StepAttempt]) -> u32 {
    attempts
        .iter()
        .filter(|a| a.fault != Some(FaultKind::Infrastructure))
        .count() as u32
}

/// Whether another attempt may be dispatched for a step whose last attempt
/// failed, given its declared retry policy.
#[must_use]
pub fn should_retry(attempts: &[StepAttempt], policy: &RetryPolicy) -> bool {
    let Some(last) = attempts.last() else {
        return true;
    };
    if !last.is_failure() {
        return false;
    }

    match last.fault {
        // Infrastructure faults always get another try: they never consume
        // the business budget in the first place.
        Some(FaultKind::Infrastructure) => true,
        _ => business_attempt_count(attempts) < policy.max_attempts,
    }
}

/// Exponential backoff with fractional jitter: `base * 2^(n-1)`, adjusted
/// by a uniform random factor in `[1 - jitter, 1 + jitter]`.
#[must_use]
pub fn backoff_delay(policy: &RetryPolicy, attempt_number: u32) -> Duration {
    let exponent = attempt_number.saturating_sub(1).min(16);
    let base = policy.backoff_base.as_secs_f64() * 2f64.powi(exponent as i32);
    let jitter_factor = rand::thread_rng().gen_range(1.0 - policy.backoff_jitter..=1.0 + policy.backoff_jitter);
    Duration::from_secs_f64((base * jitter_factor).max(0.0))
}
