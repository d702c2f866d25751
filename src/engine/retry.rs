// Retry Policy: classifies handler failures as transient or terminal, and
// computes exponential backoff with jitter.

use rand::Rng;

use crate::engine::registry::HandlerError;

const BASE_DELAY_MS: u64 = 1000;
const CAP_DELAY_MS: u64 = 10_000;
pub const MAX_RETRIES: u32 = 3;

const TRANSIENT_SIGNALS: &[&str] = &[
    "connection reset",
    "connection refused",
    "econnreset",
    "econnrefused",
    "name resolution",
    "nxdomain",
    "eai_again",
    "enotfound",
    "socket hang up",
    "timeout",
    "etimedout",
    "rate limit",
];

const TRANSIENT_STATUS_CODES: &[u16] = &[429, 503, 504];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Transient,
    Terminal,
}

/// Classify a handler error as `transient` (worth retrying) or `terminal`.
/// A status code, when present, is checked against the standard transient
/// HTTP codes; the message is checked case-insensitively against a set of
/// well-known network-transient signals.
pub fn classify(error: &HandlerError) -> Classification {
    if let Some(code) = error.status_code {
        if TRANSIENT_STATUS_CODES.contains(&code) {
            return Classification::Transient;
        }
    }
    let lower = error.message.to_lowercase();
    if TRANSIENT_SIGNALS.iter().any(|signal| lower.contains(signal)) {
        return Classification::Transient;
    }
    Classification::Terminal
}

/// `delay(attempt) = min(base * 2^attempt + jitter, cap)`, jitter in
/// `[-25%, +25%]` of the nominal (pre-jitter) delay. `attempt` is 0-based
/// (the delay before the first retry uses `attempt = 0`).
pub fn delay_ms(attempt: u32) -> u64 {
    delay_ms_with_rng(attempt, &mut rand::thread_rng())
}

fn delay_ms_with_rng(attempt: u32, rng: &mut impl Rng) -> u64 {
    let nominal = (BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(16))).min(CAP_DELAY_MS);
    let jitter_range = nominal as f64 * 0.25;
    let jitter = rng.gen_range(-jitter_range..=jitter_range);
    let with_jitter = (nominal as f64 + jitter).max(0.0) as u64;
    with_jitter.min(CAP_DELAY_MS)
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn classify(&self, error: &HandlerError) -> Classification {
        classify(error)
    }

    pub fn delay(&self, attempt: u32) -> u64 {
        delay_ms(attempt)
    }

    pub fn max_retries(&self) -> u32 {
        MAX_RETRIES
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_transient_network_signals() {
        let err = HandlerError::new("connect ETIMEDOUT 10.0.0.1:443");
        assert_eq!(classify(&err), Classification::Transient);
    }

    #[test]
    fn recognizes_transient_status_codes() {
        let err = HandlerError::with_status("service unavailable", 503);
        assert_eq!(classify(&err), Classification::Transient);
    }

    #[test]
    fn rate_limit_substring_is_transient() {
        let err = HandlerError::new("upstream returned: rate limit exceeded");
        assert_eq!(classify(&err), Classification::Transient);
    }

    #[test]
    fn unauthorized_is_terminal() {
        let err = HandlerError::with_status("invalid api key", 401);
        assert_eq!(classify(&err), Classification::Terminal);
    }

    #[test]
    fn delay_grows_exponentially_and_respects_cap() {
        let mut rng = rand::rngs::mock::StepRng::new(u64::MAX / 2, 0);
        let d0 = delay_ms_with_rng(0, &mut rng);
        let d1 = delay_ms_with_rng(1, &mut rng);
        let d_big = delay_ms_with_rng(10, &mut rng);
        assert!(d0 <= 1250 && d0 >= 750);
        assert!(d1 <= 2500 && d1 >= 1500);
        assert!(d_big <= CAP_DELAY_MS);
    }
}
