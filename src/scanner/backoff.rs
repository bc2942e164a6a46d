use std::time::Duration;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 10_000;

/// Delay before retrying after failed attempt number `attempt` (1-based).
///
/// | Attempt | Sleep before next attempt |
/// |---------|---------------------------|
/// | 1       | 2 s                       |
/// | 2       | 4 s                       |
/// | 3       | 8 s                       |
/// | 4+      | 10 s (cap)                |
pub fn backoff_delay(attempt: u32) -> Duration {
    let delay_ms = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(32));
    Duration::from_millis(delay_ms.min(MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn caps_at_ten_seconds() {
        assert_eq!(backoff_delay(4), Duration::from_secs(10));
        assert_eq!(backoff_delay(40), Duration::from_secs(10));
    }
}
