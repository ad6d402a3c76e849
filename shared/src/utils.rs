use sha2::{Digest, Sha256};
use std::time::Duration;

/// Stable, non-reversible reference to a username for log lines.
pub fn user_fingerprint(username: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Time left before a Lambda deadline (epoch millis), minus `buffer`.
pub fn remaining_budget(deadline_ms: u64, now_ms: u64, buffer: Duration) -> Duration {
    Duration::from_millis(deadline_ms.saturating_sub(now_ms)).saturating_sub(buffer)
}

/// Get current Unix timestamp in milliseconds
pub fn current_timestamp_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_fingerprint() {
        let first = user_fingerprint("alice");
        assert_eq!(first.len(), 16);
        assert_eq!(first, user_fingerprint("alice"));
        assert_ne!(first, user_fingerprint("bob"));
        assert!(!first.contains("alice"));
    }

    #[test]
    fn test_remaining_budget() {
        assert_eq!(remaining_budget(10_000, 5_000, Duration::from_millis(250)), Duration::from_millis(4_750));
        assert_eq!(remaining_budget(5_000, 6_000, Duration::from_millis(250)), Duration::ZERO);
        assert_eq!(remaining_budget(5_100, 5_000, Duration::from_millis(250)), Duration::ZERO);
    }
}
