//! Shared utilities for the cache library.

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Length of generated request identifiers.
const REQUEST_ID_LEN: usize = 10;

/// Build a prefixed store key.
///
/// Format: `{prefix}:{key}`, or just `key` when the prefix is empty.
pub fn build_cache_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        return key.to_string();
    }
    format!("{}:{}", prefix, key)
}

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Convert a duration to whole milliseconds, saturating at `i64::MAX`.
pub fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Generate a random alphanumeric request identifier.
///
/// Used both to tell dedup rounds apart and as a refresh lock token, so it
/// must be unique across processes sharing a store.
pub fn request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_cache_key() {
        assert_eq!(build_cache_key("users", "user:123"), "users:user:123");
        assert_eq!(build_cache_key("", "user:123"), "user:123");
    }

    #[test]
    fn test_now_ms_is_positive() {
        let now = now_ms();
        assert!(now > 0);
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_secs(2)), 2_000);
        assert_eq!(duration_ms(Duration::MAX), i64::MAX);
    }

    #[test]
    fn test_request_id_shape() {
        let a = request_id();
        let b = request_id();
        assert_eq!(a.len(), REQUEST_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
