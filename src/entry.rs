use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::{duration_ms, now_ms};

/// A cache entry containing a value and the time it was computed.
///
/// Stale-while-revalidate stores hold `Entry<V>`; freshness is decided at read
/// time from `created_at` and the caller's freshness window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<V> {
    /// The cached value.
    pub value: V,

    /// Unix timestamp in milliseconds at which the value was computed.
    pub created_at: i64,
}

impl<V> Entry<V> {
    /// Create an entry stamped with the current time.
    pub fn new(value: V) -> Self {
        Entry {
            value,
            created_at: now_ms(),
        }
    }

    /// Create an entry with an explicit creation timestamp.
    pub fn with_created_at(value: V, created_at: i64) -> Self {
        Entry { value, created_at }
    }

    /// Age of the entry in milliseconds. Entries stamped in the future have age zero.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.created_at).max(0)
    }

    /// Check if the entry is still within `freshness` of its creation.
    pub fn is_fresh(&self, freshness: Duration, now_ms: i64) -> bool {
        self.created_at.saturating_add(duration_ms(freshness)) >= now_ms
    }

    /// Check if the entry is past its freshness window.
    pub fn is_stale(&self, freshness: Duration, now_ms: i64) -> bool {
        !self.is_fresh(freshness, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freshness_window() {
        let now = now_ms();
        let entry = Entry::with_created_at("v", now - 10_000);

        assert!(entry.is_stale(Duration::from_secs(5), now));
        assert!(entry.is_fresh(Duration::from_secs(60), now));
        assert_eq!(entry.age_ms(now), 10_000);
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = now_ms();
        let entry = Entry::with_created_at(1u32, now + 5_000);

        assert!(entry.is_fresh(Duration::ZERO, now));
        assert_eq!(entry.age_ms(now), 0);
    }

    #[test]
    fn test_serde_shape() {
        let entry = Entry::with_created_at("hello".to_string(), 42);
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"value":"hello","created_at":42}"#);

        let back: Entry<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
