//! Token and TTL based refresh lock over a shared key-value backend.
//!
//! A lock is a record `token|timestamp_ms` stored under the lock key. Only the
//! first write of a record relies on the backend (atomic create-if-absent);
//! everything after that is a sequence of plain reads, writes and deletes, so
//! a stale lock may briefly be claimed by two owners. The window is bounded by
//! the lock TTL. Records are also written with a backend expiry of twice the
//! lock TTL, so abandoned locks are eventually removed by the backend itself.

use std::time::Duration;

use crate::error::CacheError;
use crate::stores::kv::KvBackend;
use crate::utils::{duration_ms, now_ms};

const SEPARATOR: char = '|';

/// How many create attempts one acquisition may make after clearing a dead record.
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// Lock records expire in the backend after this many lock TTLs, so a record
/// left by a crashed owner does not outlive the lock by much.
const RECORD_TTL_FACTOR: u32 = 2;

/// Prefix under which lock records live next to the cached values.
pub(crate) const LOCK_KEY_PREFIX: &str = "lock:";

/// A decoded lock record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub token: String,
    pub timestamp: i64,
}

impl LockRecord {
    pub fn new(token: impl Into<String>, timestamp: i64) -> Self {
        LockRecord {
            token: token.into(),
            timestamp,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{}{}{}", self.token, SEPARATOR, self.timestamp).into_bytes()
    }

    /// Parse a stored record. Anything other than exactly `token|integer` is malformed.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let mut parts = text.split(SEPARATOR);
        let (token, timestamp) = match (parts.next(), parts.next(), parts.next()) {
            (Some(token), Some(timestamp), None) => (token, timestamp),
            _ => return None,
        };
        let timestamp = timestamp.parse().ok()?;
        Some(LockRecord::new(token, timestamp))
    }

    /// Whether the record is younger than `ttl` at `now_ms`.
    pub fn is_live(&self, ttl: Duration, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) < duration_ms(ttl)
    }
}

fn record_ttl(ttl: Duration) -> Option<Duration> {
    Some(ttl.saturating_mul(RECORD_TTL_FACTOR))
}

fn validate_token(key: &str, token: &str) -> Result<(), CacheError> {
    if token.is_empty() {
        return Err(CacheError::lock(key, "lock token must not be empty"));
    }
    if token.contains(SEPARATOR) {
        return Err(CacheError::lock(
            key,
            format!("lock token must not contain '{}'", SEPARATOR),
        ));
    }
    Ok(())
}

/// Try to take the lock stored at `lock_key` for `token`.
pub(crate) async fn try_acquire<B>(
    backend: &B,
    lock_key: &str,
    token: &str,
    ttl: Duration,
) -> Result<bool, CacheError>
where
    B: KvBackend + ?Sized,
{
    validate_token(lock_key, token)?;
    let record_ttl = record_ttl(ttl);

    for _ in 0..MAX_ACQUIRE_ATTEMPTS {
        let now = now_ms();
        let record = LockRecord::new(token, now);

        if backend.create(lock_key, record.encode(), record_ttl).await? {
            return Ok(true);
        }

        let Some(stored) = backend.get(lock_key).await? else {
            // Released between our create and our read.
            continue;
        };

        match LockRecord::decode(&stored) {
            None => {
                tracing::warn!(
                    key = lock_key,
                    tier = backend.name(),
                    "Malformed refresh lock record, deleting"
                );
                backend.delete(lock_key).await?;
            }
            Some(existing) if existing.token == token => {
                backend.put(lock_key, record.encode(), record_ttl).await?;
                return Ok(true);
            }
            Some(existing) if existing.is_live(ttl, now) => {
                return Ok(false);
            }
            Some(existing) => {
                tracing::debug!(
                    key = lock_key,
                    owner = %existing.token,
                    age_ms = now.saturating_sub(existing.timestamp),
                    "Taking over abandoned refresh lock"
                );
                backend.delete(lock_key).await?;
            }
        }
    }

    tracing::debug!(
        key = lock_key,
        "Gave up acquiring refresh lock after repeated contention"
    );
    Ok(false)
}

/// Release the lock stored at `lock_key` if `token` owns it.
pub(crate) async fn release<B>(backend: &B, lock_key: &str, token: &str) -> Result<(), CacheError>
where
    B: KvBackend + ?Sized,
{
    let Some(stored) = backend.get(lock_key).await? else {
        return Ok(());
    };

    match LockRecord::decode(&stored) {
        Some(existing) if existing.token != token => Ok(()),
        Some(_) => backend.delete(lock_key).await,
        None => {
            tracing::warn!(
                key = lock_key,
                tier = backend.name(),
                "Malformed refresh lock record on release, deleting"
            );
            backend.delete(lock_key).await
        }
    }
}
