use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Memoization seam for dashboard payloads.
///
/// The aggregator must behave identically (just slower) against a cache
/// that never hits, so implementations are infallible: a broken backend
/// is modeled as [`NoopCache`], not as an error path.
pub trait MetricsCache: Send {
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    fn put(&self, key: &str, value: serde_json::Value, ttl: Duration);
    /// Drop the exact key, or every key under a trailing-`*` prefix.
    /// Returns the number of entries removed; no match is a no-op.
    fn forget(&self, pattern: &str) -> usize;
    fn flush(&self);
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl MetricsCache for MemoryCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(e) if e.expires_at > Instant::now() => Some(e.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.to_string(),
                Entry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    fn forget(&self, pattern: &str) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        if let Some(prefix) = pattern.strip_suffix('*') {
            let before = entries.len();
            entries.retain(|k, _| !k.starts_with(prefix));
            before - entries.len()
        } else if entries.remove(pattern).is_some() {
            1
        } else {
            0
        }
    }

    fn flush(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Always-miss cache for workspaces running with caching disabled.
pub struct NoopCache;

impl MetricsCache for NoopCache {
    fn get(&self, _key: &str) -> Option<serde_json::Value> {
        None
    }
    fn put(&self, _key: &str, _value: serde_json::Value, _ttl: Duration) {}
    fn forget(&self, _pattern: &str) -> usize {
        0
    }
    fn flush(&self) {}
}

/// Cache key for one dashboard payload: `dashboard:{role}:{id?}:{hash}`.
///
/// The filter hash is a digest over `key=value` pairs sorted by key, so
/// callers supplying the same filters in any order share one entry.
pub fn dashboard_key(role: &str, id: Option<&str>, filters: &[(String, String)]) -> String {
    let mut pairs: Vec<String> = filters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();
    let mut hasher = Sha256::new();
    for p in &pairs {
        hasher.update(p.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("dashboard:{}:{}:{}", role, id.unwrap_or(""), hex)
}
