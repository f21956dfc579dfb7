//! TTL'd DNS resolution cache
//!
//! Avoids repeated lookups on the connect hot path. The cache is advisory:
//! every caller keeps the unresolved address as a fallback, so a miss only
//! costs latency, never correctness. Expiry is checked at read time; there
//! is no eviction task.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Hostname -> resolved IP cache with per-entry TTL.
///
/// A TTL of zero disables the cache entirely: `get` always misses and `set`
/// is a no-op.
pub struct DnsCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (IpAddr, Instant)>>,
}

impl DnsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a hostname. Expired entries are removed and reported as
    /// absent.
    pub fn get(&self, host: &str) -> Option<IpAddr> {
        if self.ttl.is_zero() {
            return None;
        }
        let mut entries = self.entries.lock().unwrap();
        match entries.get(host) {
            Some((ip, inserted)) if inserted.elapsed() < self.ttl => Some(*ip),
            Some(_) => {
                entries.remove(host);
                None
            }
            None => None,
        }
    }

    /// Record a resolution. Overwrites any previous entry for the host.
    pub fn set(&self, host: &str, ip: IpAddr) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        entries.insert(host.to_string(), (ip, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_set_then_get_within_ttl() {
        let cache = DnsCache::new(Duration::from_secs(60));
        cache.set("example.com", ip("93.184.216.34"));
        assert_eq!(cache.get("example.com"), Some(ip("93.184.216.34")));
    }

    #[test]
    fn test_expiry() {
        let cache = DnsCache::new(Duration::from_millis(10));
        cache.set("example.com", ip("93.184.216.34"));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("example.com"), None);
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = DnsCache::new(Duration::ZERO);
        cache.set("example.com", ip("93.184.216.34"));
        assert_eq!(cache.get("example.com"), None);
    }

    #[test]
    fn test_miss_on_unknown_host() {
        let cache = DnsCache::new(Duration::from_secs(60));
        assert_eq!(cache.get("nope.invalid"), None);
    }

    #[test]
    fn test_overwrite() {
        let cache = DnsCache::new(Duration::from_secs(60));
        cache.set("example.com", ip("93.184.216.34"));
        cache.set("example.com", ip("10.0.0.1"));
        assert_eq!(cache.get("example.com"), Some(ip("10.0.0.1")));
    }
}
