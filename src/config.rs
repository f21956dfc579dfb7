//! Configuration module
//!
//! JSON configuration loaded once at startup. Each `proxies` entry is an
//! independent front: its listeners share one upstream connector, one DNS
//! cache and one load balancer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::outbound::{UpstreamDef, UpstreamKind};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Proxy front configurations
    #[serde(default)]
    pub proxies: Vec<ProxyConfig>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// An example configuration with all three listeners on loopback and a
    /// direct (no upstream) connect path.
    pub fn example() -> Self {
        Config {
            log: LogConfig::default(),
            proxies: vec![ProxyConfig {
                http: Some(ListenerConfig {
                    addr: "127.0.0.1:8080".to_string(),
                    crypto_method: String::new(),
                    crypto_password: String::new(),
                }),
                socks4: Some(ListenerConfig {
                    addr: "127.0.0.1:1084".to_string(),
                    crypto_method: String::new(),
                    crypto_password: String::new(),
                }),
                socks5: Some(ListenerConfig {
                    addr: "127.0.0.1:1080".to_string(),
                    crypto_method: String::new(),
                    crypto_password: String::new(),
                }),
                dns_cache_seconds: default_dns_cache_seconds(),
                upstreams: Vec::new(),
            }],
        }
    }
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One proxy front: up to three listeners sharing a DNS cache and an
/// upstream list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// HTTP proxy listener
    #[serde(default)]
    pub http: Option<ListenerConfig>,

    /// SOCKS4 listener
    #[serde(default)]
    pub socks4: Option<ListenerConfig>,

    /// SOCKS5 listener
    #[serde(default)]
    pub socks5: Option<ListenerConfig>,

    /// DNS cache TTL in seconds; 0 disables caching
    #[serde(default = "default_dns_cache_seconds")]
    pub dns_cache_seconds: u64,

    /// Upstream proxies to rotate across; empty means direct connect
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,
}

fn default_dns_cache_seconds() -> u64 {
    300
}

/// A single listener address with an optional inbound stream cipher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfig {
    /// Listen address, `"host:port"`
    pub addr: String,

    /// Stream cipher applied to inbound connections; empty for plaintext
    #[serde(default)]
    pub crypto_method: String,

    #[serde(default)]
    pub crypto_password: String,
}

/// One upstream proxy definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    /// "socks5", "shadowsocks", or "" / "direct"
    #[serde(default)]
    pub server_type: String,

    /// Upstream proxy address, `"host:port"`
    #[serde(default)]
    pub address: String,

    /// Stream cipher towards the upstream; empty for plaintext
    #[serde(default)]
    pub crypto_method: String,

    #[serde(default)]
    pub password: String,
}

impl UpstreamConfig {
    /// Convert to the immutable runtime definition. Unknown server types
    /// fall back to direct connect.
    pub fn to_def(&self) -> UpstreamDef {
        let kind = match self.server_type.to_lowercase().as_str() {
            "socks5" => UpstreamKind::Socks5,
            "shadowsocks" => UpstreamKind::Shadowsocks,
            _ => UpstreamKind::Direct,
        };
        UpstreamDef {
            kind,
            address: self.address.clone(),
            method: self.crypto_method.clone(),
            password: self.password.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_round_trips() {
        let config = Config::example();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed = Config::from_json(&json).unwrap();
        assert_eq!(parsed.proxies.len(), 1);
        assert!(parsed.proxies[0].socks5.is_some());
        assert_eq!(parsed.proxies[0].dns_cache_seconds, 300);
    }

    #[test]
    fn test_minimal_config() {
        let config = Config::from_json(
            r#"{ "proxies": [ { "socks5": { "addr": "127.0.0.1:1080" } } ] }"#,
        )
        .unwrap();
        let proxy = &config.proxies[0];
        assert!(proxy.http.is_none());
        assert!(proxy.upstreams.is_empty());
        let socks5 = proxy.socks5.as_ref().unwrap();
        assert_eq!(socks5.addr, "127.0.0.1:1080");
        assert!(socks5.crypto_method.is_empty());
    }

    #[test]
    fn test_upstream_kinds() {
        let config = Config::from_json(
            r#"{ "proxies": [ { "upstreams": [
                { "serverType": "socks5", "address": "10.0.0.2:1080",
                  "cryptoMethod": "rc4", "password": "pw" },
                { "serverType": "SHADOWSOCKS", "address": "10.0.0.3:8388" },
                { "serverType": "" }
            ] } ] }"#,
        )
        .unwrap();
        let defs: Vec<_> = config.proxies[0]
            .upstreams
            .iter()
            .map(|u| u.to_def())
            .collect();
        assert_eq!(defs[0].kind, UpstreamKind::Socks5);
        assert_eq!(defs[0].method, "rc4");
        assert_eq!(defs[1].kind, UpstreamKind::Shadowsocks);
        assert_eq!(defs[2].kind, UpstreamKind::Direct);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        assert!(matches!(
            Config::from_json("{ nope"),
            Err(Error::Config(_))
        ));
    }
}
