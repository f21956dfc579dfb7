//! Address type for network connections

use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};

/// Maximum domain name length that fits the one-byte length field used by
/// the SOCKS5 and shadowsocks framings.
const MAX_DOMAIN_LEN: usize = 255;

/// Network address representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// IP socket address (IP + port)
    Socket(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl Address {
    /// Create from domain and port
    pub fn domain(domain: impl Into<String>, port: u16) -> Self {
        Address::Domain(domain.into(), port)
    }

    /// Create from IP and port
    pub fn ip_port(ip: IpAddr, port: u16) -> Self {
        Address::Socket(SocketAddr::new(ip, port))
    }

    /// Get the port
    pub fn port(&self) -> u16 {
        match self {
            Address::Socket(addr) => addr.port(),
            Address::Domain(_, port) => *port,
        }
    }

    /// Get the host part as string
    pub fn host(&self) -> String {
        match self {
            Address::Socket(addr) => addr.ip().to_string(),
            Address::Domain(domain, _) => domain.clone(),
        }
    }

    /// Check if this is a domain address
    pub fn is_domain(&self) -> bool {
        matches!(self, Address::Domain(_, _))
    }

    /// Get domain if this is a domain address
    pub fn as_domain(&self) -> Option<(&str, u16)> {
        match self {
            Address::Domain(domain, port) => Some((domain, *port)),
            Address::Socket(_) => None,
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Socket(addr) => write!(f, "{}", addr),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Socket(addr)
    }
}

impl From<(String, u16)> for Address {
    fn from((domain, port): (String, u16)) -> Self {
        Address::Domain(domain, port)
    }
}

impl From<(&str, u16)> for Address {
    fn from((domain, port): (&str, u16)) -> Self {
        Address::Domain(domain.to_string(), port)
    }
}

/// Parse a `"host:port"` string into an [`Address`].
///
/// The host is classified as an IP literal when it parses as one (IPv6
/// literals may be bracketed), otherwise as a domain name. The port must be
/// a decimal in `1..=65535`; a domain must fit the one-byte length field of
/// the SOCKS5/shadowsocks framings.
pub fn parse_address(s: &str) -> Result<Address> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidAddress(format!("missing port in {:?}", s)))?;

    let port: u16 = port
        .parse()
        .map_err(|_| Error::InvalidAddress(format!("invalid port in {:?}", s)))?;
    if port == 0 {
        return Err(Error::InvalidAddress(format!("port out of range in {:?}", s)));
    }

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(Error::InvalidAddress(format!("empty host in {:?}", s)));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(Address::Socket(SocketAddr::new(ip, port)));
    }

    if host.len() > MAX_DOMAIN_LEN {
        return Err(Error::InvalidAddress(format!(
            "domain name too long ({} bytes)",
            host.len()
        )));
    }
    Ok(Address::Domain(host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let addr = parse_address("127.0.0.1:8080").unwrap();
        assert_eq!(addr, Address::Socket("127.0.0.1:8080".parse().unwrap()));
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_parse_ipv6_bracketed() {
        let addr = parse_address("[::1]:443").unwrap();
        match addr {
            Address::Socket(s) => {
                assert!(s.ip().is_loopback());
                assert_eq!(s.port(), 443);
            }
            _ => panic!("expected socket address"),
        }
    }

    #[test]
    fn test_parse_domain() {
        let addr = parse_address("example.com:80").unwrap();
        assert_eq!(addr, Address::Domain("example.com".to_string(), 80));
        assert!(addr.is_domain());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_address("example.com").is_err());
        assert!(parse_address(":80").is_err());
        assert!(parse_address("example.com:http").is_err());
        assert!(parse_address("example.com:0").is_err());
        assert!(parse_address("example.com:65536").is_err());
    }

    #[test]
    fn test_parse_rejects_overlong_domain() {
        let long = format!("{}:80", "a".repeat(256));
        assert!(parse_address(&long).is_err());
        let ok = format!("{}:80", "a".repeat(255));
        assert!(parse_address(&ok).is_ok());
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["127.0.0.1:8080", "example.com:80", "[::1]:443"] {
            let addr = parse_address(s).unwrap();
            let again = parse_address(&addr.to_string()).unwrap();
            assert_eq!(addr, again);
        }
    }
}
