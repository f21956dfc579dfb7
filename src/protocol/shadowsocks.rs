//! Shadowsocks-style request framing (client role only)
//!
//! A strict subset of the SOCKS5 request: no version byte, no command, and
//! no reply frame. The upstream is trusted to start relaying as soon as it
//! has read the destination. Obfuscation comes from the cipher stream the
//! request travels through, not from the framing itself.

use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::common::Address;
use crate::error::{Error, Result};

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

/// Build the request frame: `[atyp, (len,) addr…, port]`.
pub fn build_request(dest: &Address) -> Result<Vec<u8>> {
    let mut req = Vec::with_capacity(22);
    match dest {
        Address::Socket(SocketAddr::V4(v4)) => {
            req.push(ATYP_IPV4);
            req.extend_from_slice(&v4.ip().octets());
            req.extend_from_slice(&v4.port().to_be_bytes());
        }
        Address::Socket(SocketAddr::V6(v6)) => {
            req.push(ATYP_IPV6);
            req.extend_from_slice(&v6.ip().octets());
            req.extend_from_slice(&v6.port().to_be_bytes());
        }
        Address::Domain(domain, port) => {
            if domain.len() > 255 {
                return Err(Error::InvalidAddress(format!(
                    "domain name too long ({} bytes)",
                    domain.len()
                )));
            }
            req.push(ATYP_DOMAIN);
            req.push(domain.len() as u8);
            req.extend_from_slice(domain.as_bytes());
            req.extend_from_slice(&port.to_be_bytes());
        }
    }
    Ok(req)
}

/// Send the request for `dest`. No reply is expected.
pub async fn connect<S>(stream: &mut S, dest: &Address) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&build_request(dest)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_frame() {
        let req = build_request(&Address::domain("example.com", 80)).unwrap();
        let mut expected = vec![0x03, 11];
        expected.extend_from_slice(b"example.com");
        expected.extend_from_slice(&[0x00, 0x50]);
        assert_eq!(req, expected);
    }

    #[test]
    fn test_ipv4_frame() {
        let req = build_request(&Address::Socket("10.1.2.3:443".parse().unwrap())).unwrap();
        assert_eq!(req, vec![0x01, 10, 1, 2, 3, 0x01, 0xbb]);
    }

    #[test]
    fn test_ipv6_frame() {
        let req = build_request(&Address::Socket("[::1]:53".parse().unwrap())).unwrap();
        let mut expected = vec![0x04];
        expected.extend_from_slice(&[0u8; 15]);
        expected.push(1);
        expected.extend_from_slice(&[0x00, 0x35]);
        assert_eq!(req, expected);
    }
}
