//! SOCKS5 protocol codec (RFC 1928, CONNECT only, no authentication)

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Address;
use crate::error::{Error, Result};

pub const VERSION: u8 = 0x05;

const AUTH_NONE: u8 = 0x00;

pub const CMD_CONNECT: u8 = 0x01;

const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

pub const REP_SUCCESS: u8 = 0x00;
pub const REP_GENERAL_FAILURE: u8 = 0x05;
pub const REP_CMD_NOT_SUPPORTED: u8 = 0x07;

// ============================================================================
// Server role
// ============================================================================

/// Run the method-negotiation phase: read the client greeting and answer
/// "no authentication" regardless of the offered method list.
pub async fn accept_greeting<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(Error::UnsupportedVersion(head[0]));
    }

    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;

    stream.write_all(&[VERSION, AUTH_NONE]).await?;
    Ok(())
}

/// Read a request frame and extract `(command, destination)`.
///
/// The address type determines the exact remaining frame length; a stream
/// that ends short of it fails, and an unknown address type is a framing
/// error.
pub async fn read_request<S>(stream: &mut S) -> Result<(u8, Address)>
where
    S: AsyncRead + Unpin,
{
    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(Error::UnsupportedVersion(head[0]));
    }
    let cmd = head[1];

    let destination = match head[3] {
        ATYP_IPV4 => {
            let mut buf = [0u8; 6];
            stream.read_exact(&mut buf).await?;
            let ip = std::net::Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
            let port = u16::from_be_bytes([buf[4], buf[5]]);
            Address::ip_port(ip.into(), port)
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            let mut buf = vec![0u8; len[0] as usize + 2];
            stream.read_exact(&mut buf).await?;
            let (domain, port) = buf.split_at(len[0] as usize);
            let domain = String::from_utf8_lossy(domain).into_owned();
            let port = u16::from_be_bytes([port[0], port[1]]);
            Address::Domain(domain, port)
        }
        ATYP_IPV6 => {
            let mut buf = [0u8; 18];
            stream.read_exact(&mut buf).await?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&buf[..16]);
            let ip = std::net::Ipv6Addr::from(octets);
            let port = u16::from_be_bytes([buf[16], buf[17]]);
            Address::ip_port(ip.into(), port)
        }
        other => {
            return Err(Error::InvalidProtocol(format!(
                "unknown address type {:#04x}",
                other
            )));
        }
    };

    Ok((cmd, destination))
}

/// The 10-byte reply frame. The bound-address fields are stubbed since BIND
/// is unsupported.
pub fn reply(status: u8) -> [u8; 10] {
    [VERSION, status, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0x22, 0x22]
}

// ============================================================================
// Client role
// ============================================================================

/// Build the CONNECT request frame for a destination.
pub fn build_request(dest: &Address) -> Result<Vec<u8>> {
    let mut req = vec![VERSION, CMD_CONNECT, 0x00];
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

/// Drive the full client-side handshake over an established stream and
/// request a tunnel to `dest`.
pub async fn connect<S>(stream: &mut S, dest: &Address) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&[VERSION, 1, AUTH_NONE]).await?;

    let mut selection = [0u8; 2];
    stream.read_exact(&mut selection).await?;
    if selection != [VERSION, AUTH_NONE] {
        return Err(Error::UpstreamHandshake(format!(
            "method selection {:02x?}",
            selection
        )));
    }

    stream.write_all(&build_request(dest)?).await?;

    let mut rep = [0u8; 10];
    stream.read_exact(&mut rep).await?;
    if rep[0] != VERSION {
        return Err(Error::UpstreamHandshake(format!(
            "reply version {:#04x}",
            rep[0]
        )));
    }
    if rep[1] != REP_SUCCESS {
        return Err(Error::UpstreamHandshake(format!(
            "reply status {:#04x}",
            rep[1]
        )));
    }
    Ok(())
}
