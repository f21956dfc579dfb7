//! SOCKS4 protocol codec (CONNECT only)
//!
//! SOCKS4 carries raw IPv4 addresses only; that is a protocol limitation,
//! not a bug. The user-id field is read and discarded.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::common::Address;
use crate::error::{Error, Result};

pub const VERSION: u8 = 0x04;

pub const CMD_CONNECT: u8 = 0x01;

pub const STATUS_GRANTED: u8 = 0x5a;
pub const STATUS_REJECTED: u8 = 0x5b;
pub const STATUS_CONNECT_FAILED: u8 = 0x5c;

// ============================================================================
// Server role
// ============================================================================

/// Read a request and extract `(command, destination)`.
///
/// The fixed 8-byte header is `[ver, cmd, port, ip4]`. When it does not end
/// on a NUL, the user-id tail is consumed byte by byte until a NUL
/// terminator or EOF.
pub async fn read_request<S>(stream: &mut S) -> Result<(u8, Address)>
where
    S: AsyncRead + Unpin,
{
    let mut head = [0u8; 8];
    stream.read_exact(&mut head).await?;
    if head[0] != VERSION {
        return Err(Error::UnsupportedVersion(head[0]));
    }

    let cmd = head[1];
    let port = u16::from_be_bytes([head[2], head[3]]);
    let ip = std::net::Ipv4Addr::new(head[4], head[5], head[6], head[7]);

    if head[7] != 0 {
        loop {
            let mut byte = [0u8; 1];
            match stream.read(&mut byte).await? {
                0 => break,
                _ if byte[0] == 0 => break,
                _ => continue,
            }
        }
    }

    Ok((cmd, Address::ip_port(ip.into(), port)))
}

/// The 8-byte reply frame; the version byte of a reply is zero.
pub fn reply(status: u8) -> [u8; 8] {
    [0x00, status, 0, 0, 0, 0, 0, 0]
}

// ============================================================================
// Client role
// ============================================================================

/// Build a CONNECT request with an empty user-id. Only IPv4 socket
/// destinations can be encoded.
pub fn build_request(dest: &Address) -> Result<Vec<u8>> {
    let v4 = match dest {
        Address::Socket(SocketAddr::V4(v4)) => v4,
        _ => return Err(Error::UnsupportedAddressFamily),
    };

    let mut req = Vec::with_capacity(9);
    req.push(VERSION);
    req.push(CMD_CONNECT);
    req.extend_from_slice(&v4.port().to_be_bytes());
    req.extend_from_slice(&v4.ip().octets());
    req.push(0x00);
    Ok(req)
}
