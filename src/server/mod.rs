//! Protocol servers
//!
//! Each server owns one TCP listener, accepts in a loop, and spawns an
//! independent task per connection. Transient accept errors are retried;
//! anything else terminates that listener only. An optional per-listener
//! cipher decorates every accepted connection before the handshake.

pub mod http;
pub mod socks4;
pub mod socks5;

pub use http::HttpServer;
pub use socks4::Socks4Server;
pub use socks5::Socks5Server;

use std::io;

use tokio::net::TcpStream;

use crate::common::{IntoStream, Stream};
use crate::crypto::CipherStream;
use crate::error::Result;

/// Optional stream cipher applied to inbound connections of one listener.
#[derive(Debug, Clone, Default)]
pub struct LocalCipher {
    pub method: String,
    pub password: String,
}

impl LocalCipher {
    pub fn new(method: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            password: password.into(),
        }
    }

    /// Decorate an accepted connection. With an empty method this is the
    /// pass-through wrapper.
    pub(crate) fn wrap(&self, conn: TcpStream) -> Result<Stream> {
        let stream = CipherStream::new(conn.into_stream(), &self.method, self.password.as_bytes())?;
        Ok(Box::new(stream))
    }
}

/// Accept errors that the listen loop retries instead of propagating.
pub(crate) fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
