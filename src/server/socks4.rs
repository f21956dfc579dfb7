//! SOCKS4 proxy server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::common::{format_bytes, relay, Stream};
use crate::error::{Error, Result};
use crate::outbound::Dialer;
use crate::protocol::socks4;

use super::{is_transient_accept_error, LocalCipher};

pub struct Socks4Server {
    dialer: Arc<dyn Dialer>,
    cipher: LocalCipher,
}

impl Socks4Server {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            cipher: LocalCipher::default(),
        }
    }

    pub fn with_cipher(mut self, cipher: LocalCipher) -> Self {
        self.cipher = cipher;
        self
    }

    /// Accept loop. Returns only on a non-transient accept error.
    pub async fn run(self, listener: TcpListener) -> Result<()> {
        loop {
            let (conn, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if is_transient_accept_error(&e) => {
                    warn!("SOCKS4 accept transient error: {}", e);
                    continue;
                }
                Err(e) => {
                    error!("SOCKS4 accept failed: {}", e);
                    return Err(e.into());
                }
            };
            let _ = conn.set_nodelay(true);

            let stream = match self.cipher.wrap(conn) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("SOCKS4 cipher setup failed: {}", e);
                    continue;
                }
            };

            let dialer = Arc::clone(&self.dialer);
            tokio::spawn(async move {
                if let Err(e) = handle(stream, dialer, peer).await {
                    warn!("SOCKS4 connection from {} failed: {}", peer, e);
                }
            });
        }
    }
}

async fn handle(mut stream: Stream, dialer: Arc<dyn Dialer>, peer: SocketAddr) -> Result<()> {
    let (cmd, dest) = socks4::read_request(&mut stream).await?;

    if cmd != socks4::CMD_CONNECT {
        stream
            .write_all(&socks4::reply(socks4::STATUS_REJECTED))
            .await?;
        return Err(Error::UnsupportedCommand(cmd));
    }

    let target = dest.to_string();
    let remote = match dialer.connect(&target).await {
        Ok(remote) => remote,
        Err(e) => {
            stream
                .write_all(&socks4::reply(socks4::STATUS_CONNECT_FAILED))
                .await?;
            return Err(e);
        }
    };

    stream
        .write_all(&socks4::reply(socks4::STATUS_GRANTED))
        .await?;
    stream.flush().await?;

    info!("SOCKS4 {} -> {}", peer, target);
    let (up, down) = relay(stream, remote).await;
    info!(
        "SOCKS4 closed {} -> {} (↑{} ↓{})",
        peer,
        target,
        format_bytes(up),
        format_bytes(down)
    );
    Ok(())
}
