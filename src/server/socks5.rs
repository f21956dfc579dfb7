//! SOCKS5 proxy server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::common::{format_bytes, relay, Stream};
use crate::error::{Error, Result};
use crate::outbound::Dialer;
use crate::protocol::socks5;

use super::{is_transient_accept_error, LocalCipher};

pub struct Socks5Server {
    dialer: Arc<dyn Dialer>,
    cipher: LocalCipher,
}

impl Socks5Server {
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
                    warn!("SOCKS5 accept transient error: {}", e);
                    continue;
                }
                Err(e) => {
                    error!("SOCKS5 accept failed: {}", e);
                    return Err(e.into());
                }
            };
            let _ = conn.set_nodelay(true);

            let stream = match self.cipher.wrap(conn) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("SOCKS5 cipher setup failed: {}", e);
                    continue;
                }
            };

            let dialer = Arc::clone(&self.dialer);
            tokio::spawn(async move {
                if let Err(e) = handle(stream, dialer, peer).await {
                    warn!("SOCKS5 connection from {} failed: {}", peer, e);
                }
            });
        }
    }
}

async fn handle(mut stream: Stream, dialer: Arc<dyn Dialer>, peer: SocketAddr) -> Result<()> {
    socks5::accept_greeting(&mut stream).await?;
    let (cmd, dest) = socks5::read_request(&mut stream).await?;

    if cmd != socks5::CMD_CONNECT {
        stream
            .write_all(&socks5::reply(socks5::REP_CMD_NOT_SUPPORTED))
            .await?;
        return Err(Error::UnsupportedCommand(cmd));
    }

    let target = dest.to_string();
    let remote = match dialer.connect(&target).await {
        Ok(remote) => remote,
        Err(e) => {
            stream
                .write_all(&socks5::reply(socks5::REP_GENERAL_FAILURE))
                .await?;
            return Err(e);
        }
    };

    stream.write_all(&socks5::reply(socks5::REP_SUCCESS)).await?;
    stream.flush().await?;

    info!("SOCKS5 {} -> {}", peer, target);
    let (up, down) = relay(stream, remote).await;
    info!(
        "SOCKS5 closed {} -> {} (↑{} ↓{})",
        peer,
        target,
        format_bytes(up),
        format_bytes(down)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DnsCache, IntoStream};
    use crate::crypto::CipherStream;
    use crate::outbound::{LoadBalancer, UpstreamConnector};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn spawn_server(cipher: LocalCipher) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dialer = Arc::new(UpstreamConnector::new(
            LoadBalancer::new(Vec::new()),
            DnsCache::new(Duration::from_secs(60)),
        ));
        let server = Socks5Server::new(dialer).with_cipher(cipher);
        tokio::spawn(server.run(listener));
        addr
    }

    async fn spawn_echo() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut conn, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match conn.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if conn.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    fn connect_request(dest: SocketAddr) -> Vec<u8> {
        let ip = match dest {
            SocketAddr::V4(v4) => v4.ip().octets(),
            _ => panic!("ipv4 test destinations only"),
        };
        let mut req = vec![0x05, 0x01, 0x00, 0x01];
        req.extend_from_slice(&ip);
        req.extend_from_slice(&dest.port().to_be_bytes());
        req
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_port_reports_general_failure() {
        let server = spawn_server(LocalCipher::default()).await;

        // Bind-then-drop to obtain a closed destination port.
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let mut client = TcpStream::connect(server).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut selection = [0u8; 2];
        client.read_exact(&mut selection).await.unwrap();
        assert_eq!(selection, [0x05, 0x00]);

        client.write_all(&connect_request(dead_addr)).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0x22, 0x22]);
    }

    #[tokio::test]
    async fn test_connect_and_relay() {
        let server = spawn_server(LocalCipher::default()).await;
        let echo = spawn_echo().await;

        let mut client = TcpStream::connect(server).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut selection = [0u8; 2];
        client.read_exact(&mut selection).await.unwrap();

        client.write_all(&connect_request(echo)).await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0x22, 0x22]);

        client.write_all(b"through the tunnel").await.unwrap();
        let mut buf = [0u8; 18];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"through the tunnel");
    }

    #[tokio::test]
    async fn test_unsupported_command_is_rejected() {
        let server = spawn_server(LocalCipher::default()).await;

        let mut client = TcpStream::connect(server).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut selection = [0u8; 2];
        client.read_exact(&mut selection).await.unwrap();

        // BIND request
        client
            .write_all(&[0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
            .await
            .unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], 0x07);
    }

    #[tokio::test]
    async fn test_handshake_through_local_cipher() {
        let server = spawn_server(LocalCipher::new("rc4", "listener-pw")).await;
        let echo = spawn_echo().await;

        let conn = TcpStream::connect(server).await.unwrap();
        let mut client =
            CipherStream::new(conn.into_stream(), "rc4", b"listener-pw").unwrap();

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        client.flush().await.unwrap();
        let mut selection = [0u8; 2];
        client.read_exact(&mut selection).await.unwrap();
        assert_eq!(selection, [0x05, 0x00]);

        client.write_all(&connect_request(echo)).await.unwrap();
        client.flush().await.unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], 0x00);

        client.write_all(b"ciphered").await.unwrap();
        client.flush().await.unwrap();
        let mut buf = [0u8; 8];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ciphered");
    }
}
