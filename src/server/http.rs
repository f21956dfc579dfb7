//! HTTP proxy server
//!
//! CONNECT requests become raw tunnels through the shared dialer; ordinary
//! absolute-form requests are rewritten to origin form and forwarded over
//! the same dialer, then the response bytes are relayed back.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::common::{format_bytes, relay, CombinedStream, IntoStream, Stream};
use crate::error::{Error, Result};
use crate::outbound::Dialer;

use super::{is_transient_accept_error, LocalCipher};

pub struct HttpServer {
    dialer: Arc<dyn Dialer>,
    cipher: LocalCipher,
}

impl HttpServer {
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
                    warn!("HTTP accept transient error: {}", e);
                    continue;
                }
                Err(e) => {
                    error!("HTTP accept failed: {}", e);
                    return Err(e.into());
                }
            };
            let _ = conn.set_nodelay(true);

            let stream = match self.cipher.wrap(conn) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("HTTP cipher setup failed: {}", e);
                    continue;
                }
            };

            let dialer = Arc::clone(&self.dialer);
            tokio::spawn(async move {
                if let Err(e) = handle(stream, dialer, peer).await {
                    warn!("HTTP connection from {} failed: {}", peer, e);
                }
            });
        }
    }
}

async fn handle(stream: Stream, dialer: Arc<dyn Dialer>, peer: SocketAddr) -> Result<()> {
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
        return Err(Error::InvalidProtocol("empty request".into()));
    }
    let parts: Vec<&str> = request_line.trim().split_whitespace().collect();
    if parts.len() < 3 {
        return Err(Error::InvalidProtocol(format!(
            "malformed request line {:?}",
            request_line.trim()
        )));
    }
    let (method, target, version) = (parts[0].to_string(), parts[1].to_string(), parts[2].to_string());

    let mut headers: Vec<(String, String)> = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    if method.eq_ignore_ascii_case("CONNECT") {
        let target = ensure_port(&target, 80);
        let remote = match dialer.connect(&target).await {
            Ok(remote) => remote,
            Err(e) => {
                writer
                    .write_all(format!("HTTP/1.0 500 connect to {} failed\r\n\r\n", target).as_bytes())
                    .await?;
                return Err(e);
            }
        };

        writer
            .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
            .await?;

        info!("HTTP CONNECT {} -> {}", peer, target);
        let client = CombinedStream::new(reader, writer).into_stream();
        let (up, down) = relay(client, remote).await;
        info!(
            "HTTP CONNECT closed {} -> {} (↑{} ↓{})",
            peer,
            target,
            format_bytes(up),
            format_bytes(down)
        );
        return Ok(());
    }

    // Ordinary request: the proxy form carries an absolute URI.
    let url = target.strip_prefix("http://").ok_or_else(|| {
        Error::InvalidProtocol(format!("expected absolute http:// URI, got {:?}", target))
    })?;
    let (host, path) = match url.split_once('/') {
        Some((host, rest)) => (host.to_string(), format!("/{}", rest)),
        None => (url.to_string(), "/".to_string()),
    };
    let target = ensure_port(&host, 80);

    let mut remote = match dialer.connect(&target).await {
        Ok(remote) => remote,
        Err(e) => {
            writer.write_all(b"HTTP/1.0 502 Bad Gateway\r\n\r\n").await?;
            return Err(e);
        }
    };

    // Origin-form request line; the proxy hop headers do not travel
    // upstream, and the connection is pinned to close so the relay ends
    // with the response.
    let mut head = format!("{} {} {}\r\n", method, path, version);
    for (key, value) in &headers {
        match key.to_ascii_lowercase().as_str() {
            "proxy-connection" | "connection" => {}
            _ => {
                head.push_str(key);
                head.push_str(": ");
                head.push_str(value);
                head.push_str("\r\n");
            }
        }
    }
    head.push_str("Connection: close\r\n\r\n");
    remote.write_all(head.as_bytes()).await?;
    remote.flush().await?;

    info!("HTTP {} {} -> {}", method, peer, target);
    let client = CombinedStream::new(reader, writer).into_stream();
    let (up, down) = relay(client, remote).await;
    info!(
        "HTTP closed {} -> {} (↑{} ↓{})",
        peer,
        target,
        format_bytes(up),
        format_bytes(down)
    );
    Ok(())
}

/// Append a default port unless the target already ends in one.
fn ensure_port(target: &str, default_port: u16) -> String {
    if let Some(idx) = target.rfind(':') {
        let tail = &target[idx + 1..];
        if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
            return target.to_string();
        }
    }
    format!("{}:{}", target, default_port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::DnsCache;
    use crate::outbound::{LoadBalancer, UpstreamConnector};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn test_ensure_port() {
        assert_eq!(ensure_port("example.com", 80), "example.com:80");
        assert_eq!(ensure_port("example.com:8080", 80), "example.com:8080");
        assert_eq!(ensure_port("[::1]", 80), "[::1]:80");
        assert_eq!(ensure_port("[::1]:443", 80), "[::1]:443");
    }

    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dialer = Arc::new(UpstreamConnector::new(
            LoadBalancer::new(Vec::new()),
            DnsCache::new(Duration::from_secs(60)),
        ));
        tokio::spawn(HttpServer::new(dialer).run(listener));
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

    async fn read_response_head(client: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            client.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    #[tokio::test]
    async fn test_connect_tunnel() {
        let server = spawn_server().await;
        let echo = spawn_echo().await;

        let mut client = TcpStream::connect(server).await.unwrap();
        client
            .write_all(format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", echo, echo).as_bytes())
            .await
            .unwrap();

        let head = read_response_head(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 200"), "got {:?}", head);

        client.write_all(b"tunneled bytes").await.unwrap();
        let mut buf = [0u8; 14];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"tunneled bytes");
    }

    #[tokio::test]
    async fn test_connect_failure_returns_500() {
        let server = spawn_server().await;

        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);

        let mut client = TcpStream::connect(server).await.unwrap();
        client
            .write_all(format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", dead_addr, dead_addr).as_bytes())
            .await
            .unwrap();

        let head = read_response_head(&mut client).await;
        assert!(head.starts_with("HTTP/1.0 500"), "got {:?}", head);
    }

    #[tokio::test]
    async fn test_plain_request_is_forwarded_origin_form() {
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut conn, _) = origin.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut head = Vec::new();
            while !head.ends_with(b"\r\n\r\n") {
                let n = conn.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let head = String::from_utf8(head).unwrap();
            assert!(head.starts_with("GET /hello HTTP/1.1\r\n"), "got {:?}", head);
            assert!(head.contains("Connection: close"));
            assert!(!head.to_ascii_lowercase().contains("proxy-connection"));

            conn.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nworld")
                .await
                .unwrap();
        });

        let server = spawn_server().await;
        let mut client = TcpStream::connect(server).await.unwrap();
        client
            .write_all(
                format!(
                    "GET http://{}/hello HTTP/1.1\r\nHost: {}\r\nProxy-Connection: keep-alive\r\n\r\n",
                    origin_addr, origin_addr
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"), "got {:?}", response);
        assert!(response.ends_with("world"), "got {:?}", response);
    }

    #[tokio::test]
    async fn test_rejects_relative_target() {
        let server = spawn_server().await;
        let mut client = TcpStream::connect(server).await.unwrap();
        client
            .write_all(b"GET /not-absolute HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        // Malformed proxy request: connection is closed without a tunnel.
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }
}
