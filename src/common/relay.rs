//! Bidirectional relay loop
//!
//! Connects a client stream to a destination stream and copies bytes both
//! ways until one direction ends. The first direction to finish wins the
//! select; dropping the other direction's future releases its halves, so
//! both underlying streams are closed exactly once per relay call and any
//! in-flight copy on them is cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::stream::Stream;

/// Relay buffer size per direction (32KB)
const RELAY_BUFFER_SIZE: usize = 32 * 1024;

/// Copy bytes between `client` and `remote` in both directions.
///
/// Returns `(uploaded, downloaded)` byte counts, client perspective.
pub async fn relay(client: Stream, remote: Stream) -> (u64, u64) {
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);

    let uploaded = Arc::new(AtomicU64::new(0));
    let downloaded = Arc::new(AtomicU64::new(0));

    let upload = {
        let total = Arc::clone(&uploaded);
        async move {
            let mut buf = BytesMut::with_capacity(RELAY_BUFFER_SIZE);
            buf.resize(RELAY_BUFFER_SIZE, 0);

            loop {
                let n = match client_read.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => break,
                };
                if remote_write.write_all(&buf[..n]).await.is_err() {
                    break;
                }
                if remote_write.flush().await.is_err() {
                    break;
                }
                total.fetch_add(n as u64, Ordering::Relaxed);
            }

            // Flush what the peer may still want to read before both
            // streams are dropped.
            let _ = remote_write.shutdown().await;
        }
    };

    let download = {
        let total = Arc::clone(&downloaded);
        async move {
            let mut buf = BytesMut::with_capacity(RELAY_BUFFER_SIZE);
            buf.resize(RELAY_BUFFER_SIZE, 0);

            loop {
                let n = match remote_read.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => break,
                };
                if client_write.write_all(&buf[..n]).await.is_err() {
                    break;
                }
                if client_write.flush().await.is_err() {
                    break;
                }
                total.fetch_add(n as u64, Ordering::Relaxed);
            }

            let _ = client_write.shutdown().await;
        }
    };

    tokio::select! {
        _ = upload => {}
        _ = download => {}
    }

    (
        uploaded.load(Ordering::Relaxed),
        downloaded.load(Ordering::Relaxed),
    )
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}
