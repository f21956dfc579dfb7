//! Outbound connection establishment
//!
//! The [`Dialer`] capability is the single seam between the protocol servers
//! and everything behind them: load balancing across upstream proxies,
//! cipher decoration, upstream handshakes and DNS caching all live behind
//! `connect(address)`, so servers never know how a destination is reached.

mod balancer;

pub use balancer::{LoadBalancer, UpstreamDef, UpstreamKind};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::common::{parse_address, Address, DnsCache, IntoStream, Stream};
use crate::crypto::CipherStream;
use crate::error::Result;
use crate::protocol::{shadowsocks, socks5};

/// Capability to establish a duplex stream to a `"host:port"` destination.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Stream>;
}

/// The production [`Dialer`]: picks an upstream definition per connection
/// and either chains through the corresponding proxy protocol or connects
/// directly, consulting the DNS cache for domain destinations.
pub struct UpstreamConnector {
    balancer: LoadBalancer,
    dns_cache: DnsCache,
}

impl UpstreamConnector {
    pub fn new(balancer: LoadBalancer, dns_cache: DnsCache) -> Self {
        Self { balancer, dns_cache }
    }

    /// Chain through an upstream proxy: TCP, cipher decoration, then the
    /// protocol's client handshake. Failures drop every layer opened so far.
    async fn connect_via(&self, upstream: &UpstreamDef, address: &str) -> Result<Stream> {
        let dest = parse_address(address)?;

        debug!(
            "connecting to {} via {:?} upstream {}",
            address, upstream.kind, upstream.address
        );
        let tcp = TcpStream::connect(&upstream.address).await?;
        tcp.set_nodelay(true)?;

        let mut stream: Stream = Box::new(CipherStream::new(
            tcp.into_stream(),
            &upstream.method,
            upstream.password.as_bytes(),
        )?);

        match upstream.kind {
            UpstreamKind::Socks5 => socks5::connect(&mut stream, &dest).await?,
            UpstreamKind::Shadowsocks => shadowsocks::connect(&mut stream, &dest).await?,
            UpstreamKind::Direct => unreachable!("direct upstream takes the direct path"),
        }

        Ok(stream)
    }

    /// Connect straight to the destination. IP literals bypass the DNS
    /// cache; a successful uncached domain dial records the peer IP.
    async fn connect_direct(&self, address: &str) -> Result<Stream> {
        let dest = parse_address(address)?;

        let tcp = match &dest {
            Address::Socket(socket_addr) => TcpStream::connect(socket_addr).await?,
            Address::Domain(domain, port) => match self.dns_cache.get(domain) {
                Some(ip) => {
                    debug!("dns cache hit for {} -> {}", domain, ip);
                    TcpStream::connect((ip, *port)).await?
                }
                None => {
                    let tcp = TcpStream::connect((domain.as_str(), *port)).await?;
                    self.dns_cache.set(domain, tcp.peer_addr()?.ip());
                    tcp
                }
            },
        };

        tcp.set_nodelay(true)?;
        Ok(tcp.into_stream())
    }
}

#[async_trait]
impl Dialer for UpstreamConnector {
    async fn connect(&self, address: &str) -> Result<Stream> {
        let upstream = self.balancer.next();
        if upstream.kind != UpstreamKind::Direct && !upstream.address.is_empty() {
            self.connect_via(upstream, address).await
        } else {
            self.connect_direct(address).await
        }
    }
}
