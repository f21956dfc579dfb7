//! socksd - a local multi-protocol proxy daemon
//!
//! # Architecture
//!
//! ```text
//! SOCKS4 / SOCKS5 / HTTP server
//!         │  (handshake → destination)
//!         ▼
//!       Dialer ──► UpstreamConnector
//!                    ├─ LoadBalancer (round-robin upstream pick)
//!                    ├─ direct: DnsCache + TCP dial
//!                    └─ proxy:  TCP dial → CipherStream → SOCKS5/shadowsocks
//!         │                                client handshake
//!         ▼
//!      Relay loop (bidirectional copy until either side ends)
//! ```
//!
//! ## Core principles
//!
//! - Every layer operates on the boxed duplex [`common::Stream`]; decorators
//!   (cipher, protocol clients) nest by wrapping one stream into another.
//! - Servers never know whether a destination is reached directly or through
//!   an encrypted upstream chain; that knowledge lives behind
//!   [`outbound::Dialer`].
//! - One task per connection; the only shared mutable state is the load
//!   balancer's rotation index and the DNS cache map.
//!
//! ## Module structure
//!
//! ```text
//! src/
//! ├── common/    # Address, Stream, DnsCache, relay loop
//! ├── crypto/    # stream-cipher decorator (rc4, des, chacha20)
//! ├── protocol/  # SOCKS4, SOCKS5, shadowsocks codecs
//! ├── outbound/  # Dialer, UpstreamConnector, LoadBalancer
//! └── server/    # SOCKS4, SOCKS5, HTTP listeners
//! ```

pub mod common;
pub mod error;

pub mod crypto;
pub mod outbound;
pub mod protocol;
pub mod server;

pub mod config;

// Re-exports for convenience
pub use common::{parse_address, Address, DnsCache, Stream};
pub use config::Config;
pub use error::{Error, Result};
pub use outbound::{Dialer, LoadBalancer, UpstreamConnector};
