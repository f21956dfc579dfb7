//! Core types shared by every layer: addresses, the duplex stream
//! abstraction, the DNS cache and the relay loop.

pub mod address;
pub mod dns;
pub mod relay;
pub mod stream;

pub use address::{parse_address, Address};
pub use dns::DnsCache;
pub use relay::{format_bytes, relay};
pub use stream::{AsyncReadWrite, CombinedStream, IntoStream, Stream};

pub use crate::error::Result;
