//! Protocol codecs
//!
//! Wire-level request/reply framing for each supported proxy protocol,
//! split into a client role (compose and drive an outgoing handshake) and a
//! server role (parse an inbound handshake and emit the matching reply
//! bytes). Codecs operate on any duplex stream and never dial or relay
//! themselves; the servers and the upstream connector own that.

pub mod shadowsocks;
pub mod socks4;
pub mod socks5;
