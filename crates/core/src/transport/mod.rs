//! Network transports.
//!
//! - **UDP** ([`udp`]): carries RTP media packets from a single connected
//!   socket to the configured destination.
//!
//! - **HTTP** ([`http`]): axum router serving the session description,
//!   driven by [`crate::server::SdpServer`].

pub mod http;
pub mod udp;

pub use udp::UdpSink;
