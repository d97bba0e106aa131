//! Stream discovery.
//!
//! Receivers such as ffplay or VLC need a session description to make
//! sense of a bare RTP stream. The SDP for the running stream is served
//! over HTTP by [`crate::transport::http`]:
//!
//! | Request | Response |
//! |---------|----------|
//! | `GET`/`HEAD /stream.sdp` | `200 OK`, `Content-Type: application/sdp` |
//! | anything else on `/stream.sdp` | `405 Method Not Allowed` |
//! | any other path | `404 Not Found` |

pub mod sdp;

pub use sdp::{SdpHandle, SessionDescription};

/// Path the session description is served at.
pub const SDP_PATH: &str = "/stream.sdp";

/// Media type of the served description (RFC 8866 §5).
pub const SDP_CONTENT_TYPE: &str = "application/sdp";
