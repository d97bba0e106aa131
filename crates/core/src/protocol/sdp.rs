//! SDP (Session Description Protocol) generation (RFC 8866).
//!
//! Produces the body served at `/stream.sdp`:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=<user> <sess-id> <sess-ver> IN IP4 <addr>  ← origin
//! s=<session-name>                              ← session name
//! c=IN IP4 <addr>                               ← stream destination
//! t=0 0                                         ← timing (live stream)
//! a=tool:livertp                                ← sender software
//! a=sendonly                                    ← direction
//! m=video 16384 RTP/AVP 96                      ← media description
//! a=rtpmap:96 H264/90000                        ← codec/clock rate
//! a=fmtp:96 packetization-mode=1                ← codec parameters
//! ```
//!
//! The connection address is the RTP destination itself (often a
//! multicast group), so receivers join the stream rather than contact
//! the sender.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::media::Packetizer;

/// Everything needed to describe the single outgoing video stream.
#[derive(Debug, Clone)]
pub struct SessionDescription {
    /// Origin username (`o=<username> ...`).
    pub username: String,
    /// Origin session id.
    pub session_id: String,
    /// Origin session version; bumped whenever the media section changes.
    pub session_version: u64,
    /// Session name (`s=`).
    pub session_name: String,
    /// RTP destination address.
    pub address: IpAddr,
    /// RTP destination port.
    pub port: u16,
    /// RTP payload type.
    pub payload_type: u8,
    /// Media-level attribute lines from the packetizer.
    pub media_attributes: Vec<String>,
}

impl SessionDescription {
    /// Describe a stream sent to `address:port` by `packetizer`.
    pub fn for_stream(address: IpAddr, port: u16, packetizer: &dyn Packetizer) -> Self {
        Self {
            username: "fpv".to_string(),
            session_id: "0".to_string(),
            session_version: 0,
            session_name: "FPV Feed".to_string(),
            address,
            port,
            payload_type: packetizer.payload_type(),
            media_attributes: packetizer.sdp_attributes(),
        }
    }

    /// Render the description as CRLF-terminated SDP text.
    pub fn render(&self) -> String {
        let family = match self.address {
            IpAddr::V4(_) => "IP4",
            IpAddr::V6(_) => "IP6",
        };

        let mut sdp: Vec<String> = Vec::new();

        sdp.push("v=0".to_string());
        sdp.push(format!(
            "o={} {} {} IN {} {}",
            self.username, self.session_id, self.session_version, family, self.address
        ));
        sdp.push(format!("s={}", self.session_name));
        sdp.push(format!("c=IN {} {}", family, self.address));
        sdp.push("t=0 0".to_string());
        sdp.push("a=tool:livertp".to_string());
        sdp.push("a=sendonly".to_string());
        sdp.push(format!("m=video {} RTP/AVP {}", self.port, self.payload_type));
        sdp.extend(self.media_attributes.iter().cloned());

        format!("{}\r\n", sdp.join("\r\n"))
    }
}

/// Shared, updatable session description.
///
/// The pipeline worker publishes codec parameters once they are known;
/// the HTTP server renders whatever is current at request time.
#[derive(Debug, Clone)]
pub struct SdpHandle {
    inner: Arc<RwLock<SessionDescription>>,
}

impl SdpHandle {
    pub fn new(description: SessionDescription) -> Self {
        Self {
            inner: Arc::new(RwLock::new(description)),
        }
    }

    pub fn render(&self) -> String {
        self.inner.read().render()
    }

    /// Snapshot of the current description.
    pub fn snapshot(&self) -> SessionDescription {
        self.inner.read().clone()
    }

    /// Replace the media attributes, bumping the session version if they
    /// changed.
    pub fn update_media_attributes(&self, attributes: Vec<String>) {
        let mut description = self.inner.write();
        if description.media_attributes == attributes {
            return;
        }
        description.media_attributes = attributes;
        description.session_version += 1;
        tracing::info!(
            version = description.session_version,
            "session description updated"
        );
        tracing::debug!("SDP: {}", description.render().trim_end().replace("\r\n", " | "));
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;
    use crate::media::h264::H264Packetizer;
    use crate::media::rtp::RtpHeader;

    fn packetizer() -> H264Packetizer {
        H264Packetizer::with_header(RtpHeader::new(96, 0x12345678, 0), 1400, 90_000)
    }

    #[test]
    fn generates_h264_sdp() {
        let address = IpAddr::V4(Ipv4Addr::new(224, 0, 190, 128));
        let sdp = SessionDescription::for_stream(address, 16384, &packetizer()).render();

        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("o=fpv 0 0 IN IP4 224.0.190.128\r\n"));
        assert!(sdp.contains("s=FPV Feed\r\n"));
        assert!(sdp.contains("c=IN IP4 224.0.190.128\r\n"));
        assert!(sdp.contains("t=0 0\r\n"));
        assert!(sdp.contains("a=sendonly\r\n"));
        assert!(sdp.contains("m=video 16384 RTP/AVP 96\r\n"));
        assert!(sdp.contains("a=rtpmap:96 H264/90000\r\n"));
        assert!(sdp.contains("a=fmtp:96 packetization-mode=1\r\n"));

        // Session-level attrs precede the media section; rtpmap precedes fmtp.
        let sendonly_idx = sdp.find("a=sendonly").unwrap();
        let m_idx = sdp.find("m=video").unwrap();
        let rtpmap_idx = sdp.find("a=rtpmap").unwrap();
        let fmtp_idx = sdp.find("a=fmtp").unwrap();
        assert!(sendonly_idx < m_idx);
        assert!(m_idx < rtpmap_idx && rtpmap_idx < fmtp_idx);
        assert!(sdp.ends_with("\r\n"));
    }

    #[test]
    fn ipv6_destination_uses_ip6_family() {
        let address = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let sdp = SessionDescription::for_stream(address, 5004, &packetizer()).render();
        assert!(sdp.contains("c=IN IP6 ::1\r\n"));
        assert!(sdp.contains("IN IP6 ::1\r\n"));
    }

    #[test]
    fn handle_updates_bump_version_once() {
        let address = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let handle = SdpHandle::new(SessionDescription::for_stream(address, 5004, &packetizer()));
        let attrs = vec![
            "a=rtpmap:96 H264/90000".to_string(),
            "a=fmtp:96 packetization-mode=1;profile-level-id=42001e".to_string(),
        ];

        handle.update_media_attributes(attrs.clone());
        handle.update_media_attributes(attrs);

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.session_version, 1);
        assert!(handle.render().contains("profile-level-id=42001e"));
        assert!(handle.render().contains("o=fpv 0 1 IN IP4 127.0.0.1\r\n"));
    }
}
