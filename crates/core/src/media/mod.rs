//! RTP packetization.
//!
//! This module provides the [`Packetizer`] trait and the H.264
//! implementation that turns demuxed NAL units into RTP packets.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each NAL unit is carried in one or more RTP packets. Every RTP packet
//! carries a 12-byte fixed header ([`rtp::RtpHeader`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping, random start): for reordering
//!   and loss detection.
//! - **Timestamp** (32-bit): media clock, typically 90 kHz for video.
//! - **SSRC** (32-bit): identifies the sender for the whole stream.
//! - **Marker bit**: set on the last packet of each packetize call.
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) |

pub mod h264;
pub mod rtp;

/// Codec-specific RTP packetizer.
///
/// The pipeline only depends on this trait, so another codec or wire
/// format can be swapped in without touching the demuxer.
pub trait Packetizer: Send {
    /// Packetize Annex B data into RTP packets.
    ///
    /// Each returned `Vec<u8>` is a complete RTP packet: 12-byte header
    /// (RFC 3550 §5.1) followed by the codec-specific payload.
    ///
    /// `timestamp_increment` advances the RTP timestamp after the packets
    /// of this call have been stamped.
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>>;

    /// Codec name for the SDP `a=rtpmap` attribute (e.g. `"H264"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz.
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;

    /// SDP media-level attribute lines for this codec, `a=` prefix included.
    fn sdp_attributes(&self) -> Vec<String>;

    /// Whether out-of-band codec parameters (e.g. SPS/PPS) have been seen,
    /// making [`sdp_attributes`](Self::sdp_attributes) complete.
    fn parameter_sets_ready(&self) -> bool {
        false
    }

    /// Sequence number of the next packet.
    fn next_sequence(&self) -> u16;

    /// RTP timestamp the next packet will carry.
    fn next_rtp_timestamp(&self) -> u32;
}
