use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::Packetizer;
use super::rtp::{RTP_HEADER_LEN, RtpHeader};
use crate::config::{MIN_MTU, StreamConfig};

/// Sequence parameter set.
pub const NAL_TYPE_SPS: u8 = 7;
/// Picture parameter set.
pub const NAL_TYPE_PPS: u8 = 8;
/// Access unit delimiter, the frame boundary marker.
pub const NAL_TYPE_AUD: u8 = 9;
/// Filler data.
pub const NAL_TYPE_FILLER: u8 = 12;
/// Fragmentation unit A (RFC 6184 §5.8).
pub const NAL_TYPE_FU_A: u8 = 28;

/// FU indicator + FU header.
const FU_A_PREFIX_LEN: usize = 2;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

fn nal_type(header: u8) -> u8 {
    header & 0x1f
}

/// Units a receiver never needs on the wire.
fn is_droppable(nal: &[u8]) -> bool {
    matches!(nal_type(nal[0]), NAL_TYPE_AUD | NAL_TYPE_FILLER)
}

/// Iterator over the NAL units of an Annex-B buffer, start codes removed.
///
/// Both `00 00 01` and `00 00 00 01` prefixes are recognized; bytes before
/// the first prefix and empty units are skipped.
pub struct AnnexBUnits<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AnnexBUnits<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let pos = find_prefix(data, 0).map_or(data.len(), |(_, after)| after);
        Self { data, pos }
    }
}

impl<'a> Iterator for AnnexBUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        while self.pos < self.data.len() {
            let start = self.pos;
            let (end, next) = match find_prefix(self.data, start) {
                Some((at, after)) => {
                    // A zero right before `00 00 01` belongs to a 4-byte prefix.
                    let at = if at > start && self.data[at - 1] == 0 {
                        at - 1
                    } else {
                        at
                    };
                    (at, after)
                }
                None => (self.data.len(), self.data.len()),
            };
            self.pos = next;
            if end > start {
                return Some(&self.data[start..end]);
            }
        }
        None
    }
}

/// Position of the next `00 00 01` at or after `from`, and the offset just
/// past it.
fn find_prefix(data: &[u8], from: usize) -> Option<(usize, usize)> {
    data.get(from..)?
        .windows(3)
        .position(|w| w == [0, 0, 1])
        .map(|i| (from + i, from + i + 3))
}

/// SPS/PPS captured from the bitstream, first occurrence wins.
#[derive(Debug, Default)]
struct ParameterSets {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl ParameterSets {
    fn observe(&mut self, nal: &[u8]) {
        let kind = nal_type(nal[0]);
        let slot = match kind {
            NAL_TYPE_SPS => &mut self.sps,
            NAL_TYPE_PPS => &mut self.pps,
            _ => return,
        };
        if slot.is_none() {
            tracing::debug!(nal_type = kind, len = nal.len(), "parameter set captured");
            *slot = Some(nal.to_vec());
        }
    }

    fn complete(&self) -> bool {
        self.sps.is_some() && self.pps.is_some()
    }

    /// `profile_idc`, constraint flags and `level_idc`: SPS bytes 1..4.
    fn profile_level_id(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        let [_, profile, constraints, level, ..] = *sps else {
            return None;
        };
        Some(format!("{profile:02x}{constraints:02x}{level:02x}"))
    }

    fn sprop(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        let pps = self.pps.as_deref()?;
        Some(format!(
            "{},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        ))
    }
}

/// H.264 RTP packetizer (RFC 6184).
///
/// Takes Annex-B data (typically one NAL unit with its start code, as cut
/// by the demuxer) and emits complete RTP packets no larger than the MTU:
///
/// - **Single NAL Unit** (§5.6): NALs that fit within `mtu - 12` bytes are
///   sent as-is after the RTP header.
///
/// - **FU-A Fragmentation** (§5.8): larger NALs are split across packets,
///   each carrying a 2-byte FU prefix before the fragment:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to MTU - 14 bytes)
///   ```
///
/// Access unit delimiters and filler data carry nothing a receiver needs,
/// so they produce no packets; their timestamp increment still applies.
///
/// All packets of one [`packetize`](Packetizer::packetize) call share the
/// RTP timestamp current at the call; the increment is applied afterwards.
/// The marker bit is set on the last packet of the call.
///
/// SPS/PPS are captured from the first units that carry them; the fmtp
/// attribute then includes `profile-level-id` and `sprop-parameter-sets`
/// (RFC 6184 §8.1).
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeader,
    mtu: usize,
    clock_rate: u32,
    parameter_sets: ParameterSets,
}

impl H264Packetizer {
    /// Create with a random initial sequence number.
    ///
    /// `mtu` bounds the whole serialized packet, RTP header included.
    /// Values below [`MIN_MTU`] are raised to it.
    pub fn new(pt: u8, ssrc: u32, mtu: usize, clock_rate: u32) -> Self {
        Self::with_header(RtpHeader::with_random_sequence(pt, ssrc), mtu, clock_rate)
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.payload_type,
            config.ssrc,
            config.mtu,
            config.clock_rate,
        )
    }

    /// Create around existing header state (fixed sequence in tests).
    pub fn with_header(header: RtpHeader, mtu: usize, clock_rate: u32) -> Self {
        Self {
            header,
            mtu: mtu.max(MIN_MTU),
            clock_rate,
            parameter_sets: ParameterSets::default(),
        }
    }

    /// NAL units of an Annex-B buffer, start codes removed.
    pub fn extract_nal_units(data: &[u8]) -> Vec<&[u8]> {
        AnnexBUnits::new(data).collect()
    }

    fn max_payload(&self) -> usize {
        self.mtu.saturating_sub(RTP_HEADER_LEN)
    }

    fn packet(&mut self, marker: bool, parts: &[&[u8]]) -> Vec<u8> {
        let len = parts.iter().map(|p| p.len()).sum::<usize>();
        let mut packet = Vec::with_capacity(RTP_HEADER_LEN + len);
        packet.extend_from_slice(&self.header.write(marker));
        for part in parts {
            packet.extend_from_slice(part);
        }
        packet
    }

    /// Emit one NAL unit (no start code) into `out`; `marker` goes on its
    /// final packet only.
    fn emit_nal(&mut self, nal: &[u8], marker: bool, out: &mut Vec<Vec<u8>>) {
        if nal.len() <= self.max_payload() {
            let packet = self.packet(marker, &[nal]);
            out.push(packet);
            return;
        }

        let fu_indicator = (nal[0] & 0x60) | NAL_TYPE_FU_A;
        let kind = nal_type(nal[0]);
        let fragment_len = self.max_payload() - FU_A_PREFIX_LEN;
        let fragments = nal[1..].chunks(fragment_len);
        let count = fragments.len();

        for (i, fragment) in fragments.enumerate() {
            let last = i + 1 == count;
            let mut fu_header = kind;
            if i == 0 {
                fu_header |= FU_START;
            }
            if last {
                fu_header |= FU_END;
            }
            let prefix = [fu_indicator, fu_header];
            let packet = self.packet(marker && last, &[&prefix[..], fragment]);
            out.push(packet);
        }

        tracing::trace!(nal_type = kind, len = nal.len(), fragments = count, "FU-A");
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>> {
        let units: Vec<&[u8]> = AnnexBUnits::new(encoded_data)
            .filter(|nal| !is_droppable(nal))
            .collect();

        let mut packets = Vec::new();
        for (i, nal) in units.iter().enumerate() {
            if !self.parameter_sets.complete() {
                self.parameter_sets.observe(nal);
            }
            self.emit_nal(nal, i + 1 == units.len(), &mut packets);
        }

        tracing::trace!(
            units = units.len(),
            packets = packets.len(),
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            timestamp_increment,
            "packetized"
        );

        self.header.advance_timestamp(timestamp_increment);
        packets
    }

    fn codec_name(&self) -> &'static str {
        "H264"
    }

    fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    /// `a=rtpmap` then `a=fmtp` (RFC 6184 §8.2.1); the fmtp line gains
    /// the parameter sets once both have been seen.
    fn sdp_attributes(&self) -> Vec<String> {
        let pt = self.payload_type();
        let mut fmtp = format!("a=fmtp:{pt} packetization-mode=1");
        if let Some(id) = self.parameter_sets.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={id}"));
        }
        if let Some(sprop) = self.parameter_sets.sprop() {
            fmtp.push_str(&format!(";sprop-parameter-sets={sprop}"));
        }

        vec![
            format!("a=rtpmap:{pt} {}/{}", self.codec_name(), self.clock_rate),
            fmtp,
        ]
    }

    fn parameter_sets_ready(&self) -> bool {
        self.parameter_sets.complete()
    }

    fn next_sequence(&self) -> u16 {
        self.header.sequence()
    }

    fn next_rtp_timestamp(&self) -> u32 {
        self.header.timestamp() as u32
    }
}
