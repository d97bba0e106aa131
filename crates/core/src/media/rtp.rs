use rand::RngExt;

/// Size of the RTP fixed header with no CSRCs or extensions.
pub const RTP_HEADER_LEN: usize = 12;

/// V=2, no padding, no extension, no CSRCs.
const VERSION_BITS: u8 = 0b1000_0000;

/// RTP fixed header state (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// - **Sequence number**: starts at a random value (RFC 3550 §5.1) and
///   wraps; incremented on every written header.
/// - **Timestamp**: the running sum of every increment passed to
///   [`advance_timestamp`](Self::advance_timestamp). Kept as u64 so the
///   stream total never wraps; the wire carries the low 32 bits.
/// - **SSRC**: fixed for the lifetime of the stream.
///
/// Version is always 2. Padding, extension, and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u64,
}

impl RtpHeader {
    /// Create header state with an explicit initial sequence number.
    pub fn new(pt: u8, ssrc: u32, initial_sequence: u16) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            initial_sequence,
            "RTP header state created"
        );
        Self {
            pt: pt & 0x7f,
            ssrc,
            sequence: initial_sequence,
            timestamp: 0,
        }
    }

    /// Create with a random initial sequence number.
    pub fn with_random_sequence(pt: u8, ssrc: u32) -> Self {
        let sequence = rand::rng().random::<u16>();
        Self::new(pt, ssrc, sequence)
    }

    /// Sequence number the next [`write`](Self::write) will use.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Running timestamp (sum of all increments so far).
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Serialize a 12-byte RTP fixed header and advance the sequence number.
    ///
    /// The `marker` bit (RFC 3550 §5.1) is set on the last packet produced
    /// from one packetize call.
    pub fn write(&mut self, marker: bool) -> [u8; RTP_HEADER_LEN] {
        let [s0, s1] = self.sequence.to_be_bytes();
        let [t0, t1, t2, t3] = (self.timestamp as u32).to_be_bytes();
        let [c0, c1, c2, c3] = self.ssrc.to_be_bytes();
        self.sequence = self.sequence.wrapping_add(1);

        [
            VERSION_BITS,
            (u8::from(marker) << 7) | self.pt,
            s0,
            s1,
            t0,
            t1,
            t2,
            t3,
            c0,
            c1,
            c2,
            c3,
        ]
    }

    /// Advance the RTP timestamp by a sample count.
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(u64::from(increment));
    }
}
