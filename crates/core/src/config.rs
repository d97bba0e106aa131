use std::fmt;
use std::time::Duration;

use crate::error::{LiveRtpError, Result};

/// Default RTP synchronization source identifier.
pub const DEFAULT_SSRC: u32 = 0xDFDF_1000;

/// Smallest MTU that still leaves room for a 12-byte RTP header, the
/// 2-byte FU-A prefix and at least one byte of fragment data.
pub const MIN_MTU: usize = 15;

/// Annex-B start-code prefix used to delimit NAL units.
///
/// Fixed for the lifetime of a stream; the demuxer never probes for the
/// other length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartCode {
    /// `00 00 01`
    #[default]
    Short,
    /// `00 00 00 01`
    Long,
}

impl StartCode {
    const SHORT: [u8; 3] = [0x00, 0x00, 0x01];
    const LONG: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

    /// The prefix bytes.
    pub fn pattern(self) -> &'static [u8] {
        match self {
            Self::Short => &Self::SHORT,
            Self::Long => &Self::LONG,
        }
    }

    /// Prefix length in bytes (3 or 4).
    pub fn prefix_len(self) -> usize {
        self.pattern().len()
    }

    /// Map a byte count from configuration to a start code.
    pub fn from_len(len: usize) -> Result<Self> {
        match len {
            3 => Ok(Self::Short),
            4 => Ok(Self::Long),
            other => Err(LiveRtpError::InvalidConfig(format!(
                "start code length must be 3 or 4, got {other}"
            ))),
        }
    }
}

impl fmt::Display for StartCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Short => write!(f, "00 00 01"),
            Self::Long => write!(f, "00 00 00 01"),
        }
    }
}

/// How RTP timestamps are advanced per NAL unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    /// Advance by `clock_rate / frame_rate` on every access unit delimiter.
    #[default]
    Ratio,
    /// Advance by the wall time elapsed since the previous NAL unit,
    /// counted only on access unit delimiters.
    Elapsed,
}

/// Stream-level configuration consumed by the pipeline and its stages.
///
/// Defaults match the flag defaults of the capture tool: 90 kHz clock,
/// 60 fps, 1400-byte MTU, payload type 96, short start codes and a
/// 2048-byte read buffer.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// RTP clock rate in Hz.
    pub clock_rate: u32,
    /// Nominal frame rate exported by the device (frames per second).
    pub frame_rate: u32,
    /// Maximum size of a serialized RTP packet, header included.
    pub mtu: usize,
    /// RTP payload type (7 bits).
    pub payload_type: u8,
    /// Start-code prefix delimiting NAL units in the raw stream.
    pub start_code: StartCode,
    /// Leave out the byte immediately preceding each following start code
    /// when slicing NAL bodies. On by default to match the framing of the
    /// capture tool; see [`NalDemuxer`](crate::NalDemuxer).
    pub trim_boundary_byte: bool,
    /// Size of the buffer each source read is staged into.
    pub read_buffer_size: usize,
    /// Timestamp synthesis strategy.
    pub timestamp_mode: TimestampMode,
    /// RTP synchronization source identifier, fixed for the stream.
    pub ssrc: u32,
    /// Upper bound on the sleep between consecutive failed source reads.
    pub read_retry_max_backoff: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            clock_rate: 90_000,
            frame_rate: 60,
            mtu: 1400,
            payload_type: 96,
            start_code: StartCode::Short,
            trim_boundary_byte: true,
            read_buffer_size: 2048,
            timestamp_mode: TimestampMode::Ratio,
            ssrc: DEFAULT_SSRC,
            read_retry_max_backoff: Duration::from_millis(250),
        }
    }
}

impl StreamConfig {
    /// Check every value the pipeline relies on being in range.
    pub fn validate(&self) -> Result<()> {
        if self.payload_type > 127 {
            return Err(invalid(format!(
                "payload type must be <= 127, got {}",
                self.payload_type
            )));
        }
        if self.clock_rate == 0 || self.clock_rate > 1_000_000_000 {
            return Err(invalid(format!(
                "clock rate must be within 1..=1000000000 Hz, got {}",
                self.clock_rate
            )));
        }
        if self.frame_rate == 0 || self.frame_rate > self.clock_rate {
            return Err(invalid(format!(
                "frame rate must be within 1..={}, got {}",
                self.clock_rate, self.frame_rate
            )));
        }
        if self.mtu < MIN_MTU {
            return Err(invalid(format!(
                "MTU must be at least {MIN_MTU} bytes, got {}",
                self.mtu
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(invalid("read buffer size must be non-zero".to_string()));
        }
        Ok(())
    }

    /// RTP samples per nominal frame, `floor(clock_rate / frame_rate)`.
    pub fn samples_per_frame(&self) -> u32 {
        self.clock_rate / self.frame_rate
    }
}

fn invalid(msg: String) -> LiveRtpError {
    LiveRtpError::InvalidConfig(msg)
}
