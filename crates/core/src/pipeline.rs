//! The streaming loop: source → demuxer → timestamps → packetizer → sink.
//!
//! A [`Pipeline`] owns every stage and is driven by a single thread. Bytes
//! are read in chunks of `read_buffer_size`, each chunk is handed to the
//! [`NalDemuxer`], and every NAL unit it yields is stamped, packetized and
//! written out before the next read.
//!
//! Failures are absorbed rather than propagated:
//!
//! - a read error is logged and the read retried with a bounded backoff;
//! - a write error drops that packet only.
//!
//! The loop ends when the source reports end-of-stream. Bytes still
//! pending in the demuxer at that point never saw a closing start code and
//! are discarded.

use std::ops::ControlFlow;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::demux::{NalDemuxer, NalUnit};
use crate::error::Result;
use crate::media::Packetizer;
use crate::media::h264::{H264Packetizer, NAL_TYPE_PPS, NAL_TYPE_SPS};
use crate::protocol::SdpHandle;
use crate::sink::PacketSink;
use crate::source::{ByteSource, ReadStatus};
use crate::timestamp::TimestampSynthesizer;

/// A progress line is logged every this many written packets.
pub const PROGRESS_INTERVAL: u64 = 1000;

const INITIAL_BACKOFF: Duration = Duration::from_millis(1);

fn is_progress_point(packets_written: u64) -> bool {
    packets_written > 0 && packets_written % PROGRESS_INTERVAL == 0
}

/// Counters accumulated over a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub chunks_read: u64,
    pub bytes_read: u64,
    pub nals: u64,
    pub frames: u64,
    pub packets_written: u64,
    pub packets_dropped: u64,
    pub read_errors: u64,
}

/// Single-threaded streaming loop from a [`ByteSource`] to a [`PacketSink`].
pub struct Pipeline<S, K> {
    source: S,
    sink: K,
    demuxer: NalDemuxer,
    synthesizer: TimestampSynthesizer,
    packetizer: Box<dyn Packetizer>,
    read_buffer: Vec<u8>,
    max_backoff: Duration,
    consecutive_read_errors: u32,
    sdp: Option<SdpHandle>,
    sdp_published: bool,
    stats: PipelineStats,
}

impl<S: ByteSource, K: PacketSink> Pipeline<S, K> {
    /// Build an H.264 pipeline from `config`.
    pub fn new(config: &StreamConfig, source: S, sink: K) -> Result<Self> {
        Self::with_packetizer(
            config,
            source,
            sink,
            Box::new(H264Packetizer::from_config(config)),
        )
    }

    /// Build a pipeline around an existing packetizer.
    ///
    /// Fails if `config` does not validate.
    pub fn with_packetizer(
        config: &StreamConfig,
        source: S,
        sink: K,
        packetizer: Box<dyn Packetizer>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            source,
            sink,
            demuxer: NalDemuxer::with_boundary_trim(config.start_code, config.trim_boundary_byte),
            synthesizer: TimestampSynthesizer::from_config(config),
            packetizer,
            read_buffer: vec![0u8; config.read_buffer_size],
            max_backoff: config.read_retry_max_backoff,
            consecutive_read_errors: 0,
            sdp: None,
            sdp_published: false,
            stats: PipelineStats::default(),
        })
    }

    /// Publish codec parameters to `sdp` once the bitstream reveals them.
    pub fn with_sdp(mut self, sdp: SdpHandle) -> Self {
        self.sdp = Some(sdp);
        self
    }

    /// Run until the source reports end-of-stream.
    pub fn run(&mut self) -> PipelineStats {
        info!(
            start_code = %self.demuxer.start_code(),
            mode = ?self.synthesizer.mode(),
            buffer = self.read_buffer.len(),
            "pipeline started"
        );

        while self.poll().is_continue() {}

        info!(
            nals = self.stats.nals,
            frames = self.stats.frames,
            packets = self.stats.packets_written,
            dropped = self.stats.packets_dropped,
            read_errors = self.stats.read_errors,
            discarded = self.demuxer.pending_len(),
            "pipeline finished"
        );

        self.stats.clone()
    }

    /// Perform one read and process everything it completes.
    pub fn poll(&mut self) -> ControlFlow<()> {
        match self.source.read_chunk(&mut self.read_buffer) {
            Ok(ReadStatus::EndOfStream) => {
                debug!("source reached end of stream");
                return ControlFlow::Break(());
            }
            Ok(ReadStatus::Data(n)) => {
                self.consecutive_read_errors = 0;
                let n = n.min(self.read_buffer.len());
                if n == 0 {
                    return ControlFlow::Continue(());
                }

                self.stats.chunks_read += 1;
                self.stats.bytes_read += n as u64;

                let nals = self.demuxer.append(&self.read_buffer[..n]);
                for nal in &nals {
                    self.process_nal(nal);
                }
            }
            Err(e) => {
                self.stats.read_errors += 1;
                self.consecutive_read_errors = self.consecutive_read_errors.saturating_add(1);
                let delay = self.backoff();
                warn!(
                    error = %e,
                    attempt = self.consecutive_read_errors,
                    retry_in_ms = delay.as_millis() as u64,
                    "read failed"
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
        }

        ControlFlow::Continue(())
    }

    /// Delay before the next read after a failure: none for the first
    /// retry, then doubling from 1 ms up to the configured cap.
    fn backoff(&self) -> Duration {
        if self.consecutive_read_errors <= 1 {
            return Duration::ZERO;
        }
        let exponent = (self.consecutive_read_errors - 2).min(16);
        INITIAL_BACKOFF
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    fn process_nal(&mut self, nal: &NalUnit) {
        let increment = self.synthesizer.next_increment(nal);
        let packets = self.packetizer.packetize(&nal.body, increment);

        for packet in &packets {
            match self.sink.write_packet(packet) {
                Ok(()) => {
                    self.stats.packets_written += 1;
                    if is_progress_point(self.stats.packets_written) {
                        self.report_progress();
                    }
                }
                Err(e) => {
                    self.stats.packets_dropped += 1;
                    warn!(error = %e, len = packet.len(), "packet dropped");
                }
            }
        }

        self.stats.nals += 1;
        self.stats.frames += u64::from(nal.frame_count);

        if matches!(nal.nal_type(), Some(NAL_TYPE_SPS | NAL_TYPE_PPS)) {
            self.publish_parameter_sets();
        }
    }

    fn publish_parameter_sets(&mut self) {
        if self.sdp_published || !self.packetizer.parameter_sets_ready() {
            return;
        }
        if let Some(sdp) = &self.sdp {
            sdp.update_media_attributes(self.packetizer.sdp_attributes());
            self.sdp_published = true;
        }
    }

    fn report_progress(&self) {
        info!(
            packets = self.stats.packets_written,
            nals = self.stats.nals,
            frames = self.stats.frames,
            seq = self.packetizer.next_sequence(),
            rtp_ts = self.packetizer.next_rtp_timestamp(),
            pending = self.demuxer.pending_len(),
            "streaming"
        );
    }

    pub fn into_sink(self) -> K {
        self.sink
    }
}
