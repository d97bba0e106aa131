//! RTP timestamp synthesis.
//!
//! The capture device exports no presentation timestamps, so the RTP clock
//! is reconstructed from what the demuxer can see: access unit delimiters
//! mark frame boundaries. Every NAL unit gets a sample-count increment; the
//! packetizer accumulates the increments into the RTP timestamp, which
//! therefore never decreases.

use std::time::{Duration, Instant};

use crate::config::{StreamConfig, TimestampMode};
use crate::demux::NalUnit;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Strategy state, fixed at construction.
#[derive(Debug, Clone)]
enum Strategy {
    /// Fixed `clock_rate / frame_rate` samples per frame boundary.
    Ratio { samples_per_frame: u32 },
    /// Samples derived from the monotonic time since the previous NAL unit.
    Elapsed {
        nanos_per_sample: u64,
        last_emission: Instant,
    },
}

/// Converts NAL units into RTP sample-count increments.
#[derive(Debug, Clone)]
pub struct TimestampSynthesizer {
    strategy: Strategy,
}

impl TimestampSynthesizer {
    /// Ratio strategy: `floor(clock_rate / frame_rate)` per frame boundary.
    pub fn ratio(clock_rate: u32, frame_rate: u32) -> Self {
        Self {
            strategy: Strategy::Ratio {
                samples_per_frame: clock_rate / frame_rate.max(1),
            },
        }
    }

    /// Elapsed-clock strategy, measuring from `start`.
    pub fn elapsed(clock_rate: u32, start: Instant) -> Self {
        let nanos_per_sample = (NANOS_PER_SECOND / u64::from(clock_rate.max(1))).max(1);
        Self {
            strategy: Strategy::Elapsed {
                nanos_per_sample,
                last_emission: start,
            },
        }
    }

    /// Build the strategy selected by `config`, starting the clock now.
    pub fn from_config(config: &StreamConfig) -> Self {
        let synth = match config.timestamp_mode {
            TimestampMode::Ratio => Self::ratio(config.clock_rate, config.frame_rate),
            TimestampMode::Elapsed => Self::elapsed(config.clock_rate, Instant::now()),
        };
        tracing::debug!(
            mode = ?config.timestamp_mode,
            clock_rate = config.clock_rate,
            "timestamp synthesizer created"
        );
        synth
    }

    pub fn mode(&self) -> TimestampMode {
        match self.strategy {
            Strategy::Ratio { .. } => TimestampMode::Ratio,
            Strategy::Elapsed { .. } => TimestampMode::Elapsed,
        }
    }

    /// Increment for `nal`, measured against the current instant.
    pub fn next_increment(&mut self, nal: &NalUnit) -> u32 {
        self.next_increment_at(nal, Instant::now())
    }

    /// Increment for `nal` as if it were processed at `now`.
    ///
    /// Under the elapsed strategy the last-emission instant moves to `now`
    /// for every unit, frame boundary or not. An instant earlier than the
    /// last emission counts as zero elapsed time.
    pub fn next_increment_at(&mut self, nal: &NalUnit, now: Instant) -> u32 {
        match &mut self.strategy {
            Strategy::Ratio { samples_per_frame } => {
                samples_per_frame.saturating_mul(nal.frame_count)
            }
            Strategy::Elapsed {
                nanos_per_sample,
                last_emission,
            } => {
                let elapsed = now.saturating_duration_since(*last_emission);
                *last_emission = now;
                samples_in(elapsed, *nanos_per_sample).saturating_mul(nal.frame_count)
            }
        }
    }
}

fn samples_in(elapsed: Duration, nanos_per_sample: u64) -> u32 {
    let samples = elapsed.as_nanos() / u128::from(nanos_per_sample);
    u32::try_from(samples).unwrap_or(u32::MAX)
}
