//! Incremental Annex-B NAL unit demuxer.
//!
//! Raw capture devices hand over bytes with no regard for NAL boundaries.
//! [`NalDemuxer`] accumulates those bytes and emits a [`NalUnit`] only once
//! the *following* start code has been seen, so a unit's end is always
//! confirmed rather than guessed:
//!
//! ```text
//!  pending: .. 00 00 01 65 88 84 .. 21 | 00 00 01 41 9A ..
//!              ^ p[i]                  ^ p[i+1]
//!  body:       [p[i], p[i+1] - 1)        (retained for the next call)
//! ```
//!
//! The output depends only on the concatenated input, never on how it was
//! split across [`append`](NalDemuxer::append) calls.

use crate::config::StartCode;
use crate::media::h264::NAL_TYPE_AUD;

/// One NAL unit sliced out of the raw stream, start code included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    /// Start-code prefix followed by the NAL header and payload.
    pub body: Vec<u8>,
    /// 1 when the unit is an access unit delimiter (a frame boundary), else 0.
    pub frame_count: u32,
    start_code: StartCode,
}

impl NalUnit {
    /// Build a unit from a body that begins with `start_code`.
    ///
    /// The header byte is bounds-checked: a body too short to carry one
    /// (two start codes back to back) counts as a non-frame unit.
    pub fn new(body: Vec<u8>, start_code: StartCode) -> Self {
        let frame_count = match body.get(start_code.prefix_len()) {
            Some(&header) if header & 0x1f == NAL_TYPE_AUD => 1,
            _ => 0,
        };
        Self {
            body,
            frame_count,
            start_code,
        }
    }

    /// The NAL header byte right after the start code, if present.
    pub fn header(&self) -> Option<u8> {
        self.body.get(self.start_code.prefix_len()).copied()
    }

    /// `nal_unit_type` from the header (low 5 bits).
    pub fn nal_type(&self) -> Option<u8> {
        self.header().map(|h| h & 0x1f)
    }

    pub fn is_frame_boundary(&self) -> bool {
        self.frame_count > 0
    }

    /// Bytes after the start code.
    pub fn payload(&self) -> &[u8] {
        self.body.get(self.start_code.prefix_len()..).unwrap_or(&[])
    }
}

/// Stateful scanner that turns arbitrarily chunked bytes into NAL units.
///
/// Bytes live in a growable arena; `head` marks the consumed prefix, so
/// extracting units only moves an index. The live tail is shifted to the
/// front once the consumed prefix is at least as large as it, which keeps
/// the copying amortized to O(1) per input byte.
///
/// Scanning is incremental: `scan_pos` is the first offset not yet tested
/// for a start code and `last_start` is the most recent start code found.
/// No byte is tested twice.
#[derive(Debug)]
pub struct NalDemuxer {
    start_code: StartCode,
    trim_boundary_byte: bool,
    buffer: Vec<u8>,
    head: usize,
    scan_pos: usize,
    last_start: Option<usize>,
    nals_emitted: u64,
    frames_seen: u64,
}

impl NalDemuxer {
    /// Create a demuxer for `start_code` that trims the boundary byte.
    pub fn new(start_code: StartCode) -> Self {
        Self::with_boundary_trim(start_code, true)
    }

    /// Create a demuxer, choosing whether the byte right before each
    /// following start code is left out of the emitted body.
    ///
    /// Trimming reproduces the framing of the capture tool this stream
    /// format comes from. When the device emits 4-byte start codes and the
    /// demuxer matches 3-byte ones, the trimmed byte is the leading `00` of
    /// the next start code; for genuine 3-byte streams it is the last
    /// payload byte, which is why the behavior is switchable.
    pub fn with_boundary_trim(start_code: StartCode, trim_boundary_byte: bool) -> Self {
        tracing::debug!(%start_code, trim_boundary_byte, "NAL demuxer created");
        Self {
            start_code,
            trim_boundary_byte,
            buffer: Vec::new(),
            head: 0,
            scan_pos: 0,
            last_start: None,
            nals_emitted: 0,
            frames_seen: 0,
        }
    }

    /// Feed a chunk and return every NAL unit it completes, in stream order.
    ///
    /// An empty chunk is a no-op. Until two start codes are known nothing
    /// is emitted and nothing is discarded.
    pub fn append(&mut self, chunk: &[u8]) -> Vec<NalUnit> {
        let mut nals = Vec::new();
        if chunk.is_empty() {
            return nals;
        }
        self.buffer.extend_from_slice(chunk);

        let pattern = self.start_code.pattern();
        let mut pos = self.scan_pos;
        while pos + pattern.len() <= self.buffer.len() {
            if &self.buffer[pos..pos + pattern.len()] == pattern {
                if let Some(start) = self.last_start {
                    nals.push(self.slice(start, pos));
                }
                self.last_start = Some(pos);
            }
            pos += 1;
        }
        self.scan_pos = pos;

        if !nals.is_empty() {
            // Everything before the last start code has been emitted.
            if let Some(start) = self.last_start {
                self.head = start;
            }
            self.compact();

            self.nals_emitted += nals.len() as u64;
            self.frames_seen += nals.iter().map(|n| n.frame_count as u64).sum::<u64>();
            tracing::trace!(
                nals = nals.len(),
                pending = self.pending_len(),
                "NAL units demuxed"
            );
        }

        nals
    }

    /// `[start, next - 1)` or `[start, next)` depending on boundary trimming.
    ///
    /// Start codes never overlap, so `next >= start + prefix_len` and the
    /// trimmed end never precedes `start`.
    fn slice(&self, start: usize, next: usize) -> NalUnit {
        let end = if self.trim_boundary_byte { next - 1 } else { next };
        NalUnit::new(self.buffer[start..end].to_vec(), self.start_code)
    }

    fn compact(&mut self) {
        if self.head == 0 || self.head * 2 < self.buffer.len() {
            return;
        }
        self.buffer.drain(..self.head);
        self.scan_pos -= self.head;
        self.last_start = self.last_start.map(|s| s - self.head);
        self.head = 0;
    }

    /// Bytes held back waiting for the next start code.
    pub fn pending(&self) -> &[u8] {
        &self.buffer[self.head..]
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len() - self.head
    }

    pub fn start_code(&self) -> StartCode {
        self.start_code
    }

    /// Total NAL units emitted since creation.
    pub fn nals_emitted(&self) -> u64 {
        self.nals_emitted
    }

    /// Total access unit delimiters emitted since creation.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(demuxer: &mut NalDemuxer, chunks: &[&[u8]]) -> Vec<NalUnit> {
        chunks.iter().flat_map(|c| demuxer.append(c)).collect()
    }

    #[test]
    fn exact_slicing_short_start_code() {
        let mut d = NalDemuxer::new(StartCode::Short);
        assert!(d.append(&[0x00, 0x00, 0x01, 0xAA]).is_empty());

        let nals = d.append(&[0x00, 0x00, 0x01, 0xBB, 0xBB]);
        assert_eq!(nals.len(), 1);
        // The 0xAA right before the second start code is trimmed.
        assert_eq!(nals[0].body, vec![0x00, 0x00, 0x01]);
        assert_eq!(d.pending(), &[0x00, 0x00, 0x01, 0xBB, 0xBB]);
    }

    #[test]
    fn exact_slicing_without_trim() {
        let mut d = NalDemuxer::with_boundary_trim(StartCode::Short, false);
        assert!(d.append(&[0x00, 0x00, 0x01, 0xAA]).is_empty());

        let nals = d.append(&[0x00, 0x00, 0x01, 0xBB, 0xBB]);
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].body, vec![0x00, 0x00, 0x01, 0xAA]);
    }

    #[test]
    fn short_start_code_stream() {
        let mut d = NalDemuxer::new(StartCode::Short);
        let nals = feed(
            &mut d,
            &[
                &[0x99, 0x99],
                &[0x00, 0x00, 0x01, 0x88],
                &[0x88, 0x88, 0x88, 0x88],
                &[0x00, 0x00, 0x00, 0x01],
                &[0x12, 0x34, 0x56, 0x78],
                &[0x12, 0x34, 0x00, 0x00],
                &[0x00, 0x34, 0x00, 0x00],
                &[0x01, 0x34, 0x00, 0x00],
                &[0x00, 0x00, 0x00, 0x00],
            ],
        );
        // The tail is not a full NAL: no start code follows it.
        assert_eq!(nals.len(), 2);
        assert_eq!(nals[0].body, vec![0x00, 0x00, 0x01, 0x88, 0x88, 0x88, 0x88, 0x88]);
    }

    #[test]
    fn long_start_code_stream() {
        let mut d = NalDemuxer::new(StartCode::Long);
        let nals = feed(
            &mut d,
            &[
                &[0x12, 0x14],
                &[0x03, 0x00, 0x00, 0x00],
                &[0x01, 0x34, 0x56, 0x78],
                &[0x12, 0x34, 0x00, 0x00],
                &[0x01, 0x34, 0x00, 0x00],
                &[0x01, 0x34, 0x00, 0x00],
                &[0x00, 0x01, 0x00, 0x00],
                &[0x12, 0x34, 0x00, 0x00],
                &[0x09, 0x00, 0x00, 0x00],
                &[0x01, 0x00, 0x00, 0x00],
            ],
        );
        assert_eq!(nals.len(), 2);
        assert!(nals.iter().all(|n| n.body.starts_with(&[0, 0, 0, 1])));
        assert_eq!(nals[0].nal_type(), Some(0x34 & 0x1f));
    }

    #[test]
    fn zero_or_one_start_code_never_emits() {
        let mut d = NalDemuxer::new(StartCode::Short);
        assert!(d.append(&[0xFF; 4096]).is_empty());
        assert!(d.append(&[0x00, 0x00, 0x01, 0x65]).is_empty());
        assert!(d.append(&[0x42; 4096]).is_empty());
        assert_eq!(d.pending_len(), 4096 + 4 + 4096);
        assert_eq!(d.nals_emitted(), 0);
    }

    #[test]
    fn partial_prefix_at_tail_is_not_a_match() {
        let mut d = NalDemuxer::new(StartCode::Long);
        assert!(d.append(&[0, 0, 0, 1, 0x09, 0xF0, 0, 0, 0]).is_empty());
        let nals = d.append(&[1, 0x65]);
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].body, vec![0, 0, 0, 1, 0x09]);
        assert!(nals[0].is_frame_boundary());
    }

    #[test]
    fn frame_detection_uses_low_five_bits() {
        let mut d = NalDemuxer::new(StartCode::Short);
        let nals = feed(
            &mut d,
            &[&[
                0, 0, 1, 0x09, 0xF0, 0xEE, // AUD
                0, 0, 1, 0x29, 0x10, 0xEE, // 0x29 & 0x1f == 9
                0, 0, 1, 0x65, 0x88, 0xEE, // IDR slice
                0, 0, 1, 0x67, 0x42, 0xEE, // SPS
                0, 0, 1,
            ]],
        );
        let counts: Vec<u32> = nals.iter().map(|n| n.frame_count).collect();
        assert_eq!(counts, vec![1, 1, 0, 0]);
        assert_eq!(d.frames_seen(), 2);
    }

    #[test]
    fn adjacent_start_codes_do_not_panic() {
        let mut d = NalDemuxer::new(StartCode::Short);
        let nals = d.append(&[0, 0, 1, 0, 0, 1, 0, 0, 1, 0x09, 0x10, 0, 0, 1]);
        assert_eq!(nals.len(), 3);
        // Degenerate units shorter than the prefix carry no header byte.
        assert_eq!(nals[0].body, vec![0, 0]);
        assert_eq!(nals[0].frame_count, 0);
        assert_eq!(nals[0].header(), None);
        assert!(nals[0].payload().is_empty());
        assert_eq!(nals[1].body, vec![0, 0]);
        assert_eq!(nals[2].frame_count, 1);

        let mut d = NalDemuxer::with_boundary_trim(StartCode::Long, false);
        let nals = d.append(&[0, 0, 0, 1, 0, 0, 0, 1, 0x41]);
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].body, vec![0, 0, 0, 1]);
        assert_eq!(nals[0].frame_count, 0);
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut d = NalDemuxer::new(StartCode::Short);
        d.append(&[0, 0, 1, 0x09, 0x10, 0x00, 0x00]);
        let before = d.pending().to_vec();

        assert!(d.append(&[]).is_empty());
        assert_eq!(d.pending(), before.as_slice());
        assert_eq!(d.nals_emitted(), 0);

        // The buffered partial start code still completes normally.
        let nals = d.append(&[0x01, 0x65]);
        assert_eq!(nals.len(), 1);
        assert_eq!(nals[0].body, vec![0, 0, 1, 0x09]);
    }

    #[test]
    fn byte_at_a_time_matches_single_chunk() {
        let mut stream = Vec::new();
        for i in 0..50u8 {
            stream.extend_from_slice(&[0, 0, 0, 1, 0x09, 0xF0]);
            stream.extend_from_slice(&[0, 0, 0, 1, 0x41]);
            stream.extend(std::iter::repeat_n(i, i as usize));
        }

        let mut whole = NalDemuxer::new(StartCode::Short);
        let expected = whole.append(&stream);

        let mut split = NalDemuxer::new(StartCode::Short);
        let actual: Vec<NalUnit> = stream.iter().flat_map(|b| split.append(&[*b])).collect();

        assert_eq!(actual, expected);
        assert_eq!(split.pending(), whole.pending());
        assert_eq!(expected.len(), 99);
    }

    #[test]
    fn pending_keeps_only_the_unbounded_tail() {
        let mut d = NalDemuxer::new(StartCode::Short);
        d.append(&[0xEE, 0xEE, 0, 0, 1, 0x65, 0x01, 0x02]);
        // Leading garbage is held until a unit is confirmed.
        assert_eq!(d.pending_len(), 8);

        d.append(&[0x03, 0, 0, 1, 0x41, 0x7F]);
        assert_eq!(d.pending(), &[0, 0, 1, 0x41, 0x7F]);
    }

    #[test]
    fn long_stream_stays_compact() {
        let mut d = NalDemuxer::new(StartCode::Short);
        let unit = [0, 0, 1, 0x41, 0xAA, 0xBB, 0xCC, 0xDD];
        let mut emitted = 0;
        for _ in 0..10_000 {
            emitted += d.append(&unit).len();
        }
        assert_eq!(emitted, 9_999);
        assert_eq!(d.pending_len(), unit.len());
        assert!(d.buffer.len() <= 2 * unit.len());
    }
}
