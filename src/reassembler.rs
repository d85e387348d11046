//! Frame reassembly from an arbitrarily chunked byte stream
//!
//! Bytes are appended with [`FrameReassembler::ingest`] and complete frames are
//! pulled out with [`FrameReassembler::drain`]. The scanner is greedy and
//! left-to-right: a first byte with the high bit set starts a 3-byte frame, any
//! other first byte is dropped on its own and scanning resumes at the next one.
//! Up to two trailing bytes stay buffered until more input arrives.

use std::collections::VecDeque;

use crate::midi::{is_status_byte, Frame, FRAME_LEN};

/// Byte accumulator plus resynchronizing 3-byte frame scanner
#[derive(Debug, Default)]
pub struct FrameReassembler {
    buffer: VecDeque<u8>,
    discarded: u64,
    emitted: u64,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes to the accumulator
    pub fn ingest(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes);
    }

    /// Iterate over the frames extractable right now
    ///
    /// Bytes are consumed as the iterator advances. Dropping the iterator early
    /// leaves the remaining bytes buffered.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain { inner: self }
    }

    /// Number of buffered bytes not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes dropped by resynchronization
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Total frames produced by `drain`
    pub fn frames_emitted(&self) -> u64 {
        self.emitted
    }

    /// Drop any buffered tail, returning how many bytes were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    fn next_frame(&mut self) -> Option<Frame> {
        while self.buffer.len() >= FRAME_LEN {
            let status = self.buffer[0];
            if is_status_byte(status) {
                let frame = Frame::new(status, self.buffer[1], self.buffer[2]);
                self.buffer.drain(..FRAME_LEN);
                self.emitted += 1;
                return Some(frame);
            }

            // Cannot start a frame: skip exactly one byte and retry
            self.buffer.pop_front();
            self.discarded += 1;
        }
        None
    }
}

/// Lazy iterator returned by [`FrameReassembler::drain`]
pub struct Drain<'a> {
    inner: &'a mut FrameReassembler,
}

impl Iterator for Drain<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.inner.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::FrameKind;
    use proptest::prelude::*;

    fn feed(reassembler: &mut FrameReassembler, bytes: &[u8]) -> Vec<Frame> {
        reassembler.ingest(bytes);
        reassembler.drain().collect()
    }

    #[test]
    fn test_single_note_on() {
        let mut r = FrameReassembler::new();
        let frames = feed(&mut r, &[0x90, 0x40, 0x60]);

        assert_eq!(frames, vec![Frame::new(0x90, 0x40, 0x60)]);
        assert_eq!(frames[0].kind(), FrameKind::NoteOn);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_leading_garbage_is_discarded() {
        let mut r = FrameReassembler::new();
        let frames = feed(&mut r, &[0x00, 0x90, 0x40, 0x60]);

        assert_eq!(frames, vec![Frame::new(0x90, 0x40, 0x60)]);
        assert_eq!(r.discarded_bytes(), 1);
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_split_across_ingests() {
        let mut r = FrameReassembler::new();

        assert!(feed(&mut r, &[0x90]).is_empty());
        assert_eq!(r.pending(), 1);

        let frames = feed(&mut r, &[0x40, 0x60]);
        assert_eq!(frames, vec![Frame::new(0x90, 0x40, 0x60)]);
    }

    #[test]
    fn test_dangling_byte_stays_buffered() {
        let mut r = FrameReassembler::new();
        let frames = feed(&mut r, &[0x80, 0x01, 0x02, 0x70]);

        assert_eq!(frames, vec![Frame::new(0x80, 0x01, 0x02)]);
        assert_eq!(frames[0].kind(), FrameKind::NoteOff);
        assert_eq!(r.pending(), 1);
        assert_eq!(r.discarded_bytes(), 0);

        // The dangling byte is only judged once enough bytes are available
        let frames = feed(&mut r, &[0x90, 0x3C]);
        assert!(frames.is_empty());
        assert_eq!(r.discarded_bytes(), 1);
        assert_eq!(r.pending(), 2);

        let frames = feed(&mut r, &[0x7F]);
        assert_eq!(frames, vec![Frame::new(0x90, 0x3C, 0x7F)]);
    }

    #[test]
    fn test_drain_twice_is_idempotent() {
        let mut r = FrameReassembler::new();
        r.ingest(&[0x90, 0x40, 0x60, 0x80, 0x40, 0x00]);

        assert_eq!(r.drain().count(), 2);
        assert_eq!(r.drain().count(), 0);
        assert_eq!(r.frames_emitted(), 2);
    }

    #[test]
    fn test_resync_counts_each_discarded_byte() {
        let mut r = FrameReassembler::new();
        let frames = feed(&mut r, &[0x00, 0x01, 0x90, 0x40, 0x60]);

        assert_eq!(frames, vec![Frame::new(0x90, 0x40, 0x60)]);
        assert_eq!(r.discarded_bytes(), 2);
    }

    #[test]
    fn test_misaligned_stream_self_heals() {
        // Stream started mid-frame: two data bytes, then regular frames
        let mut r = FrameReassembler::new();
        let frames = feed(
            &mut r,
            &[0x40, 0x60, 0x90, 0x3C, 0x7F, 0x80, 0x3C, 0x00],
        );

        assert_eq!(
            frames,
            vec![Frame::new(0x90, 0x3C, 0x7F), Frame::new(0x80, 0x3C, 0x00)]
        );
        assert_eq!(r.discarded_bytes(), 2);
    }

    #[test]
    fn test_status_value_in_data_position_is_not_resynced() {
        // Data bytes are taken as-is, even with the high bit set
        let mut r = FrameReassembler::new();
        let frames = feed(&mut r, &[0x90, 0x90, 0x90]);
        assert_eq!(frames, vec![Frame::new(0x90, 0x90, 0x90)]);
    }

    #[test]
    fn test_short_garbage_waits_for_more_input() {
        let mut r = FrameReassembler::new();
        assert!(feed(&mut r, &[0x00, 0x01]).is_empty());
        assert_eq!(r.pending(), 2);
        assert_eq!(r.discarded_bytes(), 0);
    }

    #[test]
    fn test_partial_drain_keeps_remaining_bytes() {
        let mut r = FrameReassembler::new();
        r.ingest(&[0x90, 1, 2, 0x90, 3, 4]);

        let first = r.drain().next();
        assert_eq!(first, Some(Frame::new(0x90, 1, 2)));
        assert_eq!(r.pending(), 3);
        assert_eq!(r.drain().collect::<Vec<_>>(), vec![Frame::new(0x90, 3, 4)]);
    }

    #[test]
    fn test_clear_reports_dropped_tail() {
        let mut r = FrameReassembler::new();
        r.ingest(&[0x90, 0x40]);
        assert_eq!(r.clear(), 2);
        assert_eq!(r.pending(), 0);
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_frames(
            bytes in proptest::collection::vec(any::<u8>(), 0..256),
            cuts in proptest::collection::vec(1usize..8, 0..64),
        ) {
            let mut whole = FrameReassembler::new();
            let expected = feed(&mut whole, &bytes);

            // Byte at a time
            let mut single = FrameReassembler::new();
            let mut one_by_one = Vec::new();
            for b in &bytes {
                one_by_one.extend(feed(&mut single, std::slice::from_ref(b)));
            }
            prop_assert_eq!(&one_by_one, &expected);

            // Arbitrary chunk sizes
            let mut chunked = FrameReassembler::new();
            let mut out = Vec::new();
            let mut rest = bytes.as_slice();
            let mut sizes = cuts.iter().cycle();
            while !rest.is_empty() {
                let n = sizes.next().copied().unwrap_or(1).min(rest.len());
                let (head, tail) = rest.split_at(n);
                out.extend(feed(&mut chunked, head));
                rest = tail;
            }
            prop_assert_eq!(&out, &expected);
            prop_assert_eq!(chunked.pending(), whole.pending());
            prop_assert_eq!(chunked.discarded_bytes(), whole.discarded_bytes());
        }

        #[test]
        fn prop_bytes_are_conserved(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut r = FrameReassembler::new();
            let frames = feed(&mut r, &bytes);

            prop_assert!(r.pending() < FRAME_LEN);
            prop_assert_eq!(
                frames.len() * FRAME_LEN + r.discarded_bytes() as usize + r.pending(),
                bytes.len()
            );
            prop_assert!(frames.iter().all(Frame::is_valid));
        }
    }
}
