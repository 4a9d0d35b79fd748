//! # Ring Buffer
//!
//! A fixed-capacity circular store of audio samples. The delay engine
//! moves whole blocks in and out of it, so unlike a per-sample delay line
//! every operation here works on a span of samples that may run past the
//! end of the storage and continue at index 0.
//!
//! ## Wraparound
//!
//! A span of `len` samples starting at `start` is split into at most two
//! contiguous pieces:
//!
//! ```text
//!  capacity C = 10, start = 7, len = 5
//!
//!  index:  0   1   2   3   4   5   6   7   8   9
//!        [ t | t |   |   |   |   |   | h | h | h ]
//!          └─┴── tail (0..2)           └───┴───┴── head (7..10)
//! ```
//!
//! The head runs from `start` to the end of the storage, the tail picks
//! up the remainder from index 0. Callers never see the split: indices
//! are taken modulo the capacity and spans are at most one capacity long.
//!
//! ## Gain Ramps
//!
//! Writes can scale the source by a gain that moves linearly from
//! `start` (first sample) to `end` (last sample). The engine uses this
//! to fade the feedback level between blocks instead of jumping to the
//! new value, which would be heard as a click. The ramp position keeps
//! counting across the wrap split, so a span written in two pieces gets
//! exactly the same gains as one written contiguously.

use std::num::NonZeroUsize;
use std::ops::Range;

use nih_plug::nih_debug_assert;

use super::flush_denormal;

/// A linear gain ramp applied across one write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    /// Gain applied to the first sample of the span.
    pub start: f32,
    /// Gain applied to the last sample of the span.
    pub end: f32,
}

impl GainRamp {
    /// No scaling at all.
    pub const UNITY: Self = Self::new(1.0, 1.0);

    pub const fn new(start: f32, end: f32) -> Self {
        Self { start, end }
    }

    /// Gain for sample `index` of a span of `len` samples.
    ///
    /// ```text
    /// gain(i) = start + (end - start) * i / (len - 1)
    /// ```
    ///
    /// A one-sample span uses `start`.
    #[inline]
    pub fn gain_at(&self, index: usize, len: usize) -> f32 {
        if len <= 1 || self.start == self.end {
            return self.start;
        }
        self.start + (self.end - self.start) * (index as f32 / (len - 1) as f32)
    }
}

/// How a write combines the source with what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Overwrite the stored samples.
    Replace,
    /// Add onto the stored samples. Results are denormal-flushed since
    /// this is the feedback path.
    Accumulate,
}

/// Circular sample storage addressed modulo its capacity.
///
/// Allocated once when the engine is prepared and never resized
/// afterwards. None of the methods allocate or lock.
pub struct RingBuffer {
    buffer: Box<[f32]>,
}

impl RingBuffer {
    /// Create a zero-filled ring buffer. `NonZeroUsize` rules out the
    /// zero capacity that would make every modulo a division by zero.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            buffer: vec![0.0; capacity.get()].into_boxed_slice(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Map any index into `[0, capacity)`.
    #[inline]
    pub fn wrap(&self, index: usize) -> usize {
        index % self.buffer.len()
    }

    /// Split a span into its pre-wrap and post-wrap ranges. The second
    /// range is empty when the span fits before the end of the storage.
    fn spans(&self, start: usize, len: usize) -> (Range<usize>, Range<usize>) {
        let start = self.wrap(start);
        let head_len = len.min(self.capacity() - start);
        (start..start + head_len, 0..len - head_len)
    }

    /// Clamp a requested span length to the capacity.
    fn span_len(&self, len: usize) -> usize {
        nih_debug_assert!(
            len <= self.capacity(),
            "span of {} samples exceeds ring capacity {}",
            len,
            self.capacity()
        );
        len.min(self.capacity())
    }

    /// Write `source` into the ring beginning at `start` (mod capacity),
    /// scaled by `ramp` and combined according to `mode`.
    ///
    /// `source.len()` must not exceed the capacity; in release builds any
    /// excess is ignored.
    pub fn write(&mut self, source: &[f32], start: usize, ramp: GainRamp, mode: WriteMode) {
        let len = self.span_len(source.len());
        let (head, tail) = self.spans(start, len);
        let split = head.len();

        for (offset, range) in [(0, head), (split, tail)] {
            let dest = &mut self.buffer[range];
            let src = &source[offset..offset + dest.len()];

            match mode {
                WriteMode::Replace if ramp == GainRamp::UNITY => dest.copy_from_slice(src),
                WriteMode::Replace => {
                    for (i, (d, &s)) in dest.iter_mut().zip(src).enumerate() {
                        *d = s * ramp.gain_at(offset + i, len);
                    }
                }
                WriteMode::Accumulate => {
                    for (i, (d, &s)) in dest.iter_mut().zip(src).enumerate() {
                        *d = flush_denormal(*d + s * ramp.gain_at(offset + i, len));
                    }
                }
            }
        }
    }

    /// Read `dest.len()` samples beginning at `start` (mod capacity),
    /// adding them onto whatever `dest` already holds.
    pub fn read(&self, dest: &mut [f32], start: usize) {
        let len = self.span_len(dest.len());
        let (head, tail) = self.spans(start, len);
        let (dest_head, dest_tail) = dest[..len].split_at_mut(head.len());

        for (d, &s) in dest_head.iter_mut().zip(&self.buffer[head]) {
            *d += s;
        }
        for (d, &s) in dest_tail.iter_mut().zip(&self.buffer[tail]) {
            *d += s;
        }
    }

    /// Zero the whole buffer. Does not allocate.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: usize) -> RingBuffer {
        RingBuffer::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn read_back(rb: &RingBuffer, start: usize, len: usize) -> Vec<f32> {
        let mut out = vec![0.0; len];
        rb.read(&mut out, start);
        out
    }

    #[test]
    fn test_round_trip_contiguous() {
        let mut rb = ring(32);
        let input: Vec<f32> = (0..10).map(|i| i as f32 * 0.1 - 0.3).collect();

        rb.write(&input, 4, GainRamp::UNITY, WriteMode::Replace);

        assert_eq!(read_back(&rb, 4, 10), input);
    }

    /// p = C - 5, N = 10: five samples before the boundary, five after.
    #[test]
    fn test_round_trip_across_wrap() {
        let mut rb = ring(64);
        let input: Vec<f32> = (1..=10).map(|i| i as f32).collect();

        rb.write(&input, 64 - 5, GainRamp::UNITY, WriteMode::Replace);

        assert_eq!(read_back(&rb, 64 - 5, 10), input);
        // The tail landed at the start of the storage.
        assert_eq!(read_back(&rb, 0, 5), vec![6.0, 7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn test_start_index_is_taken_modulo_capacity() {
        let mut rb = ring(16);
        rb.write(&[0.5, 0.25], 16 * 3 + 15, GainRamp::UNITY, WriteMode::Replace);

        assert_eq!(read_back(&rb, 15, 2), vec![0.5, 0.25]);
        assert_eq!(rb.wrap(16 * 3 + 15), 15);
    }

    #[test]
    fn test_full_capacity_span_at_wrapping_position() {
        let mut rb = ring(8);
        let input: Vec<f32> = (0..8).map(|i| (i + 1) as f32).collect();

        rb.write(&input, 5, GainRamp::UNITY, WriteMode::Replace);

        assert_eq!(read_back(&rb, 5, 8), input);
        // Storage layout: the last three inputs wrapped to the front.
        assert_eq!(
            read_back(&rb, 0, 8),
            vec![4.0, 5.0, 6.0, 7.0, 8.0, 1.0, 2.0, 3.0]
        );
    }

    #[test]
    fn test_gain_ramp_rises_linearly() {
        let mut rb = ring(32);
        let input = [0.8; 5];

        rb.write(&input, 0, GainRamp::new(0.0, 1.0), WriteMode::Replace);

        let out = read_back(&rb, 0, 5);
        let expected = [0.0, 0.2, 0.4, 0.6, 0.8];
        for (i, (&got, &want)) in out.iter().zip(&expected).enumerate() {
            assert!(
                (got - want).abs() < 1e-6,
                "sample {i}: expected {want}, got {got}"
            );
        }
    }

    /// The ramp must be identical whether or not the span wraps.
    #[test]
    fn test_gain_ramp_continues_across_wrap() {
        let input = [1.0; 9];
        let ramp = GainRamp::new(0.2, 1.0);

        let mut contiguous = ring(32);
        contiguous.write(&input, 0, ramp, WriteMode::Replace);

        let mut wrapped = ring(12);
        wrapped.write(&input, 8, ramp, WriteMode::Replace);

        let a = read_back(&contiguous, 0, 9);
        let b = read_back(&wrapped, 8, 9);
        for (i, (x, y)) in a.iter().zip(&b).enumerate() {
            assert!((x - y).abs() < 1e-6, "sample {i}: {x} vs {y}");
        }
        assert!((b[0] - 0.2).abs() < 1e-6);
        assert!((b[8] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_sample_ramp_uses_start_gain() {
        let ramp = GainRamp::new(0.3, 0.9);
        assert!((ramp.gain_at(0, 1) - 0.3).abs() < 1e-7);
        assert!((ramp.gain_at(0, 0) - 0.3).abs() < 1e-7);
    }

    #[test]
    fn test_accumulate_adds_onto_stored_samples() {
        let mut rb = ring(16);
        rb.write(&[1.0, 1.0, 1.0], 14, GainRamp::UNITY, WriteMode::Replace);
        rb.write(&[0.5, 0.5, 0.5], 14, GainRamp::new(1.0, 0.0), WriteMode::Accumulate);

        let out = read_back(&rb, 14, 3);
        assert!((out[0] - 1.5).abs() < 1e-6);
        assert!((out[1] - 1.25).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_accumulate_flushes_denormals() {
        let mut rb = ring(4);
        rb.write(&[1e-25, 0.5], 0, GainRamp::UNITY, WriteMode::Accumulate);

        let out = read_back(&rb, 0, 2);
        assert_eq!(out[0], 0.0, "tiny feedback residue should be flushed");
        assert_eq!(out[1], 0.5);
    }

    #[test]
    fn test_read_is_additive() {
        let mut rb = ring(8);
        rb.write(&[0.25, 0.5], 7, GainRamp::UNITY, WriteMode::Replace);

        let mut dest = [1.0, 2.0];
        rb.read(&mut dest, 7);

        assert_eq!(dest, [1.25, 2.5]);
    }

    #[test]
    fn test_clear() {
        let mut rb = ring(10);
        rb.write(&[0.5; 10], 3, GainRamp::UNITY, WriteMode::Replace);
        rb.clear();

        assert!(read_back(&rb, 0, 10).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_silence_in_silence_out() {
        let rb = ring(100);
        for start in [0, 1, 50, 99, 250] {
            assert!(read_back(&rb, start, 20).iter().all(|&s| s == 0.0));
        }
    }
}
