//! # DSP (Digital Signal Processing) Primitives
//!
//! - **`ring_buffer`**: fixed-capacity circular sample storage with
//!   wrap-safe block writes (optionally gain-ramped) and additive block
//!   reads.
//!
//! - **`engine`**: the block-based delay engine. Owns one ring buffer per
//!   channel and runs the write → read → feedback → advance cycle once
//!   per audio block.

pub mod engine;
pub mod ring_buffer;

/// Magnitudes below this are treated as silence in the feedback path.
const DENORMAL_THRESHOLD: f32 = 1e-20;

/// Flush a sample to exactly zero once it has decayed below audibility.
///
/// A feedback loop decays geometrically and would otherwise spend a long
/// time in the subnormal range, where many CPUs fall off a performance
/// cliff. Hardware flush-to-zero is not available everywhere, so the
/// feedback write path also does it in software.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < DENORMAL_THRESHOLD {
        0.0
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_denormal() {
        assert_eq!(flush_denormal(1.0), 1.0);
        assert_eq!(flush_denormal(-0.5), -0.5);
        assert_eq!(flush_denormal(1e-10), 1e-10);

        assert_eq!(flush_denormal(1e-21), 0.0);
        assert_eq!(flush_denormal(-1e-21), 0.0);
        assert_eq!(flush_denormal(f32::MIN_POSITIVE / 2.0), 0.0);
        assert_eq!(flush_denormal(0.0), 0.0);
    }
}
