//! # Parameter Bridge
//!
//! The host's parameter store lives on the control side: the UI thread,
//! the host's automation thread, preset loading. The delay engine lives
//! on the audio thread. This module is the only state the two share.
//!
//! ```text
//!   host / UI thread                         audio thread
//!  ───────────────────                      ──────────────
//!   FloatParam callback                       process_block()
//!        │                                         │
//!        ▼                                         ▼
//!   set_delay_time_ms(x) ──► [AtomicParam] ──► consume_if_dirty()
//!   set_feedback_gain(x) ──► [AtomicParam]        │
//!                     └────► [dirty flag] ────────┘
//! ```
//!
//! Every field is a single atomic scalar. Setters clamp, store the value
//! and then raise the dirty flag; the audio thread swaps the flag back
//! down and loads the values. Nothing here can block, so the audio
//! thread never waits on the control side.
//!
//! ## Ordering
//!
//! The dirty flag is raised with `Release` after the value store and
//! taken with `Acquire` before the value loads, so a reader that sees
//! the flag also sees the value that raised it. If a setter races with
//! the reader, the reader may pick up the newer value early and the flag
//! stays raised; the next block then consumes the same value again,
//! which is harmless.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Declared range and default of one continuous parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParamRange {
    /// Clamp `value` into the range. NaN has no meaningful position in
    /// the range and yields `None`; infinities clamp to the ends.
    pub fn clamp(&self, value: f32) -> Option<f32> {
        if value.is_nan() {
            None
        } else {
            Some(value.clamp(self.min, self.max))
        }
    }
}

/// Delay time in milliseconds.
pub const DELAY_TIME_RANGE: ParamRange = ParamRange {
    min: 0.0,
    max: 2000.0,
    default: 200.0,
};

/// Feedback gain, linear.
pub const FEEDBACK_RANGE: ParamRange = ParamRange {
    min: 0.0,
    max: 1.0,
    default: 0.0,
};

/// A lock-free `f32` stored as its bit pattern in an `AtomicU32`.
#[derive(Debug)]
struct AtomicParam {
    bits: AtomicU32,
    range: ParamRange,
}

impl AtomicParam {
    fn new(range: ParamRange) -> Self {
        Self {
            bits: AtomicU32::new(range.default.to_bits()),
            range,
        }
    }

    /// Returns `false` when the value was rejected.
    #[inline]
    fn set(&self, value: f32) -> bool {
        match self.range.clamp(value) {
            Some(clamped) => {
                self.bits.store(clamped.to_bits(), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    #[inline]
    fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// The parameter values the engine works from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub delay_time_ms: f32,
    pub feedback_gain: f32,
}

/// Thread-safe handoff of the two delay parameters from the control side
/// to the audio thread.
#[derive(Debug)]
pub struct ParameterBridge {
    delay_time_ms: AtomicParam,
    feedback_gain: AtomicParam,
    dirty: AtomicBool,
}

impl Default for ParameterBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterBridge {
    /// A bridge holding the declared defaults. It starts out dirty so
    /// the first block picks the defaults up.
    pub fn new() -> Self {
        Self {
            delay_time_ms: AtomicParam::new(DELAY_TIME_RANGE),
            feedback_gain: AtomicParam::new(FEEDBACK_RANGE),
            dirty: AtomicBool::new(true),
        }
    }

    /// Control side: set the delay time, clamped to 0–2000 ms.
    pub fn set_delay_time_ms(&self, value: f32) {
        if self.delay_time_ms.set(value) {
            self.mark_dirty();
        }
    }

    /// Control side: set the feedback gain, clamped to 0–1.
    pub fn set_feedback_gain(&self, value: f32) {
        if self.feedback_gain.set(value) {
            self.mark_dirty();
        }
    }

    /// Flag the snapshot as changed. This is what the host store's change
    /// notification ultimately does.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// The current values, leaving the dirty flag alone.
    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            delay_time_ms: self.delay_time_ms.get(),
            feedback_gain: self.feedback_gain.get(),
        }
    }

    /// The current values, clearing the dirty flag.
    pub fn take_snapshot(&self) -> ParamSnapshot {
        self.dirty.swap(false, Ordering::Acquire);
        self.snapshot()
    }

    /// Audio side: the latest values if anything changed since the last
    /// time they were consumed, `None` otherwise. Never blocks.
    #[inline]
    pub fn consume_if_dirty(&self) -> Option<ParamSnapshot> {
        if self.dirty.swap(false, Ordering::Acquire) {
            Some(self.snapshot())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_defaults_are_pending_on_construction() {
        let bridge = ParameterBridge::new();

        assert!(bridge.is_dirty());
        assert_eq!(
            bridge.consume_if_dirty(),
            Some(ParamSnapshot {
                delay_time_ms: 200.0,
                feedback_gain: 0.0,
            })
        );
        assert_eq!(bridge.consume_if_dirty(), None);
    }

    #[test]
    fn test_setters_clamp_to_declared_ranges() {
        let bridge = ParameterBridge::new();

        bridge.set_delay_time_ms(5000.0);
        bridge.set_feedback_gain(-0.5);
        let snap = bridge.snapshot();
        assert_eq!(snap.delay_time_ms, 2000.0);
        assert_eq!(snap.feedback_gain, 0.0);

        bridge.set_delay_time_ms(f32::NEG_INFINITY);
        bridge.set_feedback_gain(f32::INFINITY);
        let snap = bridge.snapshot();
        assert_eq!(snap.delay_time_ms, 0.0);
        assert_eq!(snap.feedback_gain, 1.0);
    }

    #[test]
    fn test_nan_is_ignored() {
        let bridge = ParameterBridge::new();
        bridge.set_feedback_gain(0.25);
        bridge.take_snapshot();

        bridge.set_feedback_gain(f32::NAN);
        bridge.set_delay_time_ms(f32::NAN);

        assert!(!bridge.is_dirty(), "rejected values must not raise the flag");
        assert_eq!(bridge.snapshot().feedback_gain, 0.25);
        assert_eq!(bridge.snapshot().delay_time_ms, 200.0);
    }

    #[test]
    fn test_consume_only_reports_changes_once() {
        let bridge = ParameterBridge::new();
        bridge.take_snapshot();
        assert_eq!(bridge.consume_if_dirty(), None);

        bridge.set_delay_time_ms(750.0);
        let snap = bridge.consume_if_dirty().expect("change should be reported");
        assert_eq!(snap.delay_time_ms, 750.0);
        assert_eq!(bridge.consume_if_dirty(), None);
    }

    #[test]
    fn test_snapshot_does_not_clear_dirty() {
        let bridge = ParameterBridge::new();
        bridge.snapshot();
        assert!(bridge.is_dirty());

        bridge.take_snapshot();
        assert!(!bridge.is_dirty());
    }

    /// A writer thread hammers the bridge while the reader keeps
    /// consuming. Every consumed value must be one the writer actually
    /// stored, and the final value must be observed.
    #[test]
    fn test_concurrent_updates_are_never_torn() {
        let bridge = Arc::new(ParameterBridge::new());
        bridge.take_snapshot();

        let writer = {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                for i in 0..=1000 {
                    bridge.set_delay_time_ms(i as f32);
                    bridge.set_feedback_gain(i as f32 / 1000.0);
                }
            })
        };

        let mut last = None;
        while !writer.is_finished() {
            if let Some(snap) = bridge.consume_if_dirty() {
                assert_eq!(snap.delay_time_ms.fract(), 0.0);
                assert!((0.0..=1000.0).contains(&snap.delay_time_ms));
                assert!((0.0..=1.0).contains(&snap.feedback_gain));
                last = Some(snap);
            }
        }
        writer.join().unwrap();
        if let Some(snap) = bridge.consume_if_dirty() {
            last = Some(snap);
        }

        let last = last.expect("at least one update should be seen");
        assert_eq!(last.delay_time_ms, 1000.0);
        assert_eq!(last.feedback_gain, 1.0);
    }
}
