//! # Delay Engine
//!
//! Block-based feedback delay built on [`RingBuffer`]. Where a per-sample
//! delay line reads, writes and advances once per sample, this engine
//! moves a whole block through the ring at a time:
//!
//! ```text
//!            write cursor W                 read cursor R = W - D (mod C)
//!                 │                                 │
//!   input ──► [1] replace at W ─────────────────────┤
//!                                                   ▼
//!   output ◄─ input + ◄── [2] read D samples back ── ring
//!                                   │
//!                                   ▼
//!             [3] add delayed × feedback ramp at W (next cycle's echo)
//!                                   │
//!                                   ▼
//!             [4] W += block length (mod C)
//! ```
//!
//! After step 3 the ring holds `input + g * delayed` at the positions
//! just written, so an impulse comes back after `D` samples at full
//! level, then `g`, `g²`, `g³`… every further `D` samples.
//!
//! ## Capacity
//!
//! The ring has to hold the longest delay plus one block: while a block
//! is written at `W..W+B`, samples as old as `W - D` are still needed.
//! Capacity is therefore `ceil(2.1 s * sample_rate) + max_block_size`
//! (2000 ms maximum plus 100 ms of headroom), and the delay is clamped to
//! `capacity - max_block_size` so the two regions can never overlap.
//!
//! ## Short Delays
//!
//! When the delay is shorter than a block, part of the read region is
//! the block being written right now, whose feedback has not been added
//! yet. Blocks are therefore processed in chunks of at most `D` samples,
//! which keeps every echo of every generation exact.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;

use nih_plug::nih_debug_assert;
use nih_plug::prelude::{Smoother, SmoothingStyle};
use no_denormals::no_denormals;

use super::ring_buffer::{GainRamp, RingBuffer, WriteMode};
use crate::bridge::{ParamSnapshot, ParameterBridge, DELAY_TIME_RANGE};

/// Longest delay the engine is sized for.
pub const MAX_DELAY_MS: f32 = DELAY_TIME_RANGE.max;

/// Extra ring space beyond the maximum delay.
const HEADROOM_MS: f32 = 100.0;

/// Block-rate smoothing times. Delay time moves the read cursor and is
/// smoothed longer than feedback, which is already ramped per sample.
const DELAY_SMOOTHING_MS: f32 = 50.0;
const FEEDBACK_SMOOTHING_MS: f32 = 20.0;

/// Feedback below this is treated as "single echo" for tail reporting.
const MIN_AUDIBLE_FEEDBACK: f32 = 0.001;

/// Convert a delay time in milliseconds to a whole number of samples.
///
/// ```text
/// delay_samples = round(sample_rate * delay_ms / 1000)
/// ```
///
/// At 48 kHz: 200 ms → 9600 samples, 2000 ms → 96000 samples.
pub fn delay_samples_for(delay_ms: f32, sample_rate: f32) -> usize {
    (sample_rate * delay_ms / 1000.0).round().max(0.0) as usize
}

/// Ring capacity per channel for a sample rate and maximum block size.
pub fn capacity_for(sample_rate: f32, max_block_size: usize) -> usize {
    let delay_region = ((MAX_DELAY_MS + HEADROOM_MS) * sample_rate / 1000.0).ceil() as usize;
    delay_region + max_block_size
}

struct Channel {
    ring: RingBuffer,
    /// Holds the delayed signal of the current chunk between the read
    /// and the feedback write. Sized to `max_block_size` in `prepare`.
    scratch: Box<[f32]>,
}

/// Everything that only exists once the host has told us the sample
/// rate and block size.
struct Prepared {
    sample_rate: f32,
    max_block_size: usize,
    capacity: usize,
    max_delay_samples: usize,
    channels: Vec<Channel>,

    write_cursor: usize,
    delay_samples: usize,
    feedback_gain: f32,
    /// Feedback used by the previous block; the next block ramps from here.
    last_feedback_gain: f32,

    delay_smoother: Smoother<f32>,
    feedback_smoother: Smoother<f32>,
}

enum EngineState {
    Idle,
    Prepared(Prepared),
}

/// The real-time half of the delay effect.
///
/// Starts out idle. [`prepare()`](Self::prepare) allocates the ring
/// buffers; after that, [`process_block()`](Self::process_block) never
/// allocates, locks or blocks.
pub struct DelayEngine {
    bridge: Arc<ParameterBridge>,
    state: EngineState,
}

impl DelayEngine {
    pub fn new(bridge: Arc<ParameterBridge>) -> Self {
        Self {
            bridge,
            state: EngineState::Idle,
        }
    }

    pub fn bridge(&self) -> &Arc<ParameterBridge> {
        &self.bridge
    }

    /// Size the ring buffers for a sample rate, maximum block size and
    /// channel count, and reset all playback state.
    ///
    /// May be called again at any time (e.g. on a sample rate change);
    /// everything is re-derived and the cursors restart at zero. Returns
    /// `false` for a configuration the engine cannot run with, in which
    /// case the previous state is kept.
    pub fn prepare(&mut self, sample_rate: f32, max_block_size: usize, num_channels: usize) -> bool {
        let valid_rate = sample_rate.is_finite() && sample_rate > 0.0;
        if !valid_rate || max_block_size == 0 || num_channels == 0 {
            return false;
        }

        let capacity = capacity_for(sample_rate, max_block_size);
        let Some(ring_len) = NonZeroUsize::new(capacity) else {
            return false;
        };

        let channels = (0..num_channels)
            .map(|_| Channel {
                ring: RingBuffer::new(ring_len),
                scratch: vec![0.0; max_block_size].into_boxed_slice(),
            })
            .collect();

        let mut prepared = Prepared {
            sample_rate,
            max_block_size,
            capacity,
            max_delay_samples: (capacity - max_block_size).min(capacity - 1),
            channels,
            write_cursor: 0,
            delay_samples: 0,
            feedback_gain: 0.0,
            last_feedback_gain: 0.0,
            delay_smoother: Smoother::new(SmoothingStyle::Linear(DELAY_SMOOTHING_MS)),
            feedback_smoother: Smoother::new(SmoothingStyle::Linear(FEEDBACK_SMOOTHING_MS)),
        };
        prepared.snap_to(self.bridge.take_snapshot());

        self.state = EngineState::Prepared(prepared);
        true
    }

    /// Silence the delay line and restart the cursors without
    /// reallocating. Parameters jump straight to the bridge's current
    /// values. Does nothing before `prepare`.
    pub fn reset(&mut self) {
        if let EngineState::Prepared(state) = &mut self.state {
            for channel in &mut state.channels {
                channel.ring.clear();
                channel.scratch.fill(0.0);
            }
            state.write_cursor = 0;
            state.snap_to(self.bridge.take_snapshot());
        }
    }

    /// Process one block in place. `channels` holds one slice per
    /// channel, all the same length.
    ///
    /// # Panics
    ///
    /// If called before [`prepare()`](Self::prepare). A correctly
    /// integrated host can never do this.
    pub fn process_block(&mut self, channels: &mut [&mut [f32]]) {
        let EngineState::Prepared(state) = &mut self.state else {
            panic!("DelayEngine::process_block called before prepare");
        };
        let bridge = &self.bridge;

        no_denormals(|| state.process(bridge, channels));
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self.state, EngineState::Prepared(_))
    }

    fn prepared(&self) -> Option<&Prepared> {
        match &self.state {
            EngineState::Prepared(state) => Some(state),
            EngineState::Idle => None,
        }
    }

    pub fn sample_rate(&self) -> Option<f32> {
        self.prepared().map(|s| s.sample_rate)
    }

    /// Ring length per channel, in samples.
    pub fn capacity(&self) -> Option<usize> {
        self.prepared().map(|s| s.capacity)
    }

    pub fn num_channels(&self) -> usize {
        self.prepared().map_or(0, |s| s.channels.len())
    }

    pub fn write_cursor(&self) -> Option<usize> {
        self.prepared().map(|s| s.write_cursor)
    }

    /// Where the next block will be read from: `(W - D) mod C`.
    pub fn read_cursor(&self) -> Option<usize> {
        self.prepared().map(Prepared::read_cursor)
    }

    /// The delay currently in effect, in samples.
    pub fn delay_samples(&self) -> Option<usize> {
        self.prepared().map(|s| s.delay_samples)
    }

    /// Largest delay, in samples, the current ring can serve.
    pub fn max_delay_samples(&self) -> Option<usize> {
        self.prepared().map(|s| s.max_delay_samples)
    }

    /// The feedback gain applied at the end of the last block.
    pub fn feedback_gain(&self) -> Option<f32> {
        self.prepared().map(|s| s.feedback_gain)
    }

    /// How many samples the output keeps ringing after the input goes
    /// silent, until the echoes decay to -60 dB. `None` means forever
    /// (feedback at unity).
    ///
    /// Each repeat is `feedback` times the previous one, so after `N`
    /// repeats the level is `feedback^N`. Solving `feedback^N = 0.001`:
    ///
    /// ```text
    /// N = log10(0.001) / log10(feedback) = -3 / log10(feedback)
    /// ```
    pub fn tail_samples(&self) -> Option<u32> {
        let Some(state) = self.prepared() else {
            return Some(0);
        };
        let delay = state.delay_samples as f32;
        let feedback = state.feedback_gain;

        if feedback >= 1.0 {
            None
        } else if feedback > MIN_AUDIBLE_FEEDBACK {
            let repeats = -3.0 / feedback.log10();
            Some((repeats * delay) as u32)
        } else {
            Some(delay as u32)
        }
    }
}

impl Prepared {
    fn snap_to(&mut self, snapshot: ParamSnapshot) {
        self.delay_smoother.reset(snapshot.delay_time_ms);
        self.feedback_smoother.reset(snapshot.feedback_gain);
        self.delay_samples =
            self.clamp_delay(delay_samples_for(snapshot.delay_time_ms, self.sample_rate));
        self.feedback_gain = snapshot.feedback_gain;
        self.last_feedback_gain = snapshot.feedback_gain;
    }

    fn clamp_delay(&self, delay_samples: usize) -> usize {
        delay_samples.min(self.max_delay_samples)
    }

    fn read_cursor(&self) -> usize {
        (self.write_cursor + self.capacity - self.delay_samples) % self.capacity
    }

    fn process(&mut self, bridge: &ParameterBridge, channels: &mut [&mut [f32]]) {
        nih_debug_assert!(
            channels.len() <= self.channels.len(),
            "got {} channels, prepared for {}",
            channels.len(),
            self.channels.len()
        );
        let block_len = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        if block_len == 0 {
            return;
        }

        // Parameters are picked up once per block and then smoothed at
        // block rate.
        if let Some(snapshot) = bridge.consume_if_dirty() {
            self.delay_smoother.set_target(self.sample_rate, snapshot.delay_time_ms);
            self.feedback_smoother.set_target(self.sample_rate, snapshot.feedback_gain);
        }
        let steps = u32::try_from(block_len).unwrap_or(u32::MAX);
        let delay_ms = self.delay_smoother.next_step(steps);
        self.feedback_gain = self.feedback_smoother.next_step(steps);
        self.delay_samples = self.clamp_delay(delay_samples_for(delay_ms, self.sample_rate));

        let block_ramp = GainRamp::new(self.last_feedback_gain, self.feedback_gain);
        let chunk_limit = match self.delay_samples {
            0 => self.max_block_size,
            delay => delay.min(self.max_block_size),
        };

        let mut offset = 0;
        while offset < block_len {
            let len = chunk_limit.min(block_len - offset);
            let ramp = GainRamp::new(
                block_ramp.gain_at(offset, block_len),
                block_ramp.gain_at(offset + len - 1, block_len),
            );
            self.process_chunk(channels, offset..offset + len, ramp);
            offset += len;
        }

        self.last_feedback_gain = self.feedback_gain;
    }

    fn process_chunk(&mut self, channels: &mut [&mut [f32]], range: Range<usize>, ramp: GainRamp) {
        let len = range.len();
        let write_cursor = self.write_cursor;
        let read_cursor = self.read_cursor();

        for (io, channel) in channels.iter_mut().zip(self.channels.iter_mut()) {
            let block = &mut io[range.clone()];

            // Fresh input enters the delay line.
            channel.ring.write(block, write_cursor, GainRamp::UNITY, WriteMode::Replace);

            let delayed = &mut channel.scratch[..len];
            delayed.fill(0.0);
            channel.ring.read(delayed, read_cursor);
            for (out, &d) in block.iter_mut().zip(delayed.iter()) {
                *out += d;
            }

            // Feedback: the echo goes back in on top of the input.
            channel.ring.write(delayed, write_cursor, ramp, WriteMode::Accumulate);
        }

        self.write_cursor = (write_cursor + len) % self.capacity;
    }
}

// ─────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────
