//! # Loveless Ring Delay: A Block-Based AU/VST3/CLAP Delay Plugin
//!
//! A feedback delay built with [nih-plug](https://github.com/robbert-vdh/nih-plug)
//! around a circular buffer that is written and read one audio block at a
//! time. Outputs Audio Unit (AUv2), VST3 and CLAP formats from a single
//! codebase.
//!
//! ## Signal Flow
//!
//! ```text
//! Input ──┬─────────────────────────────────────────────────────(+)──► Output
//!         │                                                      ▲
//!         ▼                                                      │
//!  [replace at W] ──► [Ring Buffer] ──► read at W - D ──► delayed┤
//!                          ▲                                     │
//!                          │                                     │
//!                          └──(+)── × feedback ramp ◄────────────┘
//! ```
//!
//! ## Threads
//!
//! ```text
//!  host / UI thread                    audio thread
//!  ─────────────────                   ─────────────
//!  PluginParams ─callback─► ParameterBridge ─consume─► DelayEngine
//!   ("Time", "FB")          (atomics only)            (ring buffers)
//! ```
//!
//! The bridge is the only state shared between the two sides. The engine
//! owns its ring buffers outright.

pub mod bridge;
pub mod dsp;
pub mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use bridge::ParameterBridge;
use dsp::engine::DelayEngine;
use nih_plug::prelude::*;
use params::PluginParams;

/// The plugin: parameter store, bridge, and the engine that owns all
/// audio-rate state.
pub struct LovelessRingDelay {
    /// Shared with the host. Every parameter change is forwarded into
    /// `bridge` by a callback registered in [`PluginParams::new`].
    params: Arc<PluginParams>,

    bridge: Arc<ParameterBridge>,

    /// Idle until `initialize()` tells it the sample rate and block size.
    engine: DelayEngine,
}

impl Default for LovelessRingDelay {
    fn default() -> Self {
        let bridge = Arc::new(ParameterBridge::new());

        Self {
            params: Arc::new(PluginParams::new(Arc::clone(&bridge))),
            engine: DelayEngine::new(Arc::clone(&bridge)),
            bridge,
        }
    }
}

impl Plugin for LovelessRingDelay {
    const NAME: &'static str = "Loveless Ring Delay";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "steve.loveless@gmail.com";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first since most DAW tracks are stereo, with a mono fallback.
    // Each channel gets its own ring buffer.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Parameters are consumed once per block, so splitting blocks at
    // automation points would only add overhead.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Called off the audio thread whenever the audio configuration is
    /// set or changes. This is the only place ring buffers are allocated.
    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        _context: &mut impl InitContext<Self>,
    ) -> bool {
        let num_channels = audio_io_layout
            .main_input_channels
            .map(|c| c.get() as usize)
            .unwrap_or(2);
        let max_block_size = buffer_config.max_buffer_size as usize;

        // Host state may have been restored before this point.
        self.params.sync_bridge(&self.bridge);

        if !self
            .engine
            .prepare(buffer_config.sample_rate, max_block_size, num_channels)
        {
            nih_warn!(
                "Rejecting configuration: {} Hz, {} samples per block, {} channels",
                buffer_config.sample_rate,
                max_block_size,
                num_channels
            );
            return false;
        }

        nih_log!(
            "Prepared {} channel(s) at {} Hz: ring capacity {} samples, max block {}",
            num_channels,
            buffer_config.sample_rate,
            self.engine.capacity().unwrap_or(0),
            max_block_size
        );
        true
    }

    /// Called when playback stops or the plugin is bypassed. Clears the
    /// ring buffers so stale echoes don't bleed into the next playback.
    /// Runs on the audio thread, so it must not allocate.
    fn reset(&mut self) {
        self.engine.reset();
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.engine.process_block(buffer.as_slice());

        // Tell the host how long the echoes keep going after the input
        // stops, so it doesn't cut them off.
        match self.engine.tail_samples() {
            Some(tail) => ProcessStatus::Tail(tail),
            None => ProcessStatus::KeepAlive,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Plugin format trait implementations
// ─────────────────────────────────────────────────────────────────────

impl ClapPlugin for LovelessRingDelay {
    const CLAP_ID: &'static str = "com.loveless-audio.loveless-ring-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A block-based ring buffer delay with ramped feedback");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for LovelessRingDelay {
    // `*b"..."` turns a 16-character ASCII literal into the `[u8; 16]`
    // class ID VST3 requires.
    const VST3_CLASS_ID: [u8; 16] = *b"LvlssRingDly_v01";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

// ─────────────────────────────────────────────────────────────────────
// Export macros
// ─────────────────────────────────────────────────────────────────────
//
// nih_export_clap! exports `clap_entry` for CLAP hosts and
// nih_export_vst3! exports `GetPluginFactory` for VST3 hosts.
// clap_wrapper re-exports the CLAP entry point as an AUv2 component.

nih_export_clap!(LovelessRingDelay);
nih_export_vst3!(LovelessRingDelay);

clap_wrapper::export_auv2!();
