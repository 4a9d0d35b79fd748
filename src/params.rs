//! # Plugin Parameters
//!
//! The two knobs the host sees. Each has:
//!
//! - A **unique string ID** (`#[id = "..."]`) that the host uses to save
//!   and recall presets and automation. `Time` and `FB` must never
//!   change once published.
//! - A **range** and **default**, taken from the bridge's declared
//!   ranges so the host and the engine can never disagree.
//! - A **change callback** that forwards the new value into the
//!   [`ParameterBridge`]. nih-plug calls it from whichever thread changed
//!   the value; the bridge only does atomic stores, so that is fine.
//!
//! No host-side smoother is attached. The engine smooths at block rate
//! after it picks the values up, and ramps feedback sample by sample.

use std::sync::Arc;

use nih_plug::prelude::*;

use crate::bridge::{ParamRange, ParameterBridge, DELAY_TIME_RANGE, FEEDBACK_RANGE};

/// All user-facing parameters of the delay.
#[derive(Params)]
pub struct PluginParams {
    /// **Delay Time**: distance between the dry signal and the first
    /// echo, 0–2000 ms, default 200 ms.
    #[id = "Time"]
    pub delay_time: FloatParam,

    /// **Feedback**: level of each repeat relative to the previous one.
    /// 0 gives a single echo, 1 repeats forever.
    #[id = "FB"]
    pub feedback: FloatParam,
}

fn linear(range: ParamRange) -> FloatRange {
    FloatRange::Linear {
        min: range.min,
        max: range.max,
    }
}

impl PluginParams {
    /// Declare the parameters and wire their change notifications to
    /// `bridge`.
    pub fn new(bridge: Arc<ParameterBridge>) -> Self {
        let delay_bridge = Arc::clone(&bridge);
        let feedback_bridge = bridge;

        Self {
            delay_time: FloatParam::new(
                "Delay Time",
                DELAY_TIME_RANGE.default,
                linear(DELAY_TIME_RANGE),
            )
            .with_unit(" ms")
            .with_step_size(0.1)
            .with_callback(Arc::new(move |value| {
                delay_bridge.set_delay_time_ms(value)
            })),

            feedback: FloatParam::new("Feedback", FEEDBACK_RANGE.default, linear(FEEDBACK_RANGE))
                .with_unit("%")
                .with_step_size(0.01)
                .with_value_to_string(formatters::v2s_f32_percentage(0))
                .with_string_to_value(formatters::s2v_f32_percentage())
                .with_callback(Arc::new(move |value| {
                    feedback_bridge.set_feedback_gain(value)
                })),
        }
    }

    /// Copy the store's current values into `bridge`. Used after
    /// (re)initialization, when the host may have restored state before
    /// anything was listening.
    pub fn sync_bridge(&self, bridge: &ParameterBridge) {
        bridge.set_delay_time_ms(self.delay_time.value());
        bridge.set_feedback_gain(self.feedback.value());
    }
}
