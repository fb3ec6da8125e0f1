//! Automation scheduler: the ten-second rev, anchored at an origin instant.
//!
//! Three phases: ramp-up (0 to 3.5 s), hold with flutter (3.5 to 6.5 s), then
//! a glide down and cut (6.5 to 10 s). Every time below is an offset from t0.

use crate::builder::PerformanceGraph;
use revline_core::performance::DURATION;
use revline_core::{Result, Seconds};
use revline_graph::{AutomationCurve, NodeId, Param, ParamRef, PerformanceTimeline, TimelineBuilder};

const RAMP_END: Seconds = 3.5;
const HOLD_END: Seconds = 6.5;

/// Whoosh burst: silent until it opens, then a quick swell and decay
const WHOOSH_START: Seconds = 7.6;
const WHOOSH_STOP: Seconds = 9.0;

/// Lay the performance's curves and source windows over `perf`, starting at `t0`
pub fn schedule(perf: &PerformanceGraph, t0: Seconds) -> Result<PerformanceTimeline> {
    let v = &perf.voices;
    let mut timeline = TimelineBuilder::new(t0, DURATION);
    let at = |offset: Seconds| t0 + offset;
    let param = |node: NodeId, param: Param| AutomationCurve::new(ParamRef::new(node, param));

    // Engine pitch: exponential climb, then vibrato carries it
    let mut curve = param(v.engine.source, Param::Frequency);
    curve
        .set_value_at(55.0, at(0.0))?
        .exponential_ramp_to(170.0, at(RAMP_END))?;
    timeline.curve(curve)?;

    let mut curve = param(v.engine.filter, Param::Frequency);
    curve
        .set_value_at(400.0, at(0.0))?
        .exponential_ramp_to(2200.0, at(RAMP_END))?
        .linear_ramp_to(2600.0, at(HOLD_END))?
        .linear_ramp_to(1200.0, at(9.7))?;
    timeline.curve(curve)?;

    let mut curve = param(v.engine.gain, Param::Gain);
    curve
        .set_value_at(0.0, at(0.0))?
        .linear_ramp_to(0.65, at(0.6))?
        .linear_ramp_to(0.8, at(RAMP_END))?
        .linear_ramp_to(0.7, at(HOLD_END))?
        .linear_ramp_to(0.0, at(DURATION))?;
    timeline.curve(curve)?;

    let mut curve = param(v.exhaust.source, Param::Frequency);
    curve
        .set_value_at(110.0, at(0.0))?
        .linear_ramp_to(220.0, at(RAMP_END))?
        .linear_ramp_to(260.0, at(HOLD_END))?
        .linear_ramp_to(80.0, at(9.8))?;
    timeline.curve(curve)?;

    let mut curve = param(v.exhaust.gain, Param::Gain);
    curve
        .set_value_at(0.0, at(0.0))?
        .linear_ramp_to(0.35, at(0.5))?
        .linear_ramp_to(0.45, at(RAMP_END))?
        .linear_ramp_to(0.4, at(HOLD_END))?
        .linear_ramp_to(0.0, at(DURATION))?;
    timeline.curve(curve)?;

    let mut curve = param(v.intake.gain, Param::Gain);
    curve
        .set_value_at(0.0, at(0.0))?
        .linear_ramp_to(0.18, at(0.7))?
        .linear_ramp_to(0.3, at(RAMP_END))?
        .linear_ramp_to(0.24, at(HOLD_END))?
        .linear_ramp_to(0.0, at(DURATION))?;
    timeline.curve(curve)?;

    // Held at 0 up to the burst so the ramp starts from silence
    let mut curve = param(v.whoosh.gain, Param::Gain);
    curve
        .set_value_at(0.0, at(0.0))?
        .set_value_at(0.0, at(WHOOSH_START))?
        .linear_ramp_to(0.6, at(7.65))?
        .linear_ramp_to(0.0, at(8.2))?;
    timeline.curve(curve)?;

    let mut curve = param(v.bus.reverb_mix, Param::Gain);
    curve
        .set_value_at(0.18, at(0.0))?
        .linear_ramp_to(0.0, at(DURATION))?;
    timeline.curve(curve)?;

    for source in [
        v.engine.source,
        v.exhaust.source,
        v.intake.source,
        v.vibrato.lfo,
    ] {
        timeline.window(source, at(0.0), at(DURATION))?;
    }
    timeline.window(v.whoosh.source, at(WHOOSH_START), at(WHOOSH_STOP))?;

    let timeline = timeline.build(&perf.graph)?;
    tracing::debug!(
        "Scheduled performance at t0 = {:.3}s ({} curves, ends {:.3}s)",
        t0,
        timeline.curves().len(),
        timeline.end()
    );
    Ok(timeline)
}
