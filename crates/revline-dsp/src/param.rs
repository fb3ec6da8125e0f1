//! Per-block parameter values.

use smallvec::SmallVec;

use crate::bus::Bus;
use revline_core::{Frames, Sample, SampleRate, frames_to_seconds};
use revline_graph::{NodeId, Param, PerformanceTimeline};

/// The per-sample values of one node parameter for the current block.
///
/// Each sample is the automation curve value (or the intrinsic value when
/// the parameter has no curve) plus the mono signal of every node routed
/// into the parameter.
#[derive(Debug, Clone)]
pub struct ParamLane {
    param: Param,
    intrinsic: Sample,
    curve: Option<usize>,
    modulators: SmallVec<[(NodeId, usize); 2]>,
    values: Vec<Sample>,
}

impl ParamLane {
    pub fn new(param: Param, intrinsic: Sample, curve: Option<usize>, frames: Frames) -> Self {
        Self {
            param,
            intrinsic,
            curve,
            modulators: SmallVec::new(),
            values: vec![intrinsic; frames],
        }
    }

    pub fn param(&self) -> Param {
        self.param
    }

    pub fn values(&self) -> &[Sample] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [Sample] {
        &mut self.values
    }

    /// Route output `output` of `node` into this parameter
    pub fn add_modulator(&mut self, node: NodeId, output: usize) {
        self.modulators.push((node, output));
    }

    /// Compute this block's values
    pub fn fill(
        &mut self,
        timeline: &PerformanceTimeline,
        outputs: &[Vec<Bus>],
        start_frame: u64,
        sample_rate: SampleRate,
    ) {
        match self.curve.and_then(|index| timeline.curves().get(index)) {
            Some(curve) => {
                for (i, value) in self.values.iter_mut().enumerate() {
                    let time = frames_to_seconds(start_frame + i as u64, sample_rate);
                    *value = curve.value_at(time, self.intrinsic);
                }
            }
            None => self.values.fill(self.intrinsic),
        }

        for &(node, output) in &self.modulators {
            let Some(bus) = outputs.get(node).and_then(|ports| ports.get(output)) else {
                continue;
            };
            for (i, value) in self.values.iter_mut().enumerate() {
                *value += bus.mono_sample(i);
            }
        }
    }
}
