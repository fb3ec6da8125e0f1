//! Gain node - per-sample volume.

use crate::{ProcessBlock, Processor};
use revline_graph::Param;

/// Multiplies the input by the automated `gain` parameter.
///
/// Output has the same channel count as the input; a silent input stays silent.
pub struct GainProcessor;

impl Processor for GainProcessor {
    fn name(&self) -> &'static str {
        "gain"
    }

    fn process(&mut self, block: &mut ProcessBlock<'_>) {
        let Some(gain) = block.param(Param::Gain) else {
            block.outputs[0].clear();
            return;
        };
        let input = &block.inputs[0];
        let out = &mut block.outputs[0];
        if input.is_silent() {
            out.clear();
            return;
        }

        let channels = input.channels();
        for ch in 0..channels {
            let source = input.channel(ch);
            for ((o, &s), &g) in out.channel_mut(ch).iter_mut().zip(source).zip(gain) {
                *o = s * g;
            }
        }
        out.set_channels(channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bus, ParamLane};

    #[test]
    fn test_gain_scales_per_sample() {
        let frames = 4;
        let mut input = Bus::new(frames);
        input.set_channels(2);
        input.channel_mut(0).fill(1.0);
        input.channel_mut(1).fill(-0.5);

        let mut lane = ParamLane::new(Param::Gain, 0.5, None, frames);
        lane.values_mut().copy_from_slice(&[0.0, 0.25, 0.5, 1.0]);

        let inputs = [input];
        let params = [lane];
        let mut outputs = [Bus::new(frames)];
        let mut block = ProcessBlock {
            inputs: &inputs,
            outputs: &mut outputs,
            params: &params,
            frames,
            start_frame: 0,
            sample_rate: 48000,
        };
        GainProcessor.process(&mut block);

        assert_eq!(outputs[0].channels(), 2);
        assert_eq!(outputs[0].channel(0), &[0.0, 0.25, 0.5, 1.0]);
        assert_eq!(outputs[0].channel(1), &[0.0, -0.125, -0.25, -0.5]);
    }

    #[test]
    fn test_silent_input_stays_silent() {
        let frames = 4;
        let inputs = [Bus::new(frames)];
        let params = [ParamLane::new(Param::Gain, 1.0, None, frames)];
        let mut outputs = [Bus::new(frames)];
        let mut block = ProcessBlock {
            inputs: &inputs,
            outputs: &mut outputs,
            params: &params,
            frames,
            start_frame: 0,
            sample_rate: 48000,
        };
        GainProcessor.process(&mut block);
        assert!(outputs[0].is_silent());
    }
}
