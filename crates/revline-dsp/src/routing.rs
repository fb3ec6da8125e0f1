//! Channel splitter and merger.

use crate::bus::MAX_CHANNELS;
use crate::{ProcessBlock, Processor};

/// Splits a bus into mono outputs, one per channel.
///
/// A mono input is treated as both left and right, so every output carries
/// the signal. Outputs past the second are silent.
pub struct SplitterProcessor;

impl Processor for SplitterProcessor {
    fn name(&self) -> &'static str {
        "splitter"
    }

    fn process(&mut self, block: &mut ProcessBlock<'_>) {
        let input = &block.inputs[0];
        for (k, out) in block.outputs.iter_mut().enumerate() {
            if input.is_silent() || k >= MAX_CHANNELS {
                out.clear();
                continue;
            }
            out.channel_mut(0).copy_from_slice(input.channel(k));
            out.set_channels(1);
        }
    }
}

/// Merges inputs into one stereo bus: input `k` becomes channel `k`.
/// Each input is downmixed to mono first; inputs past the second are ignored.
pub struct MergerProcessor;

impl Processor for MergerProcessor {
    fn name(&self) -> &'static str {
        "merger"
    }

    fn process(&mut self, block: &mut ProcessBlock<'_>) {
        let inputs = block.inputs;
        let out = &mut block.outputs[0];
        if inputs.iter().all(crate::Bus::is_silent) {
            out.clear();
            return;
        }

        for (k, input) in inputs.iter().enumerate().take(MAX_CHANNELS) {
            for (i, sample) in out.channel_mut(k).iter_mut().enumerate() {
                *sample = input.mono_sample(i);
            }
        }
        if inputs.len() < MAX_CHANNELS {
            out.channel_mut(1).fill(0.0);
        }
        out.set_channels(MAX_CHANNELS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bus;

    fn run(processor: &mut dyn Processor, inputs: &[Bus], outputs: &mut [Bus]) {
        let mut block = ProcessBlock {
            inputs,
            outputs,
            params: &[],
            frames: 4,
            start_frame: 0,
            sample_rate: 48000,
        };
        processor.process(&mut block);
    }

    fn mono(value: f32) -> Bus {
        let mut bus = Bus::new(4);
        bus.set_channels(1);
        bus.channel_mut(0).fill(value);
        bus
    }

    #[test]
    fn test_splitter_upmixes_mono() {
        let inputs = [mono(0.5)];
        let mut outputs = [Bus::new(4), Bus::new(4)];
        run(&mut SplitterProcessor, &inputs, &mut outputs);
        for out in &outputs {
            assert_eq!(out.channels(), 1);
            assert_eq!(out.channel(0), &[0.5; 4]);
        }
    }

    #[test]
    fn test_splitter_separates_stereo() {
        let mut input = Bus::new(4);
        input.set_channels(2);
        input.channel_mut(0).fill(1.0);
        input.channel_mut(1).fill(-1.0);
        let inputs = [input];
        let mut outputs = [Bus::new(4), Bus::new(4), Bus::new(4)];
        run(&mut SplitterProcessor, &inputs, &mut outputs);
        assert_eq!(outputs[0].channel(0), &[1.0; 4]);
        assert_eq!(outputs[1].channel(0), &[-1.0; 4]);
        assert!(outputs[2].is_silent());
    }

    #[test]
    fn test_merger_places_inputs_on_channels() {
        let inputs = [mono(0.25), mono(0.75)];
        let mut outputs = [Bus::new(4)];
        run(&mut MergerProcessor, &inputs, &mut outputs);
        assert_eq!(outputs[0].channels(), 2);
        assert_eq!(outputs[0].channel(0), &[0.25; 4]);
        assert_eq!(outputs[0].channel(1), &[0.75; 4]);
    }

    #[test]
    fn test_merger_silent_when_inputs_silent() {
        let inputs = [Bus::new(4), Bus::new(4)];
        let mut outputs = [Bus::new(4)];
        run(&mut MergerProcessor, &inputs, &mut outputs);
        assert!(outputs[0].is_silent());
    }
}
