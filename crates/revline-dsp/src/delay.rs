//! Delay line with an automatable, fractional delay time.

use crate::renderer::FEEDBACK_INPUT;
use crate::{ProcessBlock, Processor};
use revline_core::{Sample, SampleRate};
use revline_graph::Param;

/// A circular buffer read with linear interpolation
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<Sample>,
    write_pos: usize,
}

impl DelayLine {
    /// A line holding `capacity` samples of history
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(2)],
            write_pos: 0,
        }
    }

    /// Push `input` and return the sample `delay` samples before it.
    /// `delay` is clamped to [1, capacity - 1].
    #[inline]
    pub fn process(&mut self, input: Sample, delay: f64) -> Sample {
        let len = self.buffer.len();
        let delay = delay.clamp(1.0, (len - 1) as f64);
        self.buffer[self.write_pos] = input;

        let whole = delay.floor() as usize;
        let frac = (delay - delay.floor()) as Sample;
        let newer = self.buffer[(self.write_pos + len - whole) % len];
        let older = self.buffer[(self.write_pos + len - whole - 1) % len];

        self.write_pos = (self.write_pos + 1) % len;
        newer + (older - newer) * frac
    }
}

/// Delay node. Stereo lines; the output is stereo once a stereo signal has
/// passed through so the echo tail keeps its width.
///
/// A fed-back signal arrives one block late, so it runs through its own
/// lines with that block taken off the delay. The loop then repeats at the
/// delay time itself, for any delay longer than a block.
pub struct DelayProcessor {
    lines: [DelayLine; 2],
    feedback_lines: [DelayLine; 2],
    sample_rate: f64,
    channels: usize,
}

impl DelayProcessor {
    pub fn new(max_time: f32, sample_rate: SampleRate) -> Self {
        let sample_rate = f64::from(sample_rate);
        let capacity = (f64::from(max_time.max(0.0)) * sample_rate).ceil() as usize + 2;
        Self {
            lines: [DelayLine::new(capacity), DelayLine::new(capacity)],
            feedback_lines: [DelayLine::new(capacity), DelayLine::new(capacity)],
            sample_rate,
            channels: 1,
        }
    }
}

impl Processor for DelayProcessor {
    fn name(&self) -> &'static str {
        "delay"
    }

    fn process(&mut self, block: &mut ProcessBlock<'_>) {
        let Some(time) = block.param(Param::DelayTime) else {
            block.outputs[0].clear();
            return;
        };
        let input = &block.inputs[0];
        let feedback = block.inputs.get(FEEDBACK_INPUT);
        self.channels = self
            .channels
            .max(input.channels())
            .max(feedback.map_or(0, crate::Bus::channels));
        let latency = block.frames as f64;
        let out = &mut block.outputs[0];
        let (left, right) = out.stereo_mut();
        let [line_l, line_r] = &mut self.lines;
        let [feedback_l, feedback_r] = &mut self.feedback_lines;

        for i in 0..block.frames {
            let delay = f64::from(time[i]) * self.sample_rate;
            left[i] = line_l.process(input.channel(0)[i], delay);
            if let Some(fed) = feedback {
                left[i] += feedback_l.process(fed.channel(0)[i], delay - latency);
            }
            if self.channels > 1 {
                right[i] = line_r.process(input.channel(1)[i], delay);
                if let Some(fed) = feedback {
                    right[i] += feedback_r.process(fed.channel(1)[i], delay - latency);
                }
            }
        }
        out.set_channels(self.channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_delay() {
        let mut line = DelayLine::new(16);
        let out: Vec<Sample> = (0..8)
            .map(|i| line.process(if i == 0 { 1.0 } else { 0.0 }, 3.0))
            .collect();
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_fractional_delay_interpolates() {
        let mut line = DelayLine::new(16);
        let out: Vec<Sample> = (0..6)
            .map(|i| line.process(if i == 0 { 1.0 } else { 0.0 }, 2.5))
            .collect();
        assert!((out[2] - 0.5).abs() < 1e-6);
        assert!((out[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_delay_clamps_to_one_sample() {
        let mut line = DelayLine::new(4);
        assert!(line.process(1.0, 0.0).abs() < f32::EPSILON);
        assert!((line.process(0.0, 0.0) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_delay_clamps_to_capacity() {
        let mut line = DelayLine::new(4);
        let out: Vec<Sample> = (0..5)
            .map(|i| line.process(if i == 0 { 1.0 } else { 0.0 }, 100.0))
            .collect();
        // Longest available delay is capacity - 1
        assert!((out[3] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_processor_capacity_covers_max_time() {
        let processor = DelayProcessor::new(1.0, 48000);
        assert!(processor.lines[0].buffer.len() >= 48001);
    }
}
