//! Biquad filter with per-sample cutoff automation.
//!
//! Coefficients from the Audio EQ Cookbook. For lowpass and highpass the Q
//! parameter is a resonance in dB, for bandpass it is the usual linear Q,
//! matching the audio-param conventions the graph is described in.

use std::f64::consts::PI;

use crate::{ProcessBlock, Processor};
use revline_core::{Sample, SampleRate};
use revline_graph::{FilterType, Param};

#[derive(Debug, Clone, Copy, Default)]
struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

/// Direct Form II Transposed state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct State {
    z1: f64,
    z2: f64,
}

impl State {
    #[inline]
    fn process(&mut self, c: &Coefficients, input: f64) -> f64 {
        let output = c.b0 * input + self.z1;
        self.z1 = c.b1 * input - c.a1 * output + self.z2;
        self.z2 = c.b2 * input - c.a2 * output;
        output
    }
}

/// A 2nd-order IIR filter shared by both channels of a bus
#[derive(Debug, Clone)]
pub struct Biquad {
    filter_type: FilterType,
    sample_rate: f64,
    coefficients: Coefficients,
    /// Parameters the coefficients were computed for
    current: Option<(f64, f64)>,
    states: [State; 2],
}

impl Biquad {
    pub fn new(filter_type: FilterType, sample_rate: SampleRate) -> Self {
        Self {
            filter_type,
            sample_rate: f64::from(sample_rate),
            coefficients: Coefficients::default(),
            current: None,
            states: [State::default(); 2],
        }
    }

    /// Recompute coefficients if `frequency` or `q` changed
    pub fn set_params(&mut self, frequency: f64, q: f64) {
        if self.current == Some((frequency, q)) {
            return;
        }
        self.current = Some((frequency, q));

        let nyquist = self.sample_rate / 2.0;
        let frequency = frequency.clamp(1.0, nyquist * 0.999);
        let w0 = 2.0 * PI * frequency / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();

        let (b0, b1, b2, a0, a1, a2) = match self.filter_type {
            FilterType::Lowpass => {
                let alpha = sin_w0 / 2.0 * 10.0_f64.powf(-q / 20.0);
                let b1 = 1.0 - cos_w0;
                let b0 = b1 / 2.0;
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Highpass => {
                let alpha = sin_w0 / 2.0 * 10.0_f64.powf(-q / 20.0);
                let b0 = (1.0 + cos_w0) / 2.0;
                let b1 = -(1.0 + cos_w0);
                (b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::Bandpass => {
                let alpha = sin_w0 / (2.0 * q.max(1e-4));
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
        };

        self.coefficients = Coefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        };
    }

    /// Filter one sample on `channel`
    #[inline]
    pub fn process(&mut self, channel: usize, input: f64) -> f64 {
        self.states[channel].process(&self.coefficients, input)
    }
}

/// Filter node
pub struct FilterProcessor {
    biquad: Biquad,
    /// Widest input seen; keeps the tail of a stereo signal ringing out in stereo
    channels: usize,
}

impl FilterProcessor {
    pub fn new(filter_type: FilterType, sample_rate: SampleRate) -> Self {
        Self {
            biquad: Biquad::new(filter_type, sample_rate),
            channels: 1,
        }
    }
}

impl Processor for FilterProcessor {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn process(&mut self, block: &mut ProcessBlock<'_>) {
        let (Some(frequency), Some(q)) = (block.param(Param::Frequency), block.param(Param::Q))
        else {
            block.outputs[0].clear();
            return;
        };

        let input = &block.inputs[0];
        self.channels = self.channels.max(input.channels());
        let out = &mut block.outputs[0];
        let (left, right) = out.stereo_mut();

        for i in 0..block.frames {
            self.biquad
                .set_params(f64::from(frequency[i]), f64::from(q[i]));
            left[i] = self.biquad.process(0, f64::from(input.channel(0)[i])) as Sample;
            if self.channels > 1 {
                right[i] = self.biquad.process(1, f64::from(input.channel(1)[i])) as Sample;
            }
        }
        out.set_channels(self.channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(biquad: &mut Biquad, input: impl Fn(usize) -> f64, samples: usize) -> f64 {
        let mut max_out = 0.0_f64;
        for i in 0..samples {
            let out = biquad.process(0, input(i));
            if i > samples / 2 {
                max_out = max_out.max(out.abs());
            }
        }
        max_out
    }

    #[test]
    fn test_lowpass_passes_dc() {
        let mut f = Biquad::new(FilterType::Lowpass, 48000);
        f.set_params(2200.0, 0.7);
        let mut output = 0.0;
        for _ in 0..2000 {
            output = f.process(0, 1.0);
        }
        assert!((output - 1.0).abs() < 0.001, "Lowpass should pass DC, got {output}");
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut f = Biquad::new(FilterType::Highpass, 48000);
        f.set_params(1200.0, 1.0);
        let mut output = 1.0;
        for _ in 0..2000 {
            output = f.process(0, 1.0);
        }
        assert!(output.abs() < 0.001, "Highpass should block DC, got {output}");
    }

    #[test]
    fn test_lowpass_attenuates_high_freq() {
        let mut f = Biquad::new(FilterType::Lowpass, 48000);
        f.set_params(400.0, 0.7);
        let max_out = settle(
            &mut f,
            |i| (2.0 * PI * 10000.0 * i as f64 / 48000.0).sin(),
            4800,
        );
        assert!(max_out < 0.01, "Lowpass@400Hz should attenuate 10kHz, got {max_out}");
    }

    #[test]
    fn test_bandpass_peaks_at_center() {
        let mut center = Biquad::new(FilterType::Bandpass, 48000);
        center.set_params(1400.0, 1.2);
        let at_center = settle(
            &mut center,
            |i| (2.0 * PI * 1400.0 * i as f64 / 48000.0).sin(),
            9600,
        );

        let mut off = Biquad::new(FilterType::Bandpass, 48000);
        off.set_params(1400.0, 1.2);
        let off_center = settle(
            &mut off,
            |i| (2.0 * PI * 100.0 * i as f64 / 48000.0).sin(),
            9600,
        );

        assert!((at_center - 1.0).abs() < 0.05, "unity gain at center, got {at_center}");
        assert!(off_center < 0.2, "100Hz should be attenuated, got {off_center}");
    }

    #[test]
    fn test_extreme_cutoff_stays_finite() {
        let mut f = Biquad::new(FilterType::Lowpass, 48000);
        f.set_params(1.0e6, 0.7);
        for i in 0..1000 {
            let out = f.process(0, if i % 50 == 0 { 1.0 } else { 0.0 });
            assert!(out.is_finite());
        }
    }
}
