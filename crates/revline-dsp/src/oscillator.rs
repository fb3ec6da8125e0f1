//! Band-limited oscillators (PolyBLEP).

use std::f64::consts::PI;

use crate::{ProcessBlock, Processor};
use revline_core::Sample;
use revline_graph::{Param, SourceWindow, Waveform};

/// Oscillator source. Silent outside its window; phase starts at 0 on the
/// first sample inside it.
pub struct OscillatorProcessor {
    waveform: Waveform,
    window: Option<SourceWindow>,
    phase: f64,
}

impl OscillatorProcessor {
    pub fn new(waveform: Waveform, window: Option<SourceWindow>) -> Self {
        Self {
            waveform,
            window,
            phase: 0.0,
        }
    }

    /// Generate one sample at `frequency` and advance the phase
    pub fn next_sample(&mut self, frequency: f64, sample_rate: f64) -> f64 {
        // Clamp to Nyquist so the PolyBLEP width stays meaningful
        let inc = (frequency / sample_rate).clamp(-0.5, 0.5);
        let dt = inc.abs().max(f64::EPSILON);
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => sawtooth(self.phase, dt),
            Waveform::Square => square(self.phase, dt),
        };
        self.phase = (self.phase + inc).rem_euclid(1.0);
        sample
    }
}

impl Processor for OscillatorProcessor {
    fn name(&self) -> &'static str {
        "oscillator"
    }

    fn process(&mut self, block: &mut ProcessBlock<'_>) {
        let (Some(window), Some(frequency)) = (self.window, block.param(Param::Frequency)) else {
            block.outputs[0].clear();
            return;
        };

        let frames = block.frames;
        if block.time_at(frames.saturating_sub(1)) < window.start
            || block.time_at(0) >= window.stop
        {
            block.outputs[0].clear();
            return;
        }

        let clock = block.clock();
        let sample_rate = f64::from(clock.sample_rate);
        let out = &mut block.outputs[0];
        for (i, sample) in out.channel_mut(0).iter_mut().enumerate().take(frames) {
            *sample = if window.contains(clock.time_at(i)) {
                self.next_sample(f64::from(frequency[i]), sample_rate) as Sample
            } else {
                0.0
            };
        }
        out.set_channels(1);
    }
}

/// Naive sawtooth with PolyBLEP correction at the wrap
fn sawtooth(phase: f64, dt: f64) -> f64 {
    2.0 * phase - 1.0 - poly_blep(phase, dt)
}

/// Square from two PolyBLEP-corrected edges
fn square(phase: f64, dt: f64) -> f64 {
    let mut value = if phase < 0.5 { 1.0 } else { -1.0 };
    value += poly_blep(phase, dt);
    value -= poly_blep((phase + 0.5) % 1.0, dt);
    value
}

/// PolyBLEP correction. `t` is the phase in [0, 1), `dt` the phase increment.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_period() {
        let mut osc = OscillatorProcessor::new(Waveform::Sine, None);
        // 1 Hz at 4 Hz sample rate: 0, 1, 0, -1
        let samples: Vec<f64> = (0..4).map(|_| osc.next_sample(1.0, 4.0)).collect();
        assert!(samples[0].abs() < 1e-9);
        assert!((samples[1] - 1.0).abs() < 1e-9);
        assert!(samples[2].abs() < 1e-9);
        assert!((samples[3] + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_waveforms_bounded() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Sawtooth,
        ] {
            let mut osc = OscillatorProcessor::new(waveform, None);
            for _ in 0..48000 {
                let s = osc.next_sample(170.0, 48000.0);
                assert!(s.is_finite());
                assert!(s.abs() <= 1.1, "{waveform:?} out of range: {s}");
            }
        }
    }

    #[test]
    fn test_sawtooth_is_zero_mean() {
        let mut osc = OscillatorProcessor::new(Waveform::Sawtooth, None);
        // Whole number of periods: 100 Hz at 48 kHz, 10 periods
        let sum: f64 = (0..4800).map(|_| osc.next_sample(100.0, 48000.0)).sum();
        assert!((sum / 4800.0).abs() < 0.01);
    }

    #[test]
    fn test_negative_frequency_wraps_phase() {
        let mut osc = OscillatorProcessor::new(Waveform::Sine, None);
        for _ in 0..100 {
            assert!(osc.next_sample(-3.0, 48000.0).is_finite());
        }
        assert!((0.0..1.0).contains(&osc.phase));
    }
}
