//! Feed-forward dynamics compressor.
//!
//! Peak envelope follower with separate attack and release coefficients and a
//! quadratic soft knee. Both channels share one envelope so the stereo image
//! does not shift under gain reduction. There is no makeup gain.

use crate::{ProcessBlock, Processor};
use revline_core::{Sample, SampleRate};
use revline_graph::CompressorSettings;

/// Gain computer and envelope state
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold: f64,
    knee: f64,
    ratio: f64,
    attack_coef: f64,
    release_coef: f64,
    envelope: f64,
}

impl Compressor {
    pub fn new(settings: CompressorSettings, sample_rate: SampleRate) -> Self {
        let sample_rate = f64::from(sample_rate);
        let attack = f64::from(settings.attack).max(1e-4);
        let release = f64::from(settings.release).max(1e-3);
        Self {
            threshold: f64::from(settings.threshold).clamp(-100.0, 0.0),
            knee: f64::from(settings.knee).clamp(0.0, 40.0),
            ratio: f64::from(settings.ratio).clamp(1.0, 20.0),
            attack_coef: (-1.0 / (attack * sample_rate)).exp(),
            release_coef: (-1.0 / (release * sample_rate)).exp(),
            envelope: 0.0,
        }
    }

    #[inline]
    fn linear_to_db(linear: f64) -> f64 {
        if linear <= 0.0 {
            -120.0
        } else {
            20.0 * linear.log10()
        }
    }

    #[inline]
    fn db_to_linear(db: f64) -> f64 {
        10.0_f64.powf(db / 20.0)
    }

    /// Gain change in dB (<= 0) for a level in dB
    pub fn gain_reduction(&self, input_db: f64) -> f64 {
        let slope = 1.0 - 1.0 / self.ratio;
        if self.knee <= 0.0 {
            return if input_db <= self.threshold {
                0.0
            } else {
                (self.threshold - input_db) * slope
            };
        }

        let half_knee = self.knee / 2.0;
        let knee_start = self.threshold - half_knee;
        let knee_end = self.threshold + half_knee;
        if input_db <= knee_start {
            0.0
        } else if input_db >= knee_end {
            (self.threshold - input_db) * slope
        } else {
            let x = (input_db - knee_start) / self.knee;
            -x * x * slope * half_knee
        }
    }

    /// Linear gain for the next frame given its peak level
    #[inline]
    pub fn next_gain(&mut self, level: f64) -> f64 {
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;
        Self::db_to_linear(self.gain_reduction(Self::linear_to_db(self.envelope)))
    }
}

/// Dynamics compressor node
pub struct CompressorProcessor {
    compressor: Compressor,
}

impl CompressorProcessor {
    pub fn new(settings: CompressorSettings, sample_rate: SampleRate) -> Self {
        Self {
            compressor: Compressor::new(settings, sample_rate),
        }
    }
}

impl Processor for CompressorProcessor {
    fn name(&self) -> &'static str {
        "compressor"
    }

    fn process(&mut self, block: &mut ProcessBlock<'_>) {
        let input = &block.inputs[0];
        let out = &mut block.outputs[0];
        let channels = input.channels();
        if channels == 0 {
            // Let the envelope release through silence
            for _ in 0..block.frames {
                self.compressor.next_gain(0.0);
            }
            out.clear();
            return;
        }

        let (left, right) = out.stereo_mut();
        let in_left = input.channel(0);
        let in_right = input.channel(1);
        for i in 0..block.frames {
            let level = f64::from(in_left[i].abs().max(in_right[i].abs()));
            let gain = self.compressor.next_gain(level) as Sample;
            left[i] = in_left[i] * gain;
            right[i] = in_right[i] * gain;
        }
        out.set_channels(channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CompressorSettings {
        CompressorSettings {
            threshold: -18.0,
            knee: 24.0,
            ratio: 3.5,
            attack: 0.003,
            release: 0.15,
        }
    }

    #[test]
    fn test_no_reduction_below_knee() {
        let c = Compressor::new(settings(), 48000);
        // Knee starts at -30 dB
        assert!(c.gain_reduction(-40.0).abs() < f64::EPSILON);
        assert!(c.gain_reduction(-30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_full_ratio_above_knee() {
        let c = Compressor::new(settings(), 48000);
        // 12 dB over threshold at 3.5:1 reduces by 12 * (1 - 1/3.5)
        let expected = -12.0 * (1.0 - 1.0 / 3.5);
        assert!((c.gain_reduction(-6.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_knee_is_continuous() {
        let c = Compressor::new(settings(), 48000);
        let inside = c.gain_reduction(-6.0 - 1e-6);
        let outside = c.gain_reduction(-6.0 + 1e-6);
        assert!((inside - outside).abs() < 1e-3);
        assert!(c.gain_reduction(-18.0) < 0.0);
    }

    #[test]
    fn test_loud_signal_is_reduced() {
        let mut c = Compressor::new(settings(), 48000);
        let mut gain = 1.0;
        for _ in 0..4800 {
            gain = c.next_gain(1.0);
        }
        assert!(gain < 0.5, "0 dBFS should be compressed, gain {gain}");
    }

    #[test]
    fn test_quiet_signal_is_untouched() {
        let mut c = Compressor::new(settings(), 48000);
        let mut gain = 0.0;
        for _ in 0..4800 {
            gain = c.next_gain(0.01);
        }
        assert!((gain - 1.0).abs() < 1e-9);
    }
}
