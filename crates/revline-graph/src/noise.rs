//! White noise buffers for the noise sources.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use revline_core::{Sample, SampleRate, Seconds};

/// A mono buffer of uniform white noise in [-1, 1].
///
/// Cloning is cheap: the samples are shared. Each call to [`NoiseBuffer::generate`]
/// draws from the RNG it is given, so two buffers built from two RNGs never
/// share state.
#[derive(Clone)]
pub struct NoiseBuffer {
    samples: Arc<[Sample]>,
    sample_rate: SampleRate,
}

impl NoiseBuffer {
    /// Fill `seconds` worth of frames with independent uniform samples
    pub fn generate<R: Rng + ?Sized>(
        sample_rate: SampleRate,
        seconds: Seconds,
        rng: &mut R,
    ) -> Self {
        let len = (seconds * Seconds::from(sample_rate)).round() as usize;
        let samples: Arc<[Sample]> = (0..len).map(|_| rng.gen_range(-1.0..=1.0)).collect();
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    /// Buffer length in seconds
    pub fn duration(&self) -> Seconds {
        self.len() as Seconds / Seconds::from(self.sample_rate)
    }
}

impl fmt::Debug for NoiseBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseBuffer")
            .field("frames", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}
