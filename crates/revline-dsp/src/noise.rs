//! Noise buffer playback.

use crate::{ProcessBlock, Processor};
use revline_graph::{NoiseBuffer, SourceWindow};

/// Plays a [`NoiseBuffer`] from its first sample when the window opens.
/// A one-shot player goes silent once the buffer runs out.
pub struct NoisePlayer {
    buffer: NoiseBuffer,
    looping: bool,
    window: Option<SourceWindow>,
    position: usize,
}

impl NoisePlayer {
    pub fn new(buffer: NoiseBuffer, looping: bool, window: Option<SourceWindow>) -> Self {
        Self {
            buffer,
            looping,
            window,
            position: 0,
        }
    }

    fn next_sample(&mut self) -> f32 {
        let samples = self.buffer.samples();
        if self.position >= samples.len() {
            return 0.0;
        }
        let value = samples[self.position];
        self.position += 1;
        if self.looping && self.position == samples.len() {
            self.position = 0;
        }
        value
    }
}

impl Processor for NoisePlayer {
    fn name(&self) -> &'static str {
        "noise"
    }

    fn process(&mut self, block: &mut ProcessBlock<'_>) {
        let Some(window) = self.window else {
            block.outputs[0].clear();
            return;
        };

        let clock = block.clock();
        let out = &mut block.outputs[0];
        for (i, sample) in out.channel_mut(0).iter_mut().enumerate().take(block.frames) {
            *sample = if window.contains(clock.time_at(i)) {
                self.next_sample()
            } else {
                0.0
            };
        }
        out.set_channels(1);
    }
}
