//! Block-sized signal buses carrying up to two channels.

use revline_core::{ChannelCount, Frames, Sample};

/// Maximum channels a bus carries (stereo)
pub const MAX_CHANNELS: ChannelCount = 2;

/// One block of audio on a node port.
///
/// `channels` is 0 for a bus nothing has written to (silence), 1 for mono,
/// 2 for stereo. Mixing mono into stereo copies the mono signal to both
/// sides; reading a mono bus as stereo does the same.
#[derive(Debug, Clone)]
pub struct Bus {
    channels: ChannelCount,
    data: [Vec<Sample>; MAX_CHANNELS],
}

impl Bus {
    /// Allocate a silent bus of `frames` samples per channel
    pub fn new(frames: Frames) -> Self {
        Self {
            channels: 0,
            data: [vec![0.0; frames], vec![0.0; frames]],
        }
    }

    pub fn channels(&self) -> ChannelCount {
        self.channels
    }

    pub fn len(&self) -> Frames {
        self.data[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.data[0].is_empty()
    }

    /// Nothing has been written since the last clear
    pub fn is_silent(&self) -> bool {
        self.channels == 0
    }

    /// Zero the samples and mark the bus silent
    pub fn clear(&mut self) {
        for channel in &mut self.data {
            channel.fill(0.0);
        }
        self.channels = 0;
    }

    /// Declare how many channels the next write produces (clamped to stereo)
    pub fn set_channels(&mut self, channels: ChannelCount) {
        self.channels = channels.min(MAX_CHANNELS);
    }

    /// Read a channel. A mono bus reads the same data on both sides.
    pub fn channel(&self, channel: usize) -> &[Sample] {
        if self.channels >= MAX_CHANNELS {
            &self.data[channel.min(MAX_CHANNELS - 1)]
        } else {
            &self.data[0]
        }
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [Sample] {
        &mut self.data[channel.min(MAX_CHANNELS - 1)]
    }

    /// Both channel buffers at once
    pub fn stereo_mut(&mut self) -> (&mut [Sample], &mut [Sample]) {
        let [left, right] = &mut self.data;
        (left.as_mut_slice(), right.as_mut_slice())
    }

    /// Mono downmix of one frame
    #[inline]
    pub fn mono_sample(&self, frame: usize) -> Sample {
        match self.channels {
            0 => 0.0,
            1 => self.data[0][frame],
            _ => 0.5 * (self.data[0][frame] + self.data[1][frame]),
        }
    }

    /// Add another bus into this one (additive mixing, mono up-mixed to stereo)
    pub fn mix_from(&mut self, source: &Self) {
        let [left, right] = &mut self.data;
        match (self.channels, source.channels) {
            (_, 0) => {}
            (0, channels) => {
                left.copy_from_slice(&source.data[0]);
                if channels >= MAX_CHANNELS {
                    right.copy_from_slice(&source.data[1]);
                }
                self.channels = channels;
            }
            (1, 1) => add_into(left, &source.data[0]),
            (1, _) => {
                right.copy_from_slice(left);
                add_into(left, &source.data[0]);
                add_into(right, &source.data[1]);
                self.channels = MAX_CHANNELS;
            }
            (_, 1) => {
                add_into(left, &source.data[0]);
                add_into(right, &source.data[0]);
            }
            (_, _) => {
                add_into(left, &source.data[0]);
                add_into(right, &source.data[1]);
            }
        }
    }

    /// Largest absolute sample across the active channels
    pub fn peak(&self) -> Sample {
        self.data[..self.channels]
            .iter()
            .flat_map(|channel| channel.iter())
            .fold(0.0_f32, |max, &s| max.max(s.abs()))
    }
}

#[inline]
fn add_into(dest: &mut [Sample], source: &[Sample]) {
    for (d, &s) in dest.iter_mut().zip(source) {
        *d += s;
    }
}
