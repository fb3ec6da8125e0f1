//! Realtime DSP for rendering a committed performance.
//!
//! Every node kind in a [`revline_graph::SignalGraph`] has a processor here.
//! The [`Renderer`] owns one processor per node and runs them block by block
//! in graph order, evaluating automation curves and source windows per sample.
//! Nothing in the render path allocates or logs.

pub mod bus;
pub mod compressor;
pub mod delay;
pub mod filter;
pub mod gain;
pub mod noise;
pub mod oscillator;
pub mod param;
pub mod renderer;
pub mod routing;

pub use bus::Bus;
pub use param::ParamLane;
pub use renderer::Renderer;

use revline_core::{Frames, Sample, SampleRate, Seconds, frames_to_seconds};
use revline_graph::{NodeKind, Param, SourceWindow};

/// The inputs, outputs, and parameter values of one node for one block
pub struct ProcessBlock<'a> {
    pub inputs: &'a [Bus],
    pub outputs: &'a mut [Bus],
    pub params: &'a [ParamLane],
    pub frames: Frames,
    /// Context frame of the first sample in the block
    pub start_frame: u64,
    pub sample_rate: SampleRate,
}

impl<'a> ProcessBlock<'a> {
    /// Context time of sample `frame` within the block
    #[inline]
    pub fn time_at(&self, frame: usize) -> Seconds {
        self.clock().time_at(frame)
    }

    /// Timing of the block, detached from the buffers so it can be used
    /// while an output is borrowed mutably
    pub fn clock(&self) -> BlockClock {
        BlockClock {
            start_frame: self.start_frame,
            sample_rate: self.sample_rate,
        }
    }

    /// Per-sample values of a parameter, if the node has it
    pub fn param(&self, param: Param) -> Option<&'a [Sample]> {
        let params: &'a [ParamLane] = self.params;
        params
            .iter()
            .find(|lane| lane.param() == param)
            .map(ParamLane::values)
    }
}

/// Start frame and sample rate of a block
#[derive(Debug, Clone, Copy)]
pub struct BlockClock {
    pub start_frame: u64,
    pub sample_rate: SampleRate,
}

impl BlockClock {
    #[inline]
    pub fn time_at(self, frame: usize) -> Seconds {
        frames_to_seconds(self.start_frame + frame as u64, self.sample_rate)
    }
}

/// A node's signal processing.
///
/// Implementations must be real-time safe: no allocation, locking, or I/O
/// inside `process`.
pub trait Processor: Send {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Render one block from `block.inputs` into `block.outputs`
    fn process(&mut self, block: &mut ProcessBlock<'_>);
}

/// Create the processor for a node kind.
///
/// `window` is the node's start/stop window; sources without one stay silent.
pub fn create_processor(
    kind: &NodeKind,
    window: Option<SourceWindow>,
    sample_rate: SampleRate,
) -> Box<dyn Processor> {
    match kind {
        NodeKind::Oscillator { waveform, .. } => {
            Box::new(oscillator::OscillatorProcessor::new(*waveform, window))
        }
        NodeKind::NoiseSource { buffer, looping } => {
            Box::new(noise::NoisePlayer::new(buffer.clone(), *looping, window))
        }
        NodeKind::Filter { filter_type, .. } => {
            Box::new(filter::FilterProcessor::new(*filter_type, sample_rate))
        }
        NodeKind::Gain { .. } => Box::new(gain::GainProcessor),
        NodeKind::DynamicsCompressor(settings) => {
            Box::new(compressor::CompressorProcessor::new(*settings, sample_rate))
        }
        NodeKind::Delay { max_time, .. } => {
            Box::new(delay::DelayProcessor::new(*max_time, sample_rate))
        }
        NodeKind::ChannelSplitter { .. } => Box::new(routing::SplitterProcessor),
        NodeKind::ChannelMerger { .. } => Box::new(routing::MergerProcessor),
    }
}
