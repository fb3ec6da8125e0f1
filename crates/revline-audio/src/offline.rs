//! Offline context - a clock advanced by the caller.
//!
//! Renders on the caller's thread through the same [`Renderer`] the device
//! context uses, so a rehearsal produces exactly the samples a device would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::context::{AudioContext, ContextFactory, ContextState, NodeBudget, closed_error};
use crate::AudioConfig;
use revline_core::{ChannelCount, Error, Frames, Result, Sample, SampleRate, Seconds, frames_to_seconds};
use revline_dsp::Renderer;
use revline_graph::{NodeKind, PerformanceTimeline, SignalGraph};

/// What one call to [`OfflineContext::advance`] rendered
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderReport {
    pub frames: u64,
    /// Largest absolute output sample
    pub peak: Sample,
}

pub struct OfflineContext {
    sample_rate: SampleRate,
    block_size: Frames,
    channels: ChannelCount,
    state: ContextState,
    frames: u64,
    budget: NodeBudget,
    renderer: Option<Renderer>,
    scratch: Vec<Sample>,
    open: Arc<AtomicUsize>,
}

impl OfflineContext {
    pub fn new(config: &AudioConfig) -> Self {
        Self::with_counter(config, Arc::new(AtomicUsize::new(1)))
    }

    fn with_counter(config: &AudioConfig, open: Arc<AtomicUsize>) -> Self {
        let block_size = config.block_size.max(1);
        let channels = config.output_channels.max(1);
        Self {
            sample_rate: config.sample_rate,
            block_size,
            channels,
            state: ContextState::Suspended,
            frames: 0,
            budget: NodeBudget::new(config.max_nodes),
            renderer: None,
            scratch: vec![0.0; block_size * channels],
            open,
        }
    }

    /// Frames rendered so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn is_committed(&self) -> bool {
        self.renderer.is_some()
    }

    /// Render `seconds` of output. The clock only moves while running.
    pub fn advance(&mut self, seconds: Seconds) -> RenderReport {
        if self.state != ContextState::Running || seconds <= 0.0 {
            return RenderReport::default();
        }
        let frames = (seconds * Seconds::from(self.sample_rate)).round() as u64;
        self.render(frames)
    }

    /// Render until `current_time` reaches `time`
    pub fn advance_to(&mut self, time: Seconds) -> RenderReport {
        if self.state != ContextState::Running {
            return RenderReport::default();
        }
        let target = (time * Seconds::from(self.sample_rate)).ceil().max(0.0) as u64;
        self.render(target.saturating_sub(self.frames))
    }

    fn render(&mut self, frames: u64) -> RenderReport {
        let mut peak: Sample = 0.0;
        if let Some(renderer) = self.renderer.as_mut() {
            let mut remaining = frames;
            while remaining > 0 {
                let chunk = remaining.min(self.block_size as u64) as usize;
                let data = &mut self.scratch[..chunk * self.channels];
                renderer.fill_interleaved(data, self.channels);
                peak = data.iter().fold(peak, |max, &s| max.max(s.abs()));
                remaining -= chunk as u64;
            }
        }
        self.frames += frames;
        RenderReport { frames, peak }
    }
}

impl AudioContext for OfflineContext {
    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn current_time(&self) -> Seconds {
        frames_to_seconds(self.frames, self.sample_rate)
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Closed => Err(Error::ContextUnavailable(
                "cannot resume a closed context".to_string(),
            )),
            _ => {
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn reserve_node(&mut self, kind: &NodeKind) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(closed_error(kind));
        }
        self.budget.reserve(kind)
    }

    fn commit(&mut self, graph: &SignalGraph, timeline: Arc<PerformanceTimeline>) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(Error::Audio("cannot commit to a closed context".to_string()));
        }
        let mut renderer = Renderer::new(graph, timeline, self.sample_rate, self.block_size)?;
        renderer.seek(self.frames);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(Error::Audio("context already closed".to_string()));
        }
        self.state = ContextState::Closed;
        self.renderer = None;
        self.open.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Creates [`OfflineContext`]s and keeps count of them
#[derive(Debug, Default)]
pub struct OfflineFactory {
    created: usize,
    open: Arc<AtomicUsize>,
}

impl OfflineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts created so far
    pub fn created(&self) -> usize {
        self.created
    }

    /// Contexts created and not yet closed
    pub fn open_contexts(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }
}

impl ContextFactory for OfflineFactory {
    type Context = OfflineContext;

    fn create(&mut self, config: &AudioConfig) -> Result<OfflineContext> {
        self.created += 1;
        self.open.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            "Offline context #{} at {} Hz, block {}",
            self.created,
            config.sample_rate,
            config.block_size
        );
        Ok(OfflineContext::with_counter(config, Arc::clone(&self.open)))
    }
}
