//! Transport: owns at most one performance and its lifecycle.
//!
//! ```text
//! Idle -> Starting -> Playing -> Completed -> Idle
//!                             \-> Stopped  -> Idle
//! ```
//!
//! Everything a performance holds (context, graph, timeline, origin, frame
//! task) lives in one [`Performance`] value, so every way out of `Playing`
//! drops all of it together.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::AudioConfig;
use crate::builder::{PerformanceGraph, build};
use crate::context::{AudioContext, ContextFactory};
use crate::scheduler::schedule;
use revline_core::performance::{DURATION, START_LATENCY};
use revline_core::{Result, Seconds};
use revline_graph::PerformanceTimeline;

/// Fraction of the performance treated as the end instant
const END_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Starting,
    Playing,
    Completed,
    Stopped,
}

/// How the last performance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    Completed,
    Stopped,
}

/// Published on every frame tick and lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressState {
    /// Elapsed fraction of the performance, in [0, 1]
    pub elapsed_fraction: f64,
    pub is_playing: bool,
}

/// The pending per-frame progress update. Dropping it cancels it.
#[derive(Debug, Default)]
struct FrameTask {
    ticks: u64,
}

struct Performance<C> {
    context: C,
    graph: PerformanceGraph,
    timeline: Arc<PerformanceTimeline>,
    origin: Seconds,
    frame_task: Option<FrameTask>,
}

pub struct Transport<F: ContextFactory> {
    factory: F,
    config: AudioConfig,
    state: TransportState,
    progress: f64,
    performance: Option<Performance<F::Context>>,
    last_finish: Option<Finish>,
    subscribers: Vec<Sender<ProgressState>>,
}

impl<F: ContextFactory> Transport<F> {
    pub fn new(factory: F, config: AudioConfig) -> Self {
        Self {
            factory,
            config,
            state: TransportState::Idle,
            progress: 0.0,
            performance: None,
            last_finish: None,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Elapsed fraction of the current performance; 0 when idle
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn last_finish(&self) -> Option<Finish> {
        self.last_finish
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Origin instant (t0) of the current performance
    pub fn origin(&self) -> Option<Seconds> {
        self.performance.as_ref().map(|p| p.origin)
    }

    pub fn timeline(&self) -> Option<&PerformanceTimeline> {
        self.performance.as_ref().map(|p| p.timeline.as_ref())
    }

    pub fn graph(&self) -> Option<&PerformanceGraph> {
        self.performance.as_ref().map(|p| &p.graph)
    }

    pub fn context(&self) -> Option<&F::Context> {
        self.performance.as_ref().map(|p| &p.context)
    }

    pub fn context_mut(&mut self) -> Option<&mut F::Context> {
        self.performance.as_mut().map(|p| &mut p.context)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Whether a frame task is scheduled
    pub fn frame_pending(&self) -> bool {
        self.performance
            .as_ref()
            .is_some_and(|p| p.frame_task.is_some())
    }

    /// Receive a [`ProgressState`] on every update
    pub fn subscribe(&mut self) -> Receiver<ProgressState> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Start a performance. Does nothing unless idle.
    ///
    /// On failure the context (if one was created) is closed, the transport
    /// is idle again, and the error is returned. Nothing is retried.
    pub fn play(&mut self) -> Result<()> {
        if self.state != TransportState::Idle {
            tracing::debug!("play() ignored in state {:?}", self.state);
            return Ok(());
        }

        self.state = TransportState::Starting;
        tracing::info!("Starting performance");

        let mut context = match self.factory.create(&self.config) {
            Ok(context) => context,
            Err(e) => {
                tracing::error!("Failed to create audio context: {}", e);
                self.state = TransportState::Idle;
                return Err(e);
            }
        };

        match Self::start(&mut context, &self.config) {
            Ok((graph, timeline, origin)) => {
                self.performance = Some(Performance {
                    context,
                    graph,
                    timeline,
                    origin,
                    frame_task: Some(FrameTask::default()),
                });
                self.state = TransportState::Playing;
                self.progress = 0.0;
                tracing::info!("Performance playing, t0 = {:.3}s", origin);
                self.publish();
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to start performance: {}", e);
                if let Err(close_err) = context.close() {
                    tracing::warn!("Error closing audio context: {}", close_err);
                }
                self.state = TransportState::Idle;
                Err(e)
            }
        }
    }

    fn start(
        context: &mut F::Context,
        config: &AudioConfig,
    ) -> Result<(PerformanceGraph, Arc<PerformanceTimeline>, Seconds)> {
        context.resume()?;
        let graph = build(context, config)?;
        let origin = context.current_time() + START_LATENCY;
        let timeline = Arc::new(schedule(&graph, origin)?);
        context.commit(&graph.graph, Arc::clone(&timeline))?;
        Ok((graph, timeline, origin))
    }

    /// One frame of progress. Completes the performance once the full
    /// duration has elapsed on the context clock.
    pub fn tick(&mut self) {
        if self.state != TransportState::Playing {
            return;
        }
        let Some(performance) = self.performance.as_mut() else {
            return;
        };
        let Some(task) = performance.frame_task.as_mut() else {
            return;
        };
        task.ticks += 1;

        let mut elapsed =
            ((performance.context.current_time() - performance.origin) / DURATION).clamp(0.0, 1.0);
        // Frame clocks land on the end instant only up to rounding
        if elapsed >= 1.0 - END_TOLERANCE {
            elapsed = 1.0;
        }
        self.progress = self.progress.max(elapsed);

        if self.progress >= 1.0 {
            let ticks = task.ticks;
            performance.frame_task = None;
            self.state = TransportState::Completed;
            self.last_finish = Some(Finish::Completed);
            tracing::info!("Performance completed after {} frames", ticks);
            self.publish();
            self.dispose();
        } else {
            self.publish();
        }
    }

    /// Stop whatever is playing. Safe in any state; never fails.
    pub fn stop(&mut self) {
        let Some(performance) = self.performance.as_mut() else {
            return;
        };
        performance.frame_task = None;
        self.state = TransportState::Stopped;
        self.last_finish = Some(Finish::Stopped);
        tracing::info!("Performance stopped at {:.1}%", self.progress * 100.0);
        self.dispose();
    }

    /// Tick once per frame until the frame task is cancelled.
    ///
    /// `before_tick` runs first each frame (a host can advance a clock or
    /// call [`Self::stop`] there); `on_frame` sees the result. A zero
    /// `frame_interval` does not sleep.
    pub fn drive<B, O>(&mut self, frame_interval: Duration, mut before_tick: B, mut on_frame: O)
    where
        B: FnMut(&mut Self),
        O: FnMut(&Self),
    {
        while self.frame_pending() {
            before_tick(self);
            self.tick();
            on_frame(self);
            if !frame_interval.is_zero() && self.frame_pending() {
                std::thread::sleep(frame_interval);
            }
        }
    }

    fn dispose(&mut self) {
        if let Some(mut performance) = self.performance.take() {
            performance.frame_task = None;
            if let Err(e) = performance.context.close() {
                tracing::warn!("Error closing audio context: {}", e);
            }
            tracing::debug!(
                "Disposed performance ({} nodes)",
                performance.graph.graph.len()
            );
        }
        self.progress = 0.0;
        self.state = TransportState::Idle;
        self.publish();
    }

    fn publish(&mut self) {
        let update = ProgressState {
            elapsed_fraction: self.progress,
            is_playing: self.state == TransportState::Playing,
        };
        self.subscribers.retain(|tx| tx.send(update).is_ok());
    }
}

impl<F: ContextFactory> Drop for Transport<F> {
    fn drop(&mut self) {
        self.stop();
    }
}
