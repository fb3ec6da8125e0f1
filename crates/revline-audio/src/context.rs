//! The audio context abstraction.

use std::sync::Arc;

use crate::AudioConfig;
use revline_core::{Error, Result, SampleRate, Seconds};
use revline_graph::{NodeKind, PerformanceTimeline, SignalGraph};

/// Lifecycle state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Created, clock not running
    Suspended,
    /// Clock running, output audible
    Running,
    /// Released; nothing can be allocated or rendered any more
    Closed,
}

/// A sample-accurate clock and output sink.
///
/// `current_time` is derived from rendered frames and never decreases.
/// A graph becomes audible only once it is committed together with its
/// timeline; a graph that fails to build is never committed.
pub trait AudioContext {
    fn sample_rate(&self) -> SampleRate;

    /// Seconds of audio rendered since the context was created
    fn current_time(&self) -> Seconds;

    fn state(&self) -> ContextState;

    /// Start the clock. A no-op when already running.
    fn resume(&mut self) -> Result<()>;

    /// Reserve resources for a node about to be added to the graph
    fn reserve_node(&mut self, kind: &NodeKind) -> Result<()>;

    /// Connect a finished graph and its timeline to the output
    fn commit(&mut self, graph: &SignalGraph, timeline: Arc<PerformanceTimeline>) -> Result<()>;

    /// Stop the clock, silence the output, and release the graph.
    /// Closing an already closed context is an error.
    fn close(&mut self) -> Result<()>;
}

/// Creates a fresh context for each performance
pub trait ContextFactory {
    type Context: AudioContext;

    fn create(&mut self, config: &AudioConfig) -> Result<Self::Context>;
}

/// Counts node reservations against a per-context limit
#[derive(Debug, Clone)]
pub struct NodeBudget {
    limit: usize,
    used: usize,
}

impl NodeBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn reserve(&mut self, kind: &NodeKind) -> Result<()> {
        if self.used >= self.limit {
            return Err(Error::GraphBuild(format!(
                "node budget of {} exhausted allocating {}",
                self.limit,
                kind.type_name()
            )));
        }
        self.used += 1;
        Ok(())
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.used
    }
}

/// Error for allocating on a closed context
pub(crate) fn closed_error(kind: &NodeKind) -> Error {
    Error::GraphBuild(format!("cannot allocate {} on a closed context", kind.type_name()))
}
