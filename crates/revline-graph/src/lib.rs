//! Signal graph and automation model.
//!
//! This crate describes *what* a performance is: the routing graph of
//! sources, filters, gains, and buses, and the write-once timeline of
//! parameter curves and source windows laid over it. It does no audio
//! processing; `revline-dsp` renders what is described here.

pub mod automation;
pub mod graph;
pub mod node;
pub mod noise;
pub mod timeline;

pub use automation::{AutomationCurve, AutomationError, AutomationPoint, Interpolation};
pub use graph::{Connection, Destination, GraphError, SignalGraph};
pub use node::{
    CompressorSettings, FilterType, NodeId, NodeKind, Param, ParamRef, SignalNode, Waveform,
};
pub use noise::NoiseBuffer;
pub use timeline::{PerformanceTimeline, SourceWindow, TimelineBuilder};

impl From<GraphError> for revline_core::Error {
    fn from(err: GraphError) -> Self {
        Self::GraphBuild(err.to_string())
    }
}

impl From<AutomationError> for revline_core::Error {
    fn from(err: AutomationError) -> Self {
        Self::InvalidAutomation(err.to_string())
    }
}
