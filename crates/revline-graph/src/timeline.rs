//! The performance timeline: every automation curve plus the start/stop
//! window of every source node, all anchored to one origin instant.
//!
//! A [`PerformanceTimeline`] can only be produced by [`TimelineBuilder::build`],
//! which validates it against the graph. It exposes no mutation afterwards.

use std::collections::HashMap;

use revline_core::performance::STOP_EPSILON;
use revline_core::{Sample, Seconds};

use crate::automation::{AutomationCurve, AutomationError};
use crate::graph::SignalGraph;
use crate::node::{NodeId, ParamRef};

/// When a source node plays, in absolute context time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceWindow {
    pub node: NodeId,
    pub start: Seconds,
    pub stop: Seconds,
}

impl SourceWindow {
    pub fn contains(&self, time: Seconds) -> bool {
        time >= self.start && time < self.stop
    }
}

/// Collects curves and windows, then validates them into a timeline
#[derive(Debug)]
pub struct TimelineBuilder {
    origin: Seconds,
    duration: Seconds,
    curves: Vec<AutomationCurve>,
    windows: Vec<SourceWindow>,
}

impl TimelineBuilder {
    pub fn new(origin: Seconds, duration: Seconds) -> Self {
        Self {
            origin,
            duration,
            curves: Vec::new(),
            windows: Vec::new(),
        }
    }

    /// Absolute instant `offset` seconds after the origin
    pub fn at(&self, offset: Seconds) -> Seconds {
        self.origin + offset
    }

    /// Add a finished curve (at most one per parameter)
    pub fn curve(&mut self, curve: AutomationCurve) -> Result<&mut Self, AutomationError> {
        if self.curves.iter().any(|c| c.param() == curve.param()) {
            return Err(AutomationError::DuplicateCurve(curve.param()));
        }
        self.curves.push(curve);
        Ok(self)
    }

    /// Schedule a source to play between two absolute instants
    pub fn window(
        &mut self,
        node: NodeId,
        start: Seconds,
        stop: Seconds,
    ) -> Result<&mut Self, AutomationError> {
        if self.windows.iter().any(|w| w.node == node) {
            return Err(AutomationError::DuplicateWindow(node));
        }
        if !(start.is_finite() && stop.is_finite()) || start < self.origin || stop <= start {
            return Err(AutomationError::InvalidWindow {
                node,
                start,
                stop,
                origin: self.origin,
            });
        }
        let limit = self.origin + self.duration + STOP_EPSILON;
        if stop > limit {
            return Err(AutomationError::WindowOutOfBounds { node, stop, limit });
        }
        self.windows.push(SourceWindow { node, start, stop });
        Ok(self)
    }

    /// Validate against the graph and freeze
    pub fn build(self, graph: &SignalGraph) -> Result<PerformanceTimeline, AutomationError> {
        for curve in &self.curves {
            let param = curve.param();
            let exists = graph
                .node(param.node)
                .is_some_and(|node| node.kind().has_param(param.param));
            if !exists {
                return Err(AutomationError::UnknownParam(param));
            }
        }

        for window in &self.windows {
            let is_source = graph
                .node(window.node)
                .is_some_and(|node| node.kind().is_source());
            if !is_source {
                return Err(AutomationError::NotASource(window.node));
            }
        }

        for source in graph.sources() {
            if !self.windows.iter().any(|w| w.node == source.id()) {
                return Err(AutomationError::MissingWindow(source.id()));
            }
        }

        let index = self
            .curves
            .iter()
            .enumerate()
            .map(|(i, curve)| (curve.param(), i))
            .collect();

        tracing::debug!(
            "Timeline frozen at origin {:.3}s: {} curves, {} source windows",
            self.origin,
            self.curves.len(),
            self.windows.len()
        );

        Ok(PerformanceTimeline {
            origin: self.origin,
            duration: self.duration,
            curves: self.curves,
            windows: self.windows,
            index,
        })
    }
}

/// Immutable schedule of one performance
#[derive(Debug, Clone)]
pub struct PerformanceTimeline {
    origin: Seconds,
    duration: Seconds,
    curves: Vec<AutomationCurve>,
    windows: Vec<SourceWindow>,
    index: HashMap<ParamRef, usize>,
}

impl PerformanceTimeline {
    /// The origin instant (t0)
    pub fn origin(&self) -> Seconds {
        self.origin
    }

    /// Absolute end of the performance
    pub fn end(&self) -> Seconds {
        self.origin + self.duration
    }

    pub fn curves(&self) -> &[AutomationCurve] {
        &self.curves
    }

    pub fn windows(&self) -> &[SourceWindow] {
        &self.windows
    }

    pub fn curve(&self, param: ParamRef) -> Option<&AutomationCurve> {
        self.index.get(&param).map(|&i| &self.curves[i])
    }

    /// Position of a parameter's curve in [`Self::curves`]
    pub fn curve_index(&self, param: ParamRef) -> Option<usize> {
        self.index.get(&param).copied()
    }

    pub fn window(&self, node: NodeId) -> Option<SourceWindow> {
        self.windows.iter().find(|w| w.node == node).copied()
    }

    /// Automated value of a parameter at an absolute instant, `None` if the
    /// parameter has no curve
    pub fn value_at(&self, param: ParamRef, time: Seconds, intrinsic: Sample) -> Option<Sample> {
        self.curve(param).map(|curve| curve.value_at(time, intrinsic))
    }

    /// Offset of an absolute instant from the origin
    pub fn offset_of(&self, time: Seconds) -> Seconds {
        time - self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, Param, Waveform};

    fn graph() -> (SignalGraph, NodeId, NodeId) {
        let mut graph = SignalGraph::new();
        let osc = graph.add_node(
            "osc",
            NodeKind::Oscillator {
                waveform: Waveform::Square,
                frequency: 110.0,
            },
        );
        let amp = graph.add_node("amp", NodeKind::Gain { level: 0.0 });
        graph.connect(osc, amp).unwrap();
        graph.connect_output(amp).unwrap();
        (graph, osc, amp)
    }

    #[test]
    fn test_build_valid_timeline() {
        let (graph, osc, amp) = graph();
        let mut builder = TimelineBuilder::new(1.0, 10.0);

        let mut gain = AutomationCurve::new(ParamRef::new(amp, Param::Gain));
        gain.set_value_at(0.0, builder.at(0.0))
            .unwrap()
            .linear_ramp_to(0.5, builder.at(1.0))
            .unwrap();
        builder.curve(gain).unwrap();
        builder.window(osc, builder.at(0.0), builder.at(10.0)).unwrap();

        let timeline = builder.build(&graph).unwrap();
        assert_eq!(timeline.origin(), 1.0);
        assert_eq!(timeline.end(), 11.0);
        assert_eq!(
            timeline.value_at(ParamRef::new(amp, Param::Gain), 1.5, 0.0),
            Some(0.25)
        );
        assert_eq!(
            timeline.value_at(ParamRef::new(osc, Param::Frequency), 1.5, 110.0),
            None
        );
        assert_eq!(timeline.window(osc).unwrap().stop, 11.0);
        assert_eq!(timeline.offset_of(3.5), 2.5);
    }

    #[test]
    fn test_duplicate_curve_rejected() {
        let (_, _, amp) = graph();
        let mut builder = TimelineBuilder::new(0.0, 10.0);
        let param = ParamRef::new(amp, Param::Gain);

        builder.curve(AutomationCurve::new(param)).unwrap();
        assert_eq!(
            builder.curve(AutomationCurve::new(param)).unwrap_err(),
            AutomationError::DuplicateCurve(param)
        );
    }

    #[test]
    fn test_window_invariants() {
        let (_, osc, _) = graph();
        let mut builder = TimelineBuilder::new(2.0, 10.0);

        // Starts before the origin
        assert!(matches!(
            builder.window(osc, 1.0, 5.0),
            Err(AutomationError::InvalidWindow { .. })
        ));
        // Stop not after start
        assert!(matches!(
            builder.window(osc, 4.0, 4.0),
            Err(AutomationError::InvalidWindow { .. })
        ));
        // Past the end of the performance
        assert!(matches!(
            builder.window(osc, 2.0, 12.5),
            Err(AutomationError::WindowOutOfBounds { .. })
        ));
        // Within epsilon of the end is fine
        assert!(builder.window(osc, 2.0, 12.0 + STOP_EPSILON / 2.0).is_ok());
        assert_eq!(
            builder.window(osc, 2.0, 3.0).unwrap_err(),
            AutomationError::DuplicateWindow(osc)
        );
    }

    #[test]
    fn test_missing_window_rejected() {
        let (graph, osc, _) = graph();
        let builder = TimelineBuilder::new(0.0, 10.0);
        assert_eq!(
            builder.build(&graph).unwrap_err(),
            AutomationError::MissingWindow(osc)
        );
    }

    #[test]
    fn test_window_on_non_source_rejected() {
        let (graph, osc, amp) = graph();
        let mut builder = TimelineBuilder::new(0.0, 10.0);
        builder.window(osc, 0.0, 10.0).unwrap();
        builder.window(amp, 0.0, 10.0).unwrap();
        assert_eq!(
            builder.build(&graph).unwrap_err(),
            AutomationError::NotASource(amp)
        );
    }

    #[test]
    fn test_curve_on_missing_param_rejected() {
        let (graph, osc, _) = graph();
        let mut builder = TimelineBuilder::new(0.0, 10.0);
        let param = ParamRef::new(osc, Param::Q);
        builder.curve(AutomationCurve::new(param)).unwrap();
        builder.window(osc, 0.0, 10.0).unwrap();
        assert_eq!(
            builder.build(&graph).unwrap_err(),
            AutomationError::UnknownParam(param)
        );
    }
}
