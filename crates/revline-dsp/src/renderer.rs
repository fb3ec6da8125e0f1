//! Block renderer for a committed graph and timeline.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::bus::Bus;
use crate::param::ParamLane;
use crate::{ProcessBlock, Processor, create_processor};
use revline_core::{Frames, Sample, SampleRate};
use revline_graph::{
    Destination, GraphError, NodeId, ParamRef, PerformanceTimeline, SignalGraph,
};

/// Input bus a delay node reads its fed-back signal from
pub const FEEDBACK_INPUT: usize = 1;

/// Where an input port reads from
#[derive(Debug, Clone, Copy)]
enum Source {
    /// Another node's output in the current block
    Live { node: NodeId, output: usize },
    /// A feedback tap holding the previous block
    Delayed(usize),
}

#[derive(Debug, Clone, Copy)]
struct Route {
    source: Source,
    input: usize,
}

/// Copy of a node output kept for one block so a feedback loop can read it
struct FeedbackTap {
    node: NodeId,
    output: usize,
    bus: Bus,
}

/// Renders a [`SignalGraph`] under a [`PerformanceTimeline`], one block at a time.
///
/// All buffers are allocated up front; rendering does not allocate. Frame
/// positions are on the context clock, so the timeline's absolute instants
/// line up with the samples produced.
pub struct Renderer {
    sample_rate: SampleRate,
    block_size: Frames,
    timeline: Arc<PerformanceTimeline>,
    order: Vec<NodeId>,
    processors: Vec<Box<dyn Processor>>,
    inputs: Vec<Vec<Bus>>,
    outputs: Vec<Vec<Bus>>,
    lanes: Vec<Vec<ParamLane>>,
    routes: Vec<SmallVec<[Route; 4]>>,
    taps: Vec<FeedbackTap>,
    sink_routes: Vec<(NodeId, usize)>,
    sink: Bus,
    /// Context frame of the next block to render
    position: u64,
    /// Read offset into `sink`; equal to `block_size` when it is used up
    cursor: usize,
}

impl Renderer {
    pub fn new(
        graph: &SignalGraph,
        timeline: Arc<PerformanceTimeline>,
        sample_rate: SampleRate,
        block_size: Frames,
    ) -> Result<Self, GraphError> {
        let block_size = block_size.max(1);
        let order = graph.processing_order()?;
        let count = graph.len();

        let mut processors = Vec::with_capacity(count);
        let mut inputs = Vec::with_capacity(count);
        let mut outputs = Vec::with_capacity(count);
        let mut lanes = Vec::with_capacity(count);
        for node in graph.nodes() {
            let kind = node.kind();
            processors.push(create_processor(
                kind,
                timeline.window(node.id()),
                sample_rate,
            ));
            // Every node gets at least one input bus so processors can index
            // port 0; a feedback target gets a separate bus for the loop
            let has_feedback = graph.incoming(node.id()).any(|conn| conn.feedback);
            let buses = if has_feedback {
                FEEDBACK_INPUT + 1
            } else {
                kind.input_count().max(1)
            };
            inputs.push(vec![Bus::new(block_size); buses]);
            outputs.push(vec![Bus::new(block_size); kind.output_count()]);
            lanes.push(
                kind.params()
                    .iter()
                    .map(|&param| {
                        let intrinsic = kind.intrinsic(param).unwrap_or_default();
                        let curve = timeline.curve_index(ParamRef::new(node.id(), param));
                        ParamLane::new(param, intrinsic, curve, block_size)
                    })
                    .collect::<Vec<_>>(),
            );
        }

        let mut routes: Vec<SmallVec<[Route; 4]>> = vec![SmallVec::new(); count];
        let mut taps = Vec::new();
        let mut sink_routes = Vec::new();
        for conn in graph.connections() {
            match conn.to {
                Destination::Node { node, .. } if conn.feedback => {
                    routes[node].push(Route {
                        source: Source::Delayed(taps.len()),
                        input: FEEDBACK_INPUT,
                    });
                    taps.push(FeedbackTap {
                        node: conn.from,
                        output: conn.output,
                        bus: Bus::new(block_size),
                    });
                }
                Destination::Node { node, input } => routes[node].push(Route {
                    source: Source::Live {
                        node: conn.from,
                        output: conn.output,
                    },
                    input,
                }),
                Destination::Param(param) => {
                    let lane = lanes[param.node]
                        .iter_mut()
                        .find(|lane| lane.param() == param.param)
                        .ok_or(GraphError::UnknownParam(param))?;
                    lane.add_modulator(conn.from, conn.output);
                }
                Destination::Output => sink_routes.push((conn.from, conn.output)),
            }
        }

        tracing::debug!(
            "Renderer ready: {} nodes, {} feedback taps, {} sink routes, block {} @ {} Hz",
            count,
            taps.len(),
            sink_routes.len(),
            block_size,
            sample_rate
        );

        Ok(Self {
            sample_rate,
            block_size,
            timeline,
            order,
            processors,
            inputs,
            outputs,
            lanes,
            routes,
            taps,
            sink_routes,
            sink: Bus::new(block_size),
            position: 0,
            cursor: block_size,
        })
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn block_size(&self) -> Frames {
        self.block_size
    }

    pub fn timeline(&self) -> &PerformanceTimeline {
        &self.timeline
    }

    /// Context frame of the next sample [`Self::fill_interleaved`] will emit
    pub fn position(&self) -> u64 {
        self.position - (self.block_size - self.cursor) as u64
    }

    /// Values `param` took over the last rendered block
    pub fn param_values(&self, param: ParamRef) -> Option<&[Sample]> {
        self.lanes
            .get(param.node)?
            .iter()
            .find(|lane| lane.param() == param.param)
            .map(ParamLane::values)
    }

    /// Continue rendering from context frame `frame`.
    ///
    /// Node state (phases, filter memory, delay lines) is kept; only the
    /// clock the timeline is evaluated against moves.
    pub fn seek(&mut self, frame: u64) {
        self.position = frame;
        self.cursor = self.block_size;
    }

    /// Render the next block into the sink bus and return it
    pub fn render_block(&mut self) -> &Bus {
        let Self {
            sample_rate,
            block_size,
            timeline,
            order,
            processors,
            inputs,
            outputs,
            lanes,
            routes,
            taps,
            sink_routes,
            sink,
            position,
            ..
        } = self;

        for &node in order.iter() {
            for bus in &mut inputs[node] {
                bus.clear();
            }
            for route in &routes[node] {
                let source = match route.source {
                    Source::Live { node, output } => &outputs[node][output],
                    Source::Delayed(tap) => &taps[tap].bus,
                };
                inputs[node][route.input].mix_from(source);
            }

            for lane in &mut lanes[node] {
                lane.fill(timeline.as_ref(), &outputs[..], *position, *sample_rate);
            }

            let mut block = ProcessBlock {
                inputs: &inputs[node],
                outputs: &mut outputs[node],
                params: &lanes[node],
                frames: *block_size,
                start_frame: *position,
                sample_rate: *sample_rate,
            };
            processors[node].process(&mut block);
        }

        for tap in taps.iter_mut() {
            tap.bus.clear();
            tap.bus.mix_from(&outputs[tap.node][tap.output]);
        }

        sink.clear();
        for &(node, output) in sink_routes.iter() {
            sink.mix_from(&outputs[node][output]);
        }

        *position += *block_size as u64;
        self.cursor = 0;
        &self.sink
    }

    /// Fill an interleaved device buffer of `channels` channels.
    ///
    /// Blocks are rendered on demand, so any buffer length works and
    /// consecutive calls produce one continuous stream. Mono devices get a
    /// downmix; channels past the second are silent, as is a trailing
    /// partial frame.
    pub fn fill_interleaved(&mut self, data: &mut [Sample], channels: usize) {
        let channels = channels.max(1);
        let mut frames = data.chunks_exact_mut(channels);
        for frame in &mut frames {
            if self.cursor >= self.block_size {
                self.render_block();
            }
            let i = self.cursor;
            if channels == 1 {
                frame[0] = self.sink.mono_sample(i);
            } else {
                frame[0] = self.sink.channel(0)[i];
                frame[1] = self.sink.channel(1)[i];
                for sample in frame.iter_mut().skip(2) {
                    *sample = 0.0;
                }
            }
            self.cursor += 1;
        }
        frames.into_remainder().fill(0.0);
    }
}
