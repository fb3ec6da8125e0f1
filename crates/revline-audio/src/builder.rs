//! Graph builder for the engine-rev performance.
//!
//! Pure construction: allocates every node through the context and wires the
//! topology. Nothing here knows about time; the scheduler lays the curves
//! over the nodes afterwards.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::AudioConfig;
use crate::context::AudioContext;
use revline_core::Result;
use revline_core::performance::NOISE_SECONDS;
use revline_graph::{
    CompressorSettings, FilterType, NodeId, NodeKind, NoiseBuffer, Param, ParamRef, SignalGraph,
    Waveform,
};

/// Source -> filter -> gain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceChain {
    pub source: NodeId,
    pub filter: NodeId,
    pub gain: NodeId,
}

/// Low-frequency oscillator modulating the engine pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vibrato {
    pub lfo: NodeId,
    pub depth: NodeId,
}

/// Stereo widening, echo, and the master chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixBus {
    pub splitter: NodeId,
    pub widen: NodeId,
    pub merger: NodeId,
    pub dry: NodeId,
    pub echo: NodeId,
    pub reverb_mix: NodeId,
    pub echo_feedback: NodeId,
    pub mix: NodeId,
    pub compressor: NodeId,
    pub master: NodeId,
}

/// Handles to every node the scheduler automates or the tests inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voices {
    pub engine: VoiceChain,
    pub exhaust: VoiceChain,
    pub intake: VoiceChain,
    pub whoosh: VoiceChain,
    pub vibrato: Vibrato,
    pub bus: MixBus,
}

/// The built graph and handles into it
#[derive(Debug, Clone)]
pub struct PerformanceGraph {
    pub graph: SignalGraph,
    pub voices: Voices,
}

impl PerformanceGraph {
    /// Source nodes that need a start/stop window
    pub fn sources(&self) -> [NodeId; 5] {
        let v = &self.voices;
        [
            v.engine.source,
            v.exhaust.source,
            v.intake.source,
            v.whoosh.source,
            v.vibrato.lfo,
        ]
    }
}

/// Reserves each node with the context before adding it to the graph
struct NodeAllocator<'a, C: AudioContext + ?Sized> {
    context: &'a mut C,
    graph: SignalGraph,
}

impl<C: AudioContext + ?Sized> NodeAllocator<'_, C> {
    fn add(&mut self, label: &str, kind: NodeKind) -> Result<NodeId> {
        self.context.reserve_node(&kind)?;
        Ok(self.graph.add_node(label, kind))
    }

    fn filter(&mut self, label: &str, filter_type: FilterType, frequency: f32, q: f32) -> Result<NodeId> {
        self.add(
            label,
            NodeKind::Filter {
                filter_type,
                frequency,
                q,
            },
        )
    }

    fn gain(&mut self, label: &str, level: f32) -> Result<NodeId> {
        self.add(label, NodeKind::Gain { level })
    }

    /// Add a filter and a silent gain after `source` and wire the chain
    fn chain(
        &mut self,
        name: &str,
        source: NodeId,
        filter_type: FilterType,
        frequency: f32,
        q: f32,
    ) -> Result<VoiceChain> {
        let filter = self.filter(&format!("{name} filter"), filter_type, frequency, q)?;
        let gain = self.gain(&format!("{name} gain"), 0.0)?;
        self.graph.connect(source, filter)?;
        self.graph.connect(filter, gain)?;
        Ok(VoiceChain {
            source,
            filter,
            gain,
        })
    }
}

/// Build the performance graph on `context`.
///
/// Fails with `GraphBuild` if the context refuses a node or a connection is
/// invalid. The graph is returned uncommitted.
pub fn build<C: AudioContext + ?Sized>(context: &mut C, config: &AudioConfig) -> Result<PerformanceGraph> {
    let sample_rate = context.sample_rate();
    let (mut intake_rng, mut whoosh_rng) = match config.noise_seed {
        Some(seed) => (
            StdRng::seed_from_u64(seed),
            StdRng::seed_from_u64(seed.wrapping_add(1)),
        ),
        None => (StdRng::from_entropy(), StdRng::from_entropy()),
    };

    let mut nodes = NodeAllocator {
        context,
        graph: SignalGraph::new(),
    };

    // Engine body: sawtooth through a resonant lowpass
    let engine_osc = nodes.add(
        "engine",
        NodeKind::Oscillator {
            waveform: Waveform::Sawtooth,
            frequency: 55.0,
        },
    )?;
    let engine = nodes.chain("engine", engine_osc, FilterType::Lowpass, 400.0, 0.7)?;

    // Exhaust: square wave, rumble trimmed below 60 Hz
    let exhaust_osc = nodes.add(
        "exhaust",
        NodeKind::Oscillator {
            waveform: Waveform::Square,
            frequency: 110.0,
        },
    )?;
    let exhaust = nodes.chain("exhaust", exhaust_osc, FilterType::Highpass, 60.0, 1.0)?;

    // Intake: looping noise through a bandpass
    let intake_noise = nodes.add(
        "intake",
        NodeKind::NoiseSource {
            buffer: NoiseBuffer::generate(sample_rate, NOISE_SECONDS, &mut intake_rng),
            looping: true,
        },
    )?;
    let intake = nodes.chain("intake", intake_noise, FilterType::Bandpass, 1400.0, 1.2)?;

    // Whoosh: one-shot noise burst, highpassed
    let whoosh_noise = nodes.add(
        "whoosh",
        NodeKind::NoiseSource {
            buffer: NoiseBuffer::generate(sample_rate, NOISE_SECONDS, &mut whoosh_rng),
            looping: false,
        },
    )?;
    let whoosh = nodes.chain("whoosh", whoosh_noise, FilterType::Highpass, 1200.0, 1.0)?;

    // Vibrato on the engine pitch, not part of the audible mix
    let lfo = nodes.add(
        "vibrato",
        NodeKind::Oscillator {
            waveform: Waveform::Sine,
            frequency: 6.5,
        },
    )?;
    let depth = nodes.gain("vibrato depth", 1.8)?;
    nodes.graph.connect(lfo, depth)?;
    nodes
        .graph
        .connect_param(depth, ParamRef::new(engine.source, Param::Frequency))?;

    // Stereo widening: right side delayed a few milliseconds
    let splitter = nodes.add("splitter", NodeKind::ChannelSplitter { outputs: 2 })?;
    let widen = nodes.add(
        "widen delay",
        NodeKind::Delay {
            time: 0.006,
            max_time: 0.05,
        },
    )?;
    let merger = nodes.add("merger", NodeKind::ChannelMerger { inputs: 2 })?;
    for voice in [&engine, &exhaust, &intake, &whoosh] {
        nodes.graph.connect(voice.gain, splitter)?;
    }
    nodes.graph.connect_ports(splitter, 0, merger, 0)?;
    nodes.graph.connect_ports(splitter, 1, widen, 0)?;
    nodes.graph.connect_ports(widen, 0, merger, 1)?;

    // Dry path and a short feedback echo standing in for a room
    let dry = nodes.gain("dry bus", 1.0)?;
    let echo = nodes.add(
        "echo delay",
        NodeKind::Delay {
            time: 0.14,
            max_time: 1.0,
        },
    )?;
    let reverb_mix = nodes.gain("reverb mix", 0.18)?;
    let echo_feedback = nodes.gain("echo feedback", 0.25)?;
    let mix = nodes.gain("mix", 1.0)?;
    nodes.graph.connect(merger, dry)?;
    nodes.graph.connect(dry, mix)?;
    nodes.graph.connect(merger, echo)?;
    nodes.graph.connect(echo, reverb_mix)?;
    nodes.graph.connect(reverb_mix, mix)?;
    nodes.graph.connect(echo, echo_feedback)?;
    nodes.graph.connect_feedback(echo_feedback, echo)?;

    // Master: glue compression, then level
    let compressor = nodes.add(
        "compressor",
        NodeKind::DynamicsCompressor(CompressorSettings {
            threshold: -18.0,
            knee: 24.0,
            ratio: 3.5,
            attack: 0.003,
            release: 0.15,
        }),
    )?;
    let master = nodes.gain("master", 0.7)?;
    nodes.graph.connect(mix, compressor)?;
    nodes.graph.connect(compressor, master)?;
    nodes.graph.connect_output(master)?;

    let graph = nodes.graph;
    tracing::debug!(
        "Built performance graph: {} nodes, {} connections",
        graph.len(),
        graph.connections().len()
    );

    Ok(PerformanceGraph {
        graph,
        voices: Voices {
            engine,
            exhaust,
            intake,
            whoosh,
            vibrato: Vibrato { lfo, depth },
            bus: MixBus {
                splitter,
                widen,
                merger,
                dry,
                echo,
                reverb_mix,
                echo_feedback,
                mix,
                compressor,
                master,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::OfflineContext;
    use revline_core::{Error, frames_to_seconds};
    use revline_dsp::Renderer;
    use revline_graph::Destination;

    fn seeded() -> AudioConfig {
        AudioConfig {
            noise_seed: Some(11),
            ..AudioConfig::default()
        }
    }

    #[test]
    fn test_builds_full_topology() {
        let mut ctx = OfflineContext::new(&seeded());
        let perf = build(&mut ctx, &seeded()).unwrap();
        let graph = &perf.graph;
        let v = perf.voices;

        assert_eq!(graph.len(), 24);
        assert_eq!(graph.sources().count(), 5);
        assert!(graph.processing_order().is_ok());

        let outputs: Vec<_> = graph.outputs().map(|c| c.from).collect();
        assert_eq!(outputs, vec![v.bus.master]);

        // Vibrato modulates the engine pitch and nothing else
        let vibrato_targets: Vec<_> = graph
            .connections()
            .iter()
            .filter(|c| c.from == v.vibrato.depth)
            .map(|c| c.to)
            .collect();
        assert_eq!(
            vibrato_targets,
            vec![Destination::Param(ParamRef::new(
                v.engine.source,
                Param::Frequency
            ))]
        );

        // Exactly one feedback edge: echo feedback back into the echo delay
        let feedback: Vec<_> = graph.connections().iter().filter(|c| c.feedback).collect();
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].from, v.bus.echo_feedback);
        assert_eq!(feedback[0].target_node(), Some(v.bus.echo));
    }

    #[test]
    fn test_filter_settings() {
        let mut ctx = OfflineContext::new(&seeded());
        let perf = build(&mut ctx, &seeded()).unwrap();
        let kind = |id| perf.graph.node(id).map(|n| n.kind().clone());

        assert!(matches!(
            kind(perf.voices.engine.filter),
            Some(NodeKind::Filter {
                filter_type: FilterType::Lowpass,
                frequency,
                q,
            }) if frequency == 400.0 && q == 0.7
        ));
        assert!(matches!(
            kind(perf.voices.intake.filter),
            Some(NodeKind::Filter {
                filter_type: FilterType::Bandpass,
                frequency,
                q,
            }) if frequency == 1400.0 && q == 1.2
        ));
        assert!(matches!(
            kind(perf.voices.whoosh.source),
            Some(NodeKind::NoiseSource { looping: false, .. })
        ));
    }

    #[test]
    fn test_noise_buffers_are_independent() {
        let mut ctx = OfflineContext::new(&seeded());
        let perf = build(&mut ctx, &seeded()).unwrap();
        let buffer = |id| match perf.graph.node(id).map(|n| n.kind().clone()) {
            Some(NodeKind::NoiseSource { buffer, .. }) => buffer,
            other => panic!("expected noise source, got {other:?}"),
        };

        let intake = buffer(perf.voices.intake.source);
        let whoosh = buffer(perf.voices.whoosh.source);
        assert_eq!(intake.len(), 96000);
        assert_ne!(intake.samples(), whoosh.samples());
    }

    #[test]
    fn test_seed_makes_build_deterministic() {
        let mut a = OfflineContext::new(&seeded());
        let mut b = OfflineContext::new(&seeded());
        let first = build(&mut a, &seeded()).unwrap();
        let second = build(&mut b, &seeded()).unwrap();
        let samples = |perf: &PerformanceGraph| match perf
            .graph
            .node(perf.voices.intake.source)
            .map(|n| n.kind().clone())
        {
            Some(NodeKind::NoiseSource { buffer, .. }) => buffer.samples().to_vec(),
            _ => Vec::new(),
        };
        assert_eq!(samples(&first), samples(&second));
    }

    #[test]
    fn test_vibrato_swings_engine_pitch() {
        let config = seeded();
        let mut ctx = OfflineContext::new(&config);
        let perf = build(&mut ctx, &config).unwrap();
        let t0 = 0.05;
        let timeline = Arc::new(crate::schedule(&perf, t0).unwrap());
        let mut renderer = Renderer::new(&perf.graph, Arc::clone(&timeline), 48000, 128).unwrap();
        let pitch = ParamRef::new(perf.voices.engine.source, Param::Frequency);

        let mut low = f32::MAX;
        let mut high = f32::MIN;
        // 0.05 s of silence before t0, then one second of the ramp-up
        for block in 0..394_u64 {
            renderer.render_block();
            let values = renderer.param_values(pitch).unwrap();
            for (i, &value) in values.iter().enumerate() {
                let time = frames_to_seconds(block * 128 + i as u64, 48000);
                if time < t0 {
                    assert_eq!(value, 55.0, "vibrato before t0 at {time}");
                    continue;
                }
                let scheduled = timeline.value_at(pitch, time, 55.0).unwrap();
                let deviation = value - scheduled;
                low = low.min(deviation);
                high = high.max(deviation);
            }
        }

        assert!(high > 1.75 && high <= 1.8 + 1e-3, "upper swing {high}");
        assert!(low < -1.75 && low >= -1.8 - 1e-3, "lower swing {low}");
    }

    #[test]
    fn test_node_budget_fails_build() {
        let config = AudioConfig {
            max_nodes: 5,
            ..seeded()
        };
        let mut ctx = OfflineContext::new(&config);
        let err = build(&mut ctx, &config).unwrap_err();
        assert!(matches!(err, Error::GraphBuild(_)));
    }
}
