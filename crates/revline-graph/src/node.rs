//! Node kinds and automatable parameters.

use std::fmt;

use crate::noise::NoiseBuffer;
use revline_core::Sample;

/// Node identifier, index into the owning [`crate::SignalGraph`]
pub type NodeId = usize;

/// Oscillator waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
}

/// Biquad filter responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
}

/// A numeric parameter of a node that can carry an automation curve
/// or receive audio-rate modulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// Oscillator pitch or filter cutoff/center (Hz)
    Frequency,
    /// Filter resonance
    Q,
    /// Linear gain level
    Gain,
    /// Delay time (seconds)
    DelayTime,
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Frequency => "frequency",
            Self::Q => "Q",
            Self::Gain => "gain",
            Self::DelayTime => "delay time",
        };
        f.write_str(name)
    }
}

/// One parameter of one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamRef {
    pub node: NodeId,
    pub param: Param,
}

impl ParamRef {
    pub const fn new(node: NodeId, param: Param) -> Self {
        Self { node, param }
    }
}

impl fmt::Display for ParamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} {}", self.node, self.param)
    }
}

/// Dynamics compressor settings (static for the lifetime of a performance)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorSettings {
    /// Threshold in dB
    pub threshold: f32,
    /// Knee width in dB
    pub knee: f32,
    /// Compression ratio (e.g. 3.5 = 3.5:1)
    pub ratio: f32,
    /// Attack time in seconds
    pub attack: f32,
    /// Release time in seconds
    pub release: f32,
}

/// What a node does. Values carried here are the intrinsic parameter
/// values, used wherever no automation point applies.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Oscillator {
        waveform: Waveform,
        frequency: Sample,
    },
    NoiseSource {
        buffer: NoiseBuffer,
        looping: bool,
    },
    Filter {
        filter_type: FilterType,
        frequency: Sample,
        q: Sample,
    },
    Gain {
        level: Sample,
    },
    DynamicsCompressor(CompressorSettings),
    Delay {
        time: Sample,
        max_time: Sample,
    },
    ChannelSplitter {
        outputs: usize,
    },
    ChannelMerger {
        inputs: usize,
    },
}

impl NodeKind {
    /// Short type name for logs and listings
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Oscillator { .. } => "oscillator",
            Self::NoiseSource { .. } => "noise",
            Self::Filter { .. } => "filter",
            Self::Gain { .. } => "gain",
            Self::DynamicsCompressor(_) => "compressor",
            Self::Delay { .. } => "delay",
            Self::ChannelSplitter { .. } => "splitter",
            Self::ChannelMerger { .. } => "merger",
        }
    }

    /// Sources produce sound on their own and need a start/stop window
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Oscillator { .. } | Self::NoiseSource { .. })
    }

    /// Number of input ports
    pub const fn input_count(&self) -> usize {
        match self {
            Self::Oscillator { .. } | Self::NoiseSource { .. } => 0,
            Self::ChannelMerger { inputs } => *inputs,
            _ => 1,
        }
    }

    /// Number of output ports
    pub const fn output_count(&self) -> usize {
        match self {
            Self::ChannelSplitter { outputs } => *outputs,
            _ => 1,
        }
    }

    /// Automatable parameters, in a stable order
    pub const fn params(&self) -> &'static [Param] {
        match self {
            Self::Oscillator { .. } => &[Param::Frequency],
            Self::Filter { .. } => &[Param::Frequency, Param::Q],
            Self::Gain { .. } => &[Param::Gain],
            Self::Delay { .. } => &[Param::DelayTime],
            Self::NoiseSource { .. }
            | Self::DynamicsCompressor(_)
            | Self::ChannelSplitter { .. }
            | Self::ChannelMerger { .. } => &[],
        }
    }

    /// Intrinsic value of a parameter, `None` if the node has no such parameter
    pub fn intrinsic(&self, param: Param) -> Option<Sample> {
        match (self, param) {
            (Self::Oscillator { frequency, .. }, Param::Frequency)
            | (Self::Filter { frequency, .. }, Param::Frequency) => Some(*frequency),
            (Self::Filter { q, .. }, Param::Q) => Some(*q),
            (Self::Gain { level }, Param::Gain) => Some(*level),
            (Self::Delay { time, .. }, Param::DelayTime) => Some(*time),
            _ => None,
        }
    }

    pub fn has_param(&self, param: Param) -> bool {
        self.params().contains(&param)
    }
}

/// A node in the signal graph
#[derive(Debug, Clone)]
pub struct SignalNode {
    id: NodeId,
    label: String,
    kind: NodeKind,
}

impl SignalNode {
    pub(crate) fn new(id: NodeId, label: String, kind: NodeKind) -> Self {
        Self { id, label, kind }
    }

    /// Get the node's ID
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Human-readable label (e.g. "engine lowpass")
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}
