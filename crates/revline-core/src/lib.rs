//! Core types, constants, and errors shared across the revline crates.
//!
//! This crate provides the fundamental building blocks every other revline
//! crate depends on: sample/time aliases, the fixed shape of the performance,
//! and the common error type surfaced to callers of the transport.

/// Sample rate in Hz
pub type SampleRate = u32;

/// Number of audio frames (samples per channel)
pub type Frames = usize;

/// Audio sample type
pub type Sample = f32;

/// Number of audio channels
pub type ChannelCount = usize;

/// Time in seconds on an audio context clock
pub type Seconds = f64;

/// Fixed shape of the performance
pub mod performance {
    use super::Seconds;

    /// Total length of one performance
    pub const DURATION: Seconds = 10.0;

    /// Headroom between "now" on the context clock and the origin instant
    pub const START_LATENCY: Seconds = 0.05;

    /// Tolerance allowed past `origin + DURATION` for a source stop instant
    pub const STOP_EPSILON: Seconds = 0.001;

    /// Length of each generated noise buffer
    pub const NOISE_SECONDS: Seconds = 2.0;
}

/// Common error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The platform could not provide an audio output context
    #[error("Audio context unavailable: {0}")]
    ContextUnavailable(String),

    /// A node could not be allocated or wired while building the graph
    #[error("Graph build failed: {0}")]
    GraphBuild(String),

    /// An automation curve or source window violates the timeline invariants
    #[error("Invalid automation: {0}")]
    InvalidAutomation(String),

    /// Other audio backend failure
    #[error("Audio error: {0}")]
    Audio(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Convert a frame position to seconds at the given sample rate
#[inline]
pub fn frames_to_seconds(frames: u64, sample_rate: SampleRate) -> Seconds {
    frames as Seconds / Seconds::from(sample_rate)
}
