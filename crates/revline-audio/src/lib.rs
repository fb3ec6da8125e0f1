//! Audio contexts and the performance lifecycle.
//!
//! This crate provides the [`AudioContext`] abstraction (an offline context
//! clocked by the caller and a cpal-backed device context), the graph builder
//! and automation scheduler for the engine-rev performance, and the
//! [`Transport`] that owns one performance at a time.

pub mod builder;
pub mod context;
pub mod device;
pub mod offline;
pub mod scheduler;
pub mod transport;

pub use builder::{PerformanceGraph, Voices, build};
pub use context::{AudioContext, ContextFactory, ContextState, NodeBudget};
pub use device::{DeviceContext, DeviceFactory};
pub use offline::{OfflineContext, OfflineFactory, RenderReport};
pub use scheduler::schedule;
pub use transport::{Finish, ProgressState, Transport, TransportState};

use revline_core::{ChannelCount, Frames, SampleRate};

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    /// Render block size in frames
    pub block_size: Frames,
    pub output_channels: ChannelCount,
    /// Most nodes a context will allocate for one performance
    pub max_nodes: usize,
    /// Seed for the noise buffers; `None` draws from entropy
    pub noise_seed: Option<u64>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 128,
            output_channels: 2,
            max_nodes: 64,
            noise_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.block_size, 128);
        assert_eq!(config.output_channels, 2);
        assert!(config.noise_seed.is_none());
    }
}
