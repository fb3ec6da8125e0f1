//! Lockless communication between the control thread and the audio callback.
//!
//! Small `Copy`-friendly commands and events travel over `rtrb` ring buffers.
//! Renderers are boxed and heap-owned, so they go over a separate crossbeam
//! channel in each direction: new renderers to the callback, retired ones back
//! so they are dropped off the audio thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use rtrb;

use crossbeam_channel::{Receiver, Sender};
use revline_core::{SampleRate, Seconds, frames_to_seconds};

/// Commands from the control thread to the audio callback
///
/// All variants must be real-time safe (no heap allocation/deallocation).
/// Renderers use the separate `renderer_tx` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCommand {
    /// Start rendering the installed renderer
    Start,
    /// Output silence; the renderer stays installed
    Stop,
    /// Hand the installed renderer back on the retire channel
    Retire,
}

/// Events from the audio callback back to the control thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    /// The first callback ran at the device's actual sample rate
    EngineInitialized {
        /// Actual sample rate of the output stream
        sample_rate: SampleRate,
    },
    /// A renderer was installed, positioned at context frame `frame`
    RendererInstalled { frame: u64 },
    /// Rendering started at context frame `frame`
    Started { frame: u64 },
    /// Rendering stopped
    Stopped,
    /// Stream error reported by the backend
    Error(String),
}

/// Renderer handed to the audio callback
pub type RendererInstance = Box<revline_dsp::Renderer>;

/// Monotonic frame counter advanced by the audio callback.
///
/// This is the context clock: every other component reads "now" from here.
#[derive(Debug, Clone, Default)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
}

impl AudioClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the audio callback after producing `frames` frames
    #[inline]
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn seconds(&self, sample_rate: SampleRate) -> Seconds {
        frames_to_seconds(self.frames(), sample_rate)
    }
}

/// Create a pair of channel ends for bidirectional communication
pub fn create_channels(capacity: usize) -> (ControlChannels, AudioChannels) {
    let (cmd_tx, cmd_rx) = rtrb::RingBuffer::new(capacity);
    let (evt_tx, evt_rx) = rtrb::RingBuffer::new(capacity);
    let (renderer_tx, renderer_rx) = crossbeam_channel::unbounded();
    let (retired_tx, retired_rx) = crossbeam_channel::unbounded();
    let clock = AudioClock::new();

    let control = ControlChannels {
        command_tx: cmd_tx,
        event_rx: evt_rx,
        renderer_tx,
        retired_rx,
        clock: clock.clone(),
    };

    let audio = AudioChannels {
        command_rx: cmd_rx,
        event_tx: evt_tx,
        renderer_rx,
        retired_tx,
        clock,
    };

    (control, audio)
}

/// Channel ends owned by the control thread
pub struct ControlChannels {
    /// Command sender (control -> audio)
    pub command_tx: rtrb::Producer<AudioCommand>,
    /// Event receiver (audio -> control)
    pub event_rx: rtrb::Consumer<AudioEvent>,
    /// Renderer sender (control -> audio)
    pub renderer_tx: Sender<RendererInstance>,
    /// Retired renderers (audio -> control), dropped here
    pub retired_rx: Receiver<RendererInstance>,
    pub clock: AudioClock,
}

/// Channel ends owned by the audio callback
pub struct AudioChannels {
    /// Command receiver (control -> audio)
    pub command_rx: rtrb::Consumer<AudioCommand>,
    /// Event sender (audio -> control)
    pub event_tx: rtrb::Producer<AudioEvent>,
    /// Renderer receiver - `try_recv` is non-blocking
    pub renderer_rx: Receiver<RendererInstance>,
    pub retired_tx: Sender<RendererInstance>,
    pub clock: AudioClock,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let (mut control, mut audio) = create_channels(16);
        assert!(control.command_tx.push(AudioCommand::Start).is_ok());
        assert_eq!(audio.command_rx.pop().ok(), Some(AudioCommand::Start));

        assert!(audio.event_tx.push(AudioEvent::Stopped).is_ok());
        assert_eq!(control.event_rx.pop().ok(), Some(AudioEvent::Stopped));
    }

    #[test]
    fn test_clock_is_shared() {
        let (control, audio) = create_channels(4);
        audio.clock.advance(24000);
        audio.clock.advance(24000);
        assert_eq!(control.clock.frames(), 48000);
        assert!((control.clock.seconds(48000) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_command_ring_is_bounded() {
        let (mut control, _audio) = create_channels(2);
        assert!(control.command_tx.push(AudioCommand::Start).is_ok());
        assert!(control.command_tx.push(AudioCommand::Stop).is_ok());
        assert!(control.command_tx.push(AudioCommand::Retire).is_err());
    }
}
