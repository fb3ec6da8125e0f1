//! Device context - the default output device through cpal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::Stream;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Receiver;

use crate::AudioConfig;
use crate::context::{AudioContext, ContextFactory, ContextState, NodeBudget, closed_error};
use revline_comms::{
    AudioChannels, AudioCommand, AudioEvent, ControlChannels, RendererInstance, create_channels,
};
use revline_core::{ChannelCount, Error, Frames, Result, SampleRate, Seconds};
use revline_dsp::Renderer;
use revline_graph::{NodeKind, PerformanceTimeline, SignalGraph};

/// How long `resume` waits for the first audio callback
const RESUME_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `close` waits for the callback to hand the renderer back
const RETIRE_TIMEOUT: Duration = Duration::from_millis(200);

/// Capacity of the command and event rings
const CHANNEL_CAPACITY: usize = 64;

/// A context rendering to the default output device.
///
/// The clock is the frame counter the audio callback advances, so
/// `current_time` is exactly the amount of audio handed to the device.
pub struct DeviceContext {
    stream: Option<Stream>,
    control: ControlChannels,
    sample_rate: SampleRate,
    block_size: Frames,
    state: ContextState,
    budget: NodeBudget,
}

impl DeviceContext {
    /// Open the default output device. The stream is built paused.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        tracing::debug!("Using audio host: {}", host.id().name());

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::ContextUnavailable("No output device available".to_string()))?;
        tracing::info!(
            "Using output device: {}",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string())
        );

        let stream_config = cpal::StreamConfig {
            channels: config.output_channels as u16,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        tracing::debug!("Stream config: {:?}", stream_config);

        let (control, audio) = create_channels(CHANNEL_CAPACITY);
        let stream = build_stream(
            &device,
            &stream_config,
            audio,
            config.output_channels.max(1),
        )?;
        stream
            .pause()
            .map_err(|e| Error::ContextUnavailable(format!("Failed to pause new stream: {e}")))?;

        Ok(Self {
            stream: Some(stream),
            control,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            state: ContextState::Suspended,
            budget: NodeBudget::new(config.max_nodes),
        })
    }

    fn send(&mut self, command: AudioCommand) -> Result<()> {
        self.control
            .command_tx
            .push(command)
            .map_err(|_| Error::Audio(format!("Command queue full, dropped {command:?}")))
    }

    /// Wait for the callback to report that it is running
    fn await_initialized(&mut self) -> Result<()> {
        let deadline = Instant::now() + RESUME_TIMEOUT;
        while Instant::now() < deadline {
            while let Ok(event) = self.control.event_rx.pop() {
                match event {
                    AudioEvent::EngineInitialized { sample_rate } => {
                        tracing::info!("Audio stream running at {} Hz", sample_rate);
                        return Ok(());
                    }
                    AudioEvent::Error(message) => return Err(Error::ContextUnavailable(message)),
                    other => tracing::debug!("Audio event before start: {:?}", other),
                }
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(Error::ContextUnavailable(format!(
            "Output stream did not start within {RESUME_TIMEOUT:?}"
        )))
    }

    /// Log events the callback reported since the last call
    fn drain_events(&mut self) {
        while let Ok(event) = self.control.event_rx.pop() {
            match event {
                AudioEvent::Error(message) => tracing::error!("Audio stream error: {}", message),
                other => tracing::debug!("Audio event: {:?}", other),
            }
        }
        // Renderers handed back by the callback are dropped here, off the audio thread
        while self.control.retired_rx.try_recv().is_ok() {}
    }

    /// Wait for the callback to hand the installed renderer back
    fn await_retired(&mut self) {
        match self.control.retired_rx.recv_timeout(RETIRE_TIMEOUT) {
            Ok(renderer) => {
                tracing::debug!("Renderer retired at frame {}", renderer.position());
            }
            Err(_) => tracing::debug!("No renderer came back from the audio callback"),
        }
    }
}

/// State owned by the audio callback
pub(crate) struct OutputCallback {
    channels: AudioChannels,
    errors: Receiver<String>,
    renderer: Option<RendererInstance>,
    sample_rate: SampleRate,
    num_channels: ChannelCount,
    is_running: bool,
    initialized: bool,
}

impl OutputCallback {
    pub(crate) fn new(
        channels: AudioChannels,
        errors: Receiver<String>,
        sample_rate: SampleRate,
        num_channels: ChannelCount,
    ) -> Self {
        Self {
            channels,
            errors,
            renderer: None,
            sample_rate,
            num_channels: num_channels.max(1),
            is_running: false,
            initialized: false,
        }
    }

    /// One device callback: report, apply commands, install, render, advance.
    ///
    /// REAL-TIME SAFE: no tracing, no blocking, no allocation of its own
    pub(crate) fn process(&mut self, data: &mut [f32]) {
        if !self.initialized {
            self.initialized = true;
            let _ = self.channels.event_tx.push(AudioEvent::EngineInitialized {
                sample_rate: self.sample_rate,
            });
        }

        while let Ok(message) = self.errors.try_recv() {
            let _ = self.channels.event_tx.push(AudioEvent::Error(message));
        }

        if let Ok(mut next) = self.channels.renderer_rx.try_recv() {
            let frame = self.channels.clock.frames();
            next.seek(frame);
            if let Some(old) = self.renderer.replace(next) {
                let _ = self.channels.retired_tx.send(old);
            }
            let _ = self
                .channels
                .event_tx
                .push(AudioEvent::RendererInstalled { frame });
        }

        while let Ok(cmd) = self.channels.command_rx.pop() {
            match cmd {
                AudioCommand::Start => {
                    self.is_running = true;
                    let _ = self.channels.event_tx.push(AudioEvent::Started {
                        frame: self.channels.clock.frames(),
                    });
                }
                AudioCommand::Stop => {
                    self.is_running = false;
                    let _ = self.channels.event_tx.push(AudioEvent::Stopped);
                }
                AudioCommand::Retire => {
                    if let Some(old) = self.renderer.take() {
                        let _ = self.channels.retired_tx.send(old);
                    }
                }
            }
        }

        match self.renderer.as_mut() {
            Some(active) if self.is_running => active.fill_interleaved(data, self.num_channels),
            _ => data.fill(0.0),
        }

        self.channels
            .clock
            .advance((data.len() / self.num_channels) as u64);
    }
}

/// Build the output stream. The callback owns its end of the channels.
fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: AudioChannels,
    num_channels: ChannelCount,
) -> Result<Stream> {
    // The error callback cannot share the event producer with the data
    // callback, so stream errors go through a channel of their own
    let (error_tx, error_rx) = crossbeam_channel::bounded::<String>(16);
    let mut callback = OutputCallback::new(channels, error_rx, config.sample_rate.0, num_channels);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback.process(data),
            move |err| {
                let _ = error_tx.try_send(err.to_string());
            },
            None,
        )
        .map_err(|e| Error::ContextUnavailable(format!("Failed to build output stream: {e}")))?;

    Ok(stream)
}

impl AudioContext for DeviceContext {
    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn current_time(&self) -> Seconds {
        self.control.clock.seconds(self.sample_rate)
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Running => Ok(()),
            ContextState::Closed => Err(Error::ContextUnavailable(
                "cannot resume a closed context".to_string(),
            )),
            ContextState::Suspended => {
                let stream = self
                    .stream
                    .as_ref()
                    .ok_or_else(|| Error::ContextUnavailable("stream released".to_string()))?;
                stream
                    .play()
                    .map_err(|e| Error::ContextUnavailable(format!("Failed to start stream: {e}")))?;
                self.await_initialized()?;
                self.state = ContextState::Running;
                Ok(())
            }
        }
    }

    fn reserve_node(&mut self, kind: &NodeKind) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(closed_error(kind));
        }
        self.budget.reserve(kind)
    }

    fn commit(&mut self, graph: &SignalGraph, timeline: Arc<PerformanceTimeline>) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(Error::Audio("cannot commit to a closed context".to_string()));
        }
        self.drain_events();
        let renderer = Renderer::new(graph, timeline, self.sample_rate, self.block_size)?;
        self.control
            .renderer_tx
            .send(Box::new(renderer))
            .map_err(|_| Error::Audio("audio callback is gone".to_string()))?;
        self.send(AudioCommand::Start)
    }

    fn close(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Err(Error::Audio("context already closed".to_string()));
        }
        let was_running = self.state == ContextState::Running;
        self.state = ContextState::Closed;

        // Silence at the command level first, then take the renderer back so
        // it is dropped here rather than with the callback
        let silenced = self
            .send(AudioCommand::Stop)
            .and_then(|()| self.send(AudioCommand::Retire));
        if was_running && silenced.is_ok() {
            self.await_retired();
        }
        self.drain_events();

        if let Some(stream) = self.stream.take() {
            let paused = stream.pause();
            drop(stream);
            paused.map_err(|e| Error::Audio(format!("Failed to pause stream: {e}")))?;
        }
        tracing::info!("Device context closed");
        silenced
    }
}

impl Drop for DeviceContext {
    // NOTE: Clippy suggests collapsing this with let-chains syntax
    #[allow(clippy::collapsible_if)]
    fn drop(&mut self) {
        if self.state != ContextState::Closed {
            if let Err(e) = self.close() {
                tracing::error!("Error closing device context: {}", e);
            }
        }
    }
}

/// Opens a [`DeviceContext`] on the default output device for every performance
#[derive(Debug, Default)]
pub struct DeviceFactory;

impl ContextFactory for DeviceFactory {
    type Context = DeviceContext;

    fn create(&mut self, config: &AudioConfig) -> Result<DeviceContext> {
        DeviceContext::open(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revline_graph::{TimelineBuilder, Waveform};

    fn sine_renderer() -> RendererInstance {
        let mut graph = SignalGraph::new();
        let osc = graph.add_node(
            "osc",
            NodeKind::Oscillator {
                waveform: Waveform::Sine,
                frequency: 440.0,
            },
        );
        graph.connect_output(osc).unwrap();
        let mut builder = TimelineBuilder::new(0.0, 10.0);
        builder.window(osc, 0.0, 10.0).unwrap();
        let timeline = Arc::new(builder.build(&graph).unwrap());
        Box::new(Renderer::new(&graph, timeline, 48000, 128).unwrap())
    }

    fn callback() -> (ControlChannels, OutputCallback) {
        let (control, audio) = create_channels(CHANNEL_CAPACITY);
        let (_error_tx, error_rx) = crossbeam_channel::bounded(1);
        (control, OutputCallback::new(audio, error_rx, 48000, 2))
    }

    fn peak(data: &[f32]) -> f32 {
        data.iter().fold(0.0_f32, |max, &s| max.max(s.abs()))
    }

    #[test]
    fn test_callback_renders_after_start() {
        let (mut control, mut callback) = callback();
        let mut data = vec![1.0; 512];

        // Nothing installed yet: silence, clock still moves
        callback.process(&mut data);
        assert_eq!(peak(&data), 0.0);
        assert_eq!(control.clock.frames(), 256);
        assert_eq!(
            control.event_rx.pop().ok(),
            Some(AudioEvent::EngineInitialized { sample_rate: 48000 })
        );

        control.renderer_tx.send(sine_renderer()).unwrap();
        control.command_tx.push(AudioCommand::Start).unwrap();
        callback.process(&mut data);
        assert!(peak(&data) > 0.5);
        assert_eq!(
            control.event_rx.pop().ok(),
            Some(AudioEvent::RendererInstalled { frame: 256 })
        );
        assert_eq!(
            control.event_rx.pop().ok(),
            Some(AudioEvent::Started { frame: 256 })
        );
    }

    #[test]
    fn test_stop_and_retire_hand_renderer_back() {
        let (mut control, mut callback) = callback();
        let mut data = vec![0.0; 512];
        control.renderer_tx.send(sine_renderer()).unwrap();
        control.command_tx.push(AudioCommand::Start).unwrap();
        callback.process(&mut data);
        assert!(peak(&data) > 0.5);

        control.command_tx.push(AudioCommand::Stop).unwrap();
        control.command_tx.push(AudioCommand::Retire).unwrap();
        callback.process(&mut data);
        assert_eq!(peak(&data), 0.0);

        let retired = control.retired_rx.try_recv().unwrap();
        assert_eq!(retired.position(), 256);
        let events: Vec<AudioEvent> = std::iter::from_fn(|| control.event_rx.pop().ok()).collect();
        assert!(events.contains(&AudioEvent::Stopped));

        // A later Start has nothing to play
        control.command_tx.push(AudioCommand::Start).unwrap();
        callback.process(&mut data);
        assert_eq!(peak(&data), 0.0);
    }

    #[test]
    fn test_new_renderer_retires_the_old_one() {
        let (control, mut callback) = callback();
        let mut data = vec![0.0; 256];
        control.renderer_tx.send(sine_renderer()).unwrap();
        callback.process(&mut data);
        assert!(control.retired_rx.try_recv().is_err());

        control.renderer_tx.send(sine_renderer()).unwrap();
        callback.process(&mut data);
        assert!(control.retired_rx.try_recv().is_ok());
    }

    #[test]
    fn test_stream_errors_become_events() {
        let (mut control, audio) = create_channels(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = crossbeam_channel::bounded(4);
        let mut callback = OutputCallback::new(audio, error_rx, 44100, 2);
        error_tx.send("device unplugged".to_string()).unwrap();

        let mut data = vec![0.0; 64];
        callback.process(&mut data);
        let events: Vec<AudioEvent> = std::iter::from_fn(|| control.event_rx.pop().ok()).collect();
        assert!(events.contains(&AudioEvent::Error("device unplugged".to_string())));
    }

    /// Returns true if we should skip the test
    fn should_skip_audio_test() -> bool {
        let host = cpal::default_host();
        host.default_output_device().is_none()
    }

    #[test]
    fn test_context_resume_close() {
        if should_skip_audio_test() {
            eprintln!("Skipping test: No audio device available (CI environment)");
            return;
        }

        let mut ctx = match DeviceContext::open(&AudioConfig::default()) {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("Skipping test: Audio device unavailable - {e}");
                return;
            }
        };
        assert_eq!(ctx.state(), ContextState::Suspended);

        if let Err(e) = ctx.resume() {
            eprintln!("Skipping test: Audio device did not start - {e}");
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
        assert!(ctx.current_time() > 0.0);

        assert!(ctx.close().is_ok());
        assert!(ctx.close().is_err());
    }

    #[test]
    fn test_closed_context_refuses_nodes() {
        if should_skip_audio_test() {
            eprintln!("Skipping test: No audio device available (CI environment)");
            return;
        }

        let Ok(mut ctx) = DeviceContext::open(&AudioConfig::default()) else {
            eprintln!("Skipping test: Audio device unavailable");
            return;
        };
        ctx.close().unwrap();
        let err = ctx.reserve_node(&NodeKind::Gain { level: 1.0 }).unwrap_err();
        assert!(matches!(err, Error::GraphBuild(_)));
    }
}
