//! revline - a ten-second synthesized engine rev.
//!
//! Plays the performance on the default output device, rehearses it against
//! the offline context, or prints its timeline.

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use revline_audio::{
    AudioConfig, AudioContext, ContextFactory, DeviceFactory, OfflineContext, OfflineFactory,
    Transport, build, schedule,
};
use revline_core::Seconds;
use revline_graph::Interpolation;

#[derive(Parser, Debug)]
#[command(name = "revline")]
#[command(about = "Procedurally synthesized engine rev", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play the performance on the default output device
    Play(RunArgs),
    /// Run the full lifecycle against an offline context, no device needed
    Rehearse(RunArgs),
    /// Print every scheduled curve and source window
    Timeline {
        /// Origin instant (t0) in seconds
        #[arg(long, default_value_t = 0.0)]
        origin: Seconds,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Seed for the noise buffers (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Progress frame interval in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Stop after this many seconds instead of playing to the end
    #[arg(long, value_parser = parse_seconds)]
    stop_after: Option<f64>,

    /// Output sample rate
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Render block size in frames
    #[arg(long, default_value_t = 128)]
    block_size: usize,
}

/// A finite, non-negative number of seconds
fn parse_seconds(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("`{value}` is not a number: {e}"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("`{value}` must be a finite, non-negative number of seconds"));
    }
    Ok(seconds)
}

impl RunArgs {
    fn config(&self) -> AudioConfig {
        AudioConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            noise_seed: self.seed,
            ..AudioConfig::default()
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_ms.max(1))
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revline=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Play(args) => play(&args),
        Command::Rehearse(args) => rehearse(&args),
        Command::Timeline { origin } => print_timeline(origin),
    }
}

/// Play on the default device, pacing frames in real time
fn play(args: &RunArgs) -> Result<()> {
    let config = args.config();
    tracing::info!("Audio config: {:?}", config);

    let mut transport = Transport::new(DeviceFactory, config);
    transport
        .play()
        .context("Failed to start the performance on the output device")?;

    let started = Instant::now();
    let stop_after = args.stop_after.map(Duration::from_secs_f64);
    transport.drive(
        args.frame_interval(),
        |t| {
            if stop_after.is_some_and(|limit| started.elapsed() >= limit) {
                t.stop();
            }
        },
        |t| print_progress(t.progress(), t.is_playing()),
    );
    println!();

    report_finish(&transport);
    Ok(())
}

/// Same lifecycle as `play`, on an offline context advanced one frame per tick
fn rehearse(args: &RunArgs) -> Result<()> {
    let config = args.config();
    tracing::info!("Rehearsing with config: {:?}", config);

    let mut transport = Transport::new(OfflineFactory::new(), config);
    transport
        .play()
        .context("Failed to start the rehearsal")?;

    let frame = args.frame_interval().as_secs_f64();
    let stop_after = args.stop_after;
    let mut peak = 0.0_f32;
    let mut frames = 0_u64;
    transport.drive(
        Duration::ZERO,
        |t| {
            let origin = t.origin().unwrap_or_default();
            let Some(ctx) = t.context_mut() else {
                return;
            };
            peak = peak.max(ctx.advance(frame).peak);
            frames = ctx.frames();
            let elapsed = ctx.current_time() - origin;
            if stop_after.is_some_and(|limit| elapsed >= limit) {
                t.stop();
            }
        },
        |t| print_progress(t.progress(), t.is_playing()),
    );
    println!();

    println!(
        "Rendered {} frames ({:.2}s), output peak {:.3} ({:.1} dBFS)",
        frames,
        frames as f64 / f64::from(transport.config().sample_rate),
        peak,
        20.0 * f64::from(peak.max(1e-6)).log10()
    );
    report_finish(&transport);
    Ok(())
}

fn report_finish<F: ContextFactory>(transport: &Transport<F>) {
    match transport.last_finish() {
        Some(finish) => tracing::info!("Performance finished: {:?}", finish),
        None => tracing::warn!("Performance did not run"),
    }
}

/// Single-line progress bar, redrawn in place
fn print_progress(progress: f64, playing: bool) {
    const WIDTH: usize = 40;
    let filled = ((progress * WIDTH as f64).round() as usize).min(WIDTH);
    print!(
        "\r[{}{}] {:5.1}%{}",
        "#".repeat(filled),
        " ".repeat(WIDTH - filled),
        progress * 100.0,
        if playing { "" } else { " done" }
    );
    let _ = std::io::stdout().flush();
}

/// Build and schedule against a throwaway offline context, then print it
fn print_timeline(origin: Seconds) -> Result<()> {
    let config = AudioConfig {
        noise_seed: Some(0),
        ..AudioConfig::default()
    };
    let mut context = OfflineContext::new(&config);
    let perf = build(&mut context, &config).context("Failed to build the performance graph")?;
    let timeline = schedule(&perf, origin).context("Failed to schedule the performance")?;
    let label = |node| {
        perf.graph
            .node(node)
            .map_or_else(|| format!("node {node}"), |n| n.label().to_string())
    };

    println!(
        "Performance: t0 = {:.3}s, ends {:.3}s, {} nodes",
        timeline.origin(),
        timeline.end(),
        perf.graph.len()
    );

    println!("\nCurves:");
    for curve in timeline.curves() {
        let param = curve.param();
        println!("  {} {}", label(param.node), param.param);
        for point in curve.points() {
            let how = match point.interpolation {
                Interpolation::Step => "set",
                Interpolation::Linear => "linear",
                Interpolation::Exponential => "exponential",
            };
            println!(
                "    +{:6.3}s  {:>11}  {:.3}",
                timeline.offset_of(point.time),
                how,
                point.value
            );
        }
    }

    println!("\nSource windows:");
    for window in timeline.windows() {
        println!(
            "  {:<8} +{:.3}s .. +{:.3}s",
            label(window.node),
            timeline.offset_of(window.start),
            timeline.offset_of(window.stop)
        );
    }

    context.close().context("Failed to close the offline context")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop_after(value: &str) -> std::result::Result<Option<f64>, clap::Error> {
        let arg = format!("--stop-after={value}");
        let cli = Cli::try_parse_from(["revline", "rehearse", arg.as_str()])?;
        match cli.command {
            Command::Rehearse(args) => Ok(args.stop_after),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_stop_after_accepts_seconds() {
        assert_eq!(stop_after("4").unwrap(), Some(4.0));
        assert_eq!(stop_after("0").unwrap(), Some(0.0));
        assert_eq!(stop_after("2.5").unwrap(), Some(2.5));
    }

    #[test]
    fn test_stop_after_rejects_unusable_values() {
        for value in ["-1", "inf", "NaN", "soon"] {
            assert!(stop_after(value).is_err(), "accepted {value}");
        }
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["revline", "play"]).unwrap();
        let Command::Play(args) = cli.command else {
            panic!("expected play");
        };
        assert_eq!(args.frame_ms, 16);
        assert!(args.stop_after.is_none());
        assert_eq!(args.config().sample_rate, 48000);
    }
}
