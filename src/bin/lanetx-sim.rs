//! Run a synthetic pixel stream through the transmitter and check the lane output.
//!
//! Usage: `lanetx-sim [CONFIG.yaml] [--frames N] [--lines N] [--pixels N] [--lockstep]`
//!
//! Both contexts run as tokio tasks paced by the configured clock rates, or in
//! deterministic lockstep with `--lockstep`. Set `RUST_LOG` to adjust logging.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lanetx::{
    ChannelLane, PixelEvent, ReadyPattern, ScriptedSource, Transmitter, TransmitterConfig,
    lane_bytes, packetize,
};

#[derive(Parser, Debug)]
#[command(name = "lanetx-sim", about = "Drive a synthetic pixel stream through the transmitter")]
struct Cli {
    /// Path to a YAML configuration file; defaults are used when omitted.
    config: Option<PathBuf>,

    /// Frames to generate.
    #[arg(long, default_value_t = 2)]
    frames: usize,

    /// Lines per frame.
    #[arg(long, default_value_t = 4)]
    lines: usize,

    /// Pixels per line.
    #[arg(long, default_value_t = 16)]
    pixels: usize,

    /// Step both contexts in deterministic lockstep instead of as tokio tasks.
    #[arg(long)]
    lockstep: bool,
}

fn synthetic_stream(options: &Cli) -> Vec<PixelEvent> {
    let mut events = Vec::new();
    for frame in 0..options.frames {
        events.push(PixelEvent::frame_start());
        for line in 0..options.lines {
            events.push(PixelEvent::line_start());
            for pixel in 0..options.pixels {
                let payload = ((frame as u64) << 48) | ((line as u64) << 24) | pixel as u64;
                events.push(PixelEvent::pixel(payload));
            }
            events.push(PixelEvent::line_end());
        }
        events.push(PixelEvent::frame_end());
    }
    events
}

fn run_lockstep(config: &TransmitterConfig, events: Vec<PixelEvent>) -> Result<Vec<u8>> {
    let mut sim = Transmitter::simulate(config)?;
    sim.settle(10_000).context("transmitter never left reset")?;
    sim.feed(events);

    let ticks = sim.run_until_drained(10_000_000).context("transmitter never drained")?;
    info!("Lockstep run drained after {} ticks", ticks);
    if sim.status().interrupt {
        warn!("Interrupt causes raised: {:#x}", sim.status().causes.value());
    }
    Ok(sim.take_lane_bytes())
}

async fn run_live(config: &TransmitterConfig, events: Vec<PixelEvent>, frames: u64) -> Result<Vec<u8>> {
    let (lane, mut units) = ChannelLane::new(ReadyPattern::Always);
    let transmitter = Transmitter::spawn(config, ScriptedSource::new(events), lane)?;

    transmitter
        .wait_for(
            |status| {
                status.builder_stats.frames == frames
                    && status.queue.pushed == status.queue.popped
                    && status.idle
            },
            Duration::from_secs(30),
        )
        .await
        .context("transmitter never went idle")?;
    let status = transmitter.status();
    info!(
        "Live run idle after {} control cycles, {} transmit cycles",
        status.cycles,
        transmitter.transmit_status().cycles
    );
    info!("Final status: {:?}", status);
    transmitter.shutdown();

    let mut bytes = Vec::new();
    while let Ok(unit) = units.try_recv() {
        bytes.push(unit);
    }
    Ok(bytes)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let options = Cli::parse();
    let config = match &options.config {
        Some(path) => TransmitterConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => TransmitterConfig::default(),
    };
    config.validate()?;

    let events = synthetic_stream(&options);
    let expected = lane_bytes(&packetize(&events, &config.codes)?);
    info!(
        "Sending {} frames of {}x{} pixels ({} lane bytes expected)",
        options.frames,
        options.lines,
        options.pixels,
        expected.len()
    );

    let actual = if options.lockstep {
        run_lockstep(&config, events)?
    } else {
        run_live(&config, events, options.frames as u64).await?
    };

    if actual != expected {
        let first = actual.iter().zip(&expected).position(|(a, e)| a != e);
        bail!(
            "lane output differs: {} bytes sent, {} expected, first mismatch at {:?}",
            actual.len(),
            expected.len(),
            first
        );
    }

    info!("Lane output matches ({} bytes)", actual.len());
    Ok(())
}
