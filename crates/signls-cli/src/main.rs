//! signls: headless runner for the generative MIDI grid

mod config;
mod display;
mod patch;

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use signls_core::{Grid, GridSnapshot, MidiSink};
use signls_services::{Engine, LoggingMidi, MidiOutService};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Cli, Config};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("signls=debug".parse()?))
        .init();

    let cli = Cli::parse();
    let path = cli.config.clone().unwrap_or_else(config::config_path);
    let config = cli.apply(config::load_config(&path));
    info!(path = %path.display(), ?config, "Starting signls");

    let rng = cli
        .seed
        .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);

    if cli.dump {
        let grid = build_grid(&cli, &config, Arc::new(LoggingMidi), rng)?;
        println!("{}", serde_json::to_string_pretty(&grid.snapshot())?);
        return Ok(());
    }

    let (midi, output) = MidiOutService::spawn(LoggingMidi);
    let grid = build_grid(&cli, &config, Arc::new(midi), rng)?;
    if cli.show {
        print!("{}", display::render(&grid, true));
    }

    let mut engine = Engine::new(grid);
    engine.start()?;
    engine.play()?;

    let deadline = Instant::now() + Duration::from_secs(config.seconds);
    while Instant::now() < deadline {
        thread::sleep(POLL_INTERVAL);
        // no banks to switch to in a headless run
        if let Some(bank) = engine.with_grid(Grid::take_bank_request)? {
            info!(bank, "Bank change requested");
        }
    }

    if cli.show {
        print!("{}", engine.with_grid(|grid| display::render(grid, true))?);
    }
    engine.stop()?;
    drop(engine);

    let forwarded = output.join();
    info!(forwarded, "MIDI output drained");
    Ok(())
}

/// Loads the snapshot given on the command line, or builds the demo patch.
fn build_grid(cli: &Cli, config: &Config, midi: Arc<dyn MidiSink>, rng: fastrand::Rng) -> anyhow::Result<Grid> {
    let Some(path) = &cli.load else {
        let mut grid = patch::demo(config.width, config.height, midi, rng)
            .context("Failed to build the demo patch")?;
        grid.set_tempo(config.tempo);
        grid.set_device(config.device.clone());
        grid.set_send_clock(config.send_clock);
        grid.set_send_transport(config.send_transport);
        grid.set_wraparound(config.wraparound);
        return Ok(grid);
    };

    // Loaded grids keep their own settings unless overridden on the command line
    let mut grid = load_snapshot(path)?.restore(midi, rng)?;
    if let Some(tempo) = cli.tempo {
        grid.set_tempo(tempo);
    }
    if let Some(device) = &cli.device {
        grid.set_device(device.clone());
    }
    if cli.send_clock {
        grid.set_send_clock(true);
    }
    if cli.send_transport {
        grid.set_send_transport(true);
    }
    if cli.wraparound {
        grid.set_wraparound(true);
    }
    Ok(grid)
}

fn load_snapshot(path: &Path) -> anyhow::Result<GridSnapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid grid snapshot in {}", path.display()))
}
