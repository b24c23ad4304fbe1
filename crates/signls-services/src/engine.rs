//! Engine wiring the clock to a shared grid

use std::sync::{Arc, Mutex};

use signls_core::{Grid, SignlsError};
use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{Clock, TempoHandle};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Grid error: {0}")]
    Grid(#[from] SignlsError),
    #[error("Engine already running")]
    AlreadyRunning,
    #[error("Engine not running")]
    NotRunning,
    #[error("Grid lock poisoned")]
    Poisoned,
}

/// Runs a grid from a clock thread while other threads edit it.
///
/// The grid sits behind a mutex shared with the clock callback; every pulse
/// and every edit holds it only briefly.
pub struct Engine {
    grid: Arc<Mutex<Grid>>,
    clock: Option<Clock>,
}

impl Engine {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid: Arc::new(Mutex::new(grid)),
            clock: None,
        }
    }

    /// Shared grid, for callers that need to hold on to it.
    pub fn grid(&self) -> Arc<Mutex<Grid>> {
        self.grid.clone()
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_some()
    }

    /// Starts the clock at the grid's tempo.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.clock.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let tempo = self.with_grid(|grid| {
            grid.take_tempo_request();
            grid.tempo()
        })?;

        let grid = self.grid.clone();
        let clock = Clock::with_handle(tempo, move |handle| {
            let mut poisoned = false;
            move || Self::pulse(&grid, &handle, &mut poisoned)
        });

        self.clock = Some(clock);
        info!(tempo, "Engine started");
        Ok(())
    }

    /// Stops the clock and releases every sounding note.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let mut clock = self.clock.take().ok_or(EngineError::NotRunning)?;
        clock.stop();
        self.with_grid(Grid::stop)?;
        info!("Engine stopped");
        Ok(())
    }

    /// Advances the grid by one pulse. A poisoned grid is skipped, with a
    /// warning the first time.
    fn pulse(grid: &Mutex<Grid>, tempo: &TempoHandle, poisoned: &mut bool) {
        let Ok(mut grid) = grid.lock() else {
            if !*poisoned {
                warn!("Grid lock poisoned, pulses are skipped");
                *poisoned = true;
            }
            return;
        };
        grid.update();
        if let Some(bpm) = grid.take_tempo_request() {
            tempo.set_tempo(bpm);
        }
    }

    /// Runs `f` with exclusive access to the grid. Tempo changes made by `f`
    /// are forwarded to the clock.
    pub fn with_grid<F, R>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut Grid) -> R,
    {
        let mut grid = self.grid.lock().map_err(|_| EngineError::Poisoned)?;
        let result = f(&mut grid);
        if let Some(bpm) = grid.take_tempo_request() {
            if let Some(clock) = &self.clock {
                clock.set_tempo(bpm);
            }
        }
        Ok(result)
    }

    pub fn play(&self) -> Result<(), EngineError> {
        self.with_grid(Grid::play)?;
        info!("Playback started");
        Ok(())
    }

    pub fn stop_playback(&self) -> Result<(), EngineError> {
        self.with_grid(Grid::stop)?;
        info!("Playback stopped");
        Ok(())
    }

    pub fn toggle_play(&self) -> Result<(), EngineError> {
        let playing = self.with_grid(|grid| {
            grid.toggle_play();
            grid.is_playing()
        })?;
        info!(playing, "Playback toggled");
        Ok(())
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<(), EngineError> {
        self.with_grid(|grid| grid.set_tempo(bpm))
    }

    /// Tempo the clock runs at, or the grid tempo while stopped.
    pub fn tempo(&self) -> Result<f64, EngineError> {
        match &self.clock {
            Some(clock) => Ok(clock.tempo()),
            None => self.with_grid(|grid| grid.tempo()),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.clock.is_some() {
            let _ = self.stop();
        }
    }
}
