//! Pulse clock running on its own thread

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, tick, Receiver, Sender};
use signls_core::timing::{is_valid_tempo, pulse_interval, DEFAULT_TEMPO, TEMPO_MAX, TEMPO_MIN};
use tracing::{debug, info, warn};

/// Tempo updates waiting for the clock thread. Further updates are dropped.
pub const TEMPO_QUEUE_CAPACITY: usize = 128;

/// Tempo change waiting for the next pulse boundary.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TempoLatch {
    #[default]
    Applied,
    Armed(f64),
}

impl TempoLatch {
    /// Arms a change. A change already armed is replaced.
    pub fn arm(&mut self, bpm: f64) {
        *self = Self::Armed(bpm);
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed(_))
    }

    /// Returns the armed tempo, if any, and marks it applied.
    pub fn take(&mut self) -> Option<f64> {
        match std::mem::take(self) {
            Self::Armed(bpm) => Some(bpm),
            Self::Applied => None,
        }
    }
}

/// Thread-safe access to a running clock's tempo.
#[derive(Debug, Clone)]
pub struct TempoHandle {
    sender: Sender<f64>,
    applied: Arc<AtomicU64>,
}

impl TempoHandle {
    /// Queues a tempo change for the next pulse. Out of range values are
    /// ignored; when the queue is full the update is dropped.
    pub fn set_tempo(&self, bpm: f64) {
        if !is_valid_tempo(bpm) {
            debug!(bpm, "Ignoring out of range tempo");
            return;
        }
        if let Err(err) = self.sender.try_send(bpm) {
            debug!(bpm, %err, "Tempo update dropped");
        }
    }

    /// Tempo the clock is currently running at.
    pub fn tempo(&self) -> f64 {
        f64::from_bits(self.applied.load(Ordering::Relaxed))
    }
}

/// Calls a tick callback 24 times per quarter note.
pub struct Clock {
    handle: TempoHandle,
    quit: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Clock {
    /// Starts a clock calling `on_pulse` on every pulse.
    pub fn new<F>(tempo: f64, on_pulse: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self::with_handle(tempo, move |_| on_pulse)
    }

    /// Starts a clock whose tick callback is built from the clock's own
    /// [`TempoHandle`], so the callback can change the tempo itself.
    pub fn with_handle<M, F>(tempo: f64, make_tick: M) -> Self
    where
        M: FnOnce(TempoHandle) -> F,
        F: FnMut() + Send + 'static,
    {
        let tempo = if tempo.is_nan() {
            DEFAULT_TEMPO
        } else {
            tempo.clamp(TEMPO_MIN, TEMPO_MAX)
        };

        let (tempo_tx, tempo_rx) = bounded(TEMPO_QUEUE_CAPACITY);
        let (quit_tx, quit_rx) = bounded(1);
        let applied = Arc::new(AtomicU64::new(tempo.to_bits()));

        let handle = TempoHandle {
            sender: tempo_tx,
            applied: applied.clone(),
        };
        let on_pulse = make_tick(handle.clone());

        let thread = thread::spawn(move || {
            Self::run(tempo, on_pulse, tempo_rx, quit_rx, applied);
        });

        info!(tempo, "Clock started");
        Self {
            handle,
            quit: Some(quit_tx),
            thread: Some(thread),
        }
    }

    fn run<F: FnMut()>(
        tempo: f64,
        mut on_pulse: F,
        tempo_rx: Receiver<f64>,
        quit_rx: Receiver<()>,
        applied: Arc<AtomicU64>,
    ) {
        let mut ticker = tick(pulse_interval(tempo));
        let mut latch = TempoLatch::Applied;

        loop {
            select! {
                recv(ticker) -> _ => {
                    on_pulse();
                    if let Some(bpm) = latch.take() {
                        ticker = tick(pulse_interval(bpm));
                        applied.store(bpm.to_bits(), Ordering::Relaxed);
                        debug!(bpm, "Tempo applied");
                    }
                }
                recv(tempo_rx) -> msg => {
                    if let Ok(bpm) = msg {
                        latch.arm(bpm);
                    }
                }
                // a message or a dropped sender both mean stop
                recv(quit_rx) -> _ => break,
            }
        }
    }

    pub fn handle(&self) -> TempoHandle {
        self.handle.clone()
    }

    pub fn set_tempo(&self, bpm: f64) {
        self.handle.set_tempo(bpm);
    }

    pub fn tempo(&self) -> f64 {
        self.handle.tempo()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stops the clock thread and waits for it. No tick runs afterwards.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        drop(self.quit.take());
        if thread.join().is_err() {
            warn!("Clock thread panicked");
        }
        info!("Clock stopped");
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.stop();
    }
}
