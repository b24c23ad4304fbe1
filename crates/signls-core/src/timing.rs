//! MIDI clock resolution and tempo bounds
//!
//! See <http://midi.teragonaudio.com/tech/midispec/clock.htm>.

use std::time::Duration;

pub const PULSES_PER_STEP: u64 = 6;
pub const STEPS_PER_QUARTER_NOTE: u64 = 4;
/// Standard MIDI clock resolution.
pub const PULSES_PER_QUARTER_NOTE: u64 = PULSES_PER_STEP * STEPS_PER_QUARTER_NOTE;

pub const TEMPO_MIN: f64 = 1.0;
pub const TEMPO_MAX: f64 = 300.0;
pub const DEFAULT_TEMPO: f64 = 120.0;

pub fn is_valid_tempo(bpm: f64) -> bool {
    (TEMPO_MIN..=TEMPO_MAX).contains(&bpm)
}

/// Time between two clock pulses, truncated to whole microseconds.
pub fn pulse_interval(bpm: f64) -> Duration {
    Duration::from_micros((60_000_000.0 / (bpm * PULSES_PER_QUARTER_NOTE as f64)) as u64)
}
