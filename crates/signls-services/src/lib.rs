//! signls-services: Clock, engine and MIDI output services

pub mod clock;
pub mod engine;
pub mod midi_out;

pub use clock::{Clock, TempoHandle, TempoLatch, TEMPO_QUEUE_CAPACITY};
pub use engine::{Engine, EngineError};
pub use midi_out::{ChannelMidi, LoggingMidi, MidiOutService, MIDI_QUEUE_CAPACITY};
