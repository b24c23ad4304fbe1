//! Boundary to whatever actually talks to MIDI devices

use std::fmt::Debug;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A MIDI message produced by the engine, addressed to a named output device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn {
        device: String,
        channel: u8,
        pitch: u8,
        velocity: u8,
    },
    NoteOff {
        device: String,
        channel: u8,
        pitch: u8,
    },
    /// All notes off on a channel.
    Silence { device: String, channel: u8 },
    ControlChange {
        device: String,
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        device: String,
        channel: u8,
        program: u8,
    },
    AfterTouch {
        device: String,
        channel: u8,
        pressure: u8,
    },
    PitchBend {
        device: String,
        channel: u8,
        value: i16,
    },
    Clock { device: String },
    Start { device: String },
    Stop { device: String },
}

impl MidiMessage {
    pub fn device(&self) -> &str {
        match self {
            Self::NoteOn { device, .. }
            | Self::NoteOff { device, .. }
            | Self::Silence { device, .. }
            | Self::ControlChange { device, .. }
            | Self::ProgramChange { device, .. }
            | Self::AfterTouch { device, .. }
            | Self::PitchBend { device, .. }
            | Self::Clock { device }
            | Self::Start { device }
            | Self::Stop { device } => device,
        }
    }
}

/// Sink for everything the engine wants to send.
///
/// Calls are fire-and-forget: the engine never looks at a result, so
/// implementations deal with (and log) their own failures. Sinks are shared
/// between every note of a grid, hence `&self`.
pub trait MidiSink: Send + Sync + Debug {
    fn note_on(&self, device: &str, channel: u8, pitch: u8, velocity: u8);
    fn note_off(&self, device: &str, channel: u8, pitch: u8);
    fn silence(&self, device: &str, channel: u8);
    fn control_change(&self, device: &str, channel: u8, controller: u8, value: u8);
    fn program_change(&self, device: &str, channel: u8, program: u8);
    fn after_touch(&self, device: &str, channel: u8, pressure: u8);
    fn pitch_bend(&self, device: &str, channel: u8, value: i16);
    fn clock(&self, device: &str);
    fn start(&self, device: &str);
    fn stop(&self, device: &str);
}

/// Sink receiving every call as a single [`MidiMessage`]. Implementing it
/// provides [`MidiSink`] for free.
pub trait MessageSink: Send + Sync + Debug {
    fn send(&self, message: MidiMessage);
}

impl<S: MessageSink> MidiSink for S {
    fn note_on(&self, device: &str, channel: u8, pitch: u8, velocity: u8) {
        self.send(MidiMessage::NoteOn {
            device: device.to_string(),
            channel,
            pitch,
            velocity,
        });
    }

    fn note_off(&self, device: &str, channel: u8, pitch: u8) {
        self.send(MidiMessage::NoteOff {
            device: device.to_string(),
            channel,
            pitch,
        });
    }

    fn silence(&self, device: &str, channel: u8) {
        self.send(MidiMessage::Silence {
            device: device.to_string(),
            channel,
        });
    }

    fn control_change(&self, device: &str, channel: u8, controller: u8, value: u8) {
        self.send(MidiMessage::ControlChange {
            device: device.to_string(),
            channel,
            controller,
            value,
        });
    }

    fn program_change(&self, device: &str, channel: u8, program: u8) {
        self.send(MidiMessage::ProgramChange {
            device: device.to_string(),
            channel,
            program,
        });
    }

    fn after_touch(&self, device: &str, channel: u8, pressure: u8) {
        self.send(MidiMessage::AfterTouch {
            device: device.to_string(),
            channel,
            pressure,
        });
    }

    fn pitch_bend(&self, device: &str, channel: u8, value: i16) {
        self.send(MidiMessage::PitchBend {
            device: device.to_string(),
            channel,
            value,
        });
    }

    fn clock(&self, device: &str) {
        self.send(MidiMessage::Clock {
            device: device.to_string(),
        });
    }

    fn start(&self, device: &str) {
        self.send(MidiMessage::Start {
            device: device.to_string(),
        });
    }

    fn stop(&self, device: &str) {
        self.send(MidiMessage::Stop {
            device: device.to_string(),
        });
    }
}

/// Keeps every message in memory. Used by tests and previews.
#[derive(Debug, Default)]
pub struct RecordingMidi {
    messages: Mutex<Vec<MidiMessage>>,
}

impl RecordingMidi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<MidiMessage> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Returns and clears the recorded messages.
    pub fn take(&self) -> Vec<MidiMessage> {
        self.messages
            .lock()
            .map(|mut m| std::mem::take(&mut *m))
            .unwrap_or_default()
    }

    /// `(channel, pitch, velocity)` of every recorded note-on.
    pub fn note_ons(&self) -> Vec<(u8, u8, u8)> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                MidiMessage::NoteOn {
                    channel,
                    pitch,
                    velocity,
                    ..
                } => Some((channel, pitch, velocity)),
                _ => None,
            })
            .collect()
    }

    /// `(channel, pitch)` of every recorded note-off.
    pub fn note_offs(&self) -> Vec<(u8, u8)> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                MidiMessage::NoteOff { channel, pitch, .. } => Some((channel, pitch)),
                _ => None,
            })
            .collect()
    }
}

impl MessageSink for RecordingMidi {
    fn send(&self, message: MidiMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let midi = RecordingMidi::new();
        midi.note_on("out", 1, 60, 100);
        midi.note_off("out", 1, 60);
        midi.clock("out");

        let messages = midi.take();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], MidiMessage::Clock { device: "out".into() });
        assert!(messages.iter().all(|m| m.device() == "out"));
        assert!(midi.messages().is_empty());
    }
}
