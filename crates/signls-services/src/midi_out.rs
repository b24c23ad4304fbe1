//! MIDI sinks for running grids

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use signls_core::{MessageSink, MidiMessage};
use tracing::{debug, trace, warn};

/// Messages the output thread may lag behind before new ones are dropped.
pub const MIDI_QUEUE_CAPACITY: usize = 1024;

/// Writes every message to the log instead of a device.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMidi;

impl MessageSink for LoggingMidi {
    fn send(&self, message: MidiMessage) {
        match message {
            MidiMessage::Clock { .. } => trace!(?message, "MIDI out"),
            _ => debug!(?message, "MIDI out"),
        }
    }
}

/// Forwards messages over a channel without blocking the sender.
#[derive(Debug, Clone)]
pub struct ChannelMidi {
    sender: Sender<MidiMessage>,
}

impl ChannelMidi {
    pub fn new(sender: Sender<MidiMessage>) -> Self {
        Self { sender }
    }

    pub fn bounded(capacity: usize) -> (Self, Receiver<MidiMessage>) {
        let (sender, receiver) = bounded(capacity);
        (Self::new(sender), receiver)
    }

    pub fn unbounded() -> (Self, Receiver<MidiMessage>) {
        let (sender, receiver) = unbounded();
        (Self::new(sender), receiver)
    }
}

impl MessageSink for ChannelMidi {
    fn send(&self, message: MidiMessage) {
        if let Err(err) = self.sender.try_send(message) {
            debug!(%err, "MIDI message dropped");
        }
    }
}

/// Drains a [`ChannelMidi`] into a device on a dedicated thread, keeping
/// device writes off the clock thread.
pub struct MidiOutService {
    handler: Option<JoinHandle<usize>>,
}

impl MidiOutService {
    /// Starts the output thread. It runs until every clone of the returned
    /// sink has been dropped.
    pub fn spawn<S>(device: S) -> (ChannelMidi, Self)
    where
        S: MessageSink + 'static,
    {
        let (sink, receiver) = ChannelMidi::bounded(MIDI_QUEUE_CAPACITY);
        let handler = thread::spawn(move || {
            let mut sent = 0;
            for message in receiver {
                device.send(message);
                sent += 1;
            }
            sent
        });
        (
            sink,
            Self {
                handler: Some(handler),
            },
        )
    }

    /// Waits for the output thread to drain and returns how many messages it
    /// forwarded.
    pub fn join(mut self) -> usize {
        let Some(handler) = self.handler.take() else {
            return 0;
        };
        handler.join().unwrap_or_else(|_| {
            warn!("MIDI output thread panicked");
            0
        })
    }
}
