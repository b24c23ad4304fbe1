//! signls-core: Domain types for the signls generative MIDI grid

mod control;
mod direction;
mod error;
mod grid;
pub mod midi;
mod node;
pub mod note;
mod snapshot;
pub mod theory;
pub mod timing;
mod transport;

pub use control::{ControlInt, ControlValue};
pub use direction::Direction;
pub use error::{Result, SignlsError};
pub use grid::{EditContext, Grid, Signal, DEFAULT_DEVICE, DEFAULT_SIZE};
pub use midi::{MessageSink, MidiMessage, MidiSink, RecordingMidi};
pub use node::{Bang, Behavior, Node, NodeKind, Quota, Teleport, DEFAULT_QUOTA};
pub use note::{ControlKind, ControlLane, KeyValue, MetaCommand, MetaEvent, MetaKind, Note};
pub use snapshot::{
    ControlSnapshot, GridSnapshot, KeySnapshot, MetaSnapshot, NodeSnapshot, NoteSnapshot,
    ParamSnapshot,
};
pub use theory::{Key, Scale};
pub use transport::TransportState;
