//! Per-node music state and the note trigger state machine

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::control::ControlValue;
use crate::midi::MidiSink;
use crate::theory::{self, Key, Scale, MIDDLE_C};
use crate::timing::{PULSES_PER_STEP, TEMPO_MAX, TEMPO_MIN};

pub const DEFAULT_KEY: Key = MIDDLE_C;
pub const DEFAULT_CHANNEL: u8 = 0;
pub const DEFAULT_VELOCITY: u8 = 100;
pub const DEFAULT_LENGTH: u8 = PULSES_PER_STEP as u8;
pub const DEFAULT_CONTROL_LANES: usize = 8;

pub const MAX_CHANNEL: u8 = 15;
pub const MAX_VELOCITY: u8 = 127;
pub const MIN_LENGTH: u8 = 1;
/// Length value meaning "hold until stopped".
pub const MAX_LENGTH: u8 = 127;
pub const MAX_PROBABILITY: u8 = 100;
/// Widest key randomization, in scale degrees.
pub const MAX_KEY_AMOUNT: i32 = 24;
pub const MAX_BANK: i16 = 31;

// ============================================================================
// Key
// ============================================================================

/// Key of a note, stored relative to the root it was chosen against so it
/// follows root changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    key: Key,
    root: Key,
    silent: bool,
    amount: i32,
    last: Key,
}

impl KeyValue {
    pub fn new(key: Key) -> Self {
        let key = key.min(127);
        Self {
            key,
            root: MIDDLE_C,
            silent: false,
            amount: 0,
            last: key,
        }
    }

    /// Key as entered by the user.
    pub fn value(&self) -> Key {
        self.key
    }

    /// Root the key was entered against.
    pub fn root(&self) -> Key {
        self.root
    }

    /// Key actually sent by the last trigger.
    pub fn last(&self) -> Key {
        self.last
    }

    /// Semitones between the key and its reference root.
    pub fn interval(&self) -> i16 {
        self.key as i16 - self.root as i16
    }

    pub fn set(&mut self, key: Key, root: Key) {
        self.key = key.min(127);
        self.root = root.min(127);
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Random amount, in scale degrees.
    pub fn random_amount(&self) -> i32 {
        self.amount
    }

    pub fn set_random_amount(&mut self, amount: i32) {
        self.amount = amount.clamp(-MAX_KEY_AMOUNT, MAX_KEY_AMOUNT);
    }

    /// Key moved along with `root` and snapped onto `scale`, without jitter.
    pub fn transposed(&self, root: Key, scale: Scale) -> Key {
        let moved = (root as i16 + self.interval()).clamp(0, 127) as Key;
        theory::quantize(moved, root, scale)
    }

    /// Resolves the key for playback and latches it for the matching note-off.
    pub fn computed(&mut self, root: Key, scale: Scale, rng: &mut fastrand::Rng) -> Key {
        let degrees = match self.amount {
            0 => 0,
            a if a > 0 => rng.i32(0..=a),
            a => rng.i32(a..=0),
        };
        self.last = theory::transpose_in_scale(self.transposed(root, scale), root, scale, degrees);
        self.last
    }

    fn settle(&mut self) -> Key {
        self.last = self.key;
        self.last
    }
}

// ============================================================================
// Control lanes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControlKind {
    #[default]
    Silent,
    ControlChange,
    ProgramChange,
    AfterTouch,
    PitchBend,
}

impl ControlKind {
    fn range(&self) -> (i16, i16) {
        match self {
            Self::PitchBend => (-8192, 8191),
            _ => (0, 127),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Silent => "off",
            Self::ControlChange => "cc",
            Self::ProgramChange => "pc",
            Self::AfterTouch => "at",
            Self::PitchBend => "pb",
        }
    }
}

/// One control message sent alongside every note-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLane {
    kind: ControlKind,
    controller: u8,
    value: ControlValue<i16>,
}

impl Default for ControlLane {
    fn default() -> Self {
        Self::new(ControlKind::Silent)
    }
}

impl ControlLane {
    pub fn new(kind: ControlKind) -> Self {
        let (min, max) = kind.range();
        Self {
            kind,
            controller: 0,
            value: ControlValue::new(0, min, max),
        }
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    /// Switching kind resets the value to the new kind's range.
    pub fn set_kind(&mut self, kind: ControlKind) {
        if kind != self.kind {
            let controller = self.controller;
            *self = Self::new(kind);
            self.controller = controller;
        }
    }

    pub fn controller(&self) -> u8 {
        self.controller
    }

    pub fn set_controller(&mut self, controller: u8) {
        self.controller = controller.min(127);
    }

    pub fn value(&self) -> &ControlValue<i16> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ControlValue<i16> {
        &mut self.value
    }

    pub fn is_silent(&self) -> bool {
        self.kind == ControlKind::Silent
    }

    fn send(&mut self, midi: &dyn MidiSink, device: &str, channel: u8, rng: &mut fastrand::Rng) {
        if self.is_silent() {
            return;
        }
        let value = self.value.computed(rng);
        match self.kind {
            ControlKind::Silent => {}
            ControlKind::ControlChange => {
                midi.control_change(device, channel, self.controller, value as u8)
            }
            ControlKind::ProgramChange => midi.program_change(device, channel, value as u8),
            ControlKind::AfterTouch => midi.after_touch(device, channel, value as u8),
            ControlKind::PitchBend => midi.pitch_bend(device, channel, value),
        }
    }
}

// ============================================================================
// Meta commands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaKind {
    Tempo,
    Bank,
    Root,
    Scale,
}

impl MetaKind {
    fn default_value(&self) -> ControlValue<i16> {
        match self {
            Self::Tempo => ControlValue::new(120, TEMPO_MIN as i16, TEMPO_MAX as i16),
            Self::Bank => ControlValue::new(0, 0, MAX_BANK),
            Self::Root => ControlValue::new(MIDDLE_C as i16, 0, 127),
            Self::Scale => ControlValue::new(0, 0, Scale::ALL.len() as i16 - 1),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tempo => "tempo",
            Self::Bank => "bank",
            Self::Root => "root",
            Self::Scale => "scale",
        }
    }
}

/// Side effect requested by a triggered note. The grid applies it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetaEvent {
    Tempo(f64),
    Bank(u8),
    Root(Key),
    Scale(Scale),
}

/// A grid-level command fired together with a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaCommand {
    kind: MetaKind,
    active: bool,
    value: ControlValue<i16>,
}

impl MetaCommand {
    pub fn new(kind: MetaKind) -> Self {
        Self {
            kind,
            active: false,
            value: kind.default_value(),
        }
    }

    pub fn kind(&self) -> MetaKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn value(&self) -> &ControlValue<i16> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ControlValue<i16> {
        &mut self.value
    }

    fn execute(&mut self, rng: &mut fastrand::Rng) -> Option<MetaEvent> {
        if !self.active {
            return None;
        }
        let value = self.value.computed(rng);
        Some(match self.kind {
            MetaKind::Tempo => MetaEvent::Tempo(value as f64),
            MetaKind::Bank => MetaEvent::Bank(value as u8),
            MetaKind::Root => MetaEvent::Root(value as Key),
            MetaKind::Scale => MetaEvent::Scale(Scale::from_index(value as u16)),
        })
    }
}

fn default_meta_commands() -> Vec<MetaCommand> {
    [MetaKind::Tempo, MetaKind::Bank, MetaKind::Root, MetaKind::Scale]
        .into_iter()
        .map(MetaCommand::new)
        .collect()
}

// ============================================================================
// Note
// ============================================================================

/// The note a node plays when a signal reaches it.
///
/// Every value that can be randomized is resolved once per trigger and
/// latched; [`Note::stop`] always releases with the latched channel, key and
/// device, so editing a sounding note can't leave it hanging.
pub struct Note {
    midi: Arc<dyn MidiSink>,
    rng: fastrand::Rng,

    /// Overrides the grid output device when set.
    pub device: Option<String>,
    pub key: KeyValue,
    pub channel: ControlValue<u8>,
    pub velocity: ControlValue<u8>,
    pub length: ControlValue<u8>,
    probability: u8,

    pub controls: Vec<ControlLane>,
    pub meta_commands: Vec<MetaCommand>,

    pulse: u64,
    triggered: bool,
    last_device: String,
}

impl fmt::Debug for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Note")
            .field("device", &self.device)
            .field("key", &self.key)
            .field("channel", &self.channel)
            .field("velocity", &self.velocity)
            .field("length", &self.length)
            .field("probability", &self.probability)
            .field("pulse", &self.pulse)
            .field("triggered", &self.triggered)
            .finish_non_exhaustive()
    }
}

impl Note {
    pub fn new(midi: Arc<dyn MidiSink>, channel: u8, rng: fastrand::Rng) -> Self {
        Self {
            midi,
            rng,
            device: None,
            key: KeyValue::new(DEFAULT_KEY),
            channel: ControlValue::new(channel, 0, MAX_CHANNEL),
            velocity: ControlValue::new(DEFAULT_VELOCITY, 0, MAX_VELOCITY),
            length: ControlValue::new(DEFAULT_LENGTH, MIN_LENGTH, MAX_LENGTH),
            probability: MAX_PROBABILITY,
            controls: vec![ControlLane::default(); DEFAULT_CONTROL_LANES],
            meta_commands: default_meta_commands(),
            pulse: 0,
            triggered: false,
            last_device: String::new(),
        }
    }

    /// Deep copy for node duplication. The copy gets its own random stream and
    /// starts idle.
    pub fn copy(&mut self) -> Note {
        Note {
            midi: self.midi.clone(),
            rng: self.rng.fork(),
            device: self.device.clone(),
            key: self.key,
            channel: self.channel,
            velocity: self.velocity,
            length: self.length,
            probability: self.probability,
            controls: self.controls.clone(),
            meta_commands: self.meta_commands.clone(),
            pulse: 0,
            triggered: false,
            last_device: String::new(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Pulses elapsed since the last trigger.
    pub fn elapsed(&self) -> u64 {
        self.pulse
    }

    pub fn probability(&self) -> u8 {
        self.probability
    }

    pub fn set_probability(&mut self, probability: u8) {
        self.probability = probability.min(MAX_PROBABILITY);
    }

    pub fn set_key(&mut self, key: Key, root: Key) {
        self.key.set(key, root);
    }

    pub fn set_channel(&mut self, channel: u8) {
        self.channel.set(channel);
    }

    pub fn set_velocity(&mut self, velocity: u8) {
        self.velocity.set(velocity);
    }

    pub fn set_length(&mut self, length: u8) {
        self.length.set(length);
    }

    fn resolve_device(&self, grid_device: &str) -> String {
        self.device
            .clone()
            .unwrap_or_else(|| grid_device.to_string())
    }

    /// Ages a sounding note by one pulse and releases it once its length is
    /// reached. A length of [`MAX_LENGTH`] holds forever.
    pub fn tick(&mut self) {
        if !self.triggered {
            return;
        }
        self.pulse += 1;

        let length = self.length.last();
        if length < MAX_LENGTH && self.pulse >= length as u64 {
            self.stop();
        }
    }

    /// Triggers the note against the grid's root and scale.
    ///
    /// Returns the side effects of the note's active meta commands; nothing
    /// happens (and nothing is returned) for silent notes or when the
    /// probability draw fails.
    pub fn transpose_and_play(&mut self, root: Key, scale: Scale, grid_device: &str) -> Vec<MetaEvent> {
        if self.key.is_silent() {
            return Vec::new();
        }

        if self.probability < MAX_PROBABILITY && self.rng.u8(0..100) >= self.probability {
            return Vec::new();
        }

        if self.triggered {
            self.stop();
        }

        let device = self.resolve_device(grid_device);
        let channel = self.channel.computed(&mut self.rng);
        let key = self.key.computed(root, scale, &mut self.rng);
        let velocity = self.velocity.computed(&mut self.rng);
        self.midi.note_on(&device, channel, key, velocity);
        self.length.computed(&mut self.rng);

        for control in &mut self.controls {
            control.send(self.midi.as_ref(), &device, channel, &mut self.rng);
        }

        let events = self
            .meta_commands
            .iter_mut()
            .filter_map(|cmd| cmd.execute(&mut self.rng))
            .collect();

        self.last_device = device;
        self.triggered = true;
        self.pulse = 0;
        events
    }

    /// Plays the note as entered, without transposition, randomness or side
    /// effects. Used for previews while editing.
    pub fn play(&mut self, grid_device: &str) {
        if self.key.is_silent() {
            return;
        }
        if self.triggered {
            self.stop();
        }

        let device = self.resolve_device(grid_device);
        let channel = self.channel.settle();
        let key = self.key.settle();
        let velocity = self.velocity.settle();
        self.length.settle();
        self.midi.note_on(&device, channel, key, velocity);

        self.last_device = device;
        self.triggered = true;
        self.pulse = 0;
    }

    /// Releases the sounding note with the values it was triggered with.
    pub fn stop(&mut self) {
        self.midi
            .note_off(&self.last_device, self.channel.last(), self.key.last());
        self.triggered = false;
        self.pulse = 0;
    }

    /// Silences the whole channel of this note.
    pub fn silence(&mut self, grid_device: &str) {
        let device = self.resolve_device(grid_device);
        self.midi.silence(&device, self.channel.value());
        self.triggered = false;
        self.pulse = 0;
    }

    /// Decoration appended to the node symbol by the renderer.
    pub fn symbol(&self) -> String {
        let key_symbol = if self.key.is_silent() {
            "\u{353}"
        } else if self.key.random_amount() != 0 {
            "\u{33c}"
        } else {
            ""
        };

        let has_controls = self.controls.iter().any(|c| !c.is_silent());
        let has_meta = self.meta_commands.iter().any(|c| c.is_active());
        let param_symbol = match has_controls as u8 + has_meta as u8 {
            1 => "\u{307}",
            2 => "\u{308}",
            _ => "",
        };
        format!("{key_symbol}{param_symbol}")
    }
}
