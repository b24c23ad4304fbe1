//! The grid: node layout, active signals and the per-pulse update

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::direction::Direction;
use crate::error::{Result, SignlsError};
use crate::midi::MidiSink;
use crate::node::{Behavior, Node, NodeKind};
use crate::note::{MetaEvent, Note, DEFAULT_CHANNEL};
use crate::theory::{Key, Scale, MIDDLE_C};
use crate::timing::{is_valid_tempo, DEFAULT_TEMPO, PULSES_PER_STEP, STEPS_PER_QUARTER_NOTE};
use crate::transport::TransportState;

pub const DEFAULT_SIZE: usize = 20;
pub const DEFAULT_DEVICE: &str = "default";

/// A token travelling one cell per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub x: usize,
    pub y: usize,
    /// Always a single cardinal direction.
    pub direction: Direction,
    /// Cell of the node that emitted the signal.
    pub origin: (usize, usize),
}

/// Editing state carried between node edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditContext {
    /// Channel given to newly created notes.
    pub last_channel: u8,
}

impl Default for EditContext {
    fn default() -> Self {
        Self {
            last_channel: DEFAULT_CHANNEL,
        }
    }
}

/// Node layout plus everything needed to advance it pulse by pulse.
///
/// The grid is single-threaded: whoever drives [`Grid::update`] from a clock
/// and edits it from elsewhere must serialize access (see the engine in
/// `signls-services`).
#[derive(Debug)]
pub struct Grid {
    width: usize,
    height: usize,
    nodes: Vec<Vec<Option<Node>>>,
    signals: Vec<Signal>,
    pulse: u64,

    tempo: f64,
    root: Key,
    scale: Scale,
    transport: TransportState,
    device: String,
    send_clock: bool,
    send_transport: bool,
    wraparound: bool,

    pub editing: EditContext,

    midi: Arc<dyn MidiSink>,
    rng: fastrand::Rng,

    armed_pending: bool,
    tempo_request: Option<f64>,
    bank_request: Option<u8>,
}

impl Grid {
    pub fn new(width: usize, height: usize, midi: Arc<dyn MidiSink>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SignlsError::InvalidSize(width, height));
        }
        Ok(Self {
            width,
            height,
            nodes: (0..height).map(|_| (0..width).map(|_| None).collect()).collect(),
            signals: Vec::new(),
            pulse: 0,
            tempo: DEFAULT_TEMPO,
            root: MIDDLE_C,
            scale: Scale::default(),
            transport: TransportState::Stopped,
            device: DEFAULT_DEVICE.to_string(),
            send_clock: false,
            send_transport: false,
            wraparound: false,
            editing: EditContext::default(),
            midi,
            rng: fastrand::Rng::new(),
            armed_pending: false,
            tempo_request: None,
            bank_request: None,
        })
    }

    /// Replaces the random source new notes are seeded from.
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn midi(&self) -> Arc<dyn MidiSink> {
        self.midi.clone()
    }

    // ------------------------------------------------------------------------
    // Update loop
    // ------------------------------------------------------------------------

    /// Advances the grid by one clock pulse.
    pub fn update(&mut self) {
        if self.send_clock {
            self.midi.clock(&self.device);
        }

        if !self.transport.is_playing() {
            return;
        }

        for note in self.notes_mut() {
            note.tick();
        }

        if self.pulse % PULSES_PER_STEP == 0 {
            self.step();
        }

        self.pulse += 1;
    }

    /// Moves every signal one cell and lets the nodes they reach react.
    fn step(&mut self) {
        let pulse = self.pulse;
        for node in self.nodes.iter_mut().flatten().flatten() {
            node.set_activated(false);
        }

        let mut spawned = Vec::new();

        if std::mem::take(&mut self.armed_pending) {
            let armed: Vec<(usize, usize)> = self
                .nodes()
                .filter(|(_, _, node)| node.armed_on_start())
                .map(|(x, y, _)| (x, y))
                .collect();
            for (x, y) in armed {
                self.fire(x, y, &mut spawned);
            }
        }

        let signals = std::mem::take(&mut self.signals);
        let mut kept = Vec::with_capacity(signals.len());
        for signal in signals {
            // Leaving the grid without wraparound absorbs the signal.
            let Some((x, y)) = self.target(signal.x, signal.y, signal.direction) else {
                continue;
            };
            self.enter(x, y, signal.direction, signal.origin, pulse, &mut kept, &mut spawned);
        }

        kept.extend(spawned);
        self.signals = kept;
    }

    fn target(&self, x: usize, y: usize, direction: Direction) -> Option<(usize, usize)> {
        let (nx, ny) = direction.step(x, y);
        if self.contains(nx, ny) {
            return Some((nx as usize, ny as usize));
        }
        if !self.wraparound {
            return None;
        }
        Some((
            nx.rem_euclid(self.width as isize) as usize,
            ny.rem_euclid(self.height as isize) as usize,
        ))
    }

    fn neighbor(&self, x: usize, y: usize, direction: Direction) -> Option<(usize, usize)> {
        let (nx, ny) = direction.step(x, y);
        self.contains(nx, ny).then_some((nx as usize, ny as usize))
    }

    #[allow(clippy::too_many_arguments)]
    fn enter(
        &mut self,
        x: usize,
        y: usize,
        direction: Direction,
        origin: (usize, usize),
        pulse: u64,
        kept: &mut Vec<Signal>,
        spawned: &mut Vec<Signal>,
    ) {
        let Some(node) = self.nodes[y][x].as_mut() else {
            kept.push(Signal {
                x,
                y,
                direction,
                origin,
            });
            return;
        };

        if let Behavior::Teleport(teleport) = &mut node.behavior {
            // A teleport already used this pulse swallows the signal, which
            // also ends teleport cycles.
            let Some((dx, dy)) = teleport.relocate(pulse) else {
                return;
            };
            node.set_activated(true);
            if dx < self.width && dy < self.height {
                self.enter(dx, dy, direction, (x, y), pulse, kept, spawned);
            }
            return;
        }

        self.activate(x, y, direction, pulse, spawned);
    }

    fn activate(&mut self, x: usize, y: usize, incoming: Direction, pulse: u64, spawned: &mut Vec<Signal>) {
        let Some(node) = self.nodes[y][x].as_mut() else {
            return;
        };

        let outgoing = node.emit_directions(incoming, pulse);
        node.set_activated(true);
        let mut events = Self::trigger(node, self.root, self.scale, &self.device);
        let propagate = node.behavior.should_propagate();

        spawned.extend(outgoing.cardinals().map(|direction| Signal {
            x,
            y,
            direction,
            origin: (x, y),
        }));

        if propagate {
            events.extend(self.propagate(x, y));
        }
        self.apply(events);
    }

    /// Fires an armed node without an incoming signal.
    fn fire(&mut self, x: usize, y: usize, spawned: &mut Vec<Signal>) {
        let Some(node) = self.nodes[y][x].as_mut() else {
            return;
        };
        node.set_activated(true);
        let events = Self::trigger(node, self.root, self.scale, &self.device);
        spawned.extend(node.direction.cardinals().map(|direction| Signal {
            x,
            y,
            direction,
            origin: (x, y),
        }));
        self.apply(events);
    }

    fn trigger(node: &mut Node, root: Key, scale: Scale, device: &str) -> Vec<MetaEvent> {
        if node.is_muted() {
            return Vec::new();
        }
        node.note_mut()
            .map(|note| note.transpose_and_play(root, scale, device))
            .unwrap_or_default()
    }

    /// Sounds every node of the same kind connected to `(x, y)`.
    fn propagate(&mut self, x: usize, y: usize) -> Vec<MetaEvent> {
        let Some(kind) = self.node(x, y).map(Node::kind) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let mut visited = HashSet::from([(x, y)]);
        let mut queue = VecDeque::from([(x, y)]);

        while let Some((cx, cy)) = queue.pop_front() {
            for direction in Direction::CARDINALS {
                let Some((nx, ny)) = self.neighbor(cx, cy, direction) else {
                    continue;
                };
                if visited.contains(&(nx, ny)) {
                    continue;
                }
                let Some(node) = self.nodes[ny][nx].as_mut() else {
                    continue;
                };
                if node.kind() != kind {
                    continue;
                }
                visited.insert((nx, ny));
                node.set_activated(true);
                events.extend(Self::trigger(node, self.root, self.scale, &self.device));
                queue.push_back((nx, ny));
            }
        }
        events
    }

    fn apply(&mut self, events: Vec<MetaEvent>) {
        for event in events {
            debug!(?event, pulse = self.pulse, "Meta command");
            match event {
                MetaEvent::Tempo(bpm) => self.set_tempo(bpm),
                MetaEvent::Bank(bank) => self.bank_request = Some(bank),
                MetaEvent::Root(root) => self.set_key(root),
                MetaEvent::Scale(scale) => self.scale = scale,
            }
        }
    }

    fn notes_mut(&mut self) -> impl Iterator<Item = &mut Note> {
        self.nodes
            .iter_mut()
            .flatten()
            .flatten()
            .filter_map(Node::note_mut)
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    /// Starts playback. Armed nodes fire on the first step.
    pub fn play(&mut self) {
        if self.transport.is_playing() {
            return;
        }
        self.transport = TransportState::Playing;
        self.armed_pending = true;
        if self.send_transport {
            self.midi.start(&self.device);
        }
    }

    /// Stops playback and brings the grid back to its initial state.
    pub fn stop(&mut self) {
        if !self.transport.is_playing() {
            return;
        }
        self.transport = TransportState::Stopped;
        if self.send_transport {
            self.midi.stop(&self.device);
        }
        self.reset();
    }

    pub fn toggle_play(&mut self) {
        if self.transport.is_playing() {
            self.stop();
        } else {
            self.play();
        }
    }

    /// Releases sounding notes, drops every signal and rewinds the pulse
    /// counter. When playing, armed nodes fire again on the next step.
    pub fn reset(&mut self) {
        self.signals.clear();
        self.pulse = 0;
        for node in self.nodes.iter_mut().flatten().flatten() {
            node.reset();
            if let Some(note) = node.note_mut().filter(|n| n.is_triggered()) {
                note.stop();
            }
        }
        self.armed_pending = self.transport.is_playing();
    }

    /// Sends a channel-wide silence for every note of the grid.
    pub fn silence_all(&mut self) {
        let device = &self.device;
        for node in self.nodes.iter_mut().flatten().flatten() {
            if let Some(note) = node.note_mut() {
                note.silence(device);
            }
        }
    }

    /// Pulses elapsed since playback started.
    pub fn pulse(&self) -> u64 {
        self.pulse
    }

    /// True on the first step of every quarter note.
    pub fn is_quarter_note(&self) -> bool {
        (self.pulse / PULSES_PER_STEP) % STEPS_PER_QUARTER_NOTE == 0
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    // ------------------------------------------------------------------------
    // Grid settings
    // ------------------------------------------------------------------------

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Out of range tempos are ignored. Accepted ones are also queued for
    /// whoever drives the clock, see [`Grid::take_tempo_request`].
    pub fn set_tempo(&mut self, bpm: f64) {
        if !is_valid_tempo(bpm) {
            return;
        }
        self.tempo = bpm;
        self.tempo_request = Some(bpm);
    }

    pub fn take_tempo_request(&mut self) -> Option<f64> {
        self.tempo_request.take()
    }

    /// Bank switch requested by a meta command.
    pub fn take_bank_request(&mut self) -> Option<u8> {
        self.bank_request.take()
    }

    /// Root key.
    pub fn key(&self) -> Key {
        self.root
    }

    pub fn set_key(&mut self, root: Key) {
        self.root = root.min(127);
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Scale) {
        self.scale = scale;
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn set_device(&mut self, device: impl Into<String>) {
        self.device = device.into();
    }

    pub fn send_clock(&self) -> bool {
        self.send_clock
    }

    pub fn set_send_clock(&mut self, send: bool) {
        self.send_clock = send;
    }

    pub fn send_transport(&self) -> bool {
        self.send_transport
    }

    pub fn set_send_transport(&mut self, send: bool) {
        self.send_transport = send;
    }

    pub fn wraparound(&self) -> bool {
        self.wraparound
    }

    pub fn set_wraparound(&mut self, wraparound: bool) {
        self.wraparound = wraparound;
    }

    // ------------------------------------------------------------------------
    // Node edits
    // ------------------------------------------------------------------------

    pub fn contains(&self, x: isize, y: isize) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    fn check(&self, x: usize, y: usize) -> Result<()> {
        if x < self.width && y < self.height {
            return Ok(());
        }
        Err(SignlsError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        })
    }

    fn check_free(&self, x: usize, y: usize) -> Result<()> {
        self.check(x, y)?;
        if self.nodes[y][x].is_some() {
            return Err(SignlsError::Occupied(x, y));
        }
        Ok(())
    }

    pub fn node(&self, x: usize, y: usize) -> Option<&Node> {
        self.nodes.get(y)?.get(x)?.as_ref()
    }

    pub fn node_mut(&mut self, x: usize, y: usize) -> Option<&mut Node> {
        self.nodes.get_mut(y)?.get_mut(x)?.as_mut()
    }

    /// Every node with its position, row by row.
    pub fn nodes(&self) -> impl Iterator<Item = (usize, usize, &Node)> {
        self.nodes.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(x, cell)| cell.as_ref().map(|node| (x, y, node)))
        })
    }

    /// A fresh note on the last used channel.
    pub fn new_note(&mut self) -> Note {
        Note::new(self.midi.clone(), self.editing.last_channel, self.rng.fork())
    }

    /// Builds a node of `kind` with default settings and places it.
    pub fn create_node(&mut self, kind: NodeKind, direction: Direction, x: usize, y: usize) -> Result<()> {
        self.check_free(x, y)?;
        let node = match kind {
            NodeKind::Teleport => Node::teleport(x, y),
            NodeKind::Hole => Node::hole(),
            _ => Node::new(Behavior::new(kind), direction, Some(self.new_note())),
        };
        self.add_node(node, x, y)
    }

    pub fn add_node(&mut self, node: Node, x: usize, y: usize) -> Result<()> {
        self.check_free(x, y)?;
        self.nodes[y][x] = Some(node);
        Ok(())
    }

    /// Removes a node, releasing its note if it was sounding.
    pub fn remove_node(&mut self, x: usize, y: usize) -> Option<Node> {
        let mut node = self.nodes.get_mut(y)?.get_mut(x)?.take()?;
        if let Some(note) = node.note_mut().filter(|n| n.is_triggered()) {
            note.stop();
        }
        Some(node)
    }

    pub fn move_node(&mut self, from: (usize, usize), to: (usize, usize)) -> Result<()> {
        self.check(from.0, from.1)?;
        if from == to {
            return Ok(());
        }
        self.check_free(to.0, to.1)?;
        let node = self.nodes[from.1][from.0]
            .take()
            .ok_or(SignlsError::Empty(from.0, from.1))?;
        self.nodes[to.1][to.0] = Some(node);
        Ok(())
    }

    /// Places an independent copy of the node at `from` onto `to`.
    pub fn copy_node(&mut self, from: (usize, usize), to: (usize, usize)) -> Result<()> {
        self.check(from.0, from.1)?;
        self.check_free(to.0, to.1)?;
        let copy = self.nodes[from.1][from.0]
            .as_mut()
            .map(Node::copy)
            .ok_or(SignlsError::Empty(from.0, from.1))?;
        self.nodes[to.1][to.0] = Some(copy);
        Ok(())
    }

    /// Sets the channel of a node's note and remembers it for new notes.
    pub fn set_note_channel(&mut self, x: usize, y: usize, channel: u8) {
        let Some(note) = self.node_mut(x, y).and_then(Node::note_mut) else {
            return;
        };
        note.set_channel(channel);
        let channel = note.channel.value();
        self.editing.last_channel = channel;
    }

    /// Mutes or unmutes a node. Muting releases a sounding note.
    pub fn set_muted(&mut self, x: usize, y: usize, muted: bool) {
        let Some(node) = self.node_mut(x, y) else {
            return;
        };
        node.set_muted(muted);
        if let Some(note) = node.note_mut().filter(|n| muted && n.is_triggered()) {
            note.stop();
        }
    }

    pub fn toggle_mute(&mut self, x: usize, y: usize) {
        if let Some(muted) = self.node(x, y).map(Node::is_muted) {
            self.set_muted(x, y, !muted);
        }
    }

    /// Points a teleport somewhere else. The destination is clamped into the grid.
    pub fn set_teleport_destination(&mut self, x: usize, y: usize, dx: usize, dy: usize) {
        let (dx, dy) = (dx.min(self.width - 1), dy.min(self.height - 1));
        if let Some(Behavior::Teleport(teleport)) = self.node_mut(x, y).map(|n| &mut n.behavior) {
            teleport.set_destination(dx, dy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{MidiMessage, RecordingMidi};
    use crate::note::MetaKind;

    fn grid(width: usize, height: usize) -> (Grid, Arc<RecordingMidi>) {
        let midi = Arc::new(RecordingMidi::new());
        let grid = Grid::new(width, height, midi.clone())
            .unwrap()
            .with_rng(fastrand::Rng::with_seed(5));
        (grid, midi)
    }

    fn bang(grid: &mut Grid, x: usize, y: usize, direction: Direction, key: Key) {
        let mut note = grid.new_note();
        note.set_key(key, MIDDLE_C);
        grid.add_node(Node::bang(note, direction, true), x, y).unwrap();
    }

    /// Runs `steps` propagation steps worth of pulses.
    fn advance(grid: &mut Grid, steps: u64) {
        for _ in 0..steps * PULSES_PER_STEP {
            grid.update();
        }
    }

    fn pitches(midi: &RecordingMidi) -> Vec<u8> {
        midi.note_ons().iter().map(|(_, pitch, _)| *pitch).collect()
    }

    #[test]
    fn test_stopped_grid_does_nothing() {
        let (mut g, midi) = grid(4, 4);
        bang(&mut g, 0, 0, Direction::RIGHT, 60);
        advance(&mut g, 3);
        assert_eq!(g.pulse(), 0);
        assert!(midi.messages().is_empty());
    }

    #[test]
    fn test_armed_bang_fires_on_start() {
        let (mut g, midi) = grid(8, 8);
        bang(&mut g, 1, 1, Direction::RIGHT | Direction::DOWN, 60);
        g.play();
        g.update();

        assert_eq!(midi.note_ons(), vec![(0, 60, 100)]);
        assert_eq!(g.signals().len(), 2);
        assert_eq!(g.signals()[0].direction, Direction::RIGHT);
        assert_eq!(g.signals()[1].direction, Direction::DOWN);
        assert!(g.node(1, 1).unwrap().is_activated());
    }

    #[test]
    fn test_key_snaps_into_scale_below_root() {
        let (mut g, midi) = grid(4, 4);
        g.set_key(62);
        g.set_scale(Scale::Major);
        let mut note = g.new_note();
        note.set_key(60, 62);
        g.add_node(Node::bang(note, Direction::NONE, true), 0, 0).unwrap();

        g.play();
        g.update();
        assert_eq!(midi.note_ons(), vec![(0, 59, 100)]);
    }

    #[test]
    fn test_signal_reaches_spread() {
        let (mut g, midi) = grid(8, 8);
        bang(&mut g, 0, 0, Direction::RIGHT, 60);
        let mut note = g.new_note();
        note.set_key(67, MIDDLE_C);
        g.add_node(Node::spread(note, Direction::DOWN), 3, 0).unwrap();

        g.play();
        advance(&mut g, 3);
        assert_eq!(g.signals(), &[Signal { x: 2, y: 0, direction: Direction::RIGHT, origin: (0, 0) }]);

        advance(&mut g, 1);
        assert_eq!(pitches(&midi), vec![60, 67]);
        assert_eq!(g.signals(), &[Signal { x: 3, y: 0, direction: Direction::DOWN, origin: (3, 0) }]);
        // the bang note was released after its default length of one step
        assert_eq!(midi.note_offs(), vec![(0, 60)]);

        advance(&mut g, 1);
        assert_eq!(g.signals()[0].y, 1);
    }

    #[test]
    fn test_signals_leave_the_grid() {
        let (mut g, _midi) = grid(4, 4);
        bang(&mut g, 0, 0, Direction::LEFT, 60);
        g.play();
        advance(&mut g, 2);
        assert!(g.signals().is_empty());
    }

    #[test]
    fn test_wraparound() {
        let (mut g, _midi) = grid(4, 4);
        g.set_wraparound(true);
        bang(&mut g, 0, 0, Direction::LEFT, 60);
        g.play();
        advance(&mut g, 2);
        assert_eq!(g.signals()[0].x, 3);
        assert_eq!(g.signals()[0].y, 0);
    }

    #[test]
    fn test_quota_absorbs_until_threshold() {
        let (mut g, midi) = grid(6, 6);
        bang(&mut g, 2, 0, Direction::DOWN, 60);
        bang(&mut g, 0, 2, Direction::RIGHT, 62);
        let mut note = g.new_note();
        note.set_key(64, MIDDLE_C);
        g.add_node(Node::quota(note, Direction::RIGHT, 2), 2, 2).unwrap();

        g.play();
        advance(&mut g, 3);

        // both signals arrive on the third step and sound the quota, only the
        // second one gets through
        assert_eq!(pitches(&midi), vec![60, 62, 64, 64]);
        assert_eq!(g.signals(), &[Signal { x: 2, y: 2, direction: Direction::RIGHT, origin: (2, 2) }]);
        let Behavior::Quota(quota) = g.node(2, 2).unwrap().behavior else {
            panic!("not a quota");
        };
        assert_eq!(quota.count(), 0);
    }

    #[test]
    fn test_quota_sounds_when_absorbing() {
        let (mut g, midi) = grid(6, 6);
        bang(&mut g, 0, 0, Direction::RIGHT, 50);
        let mut note = g.new_note();
        note.set_key(64, MIDDLE_C);
        g.add_node(Node::quota(note, Direction::DOWN, 3), 1, 0).unwrap();

        g.play();
        advance(&mut g, 2);

        assert_eq!(pitches(&midi), vec![50, 64]);
        assert!(g.signals().is_empty());
        assert!(g.node(1, 0).unwrap().is_activated());
        let Behavior::Quota(quota) = g.node(1, 0).unwrap().behavior else {
            panic!("not a quota");
        };
        assert_eq!(quota.count(), 1);
    }

    #[test]
    fn test_teleport_relocates_signal() {
        let (mut g, midi) = grid(8, 8);
        bang(&mut g, 0, 0, Direction::RIGHT, 60);
        g.add_node(Node::teleport(5, 3), 2, 0).unwrap();
        g.add_node(Node::hole(), 5, 3).unwrap();

        g.play();
        advance(&mut g, 3);

        assert_eq!(g.signals(), &[Signal { x: 5, y: 3, direction: Direction::RIGHT, origin: (5, 3) }]);
        assert!(g.node(2, 0).unwrap().is_activated());
        assert!(g.node(5, 3).unwrap().is_activated());
        // neither teleports nor holes sound
        assert_eq!(midi.note_ons().len(), 1);

        advance(&mut g, 1);
        assert_eq!(g.signals()[0].x, 6);
    }

    #[test]
    fn test_teleport_fires_once_per_pulse() {
        let (mut g, _midi) = grid(8, 8);
        bang(&mut g, 0, 0, Direction::RIGHT, 60);
        bang(&mut g, 2, 2, Direction::UP, 62);
        g.add_node(Node::teleport(5, 3), 2, 0).unwrap();

        g.play();
        advance(&mut g, 3);

        // the first arrival is relocated, the second one is swallowed
        assert_eq!(g.signals(), &[Signal { x: 5, y: 3, direction: Direction::RIGHT, origin: (2, 0) }]);
    }

    #[test]
    fn test_teleport_cycle_terminates() {
        let (mut g, _midi) = grid(8, 2);
        bang(&mut g, 0, 0, Direction::RIGHT, 60);
        g.add_node(Node::teleport(4, 0), 2, 0).unwrap();
        g.add_node(Node::teleport(2, 0), 4, 0).unwrap();

        g.play();
        advance(&mut g, 3);
        assert!(g.signals().is_empty());
    }

    #[test]
    fn test_zone_activates_connected_region() {
        let (mut g, midi) = grid(8, 8);
        bang(&mut g, 0, 0, Direction::RIGHT, 60);
        for (x, y) in [(3, 0), (3, 1), (4, 1), (6, 6)] {
            g.create_node(NodeKind::Zone, Direction::UP, x, y).unwrap();
        }

        g.play();
        advance(&mut g, 4);

        assert_eq!(midi.note_ons().len(), 4);
        assert!(g.node(4, 1).unwrap().is_activated());
        assert!(!g.node(6, 6).unwrap().is_activated());
        // the signal keeps its own direction through the zone
        assert_eq!(g.signals(), &[Signal { x: 3, y: 0, direction: Direction::RIGHT, origin: (3, 0) }]);
    }

    #[test]
    fn test_muted_node_propagates_silently() {
        let (mut g, midi) = grid(8, 8);
        bang(&mut g, 0, 0, Direction::RIGHT, 60);
        g.create_node(NodeKind::Spread, Direction::DOWN, 2, 0).unwrap();
        g.toggle_mute(2, 0);

        g.play();
        advance(&mut g, 3);

        assert_eq!(midi.note_ons().len(), 1);
        assert_eq!(g.signals()[0].direction, Direction::DOWN);
    }

    #[test]
    fn test_meta_commands_change_grid() {
        let (mut g, _midi) = grid(4, 4);
        let mut note = g.new_note();
        for cmd in note.meta_commands.iter_mut() {
            match cmd.kind() {
                MetaKind::Tempo => cmd.value_mut().set(90),
                MetaKind::Bank => cmd.value_mut().set(3),
                MetaKind::Root => cmd.value_mut().set(62),
                MetaKind::Scale => cmd.value_mut().set(Scale::Minor.index() as i16),
            }
            cmd.set_active(true);
        }
        g.add_node(Node::bang(note, Direction::NONE, true), 0, 0).unwrap();

        g.play();
        g.update();

        assert_eq!(g.tempo(), 90.0);
        assert_eq!(g.take_tempo_request(), Some(90.0));
        assert_eq!(g.take_tempo_request(), None);
        assert_eq!(g.take_bank_request(), Some(3));
        assert_eq!(g.key(), 62);
        assert_eq!(g.scale(), Scale::Minor);
    }

    #[test]
    fn test_transport_messages_and_clock() {
        let (mut g, midi) = grid(4, 4);
        g.set_send_clock(true);
        g.set_send_transport(true);
        g.set_device("synth");

        g.update();
        g.play();
        g.update();
        g.stop();

        assert_eq!(
            midi.messages(),
            vec![
                MidiMessage::Clock { device: "synth".into() },
                MidiMessage::Start { device: "synth".into() },
                MidiMessage::Clock { device: "synth".into() },
                MidiMessage::Stop { device: "synth".into() },
            ]
        );
    }

    #[test]
    fn test_stop_releases_and_resets() {
        let (mut g, midi) = grid(8, 8);
        bang(&mut g, 0, 0, Direction::RIGHT, 60);
        g.set_note_channel(0, 0, 4);
        g.node_mut(0, 0).unwrap().note_mut().unwrap().set_length(127);

        g.play();
        advance(&mut g, 2);
        g.stop();

        assert_eq!(midi.note_offs(), vec![(4, 60)]);
        assert!(g.signals().is_empty());
        assert_eq!(g.pulse(), 0);

        // a new start fires armed nodes again
        g.play();
        g.update();
        assert_eq!(midi.note_ons().len(), 2);
    }

    #[test]
    fn test_tempo_bounds() {
        let (mut g, _midi) = grid(2, 2);
        g.set_tempo(0.5);
        g.set_tempo(301.0);
        assert_eq!(g.tempo(), DEFAULT_TEMPO);
        assert_eq!(g.take_tempo_request(), None);
        g.set_tempo(300.0);
        assert_eq!(g.tempo(), 300.0);
    }

    #[test]
    fn test_edit_errors() {
        let (mut g, _midi) = grid(4, 4);
        g.create_node(NodeKind::Spread, Direction::UP, 1, 1).unwrap();

        assert_eq!(
            g.create_node(NodeKind::Bang, Direction::UP, 1, 1),
            Err(SignlsError::Occupied(1, 1))
        );
        assert!(matches!(
            g.create_node(NodeKind::Bang, Direction::UP, 4, 0),
            Err(SignlsError::OutOfBounds { x: 4, .. })
        ));
        assert_eq!(g.move_node((2, 2), (3, 3)), Err(SignlsError::Empty(2, 2)));
        assert!(Grid::new(0, 3, Arc::new(RecordingMidi::new())).is_err());

        g.move_node((1, 1), (3, 3)).unwrap();
        assert!(g.node(1, 1).is_none());
        assert_eq!(g.node(3, 3).unwrap().kind(), NodeKind::Spread);
        assert!(g.remove_node(3, 3).is_some());
        assert!(g.remove_node(3, 3).is_none());
    }

    #[test]
    fn test_last_used_channel_for_new_nodes() {
        let (mut g, _midi) = grid(4, 4);
        g.create_node(NodeKind::Bang, Direction::UP, 0, 0).unwrap();
        g.set_note_channel(0, 0, 7);
        g.create_node(NodeKind::Quota, Direction::UP, 1, 0).unwrap();

        let channel = g.node(1, 0).unwrap().note().unwrap().channel.value();
        assert_eq!(channel, 7);
        assert_eq!(g.editing.last_channel, 7);

        // separate grids don't share the context
        let (mut other, _midi) = grid(4, 4);
        other.create_node(NodeKind::Bang, Direction::UP, 0, 0).unwrap();
        assert_eq!(other.node(0, 0).unwrap().note().unwrap().channel.value(), DEFAULT_CHANNEL);
    }

    #[test]
    fn test_copy_node_is_independent() {
        let (mut g, _midi) = grid(4, 4);
        g.create_node(NodeKind::Spread, Direction::RIGHT, 0, 0).unwrap();
        g.copy_node((0, 0), (1, 1)).unwrap();

        g.node_mut(1, 1).unwrap().note_mut().unwrap().set_velocity(10);
        g.node_mut(1, 1).unwrap().direction = Direction::LEFT;

        let original = g.node(0, 0).unwrap();
        assert_eq!(original.note().unwrap().velocity.value(), 100);
        assert_eq!(original.direction, Direction::RIGHT);
    }

    #[test]
    fn test_teleport_destination_is_clamped() {
        let (mut g, _midi) = grid(4, 4);
        g.create_node(NodeKind::Teleport, Direction::NONE, 0, 0).unwrap();
        g.set_teleport_destination(0, 0, 10, 2);
        let Behavior::Teleport(teleport) = g.node(0, 0).unwrap().behavior else {
            panic!("not a teleport");
        };
        assert_eq!(teleport.destination(), (3, 2));
    }

    #[test]
    fn test_same_seed_same_performance() {
        fn perform() -> Vec<MidiMessage> {
            let (mut g, midi) = grid(8, 8);
            bang(&mut g, 0, 0, Direction::RIGHT | Direction::DOWN, 60);
            g.create_node(NodeKind::Spread, Direction::DOWN, 4, 0).unwrap();
            g.create_node(NodeKind::Spread, Direction::RIGHT, 0, 4).unwrap();
            for (x, y) in [(0, 0), (4, 0), (0, 4)] {
                let note = g.node_mut(x, y).unwrap().note_mut().unwrap();
                note.key.set_random_amount(7);
                note.velocity.set_random_amount(-40);
                note.set_probability(70);
            }
            g.play();
            advance(&mut g, 12);
            midi.messages()
        }

        assert_eq!(perform(), perform());
    }
}
