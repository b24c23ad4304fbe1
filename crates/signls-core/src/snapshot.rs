//! Serializable grid state
//!
//! Snapshots carry everything needed to rebuild a grid: layout, node
//! settings and grid-level options. Transient playback state (signals, pulse
//! counter, sounding notes) is not persisted.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::control::{ControlInt, ControlValue};
use crate::direction::Direction;
use crate::error::Result;
use crate::grid::Grid;
use crate::midi::MidiSink;
use crate::node::{Bang, Behavior, Node, NodeKind, Quota, Teleport, DEFAULT_QUOTA};
use crate::note::{ControlKind, ControlLane, MetaCommand, MetaKind, Note};
use crate::theory::{Key, Scale};

const PARAM_ARMED: &str = "armed";
const PARAM_THRESHOLD: &str = "threshold";
const PARAM_DESTINATION_X: &str = "destination_x";
const PARAM_DESTINATION_Y: &str = "destination_y";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub width: usize,
    pub height: usize,
    pub tempo: f64,
    pub root: Key,
    pub scale: Scale,
    pub device: String,
    #[serde(default)]
    pub send_clock: bool,
    #[serde(default)]
    pub send_transport: bool,
    #[serde(default)]
    pub wraparound: bool,
    #[serde(default)]
    pub last_channel: u8,
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    #[serde(rename = "type")]
    pub kind: String,
    pub x: usize,
    pub y: usize,
    pub direction: Direction,
    #[serde(default)]
    pub muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<NoteSnapshot>,
    /// Behavior specific settings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, i64>,
}

/// Base value and random amount of a [`ControlValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSnapshot {
    pub value: i64,
    #[serde(default)]
    pub amount: i32,
}

impl ParamSnapshot {
    fn of<T: ControlInt>(param: &ControlValue<T>) -> Self {
        Self {
            value: param.value().into(),
            amount: param.random_amount(),
        }
    }

    fn apply<T: ControlInt>(&self, param: &mut ControlValue<T>) {
        param.set(T::from_i64(self.value));
        param.set_random_amount(self.amount);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySnapshot {
    pub key: Key,
    pub root: Key,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub amount: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    pub kind: ControlKind,
    pub controller: u8,
    pub value: ParamSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaSnapshot {
    pub kind: MetaKind,
    pub active: bool,
    pub value: ParamSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub key: KeySnapshot,
    pub channel: ParamSnapshot,
    pub velocity: ParamSnapshot,
    pub length: ParamSnapshot,
    pub probability: u8,
    #[serde(default)]
    pub controls: Vec<ControlSnapshot>,
    #[serde(default)]
    pub meta: Vec<MetaSnapshot>,
}

impl NoteSnapshot {
    fn of(note: &Note) -> Self {
        Self {
            device: note.device.clone(),
            key: KeySnapshot {
                key: note.key.value(),
                root: note.key.root(),
                silent: note.key.is_silent(),
                amount: note.key.random_amount(),
            },
            channel: ParamSnapshot::of(&note.channel),
            velocity: ParamSnapshot::of(&note.velocity),
            length: ParamSnapshot::of(&note.length),
            probability: note.probability(),
            controls: note
                .controls
                .iter()
                .map(|lane| ControlSnapshot {
                    kind: lane.kind(),
                    controller: lane.controller(),
                    value: ParamSnapshot::of(lane.value()),
                })
                .collect(),
            meta: note
                .meta_commands
                .iter()
                .map(|cmd| MetaSnapshot {
                    kind: cmd.kind(),
                    active: cmd.is_active(),
                    value: ParamSnapshot::of(cmd.value()),
                })
                .collect(),
        }
    }

    fn apply(&self, note: &mut Note) {
        note.device = self.device.clone();
        note.set_key(self.key.key, self.key.root);
        note.key.set_silent(self.key.silent);
        note.key.set_random_amount(self.key.amount);
        self.channel.apply(&mut note.channel);
        self.velocity.apply(&mut note.velocity);
        self.length.apply(&mut note.length);
        note.set_probability(self.probability);

        note.controls = self
            .controls
            .iter()
            .map(|snapshot| {
                let mut lane = ControlLane::new(snapshot.kind);
                lane.set_controller(snapshot.controller);
                snapshot.value.apply(lane.value_mut());
                lane
            })
            .collect();

        note.meta_commands = self
            .meta
            .iter()
            .map(|snapshot| {
                let mut cmd = MetaCommand::new(snapshot.kind);
                cmd.set_active(snapshot.active);
                snapshot.value.apply(cmd.value_mut());
                cmd
            })
            .collect();
    }
}

impl NodeSnapshot {
    fn of(x: usize, y: usize, node: &Node) -> Self {
        let mut params = BTreeMap::new();
        match node.behavior {
            Behavior::Bang(bang) => {
                params.insert(PARAM_ARMED.to_string(), bang.armed as i64);
            }
            Behavior::Quota(quota) => {
                params.insert(PARAM_THRESHOLD.to_string(), quota.threshold() as i64);
            }
            Behavior::Teleport(teleport) => {
                let (dx, dy) = teleport.destination();
                params.insert(PARAM_DESTINATION_X.to_string(), dx as i64);
                params.insert(PARAM_DESTINATION_Y.to_string(), dy as i64);
            }
            Behavior::Spread | Behavior::Zone | Behavior::Hole => {}
        }

        Self {
            kind: node.name().to_string(),
            x,
            y,
            direction: node.direction,
            muted: node.is_muted(),
            note: node.note().map(NoteSnapshot::of),
            params,
        }
    }

    fn param(&self, name: &str) -> Option<i64> {
        self.params.get(name).copied()
    }

    fn behavior(&self, kind: NodeKind, width: usize, height: usize) -> Behavior {
        match kind {
            NodeKind::Bang => Behavior::Bang(Bang {
                armed: self.param(PARAM_ARMED).is_some_and(|armed| armed != 0),
            }),
            NodeKind::Quota => {
                let threshold = self
                    .param(PARAM_THRESHOLD)
                    .map_or(DEFAULT_QUOTA, |t| t.clamp(0, u32::MAX as i64) as u32);
                Behavior::Quota(Quota::new(threshold))
            }
            NodeKind::Teleport => {
                let coordinate = |name, size: usize| {
                    self.param(name)
                        .map_or(0, |v| v.clamp(0, size as i64 - 1) as usize)
                };
                Behavior::Teleport(Teleport::new(
                    coordinate(PARAM_DESTINATION_X, width),
                    coordinate(PARAM_DESTINATION_Y, height),
                ))
            }
            _ => Behavior::new(kind),
        }
    }
}

impl GridSnapshot {
    /// Rebuilds a grid whose notes draw their randomness from `rng`.
    pub fn restore(&self, midi: Arc<dyn MidiSink>, rng: fastrand::Rng) -> Result<Grid> {
        let mut grid = Grid::new(self.width, self.height, midi)?.with_rng(rng);
        grid.set_tempo(self.tempo);
        grid.take_tempo_request();
        grid.set_key(self.root);
        grid.set_scale(self.scale);
        grid.set_device(self.device.clone());
        grid.set_send_clock(self.send_clock);
        grid.set_send_transport(self.send_transport);
        grid.set_wraparound(self.wraparound);

        for snapshot in &self.nodes {
            let kind = NodeKind::from_name(&snapshot.kind)?;
            let behavior = snapshot.behavior(kind, self.width, self.height);

            let note = kind.is_audible().then(|| {
                let mut note = grid.new_note();
                if let Some(note_snapshot) = &snapshot.note {
                    note_snapshot.apply(&mut note);
                }
                note
            });

            let mut node = Node::new(behavior, snapshot.direction, note);
            node.set_muted(snapshot.muted);
            grid.add_node(node, snapshot.x, snapshot.y)?;
        }

        grid.editing.last_channel = self.last_channel.min(crate::note::MAX_CHANNEL);
        Ok(grid)
    }
}

impl Grid {
    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            width: self.width(),
            height: self.height(),
            tempo: self.tempo(),
            root: self.key(),
            scale: self.scale(),
            device: self.device().to_string(),
            send_clock: self.send_clock(),
            send_transport: self.send_transport(),
            wraparound: self.wraparound(),
            last_channel: self.editing.last_channel,
            nodes: self
                .nodes()
                .map(|(x, y, node)| NodeSnapshot::of(x, y, node))
                .collect(),
        }
    }

    pub fn from_snapshot(snapshot: &GridSnapshot, midi: Arc<dyn MidiSink>) -> Result<Self> {
        snapshot.restore(midi, fastrand::Rng::new())
    }
}
