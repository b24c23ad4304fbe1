//! Grid cell occupants and their propagation behavior

use serde::{Deserialize, Serialize};

use crate::direction::Direction;
use crate::error::{Result, SignlsError};
use crate::note::Note;

pub const DEFAULT_QUOTA: u32 = 2;

/// Tag identifying a node variant, as used by snapshots and node creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Bang,
    Spread,
    Zone,
    Quota,
    Teleport,
    Hole,
}

impl NodeKind {
    pub const ALL: [NodeKind; 6] = [
        Self::Bang,
        Self::Spread,
        Self::Zone,
        Self::Quota,
        Self::Teleport,
        Self::Hole,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bang => "bang",
            Self::Spread => "spread",
            Self::Zone => "zone",
            Self::Quota => "quota",
            Self::Teleport => "telep",
            Self::Hole => "hole",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == name)
            .ok_or_else(|| SignlsError::UnknownNodeType(name.to_string()))
    }

    /// Whether nodes of this kind carry a note.
    pub fn is_audible(&self) -> bool {
        !matches!(self, Self::Teleport | Self::Hole)
    }
}

// ============================================================================
// Behaviors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bang {
    pub armed: bool,
}

/// Emits once every `threshold` hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    threshold: u32,
    count: u32,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_QUOTA,
            count: 0,
        }
    }
}

impl Quota {
    pub fn new(threshold: u32) -> Self {
        let mut quota = Self::default();
        quota.set_threshold(threshold);
        quota
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// A zero threshold is ignored.
    pub fn set_threshold(&mut self, threshold: u32) {
        if threshold == 0 {
            return;
        }
        self.threshold = threshold;
    }

    /// Hits received since the last emission.
    pub fn count(&self) -> u32 {
        self.count
    }

    fn hit(&mut self, direction: Direction) -> Direction {
        self.count += 1;
        if self.count < self.threshold {
            return Direction::NONE;
        }
        self.count = 0;
        direction
    }
}

/// Moves signals to another cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Teleport {
    destination: (usize, usize),
    last_fired: Option<u64>,
}

impl Teleport {
    pub fn new(x: usize, y: usize) -> Self {
        Self {
            destination: (x, y),
            last_fired: None,
        }
    }

    pub fn destination(&self) -> (usize, usize) {
        self.destination
    }

    pub fn set_destination(&mut self, x: usize, y: usize) {
        self.destination = (x, y);
    }

    pub fn fired_at(&self, pulse: u64) -> bool {
        self.last_fired == Some(pulse)
    }

    /// Destination for a signal entering at `pulse`, or `None` if this
    /// teleport already relocated something during that pulse.
    pub fn relocate(&mut self, pulse: u64) -> Option<(usize, usize)> {
        if self.fired_at(pulse) {
            return None;
        }
        self.last_fired = Some(pulse);
        Some(self.destination)
    }
}

/// Propagation behavior of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Bang(Bang),
    Spread,
    Zone,
    Quota(Quota),
    Teleport(Teleport),
    Hole,
}

impl Behavior {
    pub fn new(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Bang => Self::Bang(Bang::default()),
            NodeKind::Spread => Self::Spread,
            NodeKind::Zone => Self::Zone,
            NodeKind::Quota => Self::Quota(Quota::default()),
            NodeKind::Teleport => Self::Teleport(Teleport::default()),
            NodeKind::Hole => Self::Hole,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Bang(_) => NodeKind::Bang,
            Self::Spread => NodeKind::Spread,
            Self::Zone => NodeKind::Zone,
            Self::Quota(_) => NodeKind::Quota,
            Self::Teleport(_) => NodeKind::Teleport,
            Self::Hole => NodeKind::Hole,
        }
    }

    /// Directions to emit when a signal travelling `incoming` enters a node
    /// configured with `configured`.
    pub fn emit_directions(&mut self, configured: Direction, incoming: Direction, _pulse: u64) -> Direction {
        match self {
            Self::Bang(_) | Self::Spread => configured,
            Self::Quota(quota) => quota.hit(configured),
            Self::Zone | Self::Teleport(_) | Self::Hole => incoming,
        }
    }

    /// Whether the node fires by itself when playback starts.
    pub fn armed_on_start(&self) -> bool {
        matches!(self, Self::Bang(Bang { armed: true }))
    }

    /// Whether an activation spreads to connected nodes of the same kind.
    pub fn should_propagate(&self) -> bool {
        matches!(self, Self::Zone)
    }

    pub fn reset(&mut self) {
        match self {
            Self::Quota(quota) => quota.count = 0,
            Self::Teleport(teleport) => teleport.last_fired = None,
            Self::Bang(_) | Self::Spread | Self::Zone | Self::Hole => {}
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn symbol(&self, direction: Direction) -> String {
        match self {
            Self::Bang(_) => format!("B{}", direction.symbol()),
            Self::Spread => format!("S{}", direction.symbol()),
            Self::Zone => format!("Z{}", direction.symbol()),
            Self::Quota(_) => format!("Q{}", direction.symbol()),
            Self::Teleport(_) => "T ".to_string(),
            Self::Hole => "O ".to_string(),
        }
    }

    /// Terminal color code.
    pub fn color(&self) -> &'static str {
        match self {
            Self::Bang(_) => "165",
            Self::Spread => "177",
            Self::Zone => "204",
            Self::Quota(_) => "197",
            Self::Teleport(_) => "15",
            Self::Hole => "244",
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// A grid cell occupant.
#[derive(Debug)]
pub struct Node {
    pub behavior: Behavior,
    pub direction: Direction,
    note: Option<Note>,
    muted: bool,
    activated: bool,
}

impl Node {
    pub fn new(behavior: Behavior, direction: Direction, note: Option<Note>) -> Self {
        Self {
            behavior,
            direction,
            note,
            muted: false,
            activated: false,
        }
    }

    pub fn bang(note: Note, direction: Direction, armed: bool) -> Self {
        Self::new(Behavior::Bang(Bang { armed }), direction, Some(note))
    }

    pub fn spread(note: Note, direction: Direction) -> Self {
        Self::new(Behavior::Spread, direction, Some(note))
    }

    pub fn zone(note: Note, direction: Direction) -> Self {
        Self::new(Behavior::Zone, direction, Some(note))
    }

    pub fn quota(note: Note, direction: Direction, threshold: u32) -> Self {
        Self::new(Behavior::Quota(Quota::new(threshold)), direction, Some(note))
    }

    pub fn teleport(x: usize, y: usize) -> Self {
        Self::new(Behavior::Teleport(Teleport::new(x, y)), Direction::NONE, None)
    }

    pub fn hole() -> Self {
        Self::new(Behavior::Hole, Direction::NONE, None)
    }

    pub fn kind(&self) -> NodeKind {
        self.behavior.kind()
    }

    pub fn note(&self) -> Option<&Note> {
        self.note.as_ref()
    }

    pub fn note_mut(&mut self) -> Option<&mut Note> {
        self.note.as_mut()
    }

    pub fn is_audible(&self) -> bool {
        self.note.is_some()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Whether the node fired during the last propagation step.
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub(crate) fn set_activated(&mut self, activated: bool) {
        self.activated = activated;
    }

    pub fn emit_directions(&mut self, incoming: Direction, pulse: u64) -> Direction {
        self.behavior.emit_directions(self.direction, incoming, pulse)
    }

    pub fn armed_on_start(&self) -> bool {
        self.behavior.armed_on_start()
    }

    pub fn name(&self) -> &'static str {
        self.behavior.name()
    }

    pub fn color(&self) -> &'static str {
        self.behavior.color()
    }

    pub fn symbol(&self) -> String {
        let decoration = self.note.as_ref().map(Note::symbol).unwrap_or_default();
        format!("{}{}", self.behavior.symbol(self.direction), decoration)
    }

    pub fn reset(&mut self) {
        self.behavior.reset();
        self.activated = false;
    }

    /// Deep copy for duplication on the grid.
    pub fn copy(&mut self) -> Node {
        Node {
            behavior: self.behavior,
            direction: self.direction,
            note: self.note.as_mut().map(Note::copy),
            muted: self.muted,
            activated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_emits_every_n_hits() {
        let mut behavior = Behavior::Quota(Quota::new(4));
        for pulse in 0..3 {
            assert_eq!(behavior.emit_directions(Direction::RIGHT, Direction::DOWN, pulse), Direction::NONE);
        }
        let Behavior::Quota(quota) = behavior else { unreachable!() };
        assert_eq!(quota.count(), 3);

        assert_eq!(behavior.emit_directions(Direction::RIGHT, Direction::DOWN, 3), Direction::RIGHT);
        let Behavior::Quota(quota) = behavior else { unreachable!() };
        assert_eq!(quota.count(), 0);
    }

    #[test]
    fn test_quota_rejects_zero_threshold() {
        let mut quota = Quota::new(3);
        quota.set_threshold(0);
        assert_eq!(quota.threshold(), 3);
        assert_eq!(Quota::new(0).threshold(), DEFAULT_QUOTA);
    }

    #[test]
    fn test_quota_of_one_always_emits() {
        let mut behavior = Behavior::Quota(Quota::new(1));
        for pulse in 0..5 {
            assert_eq!(behavior.emit_directions(Direction::UP, Direction::LEFT, pulse), Direction::UP);
        }
    }

    #[test]
    fn test_pass_through_variants() {
        let configured = Direction::UP | Direction::LEFT;
        let mut spread = Behavior::Spread;
        let mut bang = Behavior::Bang(Bang::default());
        let mut zone = Behavior::Zone;
        let mut hole = Behavior::Hole;

        assert_eq!(spread.emit_directions(configured, Direction::DOWN, 0), configured);
        assert_eq!(bang.emit_directions(configured, Direction::DOWN, 0), configured);
        assert_eq!(zone.emit_directions(configured, Direction::DOWN, 0), Direction::DOWN);
        assert_eq!(hole.emit_directions(configured, Direction::DOWN, 0), Direction::DOWN);
        assert!(zone.should_propagate());
        assert!(!spread.should_propagate());
    }

    #[test]
    fn test_teleport_fires_once_per_pulse() {
        let mut teleport = Teleport::new(4, 2);
        assert_eq!(teleport.relocate(12), Some((4, 2)));
        assert_eq!(teleport.relocate(12), None);
        assert_eq!(teleport.relocate(18), Some((4, 2)));
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut quota = Behavior::Quota(Quota::new(3));
        quota.emit_directions(Direction::UP, Direction::UP, 0);
        quota.reset();
        let Behavior::Quota(q) = quota else { unreachable!() };
        assert_eq!(q.count(), 0);

        let mut teleport = Behavior::Teleport(Teleport::new(1, 1));
        if let Behavior::Teleport(t) = &mut teleport {
            t.relocate(6);
        }
        teleport.reset();
        let Behavior::Teleport(t) = teleport else { unreachable!() };
        assert!(!t.fired_at(6));
    }

    #[test]
    fn test_armed_on_start() {
        assert!(Behavior::Bang(Bang { armed: true }).armed_on_start());
        assert!(!Behavior::Bang(Bang { armed: false }).armed_on_start());
        assert!(!Behavior::Spread.armed_on_start());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_name(kind.name()), Ok(kind));
            assert_eq!(Behavior::new(kind).kind(), kind);
        }
        assert!(NodeKind::from_name("eater").is_err());
    }

    #[test]
    fn test_symbols() {
        assert_eq!(Behavior::Quota(Quota::default()).symbol(Direction::RIGHT), "Q→");
        assert_eq!(Node::hole().symbol(), "O ");
    }
}
