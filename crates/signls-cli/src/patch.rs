//! Built-in demo patch

use std::sync::Arc;

use signls_core::{ControlKind, Direction, Grid, MetaKind, MidiSink, Node, NodeKind, Result, Scale};

/// A self-sustaining loop: a bang feeds a splitter, one branch is thinned out
/// by a quota, the other rings a zone chord and comes back around through a
/// teleport and a hole to hit the bang again.
pub fn demo(width: usize, height: usize, midi: Arc<dyn MidiSink>, rng: fastrand::Rng) -> Result<Grid> {
    let mut grid = Grid::new(width, height, midi)?.with_rng(rng);
    grid.set_scale(Scale::Dorian);
    let root = grid.key();
    let key = |interval: i16| (root as i16 + interval).clamp(0, 127) as u8;

    let mut note = grid.new_note();
    note.set_key(root, root);
    grid.add_node(Node::bang(note, Direction::RIGHT, true), 1, 1)?;

    let mut note = grid.new_note();
    note.set_key(key(7), root);
    note.key.set_random_amount(2);
    note.velocity.set_random_amount(-30);
    grid.add_node(Node::spread(note, Direction::DOWN | Direction::RIGHT), 6, 1)?;

    grid.editing.last_channel = 1;
    let mut note = grid.new_note();
    note.set_key(key(12), root);
    note.set_length(12);
    note.controls[0].set_kind(ControlKind::ControlChange);
    note.controls[0].set_controller(74);
    note.controls[0].value_mut().set(64);
    note.controls[0].value_mut().set_random_amount(40);
    grid.add_node(Node::quota(note, Direction::DOWN, 2), 12, 1)?;

    grid.editing.last_channel = 2;
    for (x, y, interval) in [(6, 4, -12), (7, 4, -5), (7, 5, -2)] {
        let mut note = grid.new_note();
        note.set_key(key(interval), root);
        note.set_length(18);
        grid.add_node(Node::zone(note, Direction::NONE), x, y)?;
    }

    grid.editing.last_channel = 0;
    let mut note = grid.new_note();
    note.set_key(key(3), root);
    note.set_probability(60);
    if let Some(cmd) = note.meta_commands.iter_mut().find(|c| c.kind() == MetaKind::Root) {
        cmd.set_active(true);
        cmd.value_mut().set(root as i16);
        cmd.value_mut().set_random_amount(5);
    }
    grid.add_node(Node::spread(note, Direction::LEFT), 6, 7)?;

    grid.create_node(NodeKind::Teleport, Direction::NONE, 4, 7)?;
    grid.set_teleport_destination(4, 7, 1, 7);

    let mut note = grid.new_note();
    note.set_key(key(-5), root);
    grid.add_node(Node::spread(note, Direction::UP), 1, 7)?;
    grid.create_node(NodeKind::Hole, Direction::NONE, 1, 4)?;

    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use signls_core::RecordingMidi;

    #[test]
    fn test_demo_fits_default_grid() {
        let grid = demo(20, 10, Arc::new(RecordingMidi::new()), fastrand::Rng::with_seed(3)).unwrap();
        assert_eq!(grid.nodes().count(), 10);
        assert!(grid.node(1, 1).unwrap().armed_on_start());
    }

    #[test]
    fn test_demo_needs_room() {
        assert!(demo(8, 8, Arc::new(RecordingMidi::new()), fastrand::Rng::new()).is_err());
    }

    #[test]
    fn test_demo_loops() {
        let midi = Arc::new(RecordingMidi::new());
        let mut grid = demo(20, 10, midi.clone(), fastrand::Rng::with_seed(3)).unwrap();
        grid.play();
        for _ in 0..6 * 64 {
            grid.update();
        }

        assert!(!grid.signals().is_empty());
        // the quota only lets every second pass through
        assert!(midi.note_ons().iter().any(|(channel, _, _)| *channel == 1));
        assert!(midi.note_ons().iter().any(|(channel, _, _)| *channel == 2));
    }
}
