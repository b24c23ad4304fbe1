//! Plain-text grid rendering

use std::fmt::Write;

use signls_core::theory::key_name;
use signls_core::Grid;

const EMPTY: &str = "· ";
const SIGNAL: &str = "• ";

/// Renders the grid with a status line, two columns per cell.
pub fn render(grid: &Grid, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {:.0} bpm  {} {}  pulse {}",
        grid.transport().symbol(),
        grid.tempo(),
        key_name(grid.key()),
        grid.scale().name(),
        grid.pulse(),
    );

    for y in 0..grid.height() {
        for x in 0..grid.width() {
            match grid.node(x, y) {
                Some(node) if color => {
                    let _ = write!(out, "\x1b[38;5;{}m{}\x1b[0m", node.color(), node.symbol());
                }
                Some(node) => out.push_str(&node.symbol()),
                None if grid.signals().iter().any(|s| s.x == x && s.y == y) => out.push_str(SIGNAL),
                None => out.push_str(EMPTY),
            }
        }
        out.push('\n');
    }
    out
}
