//! Cardinal directions signals travel in

use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Set of cardinal directions, stored as a bitmask.
///
/// A single value can hold several directions at once: `DOWN | RIGHT` means a
/// node emits two signals, one going down and one going right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Direction(u8);

impl Direction {
    pub const NONE: Direction = Direction(0);
    pub const UP: Direction = Direction(1);
    pub const RIGHT: Direction = Direction(1 << 1);
    pub const DOWN: Direction = Direction(1 << 2);
    pub const LEFT: Direction = Direction(1 << 3);
    pub const ALL: Direction = Direction(0b1111);

    /// Cardinal directions in emission order.
    pub const CARDINALS: [Direction; 4] = [Self::UP, Self::RIGHT, Self::DOWN, Self::LEFT];

    /// Builds a direction from raw bits, dropping anything that isn't a cardinal flag.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Direction) -> bool {
        !other.is_none() && self.0 & other.0 == other.0
    }

    /// Number of cardinal directions in the set.
    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the cardinal directions contained in the set, UP first, clockwise.
    pub fn cardinals(self) -> impl Iterator<Item = Direction> {
        Self::CARDINALS.into_iter().filter(move |d| self.contains(*d))
    }

    /// Mirrors every direction in the set.
    pub fn opposite(self) -> Direction {
        self.cardinals().fold(Self::NONE, |acc, d| {
            acc | match d {
                Self::UP => Self::DOWN,
                Self::RIGHT => Self::LEFT,
                Self::DOWN => Self::UP,
                _ => Self::RIGHT,
            }
        })
    }

    /// Rotates every direction in the set a quarter turn clockwise.
    pub fn turn_clockwise(self) -> Direction {
        // UP -> RIGHT -> DOWN -> LEFT -> UP is a 4-bit left rotation.
        Direction(((self.0 << 1) | (self.0 >> 3)) & Self::ALL.0)
    }

    /// Moves one cell from `(x, y)`. Returns the signed target so callers can
    /// decide what leaving the grid means. `y` grows downward.
    pub fn step(self, x: usize, y: usize) -> (isize, isize) {
        let (mut nx, mut ny) = (x as isize, y as isize);
        if self.contains(Self::UP) {
            ny -= 1;
        }
        if self.contains(Self::DOWN) {
            ny += 1;
        }
        if self.contains(Self::LEFT) {
            nx -= 1;
        }
        if self.contains(Self::RIGHT) {
            nx += 1;
        }
        (nx, ny)
    }

    /// Single glyph for the renderer.
    pub fn symbol(self) -> &'static str {
        match self.0 {
            0b0001 => "↑",
            0b0010 => "→",
            0b0100 => "↓",
            0b1000 => "←",
            0b0101 => "│",
            0b1010 => "─",
            0b0011 => "└",
            0b0110 => "┌",
            0b1100 => "┐",
            0b1001 => "┘",
            0b0111 => "├",
            0b1110 => "┬",
            0b1101 => "┤",
            0b1011 => "┴",
            0b1111 => "┼",
            _ => " ",
        }
    }
}

impl BitOr for Direction {
    type Output = Direction;

    fn bitor(self, rhs: Self) -> Self::Output {
        Direction(self.0 | rhs.0)
    }
}

impl BitOrAssign for Direction {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Direction {
    type Output = Direction;

    fn bitand(self, rhs: Self) -> Self::Output {
        Direction(self.0 & rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_directions() {
        let dir = Direction::DOWN | Direction::RIGHT;
        assert!(dir.contains(Direction::DOWN));
        assert!(dir.contains(Direction::RIGHT));
        assert!(!dir.contains(Direction::UP));
        assert!(!dir.contains(Direction::NONE));
        assert_eq!(dir.count(), 2);
        assert_eq!(dir.cardinals().collect::<Vec<_>>(), vec![Direction::RIGHT, Direction::DOWN]);
    }

    #[test]
    fn test_none_has_no_cardinals() {
        assert!(Direction::NONE.is_none());
        assert_eq!(Direction::NONE.cardinals().count(), 0);
        assert_eq!(Direction::NONE.symbol(), " ");
    }

    #[test]
    fn test_step() {
        assert_eq!(Direction::UP.step(3, 3), (3, 2));
        assert_eq!(Direction::RIGHT.step(3, 3), (4, 3));
        assert_eq!(Direction::DOWN.step(3, 3), (3, 4));
        assert_eq!(Direction::LEFT.step(0, 0), (-1, 0));
    }

    #[test]
    fn test_turn_and_opposite() {
        assert_eq!(Direction::UP.turn_clockwise(), Direction::RIGHT);
        assert_eq!(Direction::LEFT.turn_clockwise(), Direction::UP);
        assert_eq!((Direction::UP | Direction::LEFT).opposite(), Direction::DOWN | Direction::RIGHT);
    }

    #[test]
    fn test_from_bits_masks_unknown_flags() {
        assert_eq!(Direction::from_bits(0xF4), Direction::DOWN);
    }
}
