//! Keys and scales, as far as the engine needs them

use serde::{Deserialize, Serialize};

/// MIDI note number.
pub type Key = u8;

pub const MIDDLE_C: Key = 60;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Scale/mode types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scale {
    #[default]
    Chromatic,
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    Pentatonic,
    Blues,
}

impl Scale {
    pub const ALL: [Scale; 12] = [
        Self::Chromatic,
        Self::Major,
        Self::Minor,
        Self::Dorian,
        Self::Phrygian,
        Self::Lydian,
        Self::Mixolydian,
        Self::Locrian,
        Self::HarmonicMinor,
        Self::MelodicMinor,
        Self::Pentatonic,
        Self::Blues,
    ];

    /// Get scale intervals (semitones from root)
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Self::Major => &[0, 2, 4, 5, 7, 9, 11],
            Self::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Self::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Self::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Self::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Self::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Self::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Self::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Self::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            Self::Pentatonic => &[0, 2, 4, 7, 9],
            Self::Blues => &[0, 3, 5, 6, 7, 10],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chromatic => "chromatic",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Dorian => "dorian",
            Self::Phrygian => "phrygian",
            Self::Lydian => "lydian",
            Self::Mixolydian => "mixolydian",
            Self::Locrian => "locrian",
            Self::HarmonicMinor => "harmonic minor",
            Self::MelodicMinor => "melodic minor",
            Self::Pentatonic => "pentatonic",
            Self::Blues => "blues",
        }
    }

    /// Position in [`Scale::ALL`], used by meta commands and snapshots.
    pub fn index(&self) -> u16 {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0) as u16
    }

    /// Out-of-range indices wrap around the table.
    pub fn from_index(index: u16) -> Self {
        Self::ALL[index as usize % Self::ALL.len()]
    }
}

/// Human readable key name, e.g. `C4` for middle C.
pub fn key_name(key: Key) -> String {
    let octave = key as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[(key % 12) as usize], octave)
}

/// Snaps `note` to the nearest note of `scale` rooted at `root`'s pitch
/// class. Ties go to the lower note.
pub fn quantize(note: Key, root: Key, scale: Scale) -> Key {
    let root_class = (root % 12) as i32;
    let note = note as i32;
    let base = root_class + (note - root_class).div_euclid(12) * 12;

    // neighbouring octaves cover matches that wrap past the root
    let intervals = scale.intervals().iter().map(|&i| i as i32);
    intervals
        .clone()
        .map(|i| i - 12)
        .chain(intervals)
        .chain(std::iter::once(12))
        .map(|degree| base + degree)
        .filter(|pitch| (0..=127).contains(pitch))
        .min_by_key(|pitch| (pitch - note).abs())
        .unwrap_or(note) as Key
}

/// Moves `key` by `degrees` steps of `scale` rooted at `root`. The key is
/// quantized first so the walk always starts on a scale note.
pub fn transpose_in_scale(key: Key, root: Key, scale: Scale, degrees: i32) -> Key {
    let intervals = scale.intervals();
    let len = intervals.len() as i32;
    let root_in_octave = (root % 12) as i32;
    let relative = quantize(key, root, scale) as i32 - root_in_octave;

    let octave = relative.div_euclid(12);
    let in_octave = relative.rem_euclid(12);
    let degree = intervals
        .iter()
        .position(|&i| i as i32 == in_octave)
        .unwrap_or(0) as i32;

    let index = octave * len + degree + degrees;
    let note = root_in_octave
        + index.div_euclid(len) * 12
        + intervals[index.rem_euclid(len) as usize] as i32;
    note.clamp(0, 127) as Key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize() {
        // halfway between two scale notes snaps down
        assert_eq!(quantize(61, 60, Scale::Major), 60);
        assert_eq!(quantize(63, 60, Scale::Major), 62);
        assert_eq!(quantize(60, 60, Scale::Major), 60);
        assert_eq!(quantize(64, 60, Scale::Major), 64);
        // chromatic leaves everything alone
        assert_eq!(quantize(61, 62, Scale::Chromatic), 61);
    }

    #[test]
    fn test_quantize_keeps_octave_below_root() {
        // C4 sits between C#4 and B3 in D major
        assert_eq!(quantize(60, 62, Scale::Major), 59);
        assert_eq!(quantize(62, 62, Scale::Major), 62);
        assert_eq!(quantize(57, 62, Scale::Major), 57);
        assert_eq!(quantize(0, 62, Scale::Major), 1);
    }

    #[test]
    fn test_quantize_wraps_to_next_root() {
        assert_eq!(quantize(71, 60, Scale::Pentatonic), 72);
        assert_eq!(quantize(11, 0, Scale::Pentatonic), 12);
        assert_eq!(quantize(127, 60, Scale::Pentatonic), 127);
    }

    #[test]
    fn test_transpose_in_scale_other_root() {
        // D major: D E F# G A B C#
        assert_eq!(transpose_in_scale(60, 62, Scale::Major, 0), 59);
        assert_eq!(transpose_in_scale(60, 62, Scale::Major, 1), 61);
        assert_eq!(transpose_in_scale(62, 62, Scale::Major, -1), 61);
        assert_eq!(transpose_in_scale(71, 60, Scale::Pentatonic, 1), 74);
    }

    #[test]
    fn test_transpose_in_scale() {
        assert_eq!(transpose_in_scale(60, 60, Scale::Major, 1), 62);
        assert_eq!(transpose_in_scale(60, 60, Scale::Major, 7), 72);
        assert_eq!(transpose_in_scale(60, 60, Scale::Major, -1), 59);
        assert_eq!(transpose_in_scale(64, 60, Scale::Pentatonic, 2), 69);
        assert_eq!(transpose_in_scale(60, 60, Scale::Chromatic, 0), 60);
        assert_eq!(transpose_in_scale(126, 60, Scale::Chromatic, 12), 127);
        assert_eq!(transpose_in_scale(2, 60, Scale::Chromatic, -12), 0);
    }

    #[test]
    fn test_scale_index_round_trip() {
        for scale in Scale::ALL {
            assert_eq!(Scale::from_index(scale.index()), scale);
        }
        assert_eq!(Scale::from_index(12), Scale::Chromatic);
    }

    #[test]
    fn test_key_name() {
        assert_eq!(key_name(MIDDLE_C), "C4");
        assert_eq!(key_name(69), "A4");
        assert_eq!(key_name(0), "C-1");
    }
}
