// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;

/// Extracts a displayable file name from a path, returning a fallback if the name is unreadable.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Converts a 1-based beat and a tick within that beat to an absolute tick.
/// Beat 0 is treated as beat 1.
pub fn absolute_tick(beat: u32, tick: u32, ticks_per_quarter: u32) -> u32 {
    (beat.max(1) - 1)
        .saturating_mul(ticks_per_quarter)
        .saturating_add(tick)
}

/// Converts an absolute tick to a 1-based beat and the tick within that beat.
pub fn beat_position(tick: u32, ticks_per_quarter: u32) -> (u32, u32) {
    let ticks_per_quarter = ticks_per_quarter.max(1);
    (tick / ticks_per_quarter + 1, tick % ticks_per_quarter)
}

/// Outputs a position in a beat:tick format.
pub fn format_position(beat: u32, tick: u32) -> String {
    format!("{}:{:03}", beat, tick)
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use crate::util::{absolute_tick, beat_position, filename_display, format_position};

    #[test]
    fn test_absolute_tick() {
        assert_eq!(0, absolute_tick(1, 0, 480));
        assert_eq!(0, absolute_tick(0, 0, 480));
        assert_eq!(1920, absolute_tick(5, 0, 480));
        assert_eq!(1000, absolute_tick(3, 40, 480));
        // Ticks beyond the beat are allowed.
        assert_eq!(600, absolute_tick(1, 600, 480));
    }

    #[test]
    fn test_beat_position() {
        assert_eq!((1, 0), beat_position(0, 480));
        assert_eq!((1, 479), beat_position(479, 480));
        assert_eq!((5, 0), beat_position(1920, 480));
        assert_eq!((3, 40), beat_position(1000, 480));
    }

    #[test]
    fn test_position_strings() {
        assert_eq!("1:000", format_position(1, 0));
        assert_eq!("12:479", format_position(12, 479));
        assert_eq!("song.mid", filename_display(Path::new("/tmp/song.mid")));
    }
}
