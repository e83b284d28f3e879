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

/// Typed error for cue sheet load/parse failures so callers can distinguish
/// e.g. file-not-found from invalid values without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Unable to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse MIDI file: {0}")]
    Midi(#[from] midly::Error),
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },
    #[error("Sound {0} is defined more than once")]
    DuplicateSound(u32),
    #[error("Sound {0} is not defined")]
    UnknownSound(u32),
}
