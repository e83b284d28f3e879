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

//! YAML cue sheets: the engine configuration and the sounds to load.

mod cuesheet;
mod engine;
mod error;
mod message;
mod sound;

pub use self::cuesheet::CueSheet;
pub use self::engine::{Engine, DEFAULT_PLAYER_COUNT};
pub use self::error::ConfigError;
pub use self::message::{Message, ToMessage};
pub use self::sound::{Event, Sound, Track};
