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

//! The playback core of an interactive MIDI music engine. Sounds branch, loop
//! and jump between positions while a small pool of synthesizer channels is
//! shared between them by priority.

pub mod config;
pub mod driver;
pub mod engine;
pub mod hooks;
pub mod manager;
pub mod part;
pub mod player;
pub mod sequencer;
pub mod slot;
pub mod sound;
pub mod strategy;
pub mod sustainer;
#[cfg(test)]
mod testutil;
pub mod util;
