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
use midly::num::u4;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CHANNELS: usize = 16;

/// The hook classes a player can arm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    Jump,
    Transpose,
    PartEnable,
    PartVolume,
    PartProgram,
    PartTranspose,
}

impl HookKind {
    /// Returns true if this hook is armed per channel.
    pub fn is_part_hook(&self) -> bool {
        !matches!(self, HookKind::Jump | HookKind::Transpose)
    }
}

/// Armed hook values for a player. A hook message fires if its value is zero
/// or equals the armed value; firing a non-zero hook disarms it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HookBlock {
    jump: u8,
    transpose: u8,
    part_enable: [u8; CHANNELS],
    part_volume: [u8; CHANNELS],
    part_program: [u8; CHANNELS],
    part_transpose: [u8; CHANNELS],
}

impl HookBlock {
    /// Creates an empty hook block.
    pub fn new() -> HookBlock {
        HookBlock::default()
    }

    /// Disarms every hook.
    pub fn reset(&mut self) {
        *self = HookBlock::default();
    }

    /// Arms a hook. Part hooks with no channel arm all channels; the channel is
    /// ignored for jump and transpose hooks.
    pub fn set(&mut self, kind: HookKind, channel: Option<u4>, value: u8) {
        debug!(kind = ?kind, channel = ?channel, value, "Arming hook.");
        let slots = match kind {
            HookKind::Jump => {
                self.jump = value;
                return;
            }
            HookKind::Transpose => {
                self.transpose = value;
                return;
            }
            HookKind::PartEnable => &mut self.part_enable,
            HookKind::PartVolume => &mut self.part_volume,
            HookKind::PartProgram => &mut self.part_program,
            HookKind::PartTranspose => &mut self.part_transpose,
        };
        match channel {
            Some(channel) => slots[channel.as_int() as usize] = value,
            None => slots.fill(value),
        }
    }

    /// Returns the armed value for a hook.
    pub fn get(&self, kind: HookKind, channel: u4) -> u8 {
        let channel = channel.as_int() as usize;
        match kind {
            HookKind::Jump => self.jump,
            HookKind::Transpose => self.transpose,
            HookKind::PartEnable => self.part_enable[channel],
            HookKind::PartVolume => self.part_volume[channel],
            HookKind::PartProgram => self.part_program[channel],
            HookKind::PartTranspose => self.part_transpose[channel],
        }
    }

    pub fn handle_jump(&mut self, hook: u8) -> bool {
        consume(&mut self.jump, hook)
    }

    pub fn handle_transpose(&mut self, hook: u8) -> bool {
        consume(&mut self.transpose, hook)
    }

    pub fn handle_part_enable(&mut self, channel: u4, hook: u8) -> bool {
        consume(&mut self.part_enable[channel.as_int() as usize], hook)
    }

    pub fn handle_part_volume(&mut self, channel: u4, hook: u8) -> bool {
        consume(&mut self.part_volume[channel.as_int() as usize], hook)
    }

    pub fn handle_part_program(&mut self, channel: u4, hook: u8) -> bool {
        consume(&mut self.part_program[channel.as_int() as usize], hook)
    }

    pub fn handle_part_transpose(&mut self, channel: u4, hook: u8) -> bool {
        consume(&mut self.part_transpose[channel.as_int() as usize], hook)
    }
}

/// Decides whether a hook fires and disarms it if it was a conditional hit.
fn consume(armed: &mut u8, hook: u8) -> bool {
    if hook == 0 {
        return true;
    }
    if *armed == hook {
        *armed = 0;
        return true;
    }
    false
}
