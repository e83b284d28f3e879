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
use std::fmt;

use midly::num::u4;

use crate::{
    part::PartId,
    slot::{Slot, SlotId},
};

use super::PartState;

/// A call made against the mock driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    StartNote { part: PartId, key: u8, velocity: u8 },
    StopNote { part: PartId, key: u8, velocity: u8 },
    Volume { part: PartId, volume: u8 },
    Pan { part: PartId, pan: i8 },
    PitchOffset { part: PartId, offset: i16 },
    ModWheel { part: PartId, value: u8 },
    Sustain { part: PartId, on: bool },
    Reverb { part: PartId, value: u8 },
    Chorus { part: PartId, value: u8 },
    ProgramChange { part: PartId, program: Option<u8> },
    LoadPart { part: PartId, slot: Option<SlotId> },
    ActiveSetup { part: PartId, data: Vec<u8> },
    StoredSetup { part: PartId, number: u8 },
    LoadSetup { part: PartId, number: u8 },
    SetupParam { part: PartId, param: u8, value: u8 },
    StopAllNotes { slot: SlotId },
}

/// A mock driver. Doesn't actually play anything, just records what it was asked to do.
#[derive(Clone)]
pub struct Driver {
    name: String,
    slot_count: usize,
    accepts_setups: bool,
    stores_setups: bool,
    calls: Vec<Call>,
}

impl Driver {
    /// Creates a mock driver with the given number of slots.
    pub fn new(slot_count: usize) -> Driver {
        Driver {
            name: "mock".to_string(),
            slot_count,
            accepts_setups: false,
            stores_setups: false,
            calls: Vec::new(),
        }
    }

    /// Sets whether setup dumps are accepted and whether stored setups are kept.
    pub fn with_setups(mut self, accepts: bool, stores: bool) -> Driver {
        self.accepts_setups = accepts;
        self.stores_setups = stores;
        self
    }

    /// All calls recorded since the last clear.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Returns the recorded calls and clears them.
    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// The notes started since the last clear, in order.
    pub fn started_notes(&self) -> Vec<(PartId, u8)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::StartNote { part, key, .. } => Some((*part, *key)),
                _ => None,
            })
            .collect()
    }

    /// The notes stopped since the last clear, in order.
    pub fn stopped_notes(&self) -> Vec<(PartId, u8)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::StopNote { part, key, .. } => Some((*part, *key)),
                _ => None,
            })
            .collect()
    }
}

impl super::Driver for Driver {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn default_slot_count(&self) -> usize {
        self.slot_count
    }

    fn uses_stored_setup(&self) -> bool {
        self.stores_setups
    }

    fn channel_for_slot(&self, index: usize) -> u4 {
        super::melodic_channel(index)
    }

    fn start_note(&mut self, part: &PartState, key: u8, velocity: u8) {
        self.calls.push(Call::StartNote {
            part: part.part,
            key,
            velocity,
        });
    }

    fn stop_note(&mut self, part: &PartState, key: u8, velocity: u8) {
        self.calls.push(Call::StopNote {
            part: part.part,
            key,
            velocity,
        });
    }

    fn set_volume(&mut self, part: &PartState) {
        self.calls.push(Call::Volume {
            part: part.part,
            volume: part.volume,
        });
    }

    fn set_pan(&mut self, part: &PartState) {
        self.calls.push(Call::Pan {
            part: part.part,
            pan: part.pan,
        });
    }

    fn set_pitch_offset(&mut self, part: &PartState) {
        self.calls.push(Call::PitchOffset {
            part: part.part,
            offset: part.pitch_offset,
        });
    }

    fn set_mod_wheel(&mut self, part: &PartState) {
        self.calls.push(Call::ModWheel {
            part: part.part,
            value: part.mod_wheel,
        });
    }

    fn set_sustain(&mut self, part: &PartState) {
        self.calls.push(Call::Sustain {
            part: part.part,
            on: part.sustain,
        });
    }

    fn set_reverb(&mut self, part: &PartState) {
        self.calls.push(Call::Reverb {
            part: part.part,
            value: part.reverb,
        });
    }

    fn set_chorus(&mut self, part: &PartState) {
        self.calls.push(Call::Chorus {
            part: part.part,
            value: part.chorus,
        });
    }

    fn do_program_change(&mut self, part: &PartState) {
        self.calls.push(Call::ProgramChange {
            part: part.part,
            program: part.program,
        });
    }

    fn load_part(&mut self, part: &PartState) {
        self.calls.push(Call::LoadPart {
            part: part.part,
            slot: part.slot,
        });
    }

    fn active_setup(&mut self, part: &PartState, data: &[u8]) -> bool {
        self.calls.push(Call::ActiveSetup {
            part: part.part,
            data: data.to_vec(),
        });
        self.accepts_setups
    }

    fn stored_setup(&mut self, part: &PartState, number: u8, _data: &[u8]) -> bool {
        self.calls.push(Call::StoredSetup {
            part: part.part,
            number,
        });
        self.accepts_setups
    }

    fn load_setup(&mut self, part: &PartState, number: u8) -> bool {
        self.calls.push(Call::LoadSetup {
            part: part.part,
            number,
        });
        self.accepts_setups
    }

    fn setup_param(&mut self, part: &PartState, param: u8, value: u8) -> bool {
        self.calls.push(Call::SetupParam {
            part: part.part,
            param,
            value,
        });
        self.accepts_setups
    }

    fn stop_all_notes(&mut self, slot: &Slot) {
        self.calls.push(Call::StopAllNotes { slot: slot.id() });
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock, {} slots)", self.name, self.slot_count)
    }
}
