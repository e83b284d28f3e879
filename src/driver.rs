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
use std::{collections::BTreeSet, fmt};

use midly::num::u4;

use crate::{part::PartId, slot::Slot, slot::SlotId, sound::PERCUSSION_CHANNEL};

pub mod mock;
pub mod render;

/// The resolved state of a part at the moment the driver is called. Effective
/// values already have the owning player's mix applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartState {
    pub part: PartId,
    pub slot: Option<SlotId>,
    /// The output channel, if the part has somewhere to sound.
    pub channel: Option<u4>,
    pub input_channel: u4,
    pub percussion: bool,
    pub priority: u8,
    pub volume: u8,
    pub pan: i8,
    pub pitch_offset: i16,
    pub pitch_bend_range: u8,
    pub mod_wheel: u8,
    pub sustain: bool,
    pub reverb: u8,
    pub chorus: u8,
    pub program: Option<u8>,
}

/// A synthesizer backend. Slots map onto the driver's physical channels.
pub trait Driver: fmt::Display {
    /// Returns the name of the driver.
    fn name(&self) -> String;

    /// The number of slots to create when the engine config doesn't say.
    fn default_slot_count(&self) -> usize;

    /// Whether stored setups are kept by the driver.
    fn uses_stored_setup(&self) -> bool {
        false
    }

    /// The output channel for the given slot index.
    fn channel_for_slot(&self, index: usize) -> u4;

    /// The output channel percussion parts play on without a slot.
    fn percussion_channel(&self) -> Option<u4> {
        Some(u4::from(PERCUSSION_CHANNEL))
    }

    fn start_note(&mut self, part: &PartState, key: u8, velocity: u8);

    fn stop_note(&mut self, part: &PartState, key: u8, velocity: u8);

    fn set_volume(&mut self, part: &PartState);

    fn set_pan(&mut self, part: &PartState);

    fn set_pitch_offset(&mut self, part: &PartState);

    fn set_mod_wheel(&mut self, part: &PartState);

    fn set_sustain(&mut self, part: &PartState);

    fn set_reverb(&mut self, part: &PartState);

    fn set_chorus(&mut self, part: &PartState);

    fn do_program_change(&mut self, part: &PartState);

    /// Pushes every parameter of a freshly allocated part.
    fn load_part(&mut self, part: &PartState) {
        self.set_volume(part);
        self.set_pan(part);
        self.set_pitch_offset(part);
        self.set_mod_wheel(part);
        self.set_sustain(part);
        self.set_reverb(part);
        self.set_chorus(part);
        self.do_program_change(part);
    }

    /// Applies a driver-specific setup dump. Returns false if unsupported.
    fn active_setup(&mut self, _part: &PartState, _data: &[u8]) -> bool {
        false
    }

    /// Stores a setup under the given number. Returns false if unsupported.
    fn stored_setup(&mut self, _part: &PartState, _number: u8, _data: &[u8]) -> bool {
        false
    }

    /// Loads a stored setup onto a part. Returns false if unsupported.
    fn load_setup(&mut self, _part: &PartState, _number: u8) -> bool {
        false
    }

    /// Changes one setup parameter. Returns false if unsupported.
    fn setup_param(&mut self, _part: &PartState, _param: u8, _value: u8) -> bool {
        false
    }

    /// Silences everything sounding on a slot.
    fn stop_all_notes(&mut self, slot: &Slot);

    /// Adds the notes still sounding on a slot to the given set.
    fn sustain_notes(&self, slot: &Slot, notes: &mut BTreeSet<u8>) {
        notes.extend(slot.notes().iter().copied());
    }
}

/// Maps a slot index onto the General MIDI melodic channels, skipping the
/// percussion channel.
pub(crate) fn melodic_channel(index: usize) -> u4 {
    let channel = index % 15;
    if channel < PERCUSSION_CHANNEL as usize {
        u4::from(channel as u8)
    } else {
        u4::from(channel as u8 + 1)
    }
}

#[cfg(test)]
mod test {
    use super::melodic_channel;

    #[test]
    fn melodic_channels_skip_percussion() {
        let channels: Vec<u8> = (0..16).map(|i| melodic_channel(i).as_int()).collect();
        assert_eq!(
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15, 0],
            channels
        );
    }
}
