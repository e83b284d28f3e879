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

//! Parts are virtual channels. A part holds the playback parameters of one input
//! channel of a player; it only sounds while it is bound to a slot (or is a
//! percussion part).

use std::fmt;

use midly::{num::u4, MidiMessage};
use tracing::{debug, warn};

use crate::{
    driver::{Driver, PartState},
    manager::PartManager,
    player::{PlayerId, PlayerMix},
    slot::SlotId,
    sound::AllocSpec,
};

const CONTROLLER_MOD_WHEEL: u8 = 1;
const CONTROLLER_VOLUME: u8 = 7;
const CONTROLLER_PAN: u8 = 10;
const CONTROLLER_SUSTAIN: u8 = 64;
const CONTROLLER_REVERB: u8 = 91;
const CONTROLLER_CHORUS: u8 = 93;

/// Semitone limit for transposition.
const TRANSPOSE_LIMIT: i16 = 24;

/// Index of a part in the part pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartId(pub usize);

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part {}", self.0)
    }
}

/// A virtual channel.
#[derive(Clone, Debug)]
pub struct Part {
    id: PartId,
    pub(crate) player: Option<PlayerId>,
    pub(crate) slot: Option<SlotId>,
    input_channel: u4,
    enabled: bool,
    priority_offset: i8,
    volume: u8,
    pan: i8,
    transpose: i8,
    detune: i8,
    percussion: bool,
    mod_wheel: u8,
    reverb: u8,
    chorus: u8,
    sustain: bool,
    pitch_bend: i16,
    pitch_bend_range: u8,
    program: Option<u8>,
}

impl Part {
    pub(crate) fn new(id: PartId) -> Part {
        Part {
            id,
            player: None,
            slot: None,
            input_channel: u4::from(0),
            enabled: false,
            priority_offset: 0,
            volume: 127,
            pan: 0,
            transpose: 0,
            detune: 0,
            percussion: false,
            mod_wheel: 0,
            reverb: 64,
            chorus: 0,
            sustain: false,
            pitch_bend: 0,
            pitch_bend_range: 2,
            program: None,
        }
    }

    /// Resets every parameter from an allocation spec.
    pub(crate) fn alloc(&mut self, spec: &AllocSpec) {
        self.input_channel = spec.channel;
        self.enabled = spec.enabled;
        self.priority_offset = spec.priority_offset;
        self.volume = spec.volume.min(127);
        self.pan = spec.pan.clamp(-64, 63);
        self.transpose = clamp_transpose(i16::from(spec.transpose));
        self.percussion = spec.percussion;
        self.detune = spec.detune;
        self.pitch_bend_range = spec.pitch_bend_range;
        self.reverb = spec.reverb.min(127);
        self.program = spec.program;
        self.mod_wheel = 0;
        self.sustain = false;
        self.pitch_bend = 0;
        self.chorus = 0;
    }

    /// Unlinks the part from its player, returning it to the free pool.
    pub(crate) fn unlink(&mut self) {
        self.player = None;
        self.enabled = false;
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn player(&self) -> Option<PlayerId> {
        self.player
    }

    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }

    pub fn input_channel(&self) -> u4 {
        self.input_channel
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn priority_offset(&self) -> i8 {
        self.priority_offset
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn pan(&self) -> i8 {
        self.pan
    }

    pub fn transpose(&self) -> i8 {
        self.transpose
    }

    pub fn detune(&self) -> i8 {
        self.detune
    }

    /// Percussion parts have their transpose locked and never get a slot.
    pub fn is_percussion(&self) -> bool {
        self.percussion
    }

    pub fn mod_wheel(&self) -> u8 {
        self.mod_wheel
    }

    pub fn reverb(&self) -> u8 {
        self.reverb
    }

    pub fn chorus(&self) -> u8 {
        self.chorus
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    pub fn pitch_bend(&self) -> i16 {
        self.pitch_bend
    }

    pub fn pitch_bend_range(&self) -> u8 {
        self.pitch_bend_range
    }

    pub fn program(&self) -> Option<u8> {
        self.program
    }

    /// Returns true if the part is linked to a player.
    pub fn is_used(&self) -> bool {
        self.player.is_some()
    }

    /// Returns true if the part is waiting for a slot to sound.
    pub fn needs_slot(&self) -> bool {
        self.slot.is_none() && self.player.is_some() && self.enabled && !self.percussion
    }

    pub fn priority_effective(&self, mix: &PlayerMix) -> u8 {
        (i16::from(mix.priority) + i16::from(self.priority_offset)).clamp(0, 255) as u8
    }

    pub fn volume_effective(&self, mix: &PlayerMix) -> u8 {
        (u16::from(mix.volume) * u16::from(self.volume) / 127) as u8
    }

    pub fn pan_effective(&self, mix: &PlayerMix) -> i8 {
        (i16::from(self.pan) + i16::from(mix.pan)).clamp(-64, 63) as i8
    }

    pub fn transpose_effective(&self, mix: &PlayerMix) -> i8 {
        if self.percussion {
            return 0;
        }
        clamp_transpose(i16::from(self.transpose) + i16::from(mix.transpose))
    }

    pub fn detune_effective(&self, mix: &PlayerMix) -> i8 {
        (i16::from(self.detune) + i16::from(mix.detune)).clamp(-128, 127) as i8
    }

    /// The combined pitch offset, where +/-8192 spans +/-12 semitones.
    pub fn pitch_offset_effective(&self, mix: &PlayerMix) -> i16 {
        let bend = i32::from(self.pitch_bend) * i32::from(self.pitch_bend_range) / 12;
        let detune = i32::from(self.detune_effective(mix)) * 64 / 12;
        let transpose = i32::from(self.transpose_effective(mix)) * 8192 / 12;
        (bend + detune + transpose).clamp(-8192, 8191) as i16
    }
}

fn clamp_transpose(transpose: i16) -> i8 {
    transpose.clamp(-TRANSPOSE_LIMIT, TRANSPOSE_LIMIT) as i8
}

/// Mutable access to a single part. Every setter updates the part and
/// synchronously notifies the driver; mutations that can change slot
/// eligibility call back into the part manager.
pub struct PartHandle<'a> {
    manager: &'a mut PartManager,
    driver: &'a mut dyn Driver,
    id: PartId,
}

impl<'a> PartHandle<'a> {
    pub(crate) fn new(
        manager: &'a mut PartManager,
        driver: &'a mut dyn Driver,
        id: PartId,
    ) -> PartHandle<'a> {
        PartHandle {
            manager,
            driver,
            id,
        }
    }

    pub fn id(&self) -> PartId {
        self.id
    }

    /// The part being edited.
    pub fn part(&self) -> &Part {
        self.manager.pool().part(self.id)
    }

    fn part_mut(&mut self) -> &mut Part {
        &mut self.manager.pool.parts[self.id.0]
    }

    fn state(&self) -> PartState {
        self.manager.pool().state(self.id, &*self.driver)
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.part_mut().volume = volume.min(127);
        let state = self.state();
        self.driver.set_volume(&state);
    }

    pub fn set_pan(&mut self, pan: i8) {
        self.part_mut().pan = pan.clamp(-64, 63);
        let state = self.state();
        self.driver.set_pan(&state);
    }

    /// Sets the transpose, either absolutely or relative to the current value.
    pub fn set_transpose(&mut self, relative: bool, transpose: i8) {
        let part = self.part_mut();
        let base = if relative { i16::from(part.transpose) } else { 0 };
        part.transpose = clamp_transpose(base + i16::from(transpose));
        let state = self.state();
        self.driver.set_pitch_offset(&state);
    }

    pub fn set_detune(&mut self, detune: i8) {
        self.part_mut().detune = detune;
        let state = self.state();
        self.driver.set_pitch_offset(&state);
    }

    pub fn set_mod_wheel(&mut self, value: u8) {
        self.part_mut().mod_wheel = value.min(127);
        let state = self.state();
        self.driver.set_mod_wheel(&state);
    }

    pub fn set_sustain(&mut self, sustain: bool) {
        self.part_mut().sustain = sustain;
        let state = self.state();
        self.driver.set_sustain(&state);
    }

    pub fn set_reverb(&mut self, value: u8) {
        self.part_mut().reverb = value.min(127);
        let state = self.state();
        self.driver.set_reverb(&state);
    }

    pub fn set_chorus(&mut self, value: u8) {
        self.part_mut().chorus = value.min(127);
        let state = self.state();
        self.driver.set_chorus(&state);
    }

    /// Sets the raw pitch bend (-8192 to 8191).
    pub fn set_pitch_bend(&mut self, bend: i16) {
        self.part_mut().pitch_bend = bend.clamp(-8192, 8191);
        let state = self.state();
        self.driver.set_pitch_offset(&state);
    }

    pub fn set_pitch_bend_range(&mut self, range: u8) {
        self.part_mut().pitch_bend_range = range;
        let state = self.state();
        self.driver.set_pitch_offset(&state);
    }

    /// Changes the program. The first program change of a part that was
    /// allocated without one makes it a full slot claimant.
    pub fn set_program(&mut self, program: u8) {
        let part = self.part_mut();
        let placeholder = part.program.is_none();
        part.program = Some(program.min(127));
        let state = self.state();
        self.driver.do_program_change(&state);
        if placeholder {
            self.manager.part_changed(&mut *self.driver, self.id);
        }
    }

    /// Enables or disables the part. A disabled part gives up its slot.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.part().enabled == enabled {
            return;
        }
        self.part_mut().enabled = enabled;
        if enabled {
            self.manager.part_changed(&mut *self.driver, self.id);
        } else {
            self.manager.release_slot(&mut *self.driver, self.id);
        }
    }

    pub fn set_priority_offset(&mut self, offset: i8) {
        self.part_mut().priority_offset = offset;
        self.manager.part_changed(&mut *self.driver, self.id);
    }

    /// Starts a note if the part is enabled and has somewhere to sound.
    pub fn note_on(&mut self, key: u8, velocity: u8) {
        if !self.part().enabled {
            return;
        }
        let state = self.state();
        if state.channel.is_none() {
            return;
        }
        if let Some(slot) = state.slot {
            self.manager.pool.slots[slot.0].note_started(key);
        }
        self.driver.start_note(&state, key, velocity);
    }

    /// Stops a note if the part is enabled and has somewhere to sound.
    pub fn note_off(&mut self, key: u8, velocity: u8) {
        if !self.part().enabled {
            return;
        }
        let state = self.state();
        if state.channel.is_none() {
            return;
        }
        if let Some(slot) = state.slot {
            self.manager.pool.slots[slot.0].note_stopped(key);
        }
        self.driver.stop_note(&state, key, velocity);
    }

    /// Applies a channel-voice message.
    ///
    /// # Panics
    ///
    /// Pressure messages must have been filtered before they reach a part.
    pub fn handle_event(&mut self, message: &MidiMessage) {
        match *message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => self.note_off(key.as_int(), 0),
            MidiMessage::NoteOn { key, vel } => self.note_on(key.as_int(), vel.as_int()),
            MidiMessage::NoteOff { key, vel } => self.note_off(key.as_int(), vel.as_int()),
            MidiMessage::Controller { controller, value } => {
                let value = value.as_int();
                match controller.as_int() {
                    CONTROLLER_MOD_WHEEL => self.set_mod_wheel(value),
                    CONTROLLER_VOLUME => self.set_volume(value),
                    CONTROLLER_PAN => self.set_pan(value as i8 - 64),
                    CONTROLLER_SUSTAIN => self.set_sustain(value >= 64),
                    CONTROLLER_REVERB => self.set_reverb(value),
                    CONTROLLER_CHORUS => self.set_chorus(value),
                    other => debug!(part = self.id.0, controller = other, "Ignoring controller."),
                }
            }
            MidiMessage::ProgramChange { program } => self.set_program(program.as_int()),
            MidiMessage::PitchBend { bend } => {
                self.set_pitch_bend(bend.0.as_int() as i16 - 8192)
            }
            MidiMessage::Aftertouch { .. } | MidiMessage::ChannelAftertouch { .. } => {
                panic!("pressure message reached {}: {:?}", self.id, message)
            }
        }
    }

    /// Sends an active setup dump to the driver.
    pub fn active_setup(&mut self, data: &[u8]) -> bool {
        let state = self.state();
        report(self.id, self.driver.active_setup(&state, data), "active setup")
    }

    /// Stores a setup in the driver. Ignored unless the driver keeps stored setups.
    pub fn stored_setup(&mut self, number: u8, data: &[u8]) -> bool {
        if !self.driver.uses_stored_setup() {
            debug!(part = self.id.0, number, "Driver doesn't keep stored setups.");
            return false;
        }
        let state = self.state();
        report(self.id, self.driver.stored_setup(&state, number, data), "stored setup")
    }

    /// Loads a previously stored setup onto the part.
    pub fn load_setup(&mut self, number: u8) -> bool {
        let state = self.state();
        report(self.id, self.driver.load_setup(&state, number), "load setup")
    }

    /// Changes a single setup parameter.
    pub fn setup_param(&mut self, param: u8, value: u8) -> bool {
        let state = self.state();
        report(self.id, self.driver.setup_param(&state, param, value), "setup param")
    }
}

fn report(part: PartId, accepted: bool, what: &str) -> bool {
    if !accepted {
        warn!(part = part.0, setup = what, "Driver rejected setup.");
    }
    accepted
}
