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

//! A General MIDI driver that renders everything it is asked to play into a
//! format 0 standard MIDI file.

use std::{fmt, io, path::Path};

use midly::{
    num::{u14, u15, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent,
    TrackEventKind,
};
use tracing::debug;

use crate::slot::Slot;

use super::PartState;

/// Slots available on a General MIDI synth: every channel except percussion.
const SLOT_COUNT: usize = 15;

/// The pitch offset spans this many semitones in each direction.
const PITCH_OFFSET_RANGE: u8 = 12;

const CONTROLLER_MOD_WHEEL: u8 = 1;
const CONTROLLER_DATA_ENTRY: u8 = 6;
const CONTROLLER_VOLUME: u8 = 7;
const CONTROLLER_PAN: u8 = 10;
const CONTROLLER_SUSTAIN: u8 = 64;
const CONTROLLER_REVERB: u8 = 91;
const CONTROLLER_CHORUS: u8 = 93;
const CONTROLLER_RPN_LSB: u8 = 100;
const CONTROLLER_RPN_MSB: u8 = 101;
const CONTROLLER_ALL_NOTES_OFF: u8 = 123;

/// An event captured by the render driver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEvent {
    pub tick: u32,
    pub channel: u4,
    pub message: MidiMessage,
}

/// Records driver output against the engine tick it happened on.
#[derive(Clone, Default)]
pub struct Driver {
    tick: u32,
    events: Vec<RenderedEvent>,
}

impl Driver {
    pub fn new() -> Driver {
        Driver::default()
    }

    /// Sets the tick stamped onto subsequent events.
    pub fn set_tick(&mut self, tick: u32) {
        self.tick = tick;
    }

    pub fn events(&self) -> &[RenderedEvent] {
        &self.events
    }

    /// Builds a single track SMF from the recorded events.
    pub fn to_smf(&self, ticks_per_quarter: u16) -> Smf<'static> {
        let mut track: Vec<TrackEvent<'static>> = Vec::with_capacity(self.events.len() + 1);
        let mut last = 0;
        for event in &self.events {
            track.push(TrackEvent {
                delta: u28::from(event.tick.saturating_sub(last)),
                kind: TrackEventKind::Midi {
                    channel: event.channel,
                    message: event.message,
                },
            });
            last = last.max(event.tick);
        }
        track.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        Smf {
            header: Header::new(
                Format::SingleTrack,
                Timing::Metrical(u15::from(ticks_per_quarter)),
            ),
            tracks: vec![track],
        }
    }

    /// Writes the recorded events to a MIDI file.
    pub fn save(&self, path: &Path, ticks_per_quarter: u16) -> Result<(), io::Error> {
        debug!(
            path = path.display().to_string(),
            events = self.events.len(),
            "Saving rendered MIDI."
        );
        self.to_smf(ticks_per_quarter).save(path)
    }

    fn push(&mut self, channel: u4, message: MidiMessage) {
        self.events.push(RenderedEvent {
            tick: self.tick,
            channel,
            message,
        });
    }

    fn controller(&mut self, part: &PartState, controller: u8, value: u8) {
        if let Some(channel) = part.channel {
            self.push(
                channel,
                MidiMessage::Controller {
                    controller: u7::from(controller),
                    value: u7::from(value.min(127)),
                },
            );
        }
    }
}

impl super::Driver for Driver {
    fn name(&self) -> String {
        "render".to_string()
    }

    fn default_slot_count(&self) -> usize {
        SLOT_COUNT
    }

    fn channel_for_slot(&self, index: usize) -> u4 {
        super::melodic_channel(index)
    }

    fn start_note(&mut self, part: &PartState, key: u8, velocity: u8) {
        if let Some(channel) = part.channel {
            self.push(
                channel,
                MidiMessage::NoteOn {
                    key: u7::from(key),
                    vel: u7::from(velocity),
                },
            );
        }
    }

    fn stop_note(&mut self, part: &PartState, key: u8, velocity: u8) {
        if let Some(channel) = part.channel {
            self.push(
                channel,
                MidiMessage::NoteOff {
                    key: u7::from(key),
                    vel: u7::from(velocity),
                },
            );
        }
    }

    fn set_volume(&mut self, part: &PartState) {
        self.controller(part, CONTROLLER_VOLUME, part.volume);
    }

    fn set_pan(&mut self, part: &PartState) {
        self.controller(part, CONTROLLER_PAN, (i16::from(part.pan) + 64) as u8);
    }

    fn set_pitch_offset(&mut self, part: &PartState) {
        if let Some(channel) = part.channel {
            let bend = (i32::from(part.pitch_offset) + 8192).clamp(0, 16383) as u16;
            self.push(
                channel,
                MidiMessage::PitchBend {
                    bend: PitchBend(u14::from(bend)),
                },
            );
        }
    }

    fn set_mod_wheel(&mut self, part: &PartState) {
        self.controller(part, CONTROLLER_MOD_WHEEL, part.mod_wheel);
    }

    fn set_sustain(&mut self, part: &PartState) {
        self.controller(part, CONTROLLER_SUSTAIN, if part.sustain { 127 } else { 0 });
    }

    fn set_reverb(&mut self, part: &PartState) {
        self.controller(part, CONTROLLER_REVERB, part.reverb);
    }

    fn set_chorus(&mut self, part: &PartState) {
        self.controller(part, CONTROLLER_CHORUS, part.chorus);
    }

    fn do_program_change(&mut self, part: &PartState) {
        if let (Some(channel), Some(program)) = (part.channel, part.program) {
            self.push(
                channel,
                MidiMessage::ProgramChange {
                    program: u7::from(program),
                },
            );
        }
    }

    fn load_part(&mut self, part: &PartState) {
        // Widen the bend range so the whole pitch offset is reachable.
        self.controller(part, CONTROLLER_RPN_MSB, 0);
        self.controller(part, CONTROLLER_RPN_LSB, 0);
        self.controller(part, CONTROLLER_DATA_ENTRY, PITCH_OFFSET_RANGE);
        self.set_volume(part);
        self.set_pan(part);
        self.set_pitch_offset(part);
        self.set_mod_wheel(part);
        self.set_sustain(part);
        self.set_reverb(part);
        self.set_chorus(part);
        self.do_program_change(part);
    }

    fn stop_all_notes(&mut self, slot: &Slot) {
        self.push(
            slot.channel(),
            MidiMessage::Controller {
                controller: u7::from(CONTROLLER_ALL_NOTES_OFF),
                value: u7::from(0),
            },
        );
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render (General MIDI, {} slots)", SLOT_COUNT)
    }
}
