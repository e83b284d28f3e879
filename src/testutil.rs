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
use std::sync::Arc;

use midly::{
    num::{u4, u7},
    MidiMessage,
};

use crate::sound::{
    AllocSpec, Command, Event, Message, Sound, Track, DEFAULT_TICKS_PER_QUARTER,
};

/// Creates a Note On event. Channels are zero based.
pub fn note_on(tick: u32, channel: u8, key: u8, velocity: u8) -> Event {
    Event::new(
        tick,
        Message::Midi {
            channel: u4::from(channel),
            message: MidiMessage::NoteOn {
                key: u7::from(key),
                vel: u7::from(velocity),
            },
        },
    )
}

/// Creates a Note Off event with a release velocity of zero.
pub fn note_off(tick: u32, channel: u8, key: u8) -> Event {
    Event::new(
        tick,
        Message::Midi {
            channel: u4::from(channel),
            message: MidiMessage::NoteOff {
                key: u7::from(key),
                vel: u7::from(0),
            },
        },
    )
}

/// Creates a command event.
pub fn command(tick: u32, command: Command) -> Event {
    Event::new(tick, Message::Command(command))
}

/// Allocates a part with default settings on the channel.
pub fn alloc(tick: u32, channel: u8) -> Event {
    command(tick, Command::AllocPart(AllocSpec::new(u4::from(channel))))
}

/// Builds a sound from per-track event lists at 480 ticks per quarter.
pub fn sound(id: u32, tracks: Vec<Vec<Event>>) -> Arc<Sound> {
    Arc::new(Sound::new(
        id,
        &format!("test sound {}", id),
        DEFAULT_TICKS_PER_QUARTER,
        tracks.into_iter().map(Track::new).collect(),
    ))
}

/// Builds a sound with the given start priority.
pub fn sound_with_priority(id: u32, priority: u8, tracks: Vec<Vec<Event>>) -> Arc<Sound> {
    let sound = Arc::unwrap_or_clone(sound(id, tracks));
    Arc::new(sound.with_priority(priority))
}
