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

//! Sound data as the engine consumes it: per-track, tick-stamped events whose
//! messages have already been decoded.

use midly::{num::u4, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::hooks::HookKind;

/// The default resolution when a sound doesn't specify one.
pub const DEFAULT_TICKS_PER_QUARTER: u32 = 480;

/// The default start priority of a sound.
pub const DEFAULT_SOUND_PRIORITY: u8 = 60;

/// The General MIDI percussion channel (channel 10, zero based).
pub const PERCUSSION_CHANNEL: u8 = 9;

/// The parameters a part is initialized from when it is allocated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllocSpec {
    /// The input channel the part listens to.
    pub channel: u4,
    /// Whether the part is enabled (audible).
    pub enabled: bool,
    /// Offset added to the player's priority.
    pub priority_offset: i8,
    /// Part volume (0-127).
    pub volume: u8,
    /// Part pan (-64 to 63).
    pub pan: i8,
    /// Transpose in semitones.
    pub transpose: i8,
    /// Percussion parts have their transpose locked and never occupy a slot.
    pub percussion: bool,
    /// Fine tuning.
    pub detune: i8,
    /// Pitch bend range in semitones.
    pub pitch_bend_range: u8,
    /// Reverb send (0-127).
    pub reverb: u8,
    /// The initial program. None leaves the part in its placeholder state.
    pub program: Option<u8>,
}

impl AllocSpec {
    /// Creates an allocation spec with default settings for the given channel.
    pub fn new(channel: u4) -> AllocSpec {
        AllocSpec {
            channel,
            enabled: true,
            priority_offset: 0,
            volume: 127,
            pan: 0,
            transpose: 0,
            percussion: channel.as_int() == PERCUSSION_CHANNEL,
            detune: 0,
            pitch_bend_range: 2,
            reverb: 64,
            program: None,
        }
    }
}

/// A bounded loop request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopSpec {
    /// How many times to jump back to the start.
    pub count: u16,
    pub start_beat: u32,
    pub start_tick: u32,
    pub end_beat: u32,
    pub end_tick: u32,
}

/// A conditional action gated by a hook value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hook {
    Jump {
        hook: u8,
        track: usize,
        beat: u32,
        tick: u32,
    },
    Transpose {
        hook: u8,
        relative: bool,
        transpose: i8,
    },
    PartEnable {
        hook: u8,
        channel: u4,
        enabled: bool,
    },
    PartVolume {
        hook: u8,
        channel: u4,
        volume: u8,
    },
    PartProgram {
        hook: u8,
        channel: u4,
        program: u8,
    },
    PartTranspose {
        hook: u8,
        channel: u4,
        relative: bool,
        transpose: i8,
    },
}

impl Hook {
    /// The hook class this action belongs to.
    pub fn kind(&self) -> HookKind {
        match self {
            Hook::Jump { .. } => HookKind::Jump,
            Hook::Transpose { .. } => HookKind::Transpose,
            Hook::PartEnable { .. } => HookKind::PartEnable,
            Hook::PartVolume { .. } => HookKind::PartVolume,
            Hook::PartProgram { .. } => HookKind::PartProgram,
            Hook::PartTranspose { .. } => HookKind::PartTranspose,
        }
    }
}

/// Decoded engine control commands carried in the track data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    AllocPart(AllocSpec),
    DeallocPart {
        channel: u4,
    },
    DeallocAllParts,
    /// Arms a hook. A part hook without a channel arms every channel.
    SetHook {
        kind: HookKind,
        channel: Option<u4>,
        value: u8,
    },
    Hook(Hook),
    SetLoop(LoopSpec),
    ClearLoop,
    ActiveSetup {
        channel: u4,
        data: Vec<u8>,
    },
    StoredSetup {
        channel: u4,
        number: u8,
        data: Vec<u8>,
    },
    LoadSetup {
        channel: u4,
        number: u8,
    },
    SetupParam {
        channel: u4,
        param: u8,
        value: u8,
    },
}

/// A single message in a track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// A channel-voice message.
    Midi { channel: u4, message: MidiMessage },
    EndOfTrack,
    Command(Command),
}

impl Message {
    /// Returns the (channel, key) a note-ending message releases. Note On with
    /// a velocity of zero counts as Note Off.
    pub fn released_note(&self) -> Option<(u8, u8)> {
        match self {
            Message::Midi {
                channel,
                message: MidiMessage::NoteOff { key, .. },
            } => Some((channel.as_int(), key.as_int())),
            Message::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel },
            } if vel.as_int() == 0 => Some((channel.as_int(), key.as_int())),
            _ => None,
        }
    }

    /// Returns the (channel, key) a sounding Note On starts.
    pub fn started_note(&self) -> Option<(u8, u8)> {
        match self {
            Message::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel },
            } if vel.as_int() > 0 => Some((channel.as_int(), key.as_int())),
            _ => None,
        }
    }
}

/// A message with an absolute tick timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub tick: u32,
    pub message: Message,
}

impl Event {
    /// Creates a new event.
    pub fn new(tick: u32, message: Message) -> Event {
        Event { tick, message }
    }
}

/// An ordered, random-access list of events that always ends with End-of-Track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Track {
    events: Vec<Event>,
}

impl Track {
    /// Creates a track. Events are stably sorted by tick, anything after the first
    /// End-of-Track is dropped and an End-of-Track is appended if missing.
    pub fn new(mut events: Vec<Event>) -> Track {
        events.sort_by_key(|event| event.tick);
        if let Some(end) = events
            .iter()
            .position(|event| event.message == Message::EndOfTrack)
        {
            events.truncate(end + 1);
        } else {
            let tick = events.last().map(|event| event.tick).unwrap_or(0);
            events.push(Event::new(tick, Message::EndOfTrack));
        }
        Track { events }
    }

    /// The events of this track.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The tick of the End-of-Track event.
    pub fn length_ticks(&self) -> u32 {
        self.events.last().map(|event| event.tick).unwrap_or(0)
    }
}

/// A sound: a set of tracks the sequencer can jump between.
#[derive(Clone, Debug)]
pub struct Sound {
    id: u32,
    name: String,
    priority: u8,
    ticks_per_quarter: u32,
    tracks: Vec<Track>,
}

impl Sound {
    /// Creates a new sound.
    pub fn new(id: u32, name: &str, ticks_per_quarter: u32, tracks: Vec<Track>) -> Sound {
        Sound {
            id,
            name: name.to_string(),
            priority: DEFAULT_SOUND_PRIORITY,
            ticks_per_quarter: ticks_per_quarter.max(1),
            tracks,
        }
    }

    /// Sets the start priority of the sound.
    pub fn with_priority(mut self, priority: u8) -> Sound {
        self.priority = priority;
        self
    }

    /// Builds a sound from a standard MIDI file. Every MTrk chunk becomes one
    /// track; SysEx and meta events other than End-of-Track are skipped.
    pub fn from_smf(id: u32, name: &str, bytes: &[u8]) -> Result<Sound, midly::Error> {
        let smf = Smf::parse(bytes)?;
        let ticks_per_quarter = match smf.header.timing {
            Timing::Metrical(ticks) => u32::from(ticks.as_int()),
            Timing::Timecode(..) => DEFAULT_TICKS_PER_QUARTER,
        };

        Ok(Sound::new(
            id,
            name,
            ticks_per_quarter,
            smf.tracks.iter().map(|track| smf_track(track)).collect(),
        ))
    }

    /// Appends tracks to the sound.
    pub fn extend_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks.extend(tracks);
    }

    /// The sound's identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The sound's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The start priority.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn ticks_per_quarter(&self) -> u32 {
        self.ticks_per_quarter
    }

    /// Gets a track by index.
    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// All tracks.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

/// Converts an MTrk chunk to a track with absolute ticks.
fn smf_track(track: &[midly::TrackEvent]) -> Track {
    let mut tick: u32 = 0;
    let mut events = Vec::with_capacity(track.len());
    for event in track {
        tick = tick.saturating_add(event.delta.as_int());
        match event.kind {
            TrackEventKind::Midi { channel, message } => {
                events.push(Event::new(tick, Message::Midi { channel, message }))
            }
            TrackEventKind::Meta(MetaMessage::EndOfTrack) => {
                events.push(Event::new(tick, Message::EndOfTrack));
                break;
            }
            _ => {}
        }
    }
    Track::new(events)
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use midly::{
        num::{u15, u28, u4, u7},
        Format, Header, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    };

    use super::*;

    fn note_on(tick: u32, key: u8) -> Event {
        Event::new(
            tick,
            Message::Midi {
                channel: u4::from(0),
                message: MidiMessage::NoteOn {
                    key: u7::from(key),
                    vel: u7::from(100),
                },
            },
        )
    }

    #[test]
    fn track_sorts_and_terminates() {
        let track = Track::new(vec![note_on(20, 61), note_on(10, 60)]);

        assert_eq!(3, track.events().len());
        assert_eq!(10, track.events()[0].tick);
        assert_eq!(20, track.events()[1].tick);
        assert_eq!(Message::EndOfTrack, track.events()[2].message);
        assert_eq!(20, track.length_ticks());
    }

    #[test]
    fn track_truncates_after_end_of_track() {
        let track = Track::new(vec![
            note_on(0, 60),
            Event::new(100, Message::EndOfTrack),
            note_on(200, 62),
        ]);

        assert_eq!(2, track.events().len());
        assert_eq!(100, track.length_ticks());
    }

    #[test]
    fn empty_track_still_ends() {
        let track = Track::new(Vec::new());
        assert_eq!(vec![Event::new(0, Message::EndOfTrack)], track.events());
    }

    #[test]
    fn velocity_zero_note_on_releases() {
        let message = Message::Midi {
            channel: u4::from(3),
            message: MidiMessage::NoteOn {
                key: u7::from(64),
                vel: u7::from(0),
            },
        };
        assert_eq!(Some((3, 64)), message.released_note());
        assert_eq!(None, message.started_note());
        assert_eq!(Some((0, 60)), note_on(0, 60).message.started_note());
    }

    #[test]
    fn from_smf() -> Result<(), Box<dyn Error>> {
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::from(96))));
        smf.tracks.push(vec![
            TrackEvent {
                delta: u28::from(0),
                kind: TrackEventKind::Midi {
                    channel: u4::from(1),
                    message: MidiMessage::NoteOn {
                        key: u7::from(60),
                        vel: u7::from(90),
                    },
                },
            },
            TrackEvent {
                delta: u28::from(96),
                kind: TrackEventKind::Midi {
                    channel: u4::from(1),
                    message: MidiMessage::NoteOff {
                        key: u7::from(60),
                        vel: u7::from(0),
                    },
                },
            },
            TrackEvent {
                delta: u28::from(4),
                kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
            },
        ]);
        smf.tracks.push(vec![TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
        }]);

        let mut bytes = Vec::new();
        smf.write_std(&mut bytes)?;

        let sound = Sound::from_smf(7, "smf", &bytes)?;
        assert_eq!(7, sound.id());
        assert_eq!(96, sound.ticks_per_quarter());
        assert_eq!(2, sound.tracks().len());

        let first = sound.track(0).ok_or("missing track")?;
        assert_eq!(3, first.events().len());
        assert_eq!(96, first.events()[1].tick);
        assert_eq!(100, first.length_ticks());
        assert_eq!(Some((1, 60)), first.events()[1].message.released_note());

        Ok(())
    }
}
