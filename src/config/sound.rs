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
use std::{fs, path::Path};

use serde::Deserialize;
use tracing::debug;

use crate::sound::{self, DEFAULT_SOUND_PRIORITY, DEFAULT_TICKS_PER_QUARTER};

use super::{
    error::ConfigError,
    message::{Message, ToMessage},
};

/// A YAML representation of a sound.
#[derive(Deserialize, Clone, Debug)]
pub struct Sound {
    /// The sound's identifier.
    id: u32,

    /// A display name for the sound.
    name: Option<String>,

    /// The start priority of the sound.
    priority: Option<u8>,

    /// Overrides the resolution of the MIDI file, if any.
    ticks_per_quarter: Option<u32>,

    /// A standard MIDI file, relative to the cue sheet.
    midi_file: Option<String>,

    /// Inline tracks, appended after the MIDI file's tracks.
    tracks: Option<Vec<Track>>,
}

impl Sound {
    /// The sound's identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The sound's name. Defaults to a name derived from the ID.
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("sound {}", self.id))
    }

    /// Loads the sound. MIDI files are resolved against the base path.
    pub fn to_sound(&self, base_path: &Path) -> Result<sound::Sound, ConfigError> {
        let name = self.name();
        let mut sound = match &self.midi_file {
            Some(midi_file) => {
                let path = base_path.join(midi_file);
                debug!(sound = self.id, path = ?path, "Loading MIDI file.");
                sound::Sound::from_smf(self.id, &name, &fs::read(&path)?)?
            }
            None => sound::Sound::new(self.id, &name, DEFAULT_TICKS_PER_QUARTER, Vec::new()),
        };

        let tracks = self
            .tracks
            .iter()
            .flatten()
            .map(Track::to_track)
            .collect::<Result<Vec<_>, _>>()?;
        sound.extend_tracks(tracks);

        if sound.tracks().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "tracks",
                value: 0,
            });
        }

        if let Some(ticks_per_quarter) = self.ticks_per_quarter {
            if ticks_per_quarter == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "ticks_per_quarter",
                    value: 0,
                });
            }
            sound = sound::Sound::new(
                self.id,
                &name,
                ticks_per_quarter,
                sound.tracks().to_vec(),
            );
        }

        Ok(sound.with_priority(self.priority.unwrap_or(DEFAULT_SOUND_PRIORITY)))
    }
}

/// A YAML representation of a track.
#[derive(Deserialize, Clone, Debug)]
pub struct Track {
    events: Vec<Event>,
}

impl Track {
    /// Converts the track. Events don't need to be in order.
    pub fn to_track(&self) -> Result<sound::Track, ConfigError> {
        Ok(sound::Track::new(
            self.events
                .iter()
                .map(|event| Ok(sound::Event::new(event.tick, event.message.to_message()?)))
                .collect::<Result<Vec<_>, ConfigError>>()?,
        ))
    }
}

/// A message at an absolute tick.
#[derive(Deserialize, Clone, Debug)]
pub struct Event {
    tick: u32,
    #[serde(flatten)]
    message: Message,
}

#[cfg(test)]
mod test {
    use std::{error::Error, path::Path};

    use config::{Config, File, FileFormat};
    use midly::MidiMessage;

    use super::Sound;
    use crate::{
        config::error::ConfigError,
        sound::{Command, Message},
    };

    fn parse(yaml: &str) -> Result<Sound, Box<dyn Error>> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Sound>()?)
    }

    #[test]
    fn inline_tracks() -> Result<(), Box<dyn Error>> {
        let sound = parse(
            r#"
            id: 3
            priority: 70
            ticks_per_quarter: 96
            tracks:
              - events:
                  - tick: 96
                    type: note_off
                    channel: 1
                    key: 60
                  - tick: 0
                    type: alloc_part
                    channel: 1
                  - tick: 0
                    type: note_on
                    channel: 1
                    key: 60
                    velocity: 100
              - events:
                  - tick: 0
                    type: dealloc_all_parts
            "#,
        )?
        .to_sound(Path::new(""))?;

        assert_eq!(3, sound.id());
        assert_eq!("sound 3", sound.name());
        assert_eq!(70, sound.priority());
        assert_eq!(96, sound.ticks_per_quarter());
        assert_eq!(2, sound.tracks().len());

        let events = sound.tracks()[0].events();
        assert_eq!(4, events.len());
        assert!(matches!(
            events[0].message,
            Message::Command(Command::AllocPart(_))
        ));
        assert!(matches!(
            events[1].message,
            Message::Midi {
                message: MidiMessage::NoteOn { .. },
                ..
            }
        ));
        assert_eq!(96, events[2].tick);
        assert_eq!(Message::EndOfTrack, events[3].message);
        Ok(())
    }

    #[test]
    fn defaults() -> Result<(), Box<dyn Error>> {
        let sound = parse(
            r#"
            id: 1
            name: theme
            tracks:
              - events: []
            "#,
        )?
        .to_sound(Path::new(""))?;

        assert_eq!("theme", sound.name());
        assert_eq!(60, sound.priority());
        assert_eq!(480, sound.ticks_per_quarter());
        Ok(())
    }

    #[test]
    fn sound_without_tracks_is_rejected() -> Result<(), Box<dyn Error>> {
        let result = parse("id: 1")?.to_sound(Path::new(""));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "tracks",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn missing_midi_file() -> Result<(), Box<dyn Error>> {
        let result = parse(
            r#"
            id: 1
            midi_file: does-not-exist.mid
            "#,
        )?
        .to_sound(Path::new("/nonexistent"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
        Ok(())
    }
}
