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
use midly::{
    num::{u14, u4, u7},
    MidiMessage,
};
use serde::Deserialize;

use crate::{
    hooks::HookKind,
    sound::{AllocSpec, Command, Hook, LoopSpec, Message as SoundMessage},
};

use super::error::ConfigError;

/// Implementers must convert to a track message.
pub trait ToMessage {
    /// Converts the implementer to a track message.
    fn to_message(&self) -> Result<SoundMessage, ConfigError>;
}

/// Track messages that can be parsed from YAML. Channels are 1-indexed.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    NoteOff(NoteOff),
    NoteOn(NoteOn),
    Aftertouch(Aftertouch),
    ChannelAftertouch(ChannelAftertouch),
    ControlChange(ControlChange),
    ProgramChange(ProgramChange),
    PitchBend(PitchBend),
    EndOfTrack,
    AllocPart(AllocPart),
    DeallocPart(DeallocPart),
    DeallocAllParts,
    SetHook(SetHook),
    HookJump(HookJump),
    HookTranspose(HookTranspose),
    HookPartEnable(HookPartEnable),
    HookPartVolume(HookPartVolume),
    HookPartProgram(HookPartProgram),
    HookPartTranspose(HookPartTranspose),
    SetLoop(SetLoop),
    ClearLoop,
    ActiveSetup(ActiveSetup),
    StoredSetup(StoredSetup),
    LoadSetup(LoadSetup),
    SetupParam(SetupParam),
}

impl ToMessage for Message {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        match self {
            Message::NoteOff(m) => m.to_message(),
            Message::NoteOn(m) => m.to_message(),
            Message::Aftertouch(m) => m.to_message(),
            Message::ChannelAftertouch(m) => m.to_message(),
            Message::ControlChange(m) => m.to_message(),
            Message::ProgramChange(m) => m.to_message(),
            Message::PitchBend(m) => m.to_message(),
            Message::EndOfTrack => Ok(SoundMessage::EndOfTrack),
            Message::AllocPart(m) => m.to_message(),
            Message::DeallocPart(m) => m.to_message(),
            Message::DeallocAllParts => Ok(SoundMessage::Command(Command::DeallocAllParts)),
            Message::SetHook(m) => m.to_message(),
            Message::HookJump(m) => m.to_message(),
            Message::HookTranspose(m) => m.to_message(),
            Message::HookPartEnable(m) => m.to_message(),
            Message::HookPartVolume(m) => m.to_message(),
            Message::HookPartProgram(m) => m.to_message(),
            Message::HookPartTranspose(m) => m.to_message(),
            Message::SetLoop(m) => m.to_message(),
            Message::ClearLoop => Ok(SoundMessage::Command(Command::ClearLoop)),
            Message::ActiveSetup(m) => m.to_message(),
            Message::StoredSetup(m) => m.to_message(),
            Message::LoadSetup(m) => m.to_message(),
            Message::SetupParam(m) => m.to_message(),
        }
    }
}

fn midi(channel: u8, message: MidiMessage) -> Result<SoundMessage, ConfigError> {
    Ok(SoundMessage::Midi {
        channel: parse_channel(channel)?,
        message,
    })
}

/// A NoteOff event.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NoteOff {
    channel: u8,
    key: u8,
    #[serde(default)]
    velocity: u8,
}

impl ToMessage for NoteOff {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        midi(
            self.channel,
            MidiMessage::NoteOff {
                key: parse_u7("key", self.key)?,
                vel: parse_u7("velocity", self.velocity)?,
            },
        )
    }
}

/// A NoteOn event. A velocity of zero releases the note.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NoteOn {
    channel: u8,
    key: u8,
    velocity: u8,
}

impl ToMessage for NoteOn {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        midi(
            self.channel,
            MidiMessage::NoteOn {
                key: parse_u7("key", self.key)?,
                vel: parse_u7("velocity", self.velocity)?,
            },
        )
    }
}

/// A polyphonic pressure event. These are accepted but dropped at playback.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Aftertouch {
    channel: u8,
    key: u8,
    velocity: u8,
}

impl ToMessage for Aftertouch {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        midi(
            self.channel,
            MidiMessage::Aftertouch {
                key: parse_u7("key", self.key)?,
                vel: parse_u7("velocity", self.velocity)?,
            },
        )
    }
}

/// A channel pressure event. These are accepted but dropped at playback.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChannelAftertouch {
    channel: u8,
    velocity: u8,
}

impl ToMessage for ChannelAftertouch {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        midi(
            self.channel,
            MidiMessage::ChannelAftertouch {
                vel: parse_u7("velocity", self.velocity)?,
            },
        )
    }
}

/// A ControlChange event.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ControlChange {
    channel: u8,
    controller: u8,
    value: u8,
}

impl ToMessage for ControlChange {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        midi(
            self.channel,
            MidiMessage::Controller {
                controller: parse_u7("controller", self.controller)?,
                value: parse_u7("value", self.value)?,
            },
        )
    }
}

/// A ProgramChange event.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProgramChange {
    channel: u8,
    program: u8,
}

impl ToMessage for ProgramChange {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        midi(
            self.channel,
            MidiMessage::ProgramChange {
                program: parse_u7("program", self.program)?,
            },
        )
    }
}

/// A PitchBend event. The bend is the raw 14-bit value, 8192 is centered.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PitchBend {
    channel: u8,
    bend: u16,
}

impl ToMessage for PitchBend {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        let bend = u14::try_from(self.bend).ok_or(ConfigError::InvalidValue {
            field: "bend",
            value: i64::from(self.bend),
        })?;
        midi(
            self.channel,
            MidiMessage::PitchBend {
                bend: midly::PitchBend(bend),
            },
        )
    }
}

/// Allocates a part for a channel. Anything left out takes the usual defaults.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AllocPart {
    channel: u8,
    enabled: Option<bool>,
    priority_offset: Option<i8>,
    volume: Option<u8>,
    pan: Option<i8>,
    transpose: Option<i8>,
    percussion: Option<bool>,
    detune: Option<i8>,
    pitch_bend_range: Option<u8>,
    reverb: Option<u8>,
    program: Option<u8>,
}

impl ToMessage for AllocPart {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        let mut spec = AllocSpec::new(parse_channel(self.channel)?);
        if let Some(enabled) = self.enabled {
            spec.enabled = enabled;
        }
        if let Some(priority_offset) = self.priority_offset {
            spec.priority_offset = priority_offset;
        }
        if let Some(volume) = self.volume {
            spec.volume = parse_u7("volume", volume)?.as_int();
        }
        if let Some(pan) = self.pan {
            spec.pan = pan.clamp(-64, 63);
        }
        if let Some(transpose) = self.transpose {
            spec.transpose = transpose;
        }
        if let Some(percussion) = self.percussion {
            spec.percussion = percussion;
        }
        if let Some(detune) = self.detune {
            spec.detune = detune;
        }
        if let Some(range) = self.pitch_bend_range {
            spec.pitch_bend_range = range;
        }
        if let Some(reverb) = self.reverb {
            spec.reverb = parse_u7("reverb", reverb)?.as_int();
        }
        if let Some(program) = self.program {
            spec.program = Some(parse_u7("program", program)?.as_int());
        }
        Ok(SoundMessage::Command(Command::AllocPart(spec)))
    }
}

/// Releases the part listening to a channel.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DeallocPart {
    channel: u8,
}

impl ToMessage for DeallocPart {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::DeallocPart {
            channel: parse_channel(self.channel)?,
        }))
    }
}

/// Arms a hook. Part hooks without a channel arm every channel.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SetHook {
    hook: HookKind,
    channel: Option<u8>,
    value: u8,
}

impl ToMessage for SetHook {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::SetHook {
            kind: self.hook,
            channel: self.channel.map(parse_channel).transpose()?,
            value: self.value,
        }))
    }
}

/// Jumps to a track position when the jump hook fires. Beats are 1-based.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HookJump {
    hook: u8,
    track: usize,
    beat: u32,
    #[serde(default)]
    tick: u32,
}

impl ToMessage for HookJump {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::Hook(Hook::Jump {
            hook: self.hook,
            track: self.track,
            beat: self.beat,
            tick: self.tick,
        })))
    }
}

/// Changes the player transpose when the transpose hook fires.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HookTranspose {
    hook: u8,
    #[serde(default)]
    relative: bool,
    transpose: i8,
}

impl ToMessage for HookTranspose {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::Hook(Hook::Transpose {
            hook: self.hook,
            relative: self.relative,
            transpose: self.transpose,
        })))
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HookPartEnable {
    hook: u8,
    channel: u8,
    enabled: bool,
}

impl ToMessage for HookPartEnable {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::Hook(Hook::PartEnable {
            hook: self.hook,
            channel: parse_channel(self.channel)?,
            enabled: self.enabled,
        })))
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HookPartVolume {
    hook: u8,
    channel: u8,
    volume: u8,
}

impl ToMessage for HookPartVolume {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::Hook(Hook::PartVolume {
            hook: self.hook,
            channel: parse_channel(self.channel)?,
            volume: parse_u7("volume", self.volume)?.as_int(),
        })))
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HookPartProgram {
    hook: u8,
    channel: u8,
    program: u8,
}

impl ToMessage for HookPartProgram {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::Hook(Hook::PartProgram {
            hook: self.hook,
            channel: parse_channel(self.channel)?,
            program: parse_u7("program", self.program)?.as_int(),
        })))
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HookPartTranspose {
    hook: u8,
    channel: u8,
    #[serde(default)]
    relative: bool,
    transpose: i8,
}

impl ToMessage for HookPartTranspose {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::Hook(Hook::PartTranspose {
            hook: self.hook,
            channel: parse_channel(self.channel)?,
            relative: self.relative,
            transpose: self.transpose,
        })))
    }
}

/// Requests a bounded loop between two beat positions.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SetLoop {
    count: u16,
    start_beat: u32,
    #[serde(default)]
    start_tick: u32,
    end_beat: u32,
    #[serde(default)]
    end_tick: u32,
}

impl ToMessage for SetLoop {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::SetLoop(LoopSpec {
            count: self.count,
            start_beat: self.start_beat,
            start_tick: self.start_tick,
            end_beat: self.end_beat,
            end_tick: self.end_tick,
        })))
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ActiveSetup {
    channel: u8,
    data: Vec<u8>,
}

impl ToMessage for ActiveSetup {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::ActiveSetup {
            channel: parse_channel(self.channel)?,
            data: self.data.clone(),
        }))
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredSetup {
    channel: u8,
    number: u8,
    data: Vec<u8>,
}

impl ToMessage for StoredSetup {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::StoredSetup {
            channel: parse_channel(self.channel)?,
            number: self.number,
            data: self.data.clone(),
        }))
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LoadSetup {
    channel: u8,
    number: u8,
}

impl ToMessage for LoadSetup {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::LoadSetup {
            channel: parse_channel(self.channel)?,
            number: self.number,
        }))
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SetupParam {
    channel: u8,
    param: u8,
    value: u8,
}

impl ToMessage for SetupParam {
    fn to_message(&self) -> Result<SoundMessage, ConfigError> {
        Ok(SoundMessage::Command(Command::SetupParam {
            channel: parse_channel(self.channel)?,
            param: self.param,
            value: self.value,
        }))
    }
}

/// Parses a channel from the config. Input is expected to be [1, 16].
fn parse_channel(channel: u8) -> Result<u4, ConfigError> {
    channel
        .checked_sub(1)
        .and_then(u4::try_from)
        .ok_or(ConfigError::InvalidValue {
            field: "channel",
            value: i64::from(channel),
        })
}

/// Parses a raw u7 value.
fn parse_u7(field: &'static str, raw: u8) -> Result<u7, ConfigError> {
    u7::try_from(raw).ok_or(ConfigError::InvalidValue {
        field,
        value: i64::from(raw),
    })
}
