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
use std::{fmt, sync::Arc};

use midly::{num::u4, MidiMessage};
use tracing::{debug, info};

use crate::{
    driver::Driver,
    hooks::{HookBlock, HookKind},
    manager::PartManager,
    part::PartId,
    sequencer::{normalize, Directive, EventSink, LoopState, SeekError, Sequencer, Status},
    sound::{Command, Hook, LoopSpec, Message, Sound},
    sustainer::Sustainer,
};

/// Index of a player in the player table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub usize);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player {}", self.0)
    }
}

/// Player-wide settings that every part of the player inherits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerMix {
    pub priority: u8,
    pub volume: u8,
    pub pan: i8,
    pub transpose: i8,
    pub detune: i8,
}

impl Default for PlayerMix {
    fn default() -> Self {
        PlayerMix {
            priority: 0,
            volume: 127,
            pan: 0,
            transpose: 0,
            detune: 0,
        }
    }
}

/// The engine state a player works against while it runs.
pub struct Context<'a> {
    pub parts: &'a mut PartManager,
    pub sustainer: &'a mut Sustainer,
    pub driver: &'a mut dyn Driver,
}

/// A snapshot of a playing sound's position and interactive state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractivityInfo {
    pub sound_id: u32,
    pub status: Status,
    pub mix: PlayerMix,
    pub track: usize,
    pub beat: u32,
    pub tick: u32,
    pub loop_state: Option<LoopState>,
    pub hooks: HookBlock,
    pub parts: Vec<PartId>,
}

/// Plays one sound: owns its sequencer and hook block and routes the
/// sequencer's events to parts.
pub struct Player {
    id: PlayerId,
    sound: Option<Arc<Sound>>,
    status: Status,
    hooks: HookBlock,
    sequencer: Sequencer,
}

impl Player {
    pub fn new(id: PlayerId) -> Player {
        Player {
            id,
            sound: None,
            status: Status::Off,
            hooks: HookBlock::new(),
            sequencer: Sequencer::new(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// The sound being played, if any.
    pub fn sound_id(&self) -> Option<u32> {
        self.sound.as_ref().map(|sound| sound.id())
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == Status::On
    }

    pub fn hooks(&self) -> &HookBlock {
        &self.hooks
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Starts a sound from the top of its first track. Anything already
    /// playing on this player is stopped first.
    pub fn start(
        &mut self,
        ctx: &mut Context<'_>,
        sound: Arc<Sound>,
        priority: u8,
    ) -> Result<(), SeekError> {
        if self.sound.is_some() {
            self.stop(ctx);
        }
        self.sequencer.start(sound.clone(), 0)?;
        ctx.parts.reset_player_mix(self.id, priority);
        self.hooks.reset();
        info!(
            player = self.id.0,
            sound = sound.id(),
            name = sound.name(),
            priority,
            "Starting sound."
        );
        self.sound = Some(sound);
        self.status = Status::On;
        Ok(())
    }

    /// Stops playback and gives up every part and pending sustain.
    pub fn stop(&mut self, ctx: &mut Context<'_>) {
        if let Some(sound) = self.sound.take() {
            info!(player = self.id.0, sound = sound.id(), "Stopping sound.");
        }
        ctx.parts.dealloc_all_parts(&mut *ctx.driver, self.id);
        ctx.sustainer.forget(self.id);
        self.sequencer.stop();
        self.status = Status::Off;
    }

    /// Advances the player by one tick. Returns true once the player has
    /// finished, in which case it has stopped itself.
    pub fn tick(&mut self, ctx: &mut Context<'_>) -> bool {
        if !self.is_playing() {
            return true;
        }
        let mut router = Router {
            player: self.id,
            hooks: &mut self.hooks,
        };
        let finished = self.sequencer.tick(self.id, ctx, &mut router);
        if finished {
            self.stop(ctx);
        }
        finished
    }

    /// Handles a message as if the sequencer had dispatched it.
    pub fn handle_event(&mut self, ctx: &mut Context<'_>, message: &Message) {
        if !self.is_playing() {
            return;
        }
        let Some(message) = normalize(message) else {
            return;
        };
        let mut router = Router {
            player: self.id,
            hooks: &mut self.hooks,
        };
        let directive = router.handle_event(ctx, &message);
        self.sequencer.apply(self.id, ctx, directive);
    }

    pub fn set_priority(&mut self, ctx: &mut Context<'_>, priority: u8) {
        ctx.parts.set_player_priority(&mut *ctx.driver, self.id, priority);
    }

    pub fn set_volume(&mut self, ctx: &mut Context<'_>, volume: u8) {
        ctx.parts.set_player_volume(&mut *ctx.driver, self.id, volume);
    }

    pub fn set_pan(&mut self, ctx: &mut Context<'_>, pan: i8) {
        ctx.parts.set_player_pan(&mut *ctx.driver, self.id, pan);
    }

    pub fn set_transpose(&mut self, ctx: &mut Context<'_>, relative: bool, transpose: i8) {
        ctx.parts
            .set_player_transpose(&mut *ctx.driver, self.id, relative, transpose);
    }

    pub fn set_detune(&mut self, ctx: &mut Context<'_>, detune: i8) {
        ctx.parts.set_player_detune(&mut *ctx.driver, self.id, detune);
    }

    pub fn jump(
        &mut self,
        ctx: &mut Context<'_>,
        track: usize,
        beat: u32,
        tick: u32,
    ) -> Result<(), SeekError> {
        self.sequencer.jump(self.id, ctx, track, beat, tick)
    }

    pub fn set_loop(&mut self, spec: LoopSpec) -> Result<(), SeekError> {
        self.sequencer.set_loop(spec)
    }

    pub fn clear_loop(&mut self) {
        self.sequencer.clear_loop();
    }

    pub fn set_hook(&mut self, kind: HookKind, channel: Option<u4>, value: u8) {
        self.hooks.set(kind, channel, value);
    }

    /// Reports the player's position and interactive state. None if idle.
    pub fn interactivity_info(&self, parts: &PartManager) -> Option<InteractivityInfo> {
        let sound = self.sound.as_ref()?;
        Some(InteractivityInfo {
            sound_id: sound.id(),
            status: self.status,
            mix: *parts.pool().mix(self.id),
            track: self.sequencer.track(),
            beat: self.sequencer.beat(),
            tick: self.sequencer.tick_in_beat(),
            loop_state: self.sequencer.loop_state(),
            hooks: self.hooks.clone(),
            parts: parts.pool().player_parts(self.id),
        })
    }
}

/// Routes a player's events to its parts and hook block.
struct Router<'h> {
    player: PlayerId,
    hooks: &'h mut HookBlock,
}

impl EventSink for Router<'_> {
    fn handle_event(&mut self, ctx: &mut Context<'_>, message: &Message) -> Directive {
        match message {
            Message::Midi { channel, message } => {
                self.midi(ctx, *channel, message);
                Directive::Continue
            }
            Message::EndOfTrack => Directive::Continue,
            Message::Command(command) => self.command(ctx, command),
        }
    }
}

impl Router<'_> {
    fn midi(&mut self, ctx: &mut Context<'_>, channel: u4, message: &MidiMessage) {
        let part = match ctx.parts.pool().part_for_channel(self.player, channel) {
            Some(part) => part,
            // Releasing a note on a channel that was never set up needs no part.
            None if matches!(message, MidiMessage::NoteOff { .. }) => return,
            None => match ctx
                .parts
                .auto_alloc_part(&mut *ctx.driver, self.player, channel)
            {
                Some(part) => part,
                None => return,
            },
        };
        ctx.parts
            .part_mut(&mut *ctx.driver, part)
            .handle_event(message);
    }

    fn part(&self, ctx: &Context<'_>, channel: u4) -> Option<PartId> {
        let part = ctx.parts.pool().part_for_channel(self.player, channel);
        if part.is_none() {
            debug!(
                player = self.player.0,
                channel = channel.as_int(),
                "No part allocated for channel."
            );
        }
        part
    }

    fn command(&mut self, ctx: &mut Context<'_>, command: &Command) -> Directive {
        match command {
            Command::AllocPart(spec) => {
                ctx.parts.alloc_part(&mut *ctx.driver, self.player, spec);
            }
            Command::DeallocPart { channel } => {
                ctx.parts
                    .dealloc_part(&mut *ctx.driver, self.player, *channel);
            }
            Command::DeallocAllParts => ctx.parts.dealloc_all_parts(&mut *ctx.driver, self.player),
            Command::SetHook {
                kind,
                channel,
                value,
            } => self.hooks.set(*kind, *channel, *value),
            Command::Hook(hook) => return self.hook(ctx, hook),
            Command::SetLoop(spec) => return Directive::SetLoop(*spec),
            Command::ClearLoop => return Directive::ClearLoop,
            Command::ActiveSetup { channel, data } => {
                if let Some(part) = self.part(ctx, *channel) {
                    ctx.parts.part_mut(&mut *ctx.driver, part).active_setup(data);
                }
            }
            Command::StoredSetup {
                channel,
                number,
                data,
            } => {
                if let Some(part) = self.part(ctx, *channel) {
                    ctx.parts
                        .part_mut(&mut *ctx.driver, part)
                        .stored_setup(*number, data);
                }
            }
            Command::LoadSetup { channel, number } => {
                if let Some(part) = self.part(ctx, *channel) {
                    ctx.parts.part_mut(&mut *ctx.driver, part).load_setup(*number);
                }
            }
            Command::SetupParam {
                channel,
                param,
                value,
            } => {
                if let Some(part) = self.part(ctx, *channel) {
                    ctx.parts
                        .part_mut(&mut *ctx.driver, part)
                        .setup_param(*param, *value);
                }
            }
        }
        Directive::Continue
    }

    fn hook(&mut self, ctx: &mut Context<'_>, action: &Hook) -> Directive {
        match *action {
            Hook::Jump {
                hook,
                track,
                beat,
                tick,
            } => {
                if self.hooks.handle_jump(hook) {
                    return Directive::Jump { track, beat, tick };
                }
            }
            Hook::Transpose {
                hook,
                relative,
                transpose,
            } => {
                if self.hooks.handle_transpose(hook) {
                    ctx.parts
                        .set_player_transpose(&mut *ctx.driver, self.player, relative, transpose);
                }
            }
            Hook::PartEnable {
                hook,
                channel,
                enabled,
            } => {
                if self.hooks.handle_part_enable(channel, hook) {
                    if let Some(part) = self.part(ctx, channel) {
                        ctx.parts.part_mut(&mut *ctx.driver, part).set_enabled(enabled);
                    }
                }
            }
            Hook::PartVolume {
                hook,
                channel,
                volume,
            } => {
                if self.hooks.handle_part_volume(channel, hook) {
                    if let Some(part) = self.part(ctx, channel) {
                        ctx.parts.part_mut(&mut *ctx.driver, part).set_volume(volume);
                    }
                }
            }
            Hook::PartProgram {
                hook,
                channel,
                program,
            } => {
                if self.hooks.handle_part_program(channel, hook) {
                    if let Some(part) = self.part(ctx, channel) {
                        ctx.parts.part_mut(&mut *ctx.driver, part).set_program(program);
                    }
                }
            }
            Hook::PartTranspose {
                hook,
                channel,
                relative,
                transpose,
            } => {
                if self.hooks.handle_part_transpose(channel, hook) {
                    if let Some(part) = self.part(ctx, channel) {
                        ctx.parts
                            .part_mut(&mut *ctx.driver, part)
                            .set_transpose(relative, transpose);
                    }
                }
            }
        }
        Directive::Continue
    }
}
