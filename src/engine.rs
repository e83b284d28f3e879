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

use midly::num::u4;
use tracing::{error, info, span, warn, Level};

use crate::{
    config,
    driver::Driver,
    hooks::HookKind,
    manager::PartManager,
    player::{Context, InteractivityInfo, Player, PlayerId},
    sequencer::SeekError,
    sound::{LoopSpec, Message, Sound},
    sustainer::Sustainer,
};

/// Owns the part pool, the sustainer, the driver and a fixed table of players.
/// An external scheduler drives it by calling [Engine::tick].
pub struct Engine<D: Driver> {
    parts: PartManager,
    sustainer: Sustainer,
    driver: D,
    players: Vec<Player>,
    ticks: u64,
}

impl<D: Driver> Engine<D> {
    /// Creates an engine. The slot count falls back to the driver's default.
    pub fn new(config: &config::Engine, driver: D) -> Engine<D> {
        let slots = config
            .slots()
            .unwrap_or_else(|| driver.default_slot_count());
        let parts = PartManager::new(
            config.parts(),
            &driver,
            slots,
            config.players(),
            config.slot_policy(),
        );
        Engine {
            parts,
            sustainer: Sustainer::new(),
            driver,
            players: (0..config.players()).map(|i| Player::new(PlayerId(i))).collect(),
            ticks: 0,
        }
    }

    /// Starts a sound at its own priority. A sound that is already playing is
    /// restarted on the same player. Returns None if no player is free.
    pub fn start_sound(&mut self, sound: Arc<Sound>) -> Option<PlayerId> {
        let span = span!(Level::INFO, "start sound", sound = sound.id());
        let _enter = span.enter();

        let index = match self.player_index(sound.id()) {
            Some(index) => Some(index),
            None => self.players.iter().position(|p| p.sound_id().is_none()),
        };
        let Some(index) = index else {
            warn!(sound = sound.id(), "No free player.");
            return None;
        };

        let Engine {
            parts,
            sustainer,
            driver,
            players,
            ..
        } = self;
        let mut ctx = Context {
            parts,
            sustainer,
            driver,
        };
        let player = &mut players[index];
        let priority = sound.priority();
        match player.start(&mut ctx, sound, priority) {
            Ok(()) => Some(player.id()),
            Err(e) => {
                error!(err = e.to_string(), "Unable to start sound.");
                None
            }
        }
    }

    /// Stops a sound. Returns false if it wasn't playing.
    pub fn stop_sound(&mut self, sound_id: u32) -> bool {
        self.with_player(sound_id, |player, ctx| player.stop(ctx))
            .is_some()
    }

    /// Stops every sound.
    pub fn stop_all_sounds(&mut self) {
        info!("Stopping all sounds.");
        let Engine {
            parts,
            sustainer,
            driver,
            players,
            ..
        } = self;
        let mut ctx = Context {
            parts,
            sustainer,
            driver,
        };
        for player in players.iter_mut().filter(|p| p.sound_id().is_some()) {
            player.stop(&mut ctx);
        }
    }

    /// Advances every playing sound by one tick, in player order.
    pub fn tick(&mut self) {
        let Engine {
            parts,
            sustainer,
            driver,
            players,
            ticks,
        } = self;
        let mut ctx = Context {
            parts,
            sustainer,
            driver,
        };
        for player in players.iter_mut().filter(|p| p.is_playing()) {
            player.tick(&mut ctx);
        }
        *ticks += 1;
    }

    /// The number of ticks the engine has run.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns true if any sound is playing.
    pub fn is_any_playing(&self) -> bool {
        self.players.iter().any(Player::is_playing)
    }

    /// Returns true if the sound is playing.
    pub fn is_playing(&self, sound_id: u32) -> bool {
        self.player_for_sound(sound_id)
            .is_some_and(Player::is_playing)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.0)
    }

    /// The player a sound is playing on.
    pub fn player_for_sound(&self, sound_id: u32) -> Option<&Player> {
        self.player_index(sound_id).map(|index| &self.players[index])
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn parts(&self) -> &PartManager {
        &self.parts
    }

    pub fn sustainer(&self) -> &Sustainer {
        &self.sustainer
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn set_priority(&mut self, sound_id: u32, priority: u8) -> bool {
        self.with_player(sound_id, |player, ctx| player.set_priority(ctx, priority))
            .is_some()
    }

    pub fn set_volume(&mut self, sound_id: u32, volume: u8) -> bool {
        self.with_player(sound_id, |player, ctx| player.set_volume(ctx, volume))
            .is_some()
    }

    pub fn set_pan(&mut self, sound_id: u32, pan: i8) -> bool {
        self.with_player(sound_id, |player, ctx| player.set_pan(ctx, pan))
            .is_some()
    }

    pub fn set_transpose(&mut self, sound_id: u32, relative: bool, transpose: i8) -> bool {
        self.with_player(sound_id, |player, ctx| {
            player.set_transpose(ctx, relative, transpose)
        })
        .is_some()
    }

    pub fn set_detune(&mut self, sound_id: u32, detune: i8) -> bool {
        self.with_player(sound_id, |player, ctx| player.set_detune(ctx, detune))
            .is_some()
    }

    /// Jumps a playing sound to a track position. Beats are 1-based.
    pub fn jump(
        &mut self,
        sound_id: u32,
        track: usize,
        beat: u32,
        tick: u32,
    ) -> Result<(), SeekError> {
        self.with_player(sound_id, |player, ctx| player.jump(ctx, track, beat, tick))
            .unwrap_or(Err(SeekError::NotPlaying))
    }

    pub fn set_loop(&mut self, sound_id: u32, spec: LoopSpec) -> Result<(), SeekError> {
        self.with_player(sound_id, |player, _| player.set_loop(spec))
            .unwrap_or(Err(SeekError::NotPlaying))
    }

    pub fn clear_loop(&mut self, sound_id: u32) -> bool {
        self.with_player(sound_id, |player, _| player.clear_loop())
            .is_some()
    }

    /// Arms a hook on a playing sound.
    pub fn set_hook(
        &mut self,
        sound_id: u32,
        kind: HookKind,
        channel: Option<u4>,
        value: u8,
    ) -> bool {
        self.with_player(sound_id, |player, _| player.set_hook(kind, channel, value))
            .is_some()
    }

    /// Feeds a message to a playing sound as if it came from its track.
    pub fn handle_event(&mut self, sound_id: u32, message: &Message) -> bool {
        self.with_player(sound_id, |player, ctx| player.handle_event(ctx, message))
            .is_some()
    }

    pub fn interactivity_info(&self, sound_id: u32) -> Option<InteractivityInfo> {
        self.player_for_sound(sound_id)?
            .interactivity_info(&self.parts)
    }

    fn player_index(&self, sound_id: u32) -> Option<usize> {
        self.players
            .iter()
            .position(|player| player.sound_id() == Some(sound_id))
    }

    /// Runs an operation against the player a sound is playing on.
    fn with_player<R>(
        &mut self,
        sound_id: u32,
        f: impl FnOnce(&mut Player, &mut Context<'_>) -> R,
    ) -> Option<R> {
        let index = self.player_index(sound_id)?;
        let Engine {
            parts,
            sustainer,
            driver,
            players,
            ..
        } = self;
        let mut ctx = Context {
            parts,
            sustainer,
            driver,
        };
        Some(f(&mut players[index], &mut ctx))
    }
}
