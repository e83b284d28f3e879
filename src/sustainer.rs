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

//! Keeps notes that were sounding across a jump alive for as long as they
//! would have sounded had playback continued at the departure point.

use std::collections::BTreeSet;

use midly::num::u4;
use tracing::debug;

use crate::{
    driver::Driver, manager::PartManager, player::PlayerId, sound::Event, sound::Message,
};

/// A pending note-off created by a jump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SustainDefinition {
    pub player: PlayerId,
    pub channel: u8,
    pub note: u8,
    /// Ticks from the jump until the note-off is due.
    pub duration: u32,
    /// Ticks elapsed since the jump.
    pub elapsed: u32,
}

/// A read position within a track's event list.
#[derive(Clone, Copy, Debug)]
pub struct TrackPosition<'a> {
    pub events: &'a [Event],
    /// Index of the first event not yet processed.
    pub cursor: usize,
    /// The tick playback is at.
    pub tick: u32,
    /// True while the tick at `tick` is being dispatched. Otherwise that tick
    /// is still ahead, one tick later than it would be mid-dispatch.
    pub dispatching: bool,
}

/// Schedules and fires the note-offs of sustained notes.
#[derive(Debug, Default)]
pub struct Sustainer {
    pending: Vec<SustainDefinition>,
}

impl Sustainer {
    pub fn new() -> Sustainer {
        Sustainer::default()
    }

    /// All pending definitions.
    pub fn pending(&self) -> &[SustainDefinition] {
        &self.pending
    }

    /// The pending definitions of a player.
    pub fn pending_for(&self, player: PlayerId) -> impl Iterator<Item = &SustainDefinition> {
        self.pending.iter().filter(move |def| def.player == player)
    }

    /// Works out which sounding notes should be held after a jump.
    ///
    /// Each sounding note is held until its note-off in the departure track
    /// would have arrived. A note is not held if the arrival track restarts
    /// the same note first. Notes whose note-off never comes before the end
    /// of the departure track are not held.
    ///
    /// A note-off at the departure tick itself gets a duration of zero when
    /// the jump happens mid-dispatch; [Sustainer::release_due] sends it right
    /// away.
    pub fn analyze_sustain(
        &mut self,
        player: PlayerId,
        sounding: BTreeSet<(u8, u8)>,
        departure: TrackPosition<'_>,
        arrival: TrackPosition<'_>,
        ticks_until_next_event: u32,
    ) {
        if sounding.is_empty() {
            return;
        }

        let mut outstanding = sounding;
        let lead = u32::from(!departure.dispatching);
        let mut candidates: Vec<(u8, u8, u32)> = Vec::new();
        for event in departure.events.iter().skip(departure.cursor) {
            if outstanding.is_empty() {
                break;
            }
            if event.message == Message::EndOfTrack {
                debug!(
                    player = player.0,
                    abandoned = outstanding.len(),
                    "Notes have no note-off before the end of the track."
                );
                break;
            }
            if let Some(note) = event.message.released_note() {
                if outstanding.remove(&note) {
                    let ticks = event.tick.saturating_sub(departure.tick) + lead;
                    candidates.push((note.0, note.1, ticks));
                }
            }
        }

        let max_ticks = candidates.iter().map(|(_, _, ticks)| *ticks).max().unwrap_or(0);
        let first_tick = arrival
            .events
            .get(arrival.cursor)
            .map_or(arrival.tick, |event| event.tick);
        for event in arrival.events.iter().skip(arrival.cursor) {
            let offset = ticks_until_next_event + event.tick.saturating_sub(first_tick);
            if offset >= max_ticks || event.message == Message::EndOfTrack {
                break;
            }
            if let Some(note) = event.message.started_note() {
                candidates.retain(|(channel, key, ticks)| {
                    !(*channel == note.0 && *key == note.1 && offset < *ticks)
                });
            }
        }

        for (channel, note, duration) in candidates {
            debug!(player = player.0, channel, note, duration, "Sustaining note across jump.");
            self.pending.retain(|def| {
                !(def.player == player && def.channel == channel && def.note == note)
            });
            self.pending.push(SustainDefinition {
                player,
                channel,
                note,
                duration,
                elapsed: 0,
            });
        }
    }

    /// Advances a player's definitions by one tick, sending the note-offs
    /// that are due.
    pub fn tick(&mut self, player: PlayerId, parts: &mut PartManager, driver: &mut dyn Driver) {
        for def in self.pending.iter_mut().filter(|def| def.player == player) {
            def.elapsed += 1;
        }
        self.release_due(player, parts, driver);
    }

    /// Sends the note-offs of a player's definitions that are due without
    /// advancing them.
    pub fn release_due(
        &mut self,
        player: PlayerId,
        parts: &mut PartManager,
        driver: &mut dyn Driver,
    ) {
        let mut due = Vec::new();
        self.pending.retain(|def| {
            if def.player == player && def.elapsed >= def.duration {
                due.push((def.channel, def.note));
                return false;
            }
            true
        });

        for (channel, note) in due {
            debug!(player = player.0, channel, note, "Releasing sustained note.");
            parts.stop_note(driver, player, u4::from(channel), note);
        }
    }

    /// Drops every definition of a player.
    pub fn forget(&mut self, player: PlayerId) {
        self.pending.retain(|def| def.player != player);
    }
}
