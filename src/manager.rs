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
use std::collections::BTreeSet;

use midly::num::u4;
use tracing::{debug, info, warn};

use crate::{
    driver::{Driver, PartState},
    part::{Part, PartHandle, PartId},
    player::{PlayerId, PlayerMix},
    slot::{Slot, SlotId},
    sound::AllocSpec,
    strategy::{SlotPolicy, SlotStrategy},
};

/// The default number of parts in the pool.
pub const DEFAULT_PART_COUNT: usize = 32;

/// The part and slot arenas, plus the mix of every player slot. Parts and
/// slots refer to each other by index.
#[derive(Clone, Debug)]
pub struct Pool {
    pub(crate) parts: Vec<Part>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) mixes: Vec<PlayerMix>,
}

impl Pool {
    /// Creates a pool with one slot per given output channel.
    pub fn new(part_count: usize, channels: impl Iterator<Item = u4>, player_count: usize) -> Pool {
        Pool {
            parts: (0..part_count).map(|i| Part::new(PartId(i))).collect(),
            slots: channels
                .enumerate()
                .map(|(i, channel)| Slot::new(SlotId(i), channel))
                .collect(),
            mixes: vec![PlayerMix::default(); player_count],
        }
    }

    pub fn part(&self, id: PartId) -> &Part {
        &self.parts[id.0]
    }

    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.0]
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn mix(&self, player: PlayerId) -> &PlayerMix {
        &self.mixes[player.0]
    }

    /// The mix of the player owning the part. Free parts get the neutral mix.
    pub fn mix_of(&self, part: PartId) -> PlayerMix {
        self.parts[part.0]
            .player
            .map(|player| self.mixes[player.0])
            .unwrap_or_default()
    }

    /// The effective priority of a part.
    pub fn priority_of(&self, part: PartId) -> u8 {
        self.parts[part.0].priority_effective(&self.mix_of(part))
    }

    /// Resolves a part into the state handed to the driver.
    pub fn state(&self, id: PartId, driver: &dyn Driver) -> PartState {
        let part = &self.parts[id.0];
        let mix = self.mix_of(id);
        let channel = match part.slot() {
            Some(slot) => Some(self.slots[slot.0].channel()),
            None if part.is_percussion() && part.is_used() => driver.percussion_channel(),
            None => None,
        };
        PartState {
            part: id,
            slot: part.slot(),
            channel,
            input_channel: part.input_channel(),
            percussion: part.is_percussion(),
            priority: part.priority_effective(&mix),
            volume: part.volume_effective(&mix),
            pan: part.pan_effective(&mix),
            pitch_offset: part.pitch_offset_effective(&mix),
            pitch_bend_range: part.pitch_bend_range(),
            mod_wheel: part.mod_wheel(),
            sustain: part.sustain(),
            reverb: part.reverb(),
            chorus: part.chorus(),
            program: part.program(),
        }
    }

    /// Finds the part a player has allocated for an input channel.
    pub fn part_for_channel(&self, player: PlayerId, channel: u4) -> Option<PartId> {
        self.parts
            .iter()
            .find(|part| part.player() == Some(player) && part.input_channel() == channel)
            .map(Part::id)
    }

    /// The parts linked to a player.
    pub fn player_parts(&self, player: PlayerId) -> Vec<PartId> {
        self.parts
            .iter()
            .filter(|part| part.player() == Some(player))
            .map(Part::id)
            .collect()
    }

    /// The first unbound slot.
    pub fn free_slot(&self) -> Option<SlotId> {
        self.slots.iter().find(|slot| slot.is_free()).map(Slot::id)
    }

    /// The bound slot with the lowest effective priority. Of equals, the last wins.
    pub fn lowest_slot(&self) -> Option<(SlotId, u8)> {
        let mut lowest: Option<(SlotId, u8)> = None;
        for slot in &self.slots {
            let Some(priority) = slot.priority_effective(self) else {
                continue;
            };
            if lowest.map_or(true, |(_, lowest)| priority <= lowest) {
                lowest = Some((slot.id(), priority));
            }
        }
        lowest
    }

    /// The part needing a slot with the highest effective priority. Of equals,
    /// the last wins.
    pub fn highest_needing_part(&self) -> Option<(PartId, u8)> {
        let mut highest: Option<(PartId, u8)> = None;
        for part in self.parts.iter().filter(|part| part.needs_slot()) {
            let priority = self.priority_of(part.id());
            if highest.map_or(true, |(_, highest)| priority >= highest) {
                highest = Some((part.id(), priority));
            }
        }
        highest
    }

    /// Returns true if every part/slot binding is mirrored on both sides and
    /// only linked parts hold slots.
    pub fn is_consistent(&self) -> bool {
        let slots_ok = self.slots.iter().all(|slot| match slot.part() {
            Some(part) => {
                let part = &self.parts[part.0];
                part.slot() == Some(slot.id()) && part.is_used()
            }
            None => true,
        });
        let parts_ok = self.parts.iter().all(|part| match part.slot() {
            Some(slot) => self.slots[slot.0].part() == Some(part.id()),
            None => true,
        });
        slots_ok && parts_ok
    }

    /// Binds a part to a free slot and pushes its full state.
    pub(crate) fn bind(&mut self, driver: &mut dyn Driver, slot: SlotId, part: PartId) {
        self.assign_part(slot, part);
        debug!(
            part = part.0,
            slot = slot.0,
            priority = self.priority_of(part),
            "Bound part to slot."
        );
        self.send_all(driver, part);
    }

    /// Silences a slot and unbinds its part.
    pub(crate) fn evict(&mut self, driver: &mut dyn Driver, slot: SlotId) -> Option<PartId> {
        self.slots[slot.0].part()?;
        driver.stop_all_notes(&self.slots[slot.0]);
        self.slots[slot.0].clear_notes();
        let part = self.abandon_part(slot);
        if let Some(part) = part {
            debug!(part = part.0, slot = slot.0, "Evicted part from slot.");
        }
        part
    }

    /// Pushes every parameter of a part to the driver.
    pub(crate) fn send_all(&self, driver: &mut dyn Driver, part: PartId) {
        let state = self.state(part, &*driver);
        driver.set_volume(&state);
        driver.set_pan(&state);
        driver.set_pitch_offset(&state);
        driver.set_mod_wheel(&state);
        driver.set_sustain(&state);
        driver.set_reverb(&state);
        driver.set_chorus(&state);
        driver.do_program_change(&state);
    }
}

/// Owns the part and slot pools and the policy that assigns slots to parts.
pub struct PartManager {
    pub(crate) pool: Pool,
    strategy: Box<dyn SlotStrategy>,
}

impl PartManager {
    /// Creates a part manager with slots on the driver's channels.
    pub fn new(
        part_count: usize,
        driver: &dyn Driver,
        slot_count: usize,
        player_count: usize,
        policy: SlotPolicy,
    ) -> PartManager {
        let strategy = policy.strategy();
        info!(
            parts = part_count,
            slots = slot_count,
            players = player_count,
            policy = strategy.name(),
            driver = driver.name(),
            "Creating part manager."
        );
        PartManager {
            pool: Pool::new(
                part_count,
                (0..slot_count).map(|i| driver.channel_for_slot(i)),
                player_count,
            ),
            strategy,
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// The name of the slot assignment policy.
    pub fn policy(&self) -> &'static str {
        self.strategy.name()
    }

    /// Gets a handle for mutating a part.
    pub fn part_mut<'a>(&'a mut self, driver: &'a mut dyn Driver, part: PartId) -> PartHandle<'a> {
        PartHandle::new(self, driver, part)
    }

    /// Picks the part to use for a new allocation: the first free part, or
    /// else the lowest-priority part not above the request. Of equals, the
    /// last wins.
    pub fn select_part(&self, priority: u8) -> Option<PartId> {
        let mut best = None;
        let mut lowest = priority;
        for part in &self.pool.parts {
            if !part.is_used() {
                return Some(part.id());
            }
            let part_priority = self.pool.priority_of(part.id());
            if lowest >= part_priority {
                lowest = part_priority;
                best = Some(part.id());
            }
        }
        best
    }

    /// Allocates a part for a player's input channel. A part the player
    /// already has on that channel is reinitialized in place.
    pub fn alloc_part(
        &mut self,
        driver: &mut dyn Driver,
        player: PlayerId,
        spec: &AllocSpec,
    ) -> Option<PartId> {
        let priority = (i16::from(self.pool.mixes[player.0].priority)
            + i16::from(spec.priority_offset))
        .clamp(0, 255) as u8;

        let existing = self.pool.part_for_channel(player, spec.channel);
        let Some(part) = existing.or_else(|| self.select_part(priority)) else {
            warn!(
                player = player.0,
                channel = spec.channel.as_int(),
                priority,
                "No part available."
            );
            return None;
        };

        if existing.is_none() {
            if let Some(owner) = self.pool.parts[part.0].player() {
                info!(
                    part = part.0,
                    from = owner.0,
                    to = player.0,
                    "Stealing part."
                );
                self.release_part(driver, part);
            }
        }

        let entry = &mut self.pool.parts[part.0];
        entry.alloc(spec);
        entry.player = Some(player);
        debug!(
            part = part.0,
            player = player.0,
            channel = spec.channel.as_int(),
            "Allocated part."
        );

        let entry = &self.pool.parts[part.0];
        if entry.slot().is_some() && (!entry.is_enabled() || entry.is_percussion()) {
            self.release_slot(driver, part);
        } else {
            self.part_changed(driver, part);
        }

        let state = self.pool.state(part, &*driver);
        driver.load_part(&state);
        Some(part)
    }

    /// Allocates a part with defaults for a channel that received a message
    /// before being explicitly allocated.
    pub fn auto_alloc_part(
        &mut self,
        driver: &mut dyn Driver,
        player: PlayerId,
        channel: u4,
    ) -> Option<PartId> {
        debug!(player = player.0, channel = channel.as_int(), "Auto allocating part.");
        self.alloc_part(driver, player, &AllocSpec::new(channel))
    }

    /// Releases the part a player holds on an input channel.
    pub fn dealloc_part(&mut self, driver: &mut dyn Driver, player: PlayerId, channel: u4) -> bool {
        match self.pool.part_for_channel(player, channel) {
            Some(part) => {
                self.release_part(driver, part);
                true
            }
            None => false,
        }
    }

    /// Releases every part a player holds.
    pub fn dealloc_all_parts(&mut self, driver: &mut dyn Driver, player: PlayerId) {
        for part in self.pool.player_parts(player) {
            self.release_part(driver, part);
        }
    }

    /// The (input channel, note) pairs still sounding on a player's slots.
    pub fn sustain_notes(&self, driver: &dyn Driver, player: PlayerId) -> BTreeSet<(u8, u8)> {
        let mut sounding = BTreeSet::new();
        for slot in &self.pool.slots {
            let Some(part) = slot.part() else {
                continue;
            };
            let part = &self.pool.parts[part.0];
            if part.player() != Some(player) {
                continue;
            }
            let mut notes = BTreeSet::new();
            driver.sustain_notes(slot, &mut notes);
            let channel = part.input_channel().as_int();
            sounding.extend(notes.into_iter().map(|note| (channel, note)));
        }
        sounding
    }

    /// Stops a note on the part a player holds for an input channel.
    pub fn stop_note(&mut self, driver: &mut dyn Driver, player: PlayerId, channel: u4, key: u8) {
        if let Some(part) = self.pool.part_for_channel(player, channel) {
            self.part_mut(driver, part).note_off(key, 0);
        }
    }

    pub fn set_player_priority(&mut self, driver: &mut dyn Driver, player: PlayerId, priority: u8) {
        self.pool.mixes[player.0].priority = priority;
        for part in self.pool.player_parts(player) {
            self.part_changed(driver, part);
        }
    }

    pub fn set_player_volume(&mut self, driver: &mut dyn Driver, player: PlayerId, volume: u8) {
        self.pool.mixes[player.0].volume = volume.min(127);
        self.refresh(driver, player, |driver, state| driver.set_volume(state));
    }

    pub fn set_player_pan(&mut self, driver: &mut dyn Driver, player: PlayerId, pan: i8) {
        self.pool.mixes[player.0].pan = pan.clamp(-64, 63);
        self.refresh(driver, player, |driver, state| driver.set_pan(state));
    }

    /// Sets the player transpose, either absolutely or relative to the current value.
    pub fn set_player_transpose(
        &mut self,
        driver: &mut dyn Driver,
        player: PlayerId,
        relative: bool,
        transpose: i8,
    ) {
        let mix = &mut self.pool.mixes[player.0];
        let base = if relative { i16::from(mix.transpose) } else { 0 };
        mix.transpose = (base + i16::from(transpose)).clamp(-24, 24) as i8;
        self.refresh(driver, player, |driver, state| driver.set_pitch_offset(state));
    }

    pub fn set_player_detune(&mut self, driver: &mut dyn Driver, player: PlayerId, detune: i8) {
        self.pool.mixes[player.0].detune = detune;
        self.refresh(driver, player, |driver, state| driver.set_pitch_offset(state));
    }

    /// Resets a player's mix to neutral at the given priority.
    pub(crate) fn reset_player_mix(&mut self, player: PlayerId, priority: u8) {
        self.pool.mixes[player.0] = PlayerMix {
            priority,
            ..PlayerMix::default()
        };
    }

    /// Re-runs slot assignment after a part's eligibility or priority changed.
    pub(crate) fn part_changed(&mut self, driver: &mut dyn Driver, part: PartId) {
        self.strategy.part_changed(&mut self.pool, driver, part);
    }

    /// Takes a part off its slot and offers the slot to other parts.
    pub(crate) fn release_slot(&mut self, driver: &mut dyn Driver, part: PartId) {
        let Some(slot) = self.pool.parts[part.0].slot() else {
            self.part_changed(driver, part);
            return;
        };
        self.pool.evict(driver, slot);
        self.strategy.part_changed(&mut self.pool, driver, part);
        self.strategy.slot_released(&mut self.pool, driver, slot);
    }

    /// Returns a part to the free pool, giving up its slot.
    fn release_part(&mut self, driver: &mut dyn Driver, part: PartId) {
        let slot = self.pool.parts[part.0].slot();
        if let Some(slot) = slot {
            self.pool.evict(driver, slot);
        }
        self.strategy.part_released(&mut self.pool, part);
        self.pool.parts[part.0].unlink();
        debug!(part = part.0, "Released part.");
        if let Some(slot) = slot {
            self.strategy.slot_released(&mut self.pool, driver, slot);
        }
    }

    fn refresh(
        &mut self,
        driver: &mut dyn Driver,
        player: PlayerId,
        apply: fn(&mut dyn Driver, &PartState),
    ) {
        for part in self.pool.player_parts(player) {
            let state = self.pool.state(part, &*driver);
            apply(driver, &state);
        }
    }
}

#[cfg(test)]
mod test {
    use midly::num::u4;

    use super::PartManager;
    use crate::{
        driver::mock::{self, Call},
        part::PartId,
        player::PlayerId,
        slot::SlotId,
        sound::AllocSpec,
        strategy::SlotPolicy,
    };

    fn manager(parts: usize, slots: usize, policy: SlotPolicy) -> (PartManager, mock::Driver) {
        let driver = mock::Driver::new(slots);
        (PartManager::new(parts, &driver, slots, 4, policy), driver)
    }

    fn alloc(
        manager: &mut PartManager,
        driver: &mut mock::Driver,
        player: usize,
        channel: u8,
    ) -> PartId {
        manager
            .alloc_part(driver, PlayerId(player), &AllocSpec::new(u4::from(channel)))
            .expect("part should be allocated")
    }

    #[test]
    fn select_part_prefers_free_parts() {
        let (mut manager, mut driver) = manager(3, 3, SlotPolicy::GreedySweep);
        manager.set_player_priority(&mut driver, PlayerId(0), 50);
        alloc(&mut manager, &mut driver, 0, 0);
        assert_eq!(Some(PartId(1)), manager.select_part(0));
    }

    #[test]
    fn select_part_takes_last_equal_lowest() {
        let (mut manager, mut driver) = manager(3, 3, SlotPolicy::GreedySweep);
        manager.set_player_priority(&mut driver, PlayerId(0), 30);
        manager.set_player_priority(&mut driver, PlayerId(1), 10);
        alloc(&mut manager, &mut driver, 1, 0);
        alloc(&mut manager, &mut driver, 0, 0);
        alloc(&mut manager, &mut driver, 1, 1);

        // Parts 0 and 2 both sit at priority 10; the later one wins.
        assert_eq!(Some(PartId(2)), manager.select_part(40));
        assert_eq!(Some(PartId(2)), manager.select_part(10));
        // Nothing is at or below priority 5.
        assert_eq!(None, manager.select_part(5));
    }

    #[test]
    fn alloc_steals_the_lowest_part() {
        let (mut manager, mut driver) = manager(2, 2, SlotPolicy::GreedySweep);
        manager.set_player_priority(&mut driver, PlayerId(0), 10);
        manager.set_player_priority(&mut driver, PlayerId(1), 90);
        let first = alloc(&mut manager, &mut driver, 0, 0);
        alloc(&mut manager, &mut driver, 0, 1);
        driver.clear();

        let stolen = alloc(&mut manager, &mut driver, 1, 4);
        assert_eq!(PartId(1), stolen);
        assert_eq!(Some(PlayerId(1)), manager.pool().part(stolen).player());
        assert_eq!(Some(PlayerId(0)), manager.pool().part(first).player());
        assert!(driver
            .calls()
            .iter()
            .any(|call| matches!(call, Call::StopAllNotes { .. })));
        assert!(manager.pool().is_consistent());

        // A low priority request can't steal anything.
        manager.set_player_priority(&mut driver, PlayerId(2), 1);
        assert_eq!(
            None,
            manager.alloc_part(&mut driver, PlayerId(2), &AllocSpec::new(u4::from(0)))
        );
    }

    #[test]
    fn realloc_on_same_channel_is_in_place() {
        let (mut manager, mut driver) = manager(4, 4, SlotPolicy::GreedySweep);
        let first = alloc(&mut manager, &mut driver, 0, 3);
        let slot = manager.pool().part(first).slot();
        assert!(slot.is_some());

        let mut spec = AllocSpec::new(u4::from(3));
        spec.volume = 20;
        let second = manager
            .alloc_part(&mut driver, PlayerId(0), &spec)
            .expect("part should be reallocated");
        assert_eq!(first, second);
        assert_eq!(slot, manager.pool().part(second).slot());
        assert_eq!(20, manager.pool().part(second).volume());
        assert_eq!(1, manager.pool().player_parts(PlayerId(0)).len());
    }

    #[test]
    fn dealloc_releases_slot_to_waiting_part() {
        for policy in [SlotPolicy::GreedySweep, SlotPolicy::WaitingList] {
            let (mut manager, mut driver) = manager(4, 1, policy);
            let first = alloc(&mut manager, &mut driver, 0, 0);
            let second = alloc(&mut manager, &mut driver, 1, 0);
            assert_eq!(Some(SlotId(0)), manager.pool().part(first).slot());
            assert_eq!(None, manager.pool().part(second).slot());

            assert!(manager.dealloc_part(&mut driver, PlayerId(0), u4::from(0)));
            assert!(!manager.pool().part(first).is_used());
            assert_eq!(Some(SlotId(0)), manager.pool().part(second).slot());
            assert!(manager.pool().is_consistent());

            assert!(!manager.dealloc_part(&mut driver, PlayerId(0), u4::from(0)));
        }
    }

    #[test]
    fn dealloc_all_parts_frees_everything() {
        let (mut manager, mut driver) = manager(4, 4, SlotPolicy::WaitingList);
        alloc(&mut manager, &mut driver, 2, 0);
        alloc(&mut manager, &mut driver, 2, 1);
        alloc(&mut manager, &mut driver, 2, 9);
        manager.dealloc_all_parts(&mut driver, PlayerId(2));

        assert!(manager.pool().player_parts(PlayerId(2)).is_empty());
        assert!(manager.pool().slots().iter().all(|slot| slot.is_free()));
        assert!(manager.pool().is_consistent());
    }

    #[test]
    fn percussion_sounds_without_a_slot() {
        let (mut manager, mut driver) = manager(4, 2, SlotPolicy::GreedySweep);
        let drums = alloc(&mut manager, &mut driver, 0, 9);
        assert_eq!(None, manager.pool().part(drums).slot());
        assert_eq!(
            Some(u4::from(9)),
            manager.pool().state(drums, &driver).channel
        );
        assert!(manager.pool().slots().iter().all(|slot| slot.is_free()));
    }

    #[test]
    fn sustain_notes_reports_input_channels() {
        let (mut manager, mut driver) = manager(4, 4, SlotPolicy::GreedySweep);
        let part = alloc(&mut manager, &mut driver, 0, 5);
        let other = alloc(&mut manager, &mut driver, 1, 5);
        manager.part_mut(&mut driver, part).note_on(60, 100);
        manager.part_mut(&mut driver, part).note_on(67, 100);
        manager.part_mut(&mut driver, other).note_on(40, 100);

        let notes: Vec<(u8, u8)> = manager
            .sustain_notes(&driver, PlayerId(0))
            .into_iter()
            .collect();
        assert_eq!(vec![(5, 60), (5, 67)], notes);

        manager.stop_note(&mut driver, PlayerId(0), u4::from(5), 60);
        let notes: Vec<(u8, u8)> = manager
            .sustain_notes(&driver, PlayerId(0))
            .into_iter()
            .collect();
        assert_eq!(vec![(5, 67)], notes);
    }

    #[test]
    fn player_mix_changes_reach_the_driver() {
        let (mut manager, mut driver) = manager(4, 4, SlotPolicy::GreedySweep);
        let part = alloc(&mut manager, &mut driver, 0, 0);
        driver.clear();

        manager.set_player_volume(&mut driver, PlayerId(0), 200);
        manager.set_player_pan(&mut driver, PlayerId(0), -100);
        manager.set_player_transpose(&mut driver, PlayerId(0), false, 12);
        manager.set_player_transpose(&mut driver, PlayerId(0), true, 30);

        assert_eq!(127, manager.pool().mix(PlayerId(0)).volume);
        assert_eq!(-64, manager.pool().mix(PlayerId(0)).pan);
        assert_eq!(24, manager.pool().mix(PlayerId(0)).transpose);
        assert_eq!(
            vec![
                Call::Volume { part, volume: 127 },
                Call::Pan { part, pan: -64 },
                Call::PitchOffset { part, offset: 8191 },
                Call::PitchOffset { part, offset: 8191 },
            ],
            driver.take_calls()
        );
    }
}
