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

//! Slot assignment policies. Both policies only ever evict a slot for a part
//! with a strictly higher effective priority.

use serde::Deserialize;
use tracing::debug;

use crate::{driver::Driver, manager::Pool, part::PartId, slot::SlotId};

/// Decides which parts get slots.
pub trait SlotStrategy {
    /// The name of the policy.
    fn name(&self) -> &'static str;

    /// Called when a part may have gained or lost eligibility for a slot, or
    /// its priority changed.
    fn part_changed(&mut self, pool: &mut Pool, driver: &mut dyn Driver, part: PartId);

    /// Called before a part is returned to the free pool.
    fn part_released(&mut self, pool: &mut Pool, part: PartId);

    /// Called after a slot became free.
    fn slot_released(&mut self, pool: &mut Pool, driver: &mut dyn Driver, slot: SlotId);
}

/// The selectable slot policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPolicy {
    /// Parts that can't get a slot queue up and are served by priority as
    /// slots free up.
    WaitingList,
    /// Every change re-sweeps all parts, binding the highest priority
    /// claimants and evicting lower ones.
    #[default]
    GreedySweep,
}

impl SlotPolicy {
    /// Creates the strategy implementing this policy.
    pub fn strategy(&self) -> Box<dyn SlotStrategy> {
        match self {
            SlotPolicy::WaitingList => Box::new(WaitingList::new()),
            SlotPolicy::GreedySweep => Box::new(GreedySweep),
        }
    }
}

/// Slot assignment by full sweep.
pub struct GreedySweep;

impl GreedySweep {
    /// Repeatedly gives the highest priority part without a slot either a free
    /// slot or the slot of the lowest priority part, if that one is strictly
    /// lower. Stops when no part needs a slot or nothing can be evicted.
    pub fn sweep(pool: &mut Pool, driver: &mut dyn Driver) {
        while let Some((part, priority)) = pool.highest_needing_part() {
            if let Some(slot) = pool.free_slot() {
                pool.bind(driver, slot, part);
                continue;
            }
            match pool.lowest_slot() {
                Some((slot, lowest)) if lowest < priority => {
                    pool.evict(driver, slot);
                    pool.bind(driver, slot, part);
                }
                _ => return,
            }
        }
    }
}

impl SlotStrategy for GreedySweep {
    fn name(&self) -> &'static str {
        "greedy_sweep"
    }

    fn part_changed(&mut self, pool: &mut Pool, driver: &mut dyn Driver, _part: PartId) {
        GreedySweep::sweep(pool, driver);
    }

    fn part_released(&mut self, _pool: &mut Pool, _part: PartId) {}

    fn slot_released(&mut self, pool: &mut Pool, driver: &mut dyn Driver, _slot: SlotId) {
        GreedySweep::sweep(pool, driver);
    }
}

/// Slot assignment through a list of parts waiting for a slot.
#[derive(Default)]
pub struct WaitingList {
    waiting: Vec<PartId>,
}

impl WaitingList {
    pub fn new() -> WaitingList {
        WaitingList::default()
    }

    /// The parts currently waiting for a slot, oldest first.
    pub fn waiting(&self) -> &[PartId] {
        &self.waiting
    }

    fn claim(&mut self, pool: &mut Pool, driver: &mut dyn Driver, part: PartId) {
        self.waiting.retain(|waiting| *waiting != part);
        if let Some(slot) = pool.free_slot() {
            pool.bind(driver, slot, part);
            return;
        }

        let priority = pool.priority_of(part);
        match pool.lowest_slot() {
            Some((slot, lowest)) if lowest < priority => {
                if let Some(evicted) = pool.evict(driver, slot) {
                    self.waiting.push(evicted);
                }
                pool.bind(driver, slot, part);
            }
            _ => {
                debug!(part = part.0, priority, "Part is waiting for a slot.");
                self.waiting.push(part);
            }
        }
    }
}

impl SlotStrategy for WaitingList {
    fn name(&self) -> &'static str {
        "waiting_list"
    }

    fn part_changed(&mut self, pool: &mut Pool, driver: &mut dyn Driver, part: PartId) {
        if pool.part(part).needs_slot() {
            self.claim(pool, driver, part);
        } else {
            self.waiting.retain(|waiting| *waiting != part);
        }
    }

    fn part_released(&mut self, _pool: &mut Pool, part: PartId) {
        self.waiting.retain(|waiting| *waiting != part);
    }

    fn slot_released(&mut self, pool: &mut Pool, driver: &mut dyn Driver, slot: SlotId) {
        self.waiting.retain(|waiting| pool.part(*waiting).needs_slot());
        if !pool.slot(slot).is_free() {
            return;
        }

        let mut best: Option<(usize, u8)> = None;
        for (index, part) in self.waiting.iter().enumerate() {
            let priority = pool.priority_of(*part);
            if best.map_or(true, |(_, best)| priority >= best) {
                best = Some((index, priority));
            }
        }
        if let Some((index, _)) = best {
            let part = self.waiting.remove(index);
            pool.bind(driver, slot, part);
        }
    }
}

#[cfg(test)]
mod test {
    use midly::num::u4;

    use super::{GreedySweep, SlotStrategy, WaitingList};
    use crate::{
        driver::mock,
        manager::Pool,
        part::PartId,
        player::PlayerId,
        slot::SlotId,
        sound::AllocSpec,
    };

    /// Builds a pool where part i is linked to player i, with the given player priorities.
    fn pool(priorities: &[u8], slots: usize) -> Pool {
        let mut pool = Pool::new(
            priorities.len(),
            (0..slots).map(|i| u4::from(i as u8)),
            priorities.len(),
        );
        for (i, priority) in priorities.iter().enumerate() {
            pool.mixes[i].priority = *priority;
            pool.parts[i].alloc(&AllocSpec::new(u4::from(0)));
            pool.parts[i].player = Some(PlayerId(i));
        }
        pool
    }

    fn holders(pool: &Pool) -> Vec<Option<PartId>> {
        pool.slots().iter().map(|slot| slot.part()).collect()
    }

    #[test]
    fn sweep_fills_free_slots_by_priority() {
        let mut driver = mock::Driver::new(2);
        let mut pool = pool(&[10, 30, 20], 2);
        GreedySweep::sweep(&mut pool, &mut driver);

        assert_eq!(vec![Some(PartId(1)), Some(PartId(2))], holders(&pool));
        assert!(pool.part(PartId(0)).needs_slot());
        assert!(pool.is_consistent());
    }

    #[test]
    fn sweep_ties_go_to_the_last_part_and_slot() {
        let mut driver = mock::Driver::new(1);
        let mut pool = pool(&[20, 20], 1);
        GreedySweep::sweep(&mut pool, &mut driver);
        assert_eq!(vec![Some(PartId(1))], holders(&pool));

        // Equal priority never evicts.
        let mut pool = pool_with_bound(&[20, 20, 20], 2);
        GreedySweep::sweep(&mut pool, &mut driver);
        assert_eq!(vec![Some(PartId(0)), Some(PartId(1))], holders(&pool));

        // Of two equally low slots, the later one is evicted.
        let mut pool = pool_with_bound(&[5, 5, 50], 2);
        GreedySweep::sweep(&mut pool, &mut driver);
        assert_eq!(vec![Some(PartId(0)), Some(PartId(2))], holders(&pool));
        assert!(pool.part(PartId(1)).needs_slot());
    }

    /// Builds a pool where the first parts already hold every slot in order.
    fn pool_with_bound(priorities: &[u8], slots: usize) -> Pool {
        let mut pool = pool(priorities, slots);
        for i in 0..slots {
            pool.assign_part(SlotId(i), PartId(i));
        }
        pool
    }

    #[test]
    fn sweep_evicts_strictly_lower_parts() {
        let mut driver = mock::Driver::new(2);
        let mut pool = pool_with_bound(&[10, 40, 30, 5], 2);
        GreedySweep::sweep(&mut pool, &mut driver);

        assert_eq!(vec![Some(PartId(2)), Some(PartId(1))], holders(&pool));
        assert!(pool.part(PartId(0)).needs_slot());
        assert!(pool.part(PartId(3)).needs_slot());
        assert!(pool.is_consistent());
    }

    #[test]
    fn waiting_list_queues_and_preempts() {
        let mut driver = mock::Driver::new(1);
        let mut pool = pool(&[10, 5, 20], 1);
        let mut strategy = WaitingList::new();

        strategy.part_changed(&mut pool, &mut driver, PartId(0));
        assert_eq!(vec![Some(PartId(0))], holders(&pool));

        strategy.part_changed(&mut pool, &mut driver, PartId(1));
        assert_eq!(vec![Some(PartId(0))], holders(&pool));
        assert_eq!(&[PartId(1)], strategy.waiting());

        strategy.part_changed(&mut pool, &mut driver, PartId(2));
        assert_eq!(vec![Some(PartId(2))], holders(&pool));
        assert_eq!(&[PartId(1), PartId(0)], strategy.waiting());
        assert!(pool.is_consistent());
    }

    #[test]
    fn waiting_list_serves_the_highest_waiting_part() {
        let mut driver = mock::Driver::new(1);
        let mut pool = pool(&[50, 10, 30, 30], 1);
        let mut strategy = WaitingList::new();
        for part in 0..4 {
            strategy.part_changed(&mut pool, &mut driver, PartId(part));
        }
        assert_eq!(&[PartId(1), PartId(2), PartId(3)], strategy.waiting());

        strategy.part_released(&mut pool, PartId(0));
        pool.evict(&mut driver, SlotId(0));
        pool.parts[0].unlink();
        strategy.slot_released(&mut pool, &mut driver, SlotId(0));

        // Parts 2 and 3 tie; the later one wins.
        assert_eq!(vec![Some(PartId(3))], holders(&pool));
        assert_eq!(&[PartId(1), PartId(2)], strategy.waiting());
    }

    #[test]
    fn waiting_list_drops_parts_that_stop_needing_a_slot() {
        let mut driver = mock::Driver::new(1);
        let mut pool = pool(&[50, 10], 1);
        let mut strategy = WaitingList::new();
        strategy.part_changed(&mut pool, &mut driver, PartId(0));
        strategy.part_changed(&mut pool, &mut driver, PartId(1));
        assert_eq!(&[PartId(1)], strategy.waiting());

        pool.parts[1].unlink();
        strategy.part_changed(&mut pool, &mut driver, PartId(1));
        assert!(strategy.waiting().is_empty());
    }
}
