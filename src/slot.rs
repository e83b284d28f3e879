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
use std::{collections::BTreeSet, fmt};

use midly::num::u4;

use crate::{manager::Pool, part::PartId};

/// Index of a slot in the slot pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(pub usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// A physical synth channel. At most one part is bound to a slot at a time.
#[derive(Clone, Debug)]
pub struct Slot {
    id: SlotId,
    channel: u4,
    pub(crate) part: Option<PartId>,
    notes: BTreeSet<u8>,
}

impl Slot {
    pub(crate) fn new(id: SlotId, channel: u4) -> Slot {
        Slot {
            id,
            channel,
            part: None,
            notes: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    /// The output channel of the slot.
    pub fn channel(&self) -> u4 {
        self.channel
    }

    /// The part bound to the slot, if any.
    pub fn part(&self) -> Option<PartId> {
        self.part
    }

    pub fn is_free(&self) -> bool {
        self.part.is_none()
    }

    /// Notes currently sounding on the slot.
    pub fn notes(&self) -> &BTreeSet<u8> {
        &self.notes
    }

    /// The effective priority of the bound part, or None if unbound.
    pub fn priority_effective(&self, pool: &Pool) -> Option<u8> {
        self.part.map(|part| pool.priority_of(part))
    }

    pub(crate) fn note_started(&mut self, key: u8) {
        self.notes.insert(key);
    }

    pub(crate) fn note_stopped(&mut self, key: u8) {
        self.notes.remove(&key);
    }

    pub(crate) fn clear_notes(&mut self) {
        self.notes.clear();
    }
}

impl Pool {
    /// Binds a part and a slot to each other. Both must be unbound.
    pub(crate) fn assign_part(&mut self, slot: SlotId, part: PartId) {
        debug_assert!(self.slots[slot.0].part.is_none());
        debug_assert!(self.parts[part.0].slot.is_none());
        self.slots[slot.0].part = Some(part);
        self.parts[part.0].slot = Some(slot);
    }

    /// Unbinds whatever part is bound to the slot, returning it.
    pub(crate) fn abandon_part(&mut self, slot: SlotId) -> Option<PartId> {
        let part = self.slots[slot.0].part.take()?;
        self.parts[part.0].slot = None;
        Some(part)
    }
}
