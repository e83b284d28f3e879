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
use serde::Deserialize;

use crate::{manager::DEFAULT_PART_COUNT, strategy::SlotPolicy};

use super::error::ConfigError;

/// The default number of simultaneously playing sounds.
pub const DEFAULT_PLAYER_COUNT: usize = 8;

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The number of parts (virtual channels) in the pool.
    parts: Option<usize>,

    /// The number of slots (physical channels). Defaults to what the driver offers.
    slots: Option<usize>,

    /// The number of sounds that may play at once.
    players: Option<usize>,

    /// How slots are handed out to parts.
    slot_policy: Option<SlotPolicy>,
}

impl Engine {
    /// New will create a new engine configuration with defaults.
    pub fn new() -> Engine {
        Engine::default()
    }

    /// Sets the number of slots.
    pub fn with_slots(mut self, slots: usize) -> Engine {
        self.slots = Some(slots);
        self
    }

    /// Sets the number of parts.
    pub fn with_parts(mut self, parts: usize) -> Engine {
        self.parts = Some(parts);
        self
    }

    /// Sets the number of players.
    pub fn with_players(mut self, players: usize) -> Engine {
        self.players = Some(players);
        self
    }

    /// Sets the slot policy.
    pub fn with_slot_policy(mut self, policy: SlotPolicy) -> Engine {
        self.slot_policy = Some(policy);
        self
    }

    /// Returns the number of parts (default: 32).
    pub fn parts(&self) -> usize {
        self.parts.unwrap_or(DEFAULT_PART_COUNT)
    }

    /// Returns the configured number of slots, if any.
    pub fn slots(&self) -> Option<usize> {
        self.slots
    }

    /// Returns the number of players (default: 8).
    pub fn players(&self) -> usize {
        self.players.unwrap_or(DEFAULT_PLAYER_COUNT)
    }

    /// Returns the slot policy (default: greedy sweep).
    pub fn slot_policy(&self) -> SlotPolicy {
        self.slot_policy.unwrap_or_default()
    }

    /// Checks that the pools are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parts() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "parts",
                value: 0,
            });
        }
        if self.players() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "players",
                value: 0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use config::{Config, File, FileFormat};

    use super::Engine;
    use crate::strategy::SlotPolicy;

    #[test]
    fn defaults() {
        let engine = Engine::new();
        assert_eq!(32, engine.parts());
        assert_eq!(None, engine.slots());
        assert_eq!(8, engine.players());
        assert_eq!(SlotPolicy::GreedySweep, engine.slot_policy());
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn parse() -> Result<(), Box<dyn Error>> {
        let engine: Engine = Config::builder()
            .add_source(File::from_str(
                r#"
                parts: 16
                slots: 4
                players: 2
                slot_policy: waiting_list
                "#,
                FileFormat::Yaml,
            ))
            .build()?
            .try_deserialize()?;

        assert_eq!(16, engine.parts());
        assert_eq!(Some(4), engine.slots());
        assert_eq!(2, engine.players());
        assert_eq!(SlotPolicy::WaitingList, engine.slot_policy());
        Ok(())
    }

    #[test]
    fn empty_pools_are_rejected() {
        assert!(Engine::new().with_parts(0).validate().is_err());
        assert!(Engine::new().with_players(0).validate().is_err());
        assert!(Engine::new().with_slots(0).validate().is_ok());
    }
}
