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
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use config::{Config, File};
use serde::Deserialize;

use super::{engine::Engine, error::ConfigError, sound::Sound};

/// A YAML representation of a cue sheet: an engine configuration and the
/// sounds it can play.
#[derive(Deserialize, Clone, Debug)]
pub struct CueSheet {
    /// The engine configuration.
    engine: Option<Engine>,

    /// The sounds.
    sounds: Vec<Sound>,

    /// Where MIDI files are resolved from.
    #[serde(skip)]
    base_path: PathBuf,
}

impl CueSheet {
    /// Parse a cue sheet from a YAML file.
    pub fn deserialize(path: &Path) -> Result<CueSheet, ConfigError> {
        let mut cue_sheet = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<CueSheet>()?;
        cue_sheet.base_path = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(cue_sheet)
    }

    /// Returns the engine configuration.
    pub fn engine(&self) -> Engine {
        self.engine.clone().unwrap_or_default()
    }

    /// Returns the sound definitions.
    pub fn sound_definitions(&self) -> &[Sound] {
        &self.sounds
    }

    /// Loads every sound. Sound IDs must be unique.
    pub fn sounds(&self) -> Result<Vec<Arc<crate::sound::Sound>>, ConfigError> {
        let mut seen = HashSet::new();
        self.sounds
            .iter()
            .map(|sound| {
                if !seen.insert(sound.id()) {
                    return Err(ConfigError::DuplicateSound(sound.id()));
                }
                Ok(Arc::new(sound.to_sound(&self.base_path)?))
            })
            .collect()
    }

    /// Loads a single sound by ID.
    pub fn sound(&self, id: u32) -> Result<Arc<crate::sound::Sound>, ConfigError> {
        self.sounds()?
            .into_iter()
            .find(|sound| sound.id() == id)
            .ok_or(ConfigError::UnknownSound(id))
    }
}
