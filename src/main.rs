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
use std::error::Error;
use std::path::Path;

use clap::{crate_version, Parser, Subcommand};
use imuse_core::config::CueSheet;
use imuse_core::driver::render;
use imuse_core::engine::Engine;
use imuse_core::util::{beat_position, filename_display, format_position};
use tracing::{info, span, warn, Level};

/// Renders stop here unless told otherwise, so a looping sound still ends.
const DEFAULT_MAX_TICKS: u64 = 480 * 4 * 600;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "An interactive MIDI music engine."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists and verifies the sounds in a cue sheet.
    Inspect {
        /// The path to the cue sheet.
        path: String,
    },
    /// Plays a sound through a General MIDI channel map and saves the result.
    Render {
        /// The path to the cue sheet.
        path: String,
        /// The ID of the sound to play.
        sound_id: u32,
        /// Where to write the standard MIDI file.
        output: String,
        /// Stops rendering after this many ticks.
        #[arg[short, long]]
        max_ticks: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { path } => {
            let path = Path::new(&path);
            let cue_sheet = CueSheet::deserialize(path)?;
            let engine = cue_sheet.engine();
            engine.validate()?;

            println!(
                "{}: {} parts, {} players, {:?} slot policy",
                filename_display(path),
                engine.parts(),
                engine.players(),
                engine.slot_policy()
            );

            let sounds = cue_sheet.sounds()?;
            if sounds.is_empty() {
                println!("No sounds found.");
                return Ok(());
            }

            println!("Sounds (count: {}):", sounds.len());
            for sound in sounds.iter() {
                println!(
                    "- {} (id: {}, priority: {}, ticks per quarter: {})",
                    sound.name(),
                    sound.id(),
                    sound.priority(),
                    sound.ticks_per_quarter()
                );
                for (index, track) in sound.tracks().iter().enumerate() {
                    let (beat, tick) =
                        beat_position(track.length_ticks(), sound.ticks_per_quarter());
                    println!(
                        "  - track {}: {} events, ends at {}",
                        index,
                        track.events().len(),
                        format_position(beat, tick)
                    );
                }
            }
        }
        Commands::Render {
            path,
            sound_id,
            output,
            max_ticks,
        } => {
            let cue_sheet = CueSheet::deserialize(Path::new(&path))?;
            let config = cue_sheet.engine();
            config.validate()?;
            let sound = cue_sheet.sound(sound_id)?;
            let ticks_per_quarter = u16::try_from(sound.ticks_per_quarter())
                .map_err(|_| "ticks per quarter does not fit in a MIDI file header")?;

            let span = span!(Level::INFO, "render", sound = sound_id);
            let _enter = span.enter();

            let mut engine = Engine::new(&config, render::Driver::new());
            if engine.start_sound(sound).is_none() {
                return Err(format!("unable to start sound {}", sound_id).into());
            }

            let max_ticks = max_ticks.unwrap_or(DEFAULT_MAX_TICKS);
            while engine.is_playing(sound_id) && engine.ticks() < max_ticks {
                let tick = u32::try_from(engine.ticks()).unwrap_or(u32::MAX);
                engine.driver_mut().set_tick(tick);
                engine.tick();
            }
            if engine.is_playing(sound_id) {
                warn!(max_ticks, "Tick limit reached, stopping sound.");
                let tick = u32::try_from(engine.ticks()).unwrap_or(u32::MAX);
                engine.driver_mut().set_tick(tick);
                engine.stop_sound(sound_id);
            }

            let output = Path::new(&output);
            engine.driver().save(output, ticks_per_quarter)?;
            info!(
                ticks = engine.ticks(),
                events = engine.driver().events().len(),
                "Rendered sound."
            );
            println!(
                "Rendered {} ticks ({} events) to {}.",
                engine.ticks(),
                engine.driver().events().len(),
                filename_display(output)
            );
        }
    }

    Ok(())
}
