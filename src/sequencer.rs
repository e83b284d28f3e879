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

use midly::{num::u7, MidiMessage};
use tracing::{debug, error, info, warn};

use crate::{
    player::{Context, PlayerId},
    sound::{Event, LoopSpec, Message, Sound},
    sustainer::TrackPosition,
    util::{absolute_tick, beat_position, format_position},
};

/// Whether a sequencer or player is running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Off,
    On,
}

/// An armed loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopState {
    /// Jumps left before the loop stops firing.
    pub remaining: u16,
    pub start_beat: u32,
    pub start_tick: u32,
    pub end_beat: u32,
    pub end_tick: u32,
}

/// Errors raised when moving the play position.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SeekError {
    #[error("Track {track} doesn't exist, the sound has {tracks} tracks")]
    NoSuchTrack { track: usize, tracks: usize },
    #[error("Tick {tick} is past the end of track {track}")]
    PastEndOfTrack { track: usize, tick: u32 },
    #[error("Loop from beat {start_beat} to beat {end_beat} is too short")]
    InvalidLoop { start_beat: u32, end_beat: u32 },
    #[error("Not playing")]
    NotPlaying,
}

/// What the sequencer should do after an event was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    Continue,
    Jump { track: usize, beat: u32, tick: u32 },
    SetLoop(LoopSpec),
    ClearLoop,
}

/// Receives the events the sequencer dispatches.
pub trait EventSink {
    fn handle_event(&mut self, ctx: &mut Context<'_>, message: &Message) -> Directive;
}

/// Rewrites a message the way parts expect it: Note On with zero velocity
/// becomes Note Off and pressure messages are dropped.
pub(crate) fn normalize(message: &Message) -> Option<Message> {
    match message {
        Message::Midi {
            channel,
            message: MidiMessage::NoteOn { key, vel },
        } if vel.as_int() == 0 => Some(Message::Midi {
            channel: *channel,
            message: MidiMessage::NoteOff {
                key: *key,
                vel: u7::from(0),
            },
        }),
        Message::Midi {
            channel,
            message: MidiMessage::Aftertouch { .. } | MidiMessage::ChannelAftertouch { .. },
        } => {
            warn!(channel = channel.as_int(), "Dropping pressure message.");
            None
        }
        other => Some(other.clone()),
    }
}

/// Walks the tracks of a sound one tick at a time.
#[derive(Clone, Debug, Default)]
pub struct Sequencer {
    sound: Option<Arc<Sound>>,
    status: Status,
    track: usize,
    cursor: usize,
    current_tick: u32,
    beat: u32,
    tick_in_beat: u32,
    next_event_tick: u32,
    loop_state: Option<LoopState>,
    bail: bool,
    /// Set while `tick` is dispatching the current tick.
    in_tick: bool,
}

impl Sequencer {
    pub fn new() -> Sequencer {
        Sequencer::default()
    }

    /// Starts playing a track of the sound from its beginning.
    pub fn start(&mut self, sound: Arc<Sound>, track: usize) -> Result<(), SeekError> {
        let Some(events) = sound.track(track).map(|track| track.events()) else {
            return Err(SeekError::NoSuchTrack {
                track,
                tracks: sound.tracks().len(),
            });
        };
        self.next_event_tick = events.first().map_or(0, |event| event.tick);
        self.track = track;
        self.cursor = 0;
        self.current_tick = 0;
        self.beat = 1;
        self.tick_in_beat = 0;
        self.loop_state = None;
        self.bail = false;
        self.status = Status::On;
        self.sound = Some(sound);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.status = Status::Off;
        self.loop_state = None;
        self.sound = None;
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == Status::On
    }

    pub fn track(&self) -> usize {
        self.track
    }

    /// The index of the next event to dispatch.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    /// The 1-based beat.
    pub fn beat(&self) -> u32 {
        self.beat
    }

    pub fn tick_in_beat(&self) -> u32 {
        self.tick_in_beat
    }

    pub fn next_event_tick(&self) -> u32 {
        self.next_event_tick
    }

    pub fn loop_state(&self) -> Option<LoopState> {
        self.loop_state
    }

    fn events<'s>(&self, sound: &'s Sound, track: usize) -> &'s [Event] {
        sound.track(track).map_or(&[], |track| track.events())
    }

    /// Advances playback by one tick, dispatching due events to the sink.
    /// Returns true once playback is finished.
    pub fn tick(
        &mut self,
        player: PlayerId,
        ctx: &mut Context<'_>,
        sink: &mut dyn EventSink,
    ) -> bool {
        self.in_tick = true;
        let finished = self.advance(player, ctx, sink);
        self.in_tick = false;
        finished
    }

    fn advance(
        &mut self,
        player: PlayerId,
        ctx: &mut Context<'_>,
        sink: &mut dyn EventSink,
    ) -> bool {
        let Some(sound) = self.sound.clone() else {
            self.status = Status::Off;
            return true;
        };
        if self.status == Status::Off {
            return true;
        }

        self.bail = false;
        ctx.sustainer.tick(player, &mut *ctx.parts, &mut *ctx.driver);

        let ticks_per_quarter = sound.ticks_per_quarter();
        if self.tick_in_beat >= ticks_per_quarter {
            self.tick_in_beat -= ticks_per_quarter;
            self.beat += 1;
        }

        if let Some(mut state) = self.loop_state {
            let reached = self.beat > state.end_beat
                || (self.beat == state.end_beat && self.tick_in_beat >= state.end_tick);
            if state.remaining > 0 && reached {
                state.remaining -= 1;
                self.loop_state = Some(state);
                debug!(
                    player = player.0,
                    remaining = state.remaining,
                    to = format_position(state.start_beat, state.start_tick),
                    "Looping."
                );
                if let Err(e) =
                    self.jump(player, ctx, self.track, state.start_beat, state.start_tick)
                {
                    error!(player = player.0, err = e.to_string(), "Loop jump failed.");
                }
            }
        }

        let mut finished = false;
        while !self.bail && self.current_tick >= self.next_event_tick {
            let Some(event) = self.events(&sound, self.track).get(self.cursor) else {
                finished = true;
                break;
            };
            if event.message == Message::EndOfTrack {
                finished = true;
                break;
            }
            if let Some(message) = normalize(&event.message) {
                let directive = sink.handle_event(ctx, &message);
                self.apply(player, ctx, directive);
            }
            if self.bail {
                break;
            }

            self.cursor += 1;
            self.next_event_tick = self
                .events(&sound, self.track)
                .get(self.cursor)
                .map_or(u32::MAX, |event| event.tick);
        }

        if finished {
            info!(
                player = player.0,
                sound = sound.id(),
                track = self.track,
                "Reached the end of the track."
            );
            self.stop();
            return true;
        }

        if !self.bail {
            self.current_tick += 1;
            self.tick_in_beat += 1;
        }
        false
    }

    /// Moves playback to a beat and tick of a track, holding notes that
    /// were sounding for as long as they would have sounded.
    pub fn jump(
        &mut self,
        player: PlayerId,
        ctx: &mut Context<'_>,
        track: usize,
        beat: u32,
        tick: u32,
    ) -> Result<(), SeekError> {
        let Some(sound) = self.sound.clone().filter(|_| self.is_playing()) else {
            return Err(SeekError::NotPlaying);
        };
        if sound.track(track).is_none() {
            return Err(SeekError::NoSuchTrack {
                track,
                tracks: sound.tracks().len(),
            });
        }

        let ticks_per_quarter = sound.ticks_per_quarter();
        let destination = absolute_tick(beat, tick, ticks_per_quarter);
        let start = if track == self.track && destination >= self.current_tick {
            self.cursor
        } else {
            0
        };
        let arrival = self.events(&sound, track);
        let Some(cursor) = arrival
            .iter()
            .skip(start)
            .position(|event| event.tick >= destination)
            .map(|offset| start + offset)
        else {
            return Err(SeekError::PastEndOfTrack {
                track,
                tick: destination,
            });
        };
        let next_event_tick = arrival[cursor].tick;

        let sounding = ctx.parts.sustain_notes(&*ctx.driver, player);
        ctx.sustainer.analyze_sustain(
            player,
            sounding,
            TrackPosition {
                events: self.events(&sound, self.track),
                cursor: self.cursor,
                tick: self.current_tick,
                dispatching: self.in_tick,
            },
            TrackPosition {
                events: arrival,
                cursor,
                tick: destination,
                dispatching: false,
            },
            next_event_tick - destination,
        );
        ctx.sustainer.release_due(player, &mut *ctx.parts, &mut *ctx.driver);

        if track != self.track {
            self.loop_state = None;
        }
        let (beat, tick_in_beat) = beat_position(destination, ticks_per_quarter);
        self.track = track;
        self.cursor = cursor;
        self.current_tick = destination;
        self.beat = beat;
        self.tick_in_beat = tick_in_beat;
        self.next_event_tick = next_event_tick;
        self.bail = true;
        debug!(
            player = player.0,
            track,
            position = format_position(beat, tick_in_beat),
            "Jumped."
        );
        Ok(())
    }

    /// Arms a loop. The start beat must be at least two beats before the end beat.
    pub fn set_loop(&mut self, spec: LoopSpec) -> Result<(), SeekError> {
        if spec.start_beat.saturating_add(1) >= spec.end_beat {
            return Err(SeekError::InvalidLoop {
                start_beat: spec.start_beat,
                end_beat: spec.end_beat,
            });
        }
        self.loop_state = Some(LoopState {
            remaining: spec.count,
            start_beat: spec.start_beat.max(1),
            start_tick: spec.start_tick,
            end_beat: spec.end_beat,
            end_tick: spec.end_tick,
        });
        Ok(())
    }

    pub fn clear_loop(&mut self) {
        self.loop_state = None;
    }

    pub(crate) fn apply(&mut self, player: PlayerId, ctx: &mut Context<'_>, directive: Directive) {
        match directive {
            Directive::Continue => {}
            Directive::Jump { track, beat, tick } => {
                if let Err(e) = self.jump(player, ctx, track, beat, tick) {
                    error!(player = player.0, err = e.to_string(), "Jump failed.");
                }
            }
            Directive::SetLoop(spec) => {
                if let Err(e) = self.set_loop(spec) {
                    warn!(player = player.0, err = e.to_string(), "Ignoring loop.");
                }
            }
            Directive::ClearLoop => self.clear_loop(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use midly::{num::u4, num::u7, MidiMessage};

    use super::{normalize, Directive, EventSink, SeekError, Sequencer, Status};
    use crate::{
        driver::mock,
        manager::PartManager,
        player::{Context, PlayerId},
        sound::{LoopSpec, Message, Sound, Track},
        strategy::SlotPolicy,
        sustainer::Sustainer,
        testutil::{command, note_off, note_on},
    };

    /// Records every message with the tick it arrived on and answers with
    /// scripted directives.
    #[derive(Default)]
    struct Recorder {
        tick: u32,
        seen: Vec<(u32, Message)>,
        script: Vec<(u32, Directive)>,
    }

    impl EventSink for Recorder {
        fn handle_event(&mut self, _ctx: &mut Context<'_>, message: &Message) -> Directive {
            self.seen.push((self.tick, message.clone()));
            match self.script.iter().position(|(tick, _)| *tick == self.tick) {
                Some(index) => self.script.remove(index).1,
                None => Directive::Continue,
            }
        }
    }

    struct Harness {
        parts: PartManager,
        sustainer: Sustainer,
        driver: mock::Driver,
        sequencer: Sequencer,
        sink: Recorder,
    }

    impl Harness {
        fn new(sound: Sound) -> Harness {
            let driver = mock::Driver::new(4);
            let mut sequencer = Sequencer::new();
            sequencer
                .start(Arc::new(sound), 0)
                .expect("track 0 should exist");
            Harness {
                parts: PartManager::new(8, &driver, 4, 1, SlotPolicy::GreedySweep),
                sustainer: Sustainer::new(),
                driver,
                sequencer,
                sink: Recorder::default(),
            }
        }

        fn tick(&mut self) -> bool {
            self.sink.tick = self.sequencer.current_tick();
            let mut ctx = Context {
                parts: &mut self.parts,
                sustainer: &mut self.sustainer,
                driver: &mut self.driver,
            };
            self.sequencer.tick(PlayerId(0), &mut ctx, &mut self.sink)
        }

        fn jump(&mut self, track: usize, beat: u32, tick: u32) -> Result<(), SeekError> {
            let mut ctx = Context {
                parts: &mut self.parts,
                sustainer: &mut self.sustainer,
                driver: &mut self.driver,
            };
            self.sequencer.jump(PlayerId(0), &mut ctx, track, beat, tick)
        }
    }

    fn sound(tracks: Vec<Track>) -> Sound {
        Sound::new(1, "test", 4, tracks)
    }

    #[test]
    fn dispatches_events_on_their_tick() {
        let mut harness = Harness::new(sound(vec![Track::new(vec![
            note_on(0, 0, 60, 100),
            note_on(2, 0, 62, 0),
            note_off(2, 0, 60),
            note_on(5, 0, 64, 100),
        ])]));

        let mut ticks = 0;
        while !harness.tick() {
            ticks += 1;
        }

        assert_eq!(Status::Off, harness.sequencer.status());
        assert_eq!(5, ticks);
        let ticks: Vec<u32> = harness.sink.seen.iter().map(|(tick, _)| *tick).collect();
        assert_eq!(vec![0, 2, 2, 5], ticks);
        // Velocity zero arrives as note off.
        assert_eq!(note_off(2, 0, 62).message, harness.sink.seen[1].1);
    }

    #[test]
    fn beats_roll_over() {
        let mut harness = Harness::new(sound(vec![Track::new(vec![note_on(40, 0, 60, 1)])]));
        for _ in 0..9 {
            harness.tick();
        }
        // Nine ticks played; the rollover happens at the start of the next tick.
        assert_eq!(9, harness.sequencer.current_tick());
        assert_eq!((3, 1), (harness.sequencer.beat(), harness.sequencer.tick_in_beat()));
    }

    #[test]
    fn pressure_is_dropped() {
        let mut harness = Harness::new(sound(vec![Track::new(vec![
            crate::sound::Event::new(
                0,
                Message::Midi {
                    channel: u4::from(0),
                    message: MidiMessage::ChannelAftertouch { vel: u7::from(3) },
                },
            ),
            note_on(0, 0, 60, 100),
        ])]));
        harness.tick();
        assert_eq!(1, harness.sink.seen.len());
        assert_eq!(
            None,
            normalize(&Message::Midi {
                channel: u4::from(1),
                message: MidiMessage::Aftertouch {
                    key: u7::from(1),
                    vel: u7::from(1)
                }
            })
        );
    }

    #[test]
    fn jump_positions_cursor_and_bails() -> Result<(), SeekError> {
        let mut harness = Harness::new(sound(vec![
            Track::new(vec![
                note_on(0, 0, 60, 100),
                note_on(8, 0, 62, 100),
                note_on(12, 0, 64, 100),
                note_on(20, 0, 65, 100),
            ]),
            Track::new(vec![note_on(3, 1, 40, 100), note_on(30, 1, 41, 100)]),
        ]));
        harness.tick();

        // Beat 3, tick 2 is absolute tick 10; the next event is at 12.
        harness.jump(0, 3, 2)?;
        assert_eq!(2, harness.sequencer.cursor());
        assert_eq!(10, harness.sequencer.current_tick());
        assert_eq!(12, harness.sequencer.next_event_tick());
        assert_eq!((3, 2), (harness.sequencer.beat(), harness.sequencer.tick_in_beat()));

        // Backwards on the same track rescans from the start.
        harness.jump(0, 1, 0)?;
        assert_eq!(0, harness.sequencer.cursor());

        // Beat 0 means beat 1.
        harness.jump(1, 0, 3)?;
        assert_eq!(1, harness.sequencer.track());
        assert_eq!(0, harness.sequencer.cursor());
        assert_eq!(3, harness.sequencer.current_tick());

        assert_eq!(
            Err(SeekError::PastEndOfTrack { track: 1, tick: 400 }),
            harness.jump(1, 101, 0)
        );
        assert_eq!(
            Err(SeekError::NoSuchTrack { track: 5, tracks: 2 }),
            harness.jump(5, 1, 0)
        );
        // A failed jump leaves the position alone.
        assert_eq!(1, harness.sequencer.track());
        assert_eq!(3, harness.sequencer.current_tick());
        Ok(())
    }

    #[test]
    fn jump_is_deterministic() -> Result<(), SeekError> {
        let track = Track::new(vec![
            note_on(0, 0, 60, 100),
            note_on(6, 0, 62, 100),
            note_on(6, 0, 63, 100),
            note_on(9, 0, 64, 100),
        ]);
        let mut forward = Harness::new(sound(vec![track.clone()]));
        let mut backward = Harness::new(sound(vec![track]));
        for _ in 0..8 {
            backward.tick();
        }
        forward.jump(0, 2, 2)?;
        backward.jump(0, 2, 2)?;
        assert_eq!(forward.sequencer.cursor(), backward.sequencer.cursor());
        assert_eq!(1, forward.sequencer.cursor());
        Ok(())
    }

    #[test]
    fn jump_directive_skips_rest_of_tick() {
        let mut harness = Harness::new(sound(vec![Track::new(vec![
            command(4, crate::sound::Command::ClearLoop),
            note_on(4, 0, 60, 100),
            note_on(8, 0, 62, 100),
            note_on(10, 0, 64, 100),
        ])]));
        harness.sink.script.push((
            4,
            Directive::Jump {
                track: 0,
                beat: 3,
                tick: 2,
            },
        ));

        for _ in 0..8 {
            harness.tick();
        }
        let keys: Vec<(u32, Option<(u8, u8)>)> = harness
            .sink
            .seen
            .iter()
            .map(|(tick, message)| (*tick, message.started_note()))
            .collect();
        // The note sharing the jump's tick never plays; playback resumes at tick 10.
        assert_eq!(vec![(4, None), (10, Some((0, 64)))], keys);
    }

    #[test]
    fn loop_fires_count_times() {
        let mut harness = Harness::new(sound(vec![Track::new(vec![
            note_on(0, 0, 60, 100),
            note_off(2, 0, 60),
            note_on(30, 0, 61, 100),
        ])]));
        harness
            .sequencer
            .set_loop(LoopSpec {
                count: 2,
                start_beat: 1,
                start_tick: 0,
                end_beat: 3,
                end_tick: 0,
            })
            .expect("loop should be valid");

        let mut ticks = 0;
        while !harness.tick() {
            ticks += 1;
            assert!(ticks < 100, "loop never ended");
        }
        let starts = harness
            .sink
            .seen
            .iter()
            .filter(|(_, message)| message.started_note() == Some((0, 60)))
            .count();
        assert_eq!(3, starts);
        assert_eq!(None, harness.sequencer.loop_state());
    }

    #[test]
    fn set_loop_validates_span() {
        let mut sequencer = Sequencer::new();
        let spec = LoopSpec {
            count: 1,
            start_beat: 0,
            start_tick: 0,
            end_beat: 2,
            end_tick: 0,
        };
        assert_eq!(Ok(()), sequencer.set_loop(spec));
        assert_eq!(1, sequencer.loop_state().map_or(0, |state| state.start_beat));

        assert_eq!(
            Err(SeekError::InvalidLoop {
                start_beat: 4,
                end_beat: 5
            }),
            sequencer.set_loop(LoopSpec {
                start_beat: 4,
                end_beat: 5,
                ..spec
            })
        );
        sequencer.clear_loop();
        assert_eq!(None, sequencer.loop_state());
    }

    #[test]
    fn jump_requires_playing() {
        let mut harness = Harness::new(sound(vec![Track::new(vec![])]));
        assert!(harness.tick());
        assert_eq!(Err(SeekError::NotPlaying), harness.jump(0, 1, 0));
    }
}
