// Glue between the front panel and the two cores. Commands (which may hit flash)
// are handled between ticks; tick() only reads RAM.

use crate::audio::ModulatorEngine;
use crate::config::ClockConfig;
use crate::pipeline::modulator::ModulatorBank;
use crate::sequencer_api::SequencerCommand;
use crate::shared::{MODULATOR_COUNT, TRACK_COUNT};
use crate::storage::{BlockDevice, PatternCache, StorageError};

// divisors count in 48ths of a quarter note
const DIVISOR_PPQN: u32 = 48;

pub struct Middle<D> {
    pub cache: PatternCache<D>,
    pub engine: ModulatorEngine,
    pub modulators: ModulatorBank,
    clock: ClockConfig,
    selected: [usize; TRACK_COUNT], // pattern each track is playing
    gates: [bool; TRACK_COUNT],
    outputs: [i32; MODULATOR_COUNT],
    tick: u32,
}

impl<D: BlockDevice> Middle<D> {
    pub fn new(cache: PatternCache<D>, modulators: ModulatorBank, clock: ClockConfig) -> Self {
        let mut middle = Self {
            cache,
            engine: ModulatorEngine::new(),
            modulators,
            clock,
            selected: [0; TRACK_COUNT],
            gates: [false; TRACK_COUNT],
            outputs: [0; MODULATOR_COUNT],
            tick: 0,
        };
        // warm the cache so the first bars never wait on flash
        for track in 0..TRACK_COUNT {
            middle.cache.preload(track, 0);
            middle.cache.preload(track, 1);
        }
        middle
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    pub fn tick_duration(&self) -> f32 {
        self.clock.tick_duration()
    }

    pub fn selected_pattern(&self, track: usize) -> Option<usize> {
        self.selected.get(track).copied()
    }

    pub fn gates(&self) -> &[bool; TRACK_COUNT] {
        &self.gates
    }

    pub fn outputs(&self) -> &[i32; MODULATOR_COUNT] {
        &self.outputs
    }

    fn patterns_per_track(&self) -> usize {
        self.cache.store().config().patterns_per_track
    }

    /// Returns false once the session should end.
    pub fn handle_cmd(&mut self, cmd: SequencerCommand) -> bool {
        match cmd {
            SequencerCommand::SelectPattern { track, pattern } => self.select_pattern(track, pattern),
            SequencerCommand::ToggleStep { track, step } => self.toggle_step(track, step),
            SequencerCommand::EditModulator { slot, param, value, shift } => {
                if let Some(m) = self.modulators.get_mut(slot) {
                    m.edit(param, value, shift);
                }
            }
            SequencerCommand::SetTempo(bpm) => {
                let clock = ClockConfig { bpm, ..self.clock.clone() };
                match clock.validate() {
                    Ok(()) => self.clock = clock,
                    Err(e) => tracing::warn!(error = %e, "tempo change ignored"),
                }
            }
            SequencerCommand::DeletePattern { track, pattern } => {
                if let Err(e) = self.cache.delete(track, pattern) {
                    tracing::warn!(track, pattern, error = %e, "could not delete pattern");
                }
            }
            SequencerCommand::Flush { blocking } => {
                // failures are already logged per entry and retried next time
                let _ = self.cache.flush(blocking);
            }
            SequencerCommand::Quit => return false,
        }
        true
    }

    fn select_pattern(&mut self, track: usize, pattern: usize) {
        if track >= TRACK_COUNT {
            return;
        }
        if self.cache.get(track, pattern).is_none() {
            tracing::warn!(track, pattern, "pattern unavailable, staying on the current one");
            return;
        }
        self.selected[track] = pattern;
        let next = (pattern + 1) % self.patterns_per_track().max(1);
        self.cache.preload(track, next);
        tracing::debug!(track, pattern, "pattern selected");
    }

    fn toggle_step(&mut self, track: usize, step: usize) {
        let Some(&pattern) = self.selected.get(track) else {
            return;
        };
        let toggled = self
            .cache
            .get(track, pattern)
            .and_then(|bundle| bundle.note_mut(track))
            .and_then(|seq| seq.step_mut(step))
            .map(|s| s.set_gate(!s.gate()))
            .is_some();
        if toggled {
            self.cache.mark_dirty(track, pattern);
        }
    }

    // reads only what is already cached; a track whose pattern isn't in RAM stays silent
    fn update_gates(&mut self) {
        let ticks_per_unit = (self.clock.ppqn / DIVISOR_PPQN).max(1);
        for track in 0..TRACK_COUNT {
            let pattern = self.selected[track];
            self.gates[track] = self
                .cache
                .peek(track, pattern)
                .and_then(|bundle| bundle.note(track))
                .is_some_and(|seq| seq.gate_at_tick(self.tick, ticks_per_unit));
        }
    }

    /// One sequencer tick: refresh gates, then step every modulator slot in order.
    pub fn tick(&mut self) -> &[i32; MODULATOR_COUNT] {
        self.update_gates();
        let tick_duration = self.clock.tick_duration();
        for slot in 0..MODULATOR_COUNT {
            let modulator = &self.modulators.slots[slot];
            let gate = self.gates[usize::from(modulator.gate_track())];
            self.engine.tick(self.tick, modulator, slot, gate, tick_duration);
            self.outputs[slot] = self.engine.current_value(slot);
        }
        self.tick = self.tick.wrapping_add(1);
        &self.outputs
    }

    /// Power down: blocking flush of every edited pattern, plus the modulator bank.
    /// Both are attempted even if one fails.
    pub fn shutdown(&mut self) -> Result<usize, StorageError> {
        let modulators = self.cache.store_mut().save_modulators(&self.modulators);
        let saved = self.cache.flush(true)?;
        modulators?;
        Ok(saved)
    }
}
