use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::pipeline::modulator::{LfoMode, Modulator, RandomMode, Shape};
use crate::shared::{MODULATOR_COUNT, OUTPUT_CENTER, OUTPUT_MAX, PHASE_RANGE, RANDOM_SEED};

use super::envelope::{ms_to_ticks, AdsrState, Envelope};
use super::waveform;

// everything one modulator slot remembers between ticks; fixed size so ticking never allocates
#[derive(Clone, Debug, PartialEq)]
struct SlotState {
    accumulator: u16,      // wraps once per cycle
    last_accumulator: u16,
    phase: u16,            // accumulator + phase offset, as last sampled
    random_value: i32,     // current slewed random value
    random_target: i32,
    last_gate: bool,
    last_tick: Option<u32>,
    rng: Pcg32,
    envelope: Envelope,
    output: i32,
}

impl SlotState {
    fn new(slot: usize) -> Self {
        Self {
            accumulator: 0,
            last_accumulator: 0,
            phase: 0,
            random_value: 0,
            random_target: 0,
            last_gate: false,
            last_tick: None,
            rng: Pcg32::seed_from_u64(RANDOM_SEED + slot as u64),
            envelope: Envelope::default(),
            output: 0,
        }
    }

    fn draw_target(&mut self) {
        self.random_target = self.rng.random_range(-OUTPUT_MAX..=OUTPUT_MAX);
    }

    fn advance(&mut self, rate: u16) {
        let increment = PHASE_RANGE / (2 * u32::from(rate).max(1));
        self.last_accumulator = self.accumulator;
        self.accumulator = self.accumulator.wrapping_add(increment as u16);
    }

    // step toward the target, never past it
    fn slew(&mut self, smooth_ms: u16, tick_duration_s: f32) {
        let slew_ticks = if smooth_ms == 0 {
            1
        } else {
            // very fast tempos give tick counts past i32
            i32::try_from(ms_to_ticks(u32::from(smooth_ms), tick_duration_s)).unwrap_or(i32::MAX)
        };
        let diff = self.random_target - self.random_value;
        let mut step = diff / slew_ticks;
        // a plain diff / slew_ticks stalls short of the target once |diff| < slew_ticks
        if step == 0 {
            step = diff.signum();
        }
        self.random_value += step;
    }

    fn tick_lfo(&mut self, m: &Modulator, rising: bool, offset: u16) -> i32 {
        match (m.mode(), rising) {
            (LfoMode::Sync, true) => self.accumulator = 0u16.wrapping_sub(offset),
            (LfoMode::Retrigger, true) => self.accumulator = 0,
            _ => self.advance(m.rate()),
        }
        self.phase = self.accumulator.wrapping_add(offset);
        waveform::generate(m.shape(), self.phase)
    }

    fn tick_random(&mut self, m: &Modulator, rising: bool, offset: u16, tick_duration_s: f32) -> i32 {
        match m.random_mode() {
            RandomMode::Clocked => {
                self.advance(m.rate());
                self.phase = self.accumulator.wrapping_add(offset);
                if self.accumulator < self.last_accumulator {
                    self.draw_target();
                }
            }
            RandomMode::Triggered => {
                if rising {
                    self.draw_target();
                }
            }
        }
        self.slew(m.smooth(), tick_duration_s);
        self.random_value
    }
}

fn scaled(sample: i32, m: &Modulator) -> i32 {
    let value = sample * i32::from(m.depth()) / OUTPUT_MAX + i32::from(m.offset());
    (value + OUTPUT_CENTER).clamp(0, OUTPUT_MAX)
}

/// Runtime side of the modulator page: one state per slot, advanced once per sequencer tick.
#[derive(Clone, Debug, PartialEq)]
pub struct ModulatorEngine {
    slots: [SlotState; MODULATOR_COUNT],
}

impl Default for ModulatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ModulatorEngine {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(SlotState::new),
        }
    }

    pub fn reset(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            *slot = SlotState::new(i);
        }
    }

    /// Advances `slot` by one tick. A repeated call with the same `tick` is ignored, so a
    /// slot never moves twice in one sequencer tick. Out of range slots are ignored.
    pub fn tick(&mut self, tick: u32, modulator: &Modulator, slot: usize, gate: bool, tick_duration_s: f32) {
        let Some(state) = self.slots.get_mut(slot) else {
            return;
        };
        if state.last_tick == Some(tick) {
            return;
        }
        state.last_tick = Some(tick);

        let rising = gate && !state.last_gate;
        let falling = !gate && state.last_gate;
        state.last_gate = gate;

        let offset = (u32::from(modulator.phase()) * PHASE_RANGE / 360) as u16;
        state.output = match modulator.shape() {
            Shape::Adsr => {
                let level = state.envelope.tick(modulator, rising, falling, tick_duration_s);
                (level * i32::from(modulator.amplitude()) / OUTPUT_MAX).clamp(0, OUTPUT_MAX)
            }
            Shape::Random => {
                let sample = state.tick_random(modulator, rising, offset, tick_duration_s);
                scaled(sample, modulator)
            }
            _ => {
                let sample = state.tick_lfo(modulator, rising, offset);
                scaled(sample, modulator)
            }
        };
    }

    pub fn current_value(&self, slot: usize) -> i32 {
        self.slots.get(slot).map_or(0, |s| s.output)
    }

    // for the scope display only
    pub fn current_phase(&self, slot: usize) -> u16 {
        self.slots.get(slot).map_or(0, |s| s.phase)
    }

    pub fn adsr_state(&self, slot: usize) -> AdsrState {
        self.slots.get(slot).map_or(AdsrState::Idle, |s| s.envelope.state())
    }

    pub fn adsr_timer(&self, slot: usize) -> u32 {
        self.slots.get(slot).map_or(0, |s| s.envelope.timer())
    }
}
