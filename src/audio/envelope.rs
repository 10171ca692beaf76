// ADSR envelope driven by gate edges, one step per sequencer tick.
//
// Segment lengths are given in ms and converted with the tick duration passed in
// on every call, so a tempo change reshapes a running envelope immediately.

use crate::pipeline::modulator::Modulator;
use crate::shared::OUTPUT_MAX;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdsrState {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Ticks needed to cover `ms`, rounded up, never less than one.
pub fn ms_to_ticks(ms: u32, tick_duration_s: f32) -> u32 {
    if !tick_duration_s.is_finite() || tick_duration_s <= 0.0 {
        return 1;
    }
    let ticks = (ms as f32 / (tick_duration_s * 1000.0)).ceil();
    (ticks as u32).max(1)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    state: AdsrState,
    timer: u32,        // ticks spent in the current segment
    level: i32,        // 0..=127
    release_from: i32, // level when the gate dropped
}

impl Envelope {
    pub fn state(&self) -> AdsrState {
        self.state
    }

    pub fn timer(&self) -> u32 {
        self.timer
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    fn enter(&mut self, state: AdsrState) {
        self.state = state;
        self.timer = 0;
    }

    /// Advances one tick and returns the new level, 0..=127 before amplitude.
    /// Zero length segments are passed through within the same tick.
    pub fn tick(&mut self, params: &Modulator, rising: bool, falling: bool, tick_duration_s: f32) -> i32 {
        if rising {
            // a new gate always restarts, whatever was going on
            self.enter(AdsrState::Attack);
        } else if falling && !matches!(self.state, AdsrState::Idle | AdsrState::Release) {
            self.release_from = self.level;
            self.enter(AdsrState::Release);
        }

        let sustain = i32::from(params.sustain());
        let instant_decay = params.decay() == 0 || sustain >= OUTPUT_MAX;
        let ticks = |ms: u16| ms_to_ticks(u32::from(ms), tick_duration_s);

        if self.state == AdsrState::Attack {
            if params.attack() > 0 {
                let total = ticks(params.attack());
                self.timer += 1;
                if self.timer < total {
                    self.level = ramp(0, OUTPUT_MAX, self.timer, total);
                    return self.level;
                }
            }
            self.level = OUTPUT_MAX;
            self.enter(AdsrState::Decay);
            if !instant_decay {
                return self.level;
            }
        }

        if self.state == AdsrState::Decay {
            if !instant_decay {
                let total = ticks(params.decay());
                self.timer += 1;
                if self.timer < total {
                    self.level = ramp(OUTPUT_MAX, sustain, self.timer, total);
                    return self.level;
                }
            }
            self.enter(AdsrState::Sustain);
        }

        match self.state {
            AdsrState::Sustain => self.level = sustain,
            AdsrState::Release => {
                let mut done = params.release() == 0;
                if !done {
                    let total = ticks(params.release());
                    self.timer += 1;
                    done = self.timer >= total;
                    self.level = ramp(self.release_from, 0, self.timer, total);
                }
                if done {
                    self.level = 0;
                    self.enter(AdsrState::Idle);
                }
            }
            AdsrState::Idle => self.level = 0,
            AdsrState::Attack | AdsrState::Decay => {}
        }
        self.level
    }
}

// linear from `from` to `to` at elapsed/total, kept inside both bounds
fn ramp(from: i32, to: i32, elapsed: u32, total: u32) -> i32 {
    let total = total.max(1);
    let elapsed = elapsed.min(total) as i32;
    let value = from + (to - from) * elapsed / total as i32;
    value.clamp(from.min(to), from.max(to))
}
