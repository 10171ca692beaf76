// Control-rate signal generation: modulator LFOs, random and envelopes, all
// stepped by the sequencer tick rather than an audio callback.

mod engine;
mod envelope;
pub mod waveform;

pub use engine::ModulatorEngine;
pub use envelope::{ms_to_ticks, AdsrState, Envelope};
