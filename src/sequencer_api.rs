use crate::pipeline::modulator::Param;

// What the front panel (or the host's scripted stand-in) asks of the core.
// Everything here may touch flash, so it's handled between ticks, never inside one.
#[derive(Clone, Debug, PartialEq)]
pub enum SequencerCommand {
    // switch a track to another pattern; the one after it is preloaded
    SelectPattern { track: usize, pattern: usize },

    // flip a step's gate in the track's current pattern
    ToggleStep { track: usize, step: usize },

    // encoder turn on the modulator page
    EditModulator { slot: usize, param: Param, value: i32, shift: bool },

    SetTempo(f32),

    // clear a pattern from RAM and flash
    DeletePattern { track: usize, pattern: usize },

    Flush { blocking: bool },

    Quit,
}
