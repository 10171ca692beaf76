// Sizes that are baked into array types. Everything that can change per
// device (flash addresses, slot size, tempo) lives in config.rs instead.

pub const TRACK_COUNT: usize = 8;
pub const STEP_COUNT: usize = 64;
pub const MODULATOR_COUNT: usize = 8;

// how many patterns of each track we keep in RAM (current + next + previous)
pub const PATTERNS_KEPT_PER_TRACK: usize = 3;
pub const CACHE_CAPACITY: usize = TRACK_COUNT * PATTERNS_KEPT_PER_TRACK;

// 0..65535 maps to 0..360 degrees
pub const PHASE_RANGE: u32 = 65536;

// Modulator output is a 7 bit value, same as a MIDI CC
pub const OUTPUT_MAX: i32 = 127;
pub const OUTPUT_CENTER: i32 = 64;

// each modulator slot seeds its generator with RANDOM_SEED + slot index
pub const RANDOM_SEED: u64 = 0x5EC0_5EED;

// ye olde pattern address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PatternKey {
    pub track: u8,
    pub pattern: u8,
}

impl PatternKey {
    pub fn new(track: usize, pattern: usize) -> Self {
        Self {
            track: track as u8,
            pattern: pattern as u8,
        }
    }

    // flat flash slot index: track * patterns_per_track + pattern
    pub fn slot(self, patterns_per_track: usize) -> usize {
        self.track as usize * patterns_per_track + self.pattern as usize
    }
}

#[cfg(test)]
mod tests {
    use super::PatternKey;

    #[test]
    fn slot_index_is_track_major() {
        assert_eq!(PatternKey::new(0, 0).slot(5), 0);
        assert_eq!(PatternKey::new(0, 4).slot(5), 4);
        assert_eq!(PatternKey::new(1, 0).slot(5), 5);
        assert_eq!(PatternKey::new(7, 4).slot(5), 39);
    }
}
