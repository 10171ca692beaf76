// Device and clock configuration. The defaults describe the STM32F405 board the
// sequencer ships on; a host run can override them with a JSON file.
use std::ops::Range;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::shared::TRACK_COUNT;
use crate::storage::HEADER_SIZE;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub clock: ClockConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config {}", path.display()))?;
        let config: Config = serde_json::from_str(&data)
            .with_context(|| format!("could not parse config {}", path.display()))?;
        config.storage.validate().context("invalid storage config")?;
        config.clock.validate().context("invalid clock config")?;
        Ok(config)
    }
}

/// Uniform erase sectors: sector `first_id` starts at `base`, each one `size` bytes long.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorLayout {
    pub base: u32,
    pub size: u32,
    pub first_id: u8,
}

impl Default for SectorLayout {
    fn default() -> Self {
        // STM32F405 sectors 5..11 are 128 KiB each, sector 5 at 0x0802_0000
        Self {
            base: 0x0802_0000,
            size: 0x2_0000,
            first_id: 5,
        }
    }
}

impl SectorLayout {
    pub fn sector_of(&self, address: u32) -> Option<u8> {
        if address < self.base || self.size == 0 {
            return None;
        }
        let index = (address - self.base) / self.size;
        u8::try_from(index + u32::from(self.first_id)).ok()
    }

    pub fn range(&self, sector: u8) -> Option<Range<u32>> {
        let index = u32::from(sector.checked_sub(self.first_id)?);
        let start = self.base.checked_add(index.checked_mul(self.size)?)?;
        let end = start.checked_add(self.size)?;
        Some(start..end)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_address: u32,       // first byte of the pattern region
    pub flash_end: u32,          // one past the last byte of flash
    pub firmware_start: u32,
    pub firmware_end: u32,       // firmware image occupies firmware_start..firmware_end
    pub slot_size: u32,          // bytes per pattern slot, header included
    pub sectors: SectorLayout,
    pub patterns_per_track: usize,
    pub flush_settle_ms: u64,    // pause after each entry in a blocking flush
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_address: 0x0806_0000,
            flash_end: 0x0810_0000,
            firmware_start: 0x0800_0000,
            firmware_end: 0x0806_0000,
            slot_size: 0x2000,
            sectors: SectorLayout::default(),
            patterns_per_track: 8,
            flush_settle_ms: 10,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("pattern region base {0:#010x} overlaps the firmware image or lies outside flash")]
    UnsafeBase(u32),

    #[error("slot size {0} must be word aligned and larger than the 24 byte header")]
    BadSlotSize(u32),

    #[error("slots of {slot} bytes do not line up with {sector} byte sectors")]
    SectorMismatch { slot: u32, sector: u32 },

    #[error("{needed} pattern slots needed but the region only holds {available}")]
    RegionTooSmall { needed: usize, available: usize },

    #[error("patterns per track must be between 1 and {max}, got {got}")]
    BadPatternCount { got: usize, max: usize },

    #[error("tempo must be within 1..={max} bpm with a nonzero ppqn (bpm {bpm}, ppqn {ppqn})", max = ClockConfig::MAX_BPM)]
    BadTempo { bpm: f32, ppqn: u32 },
}

impl StorageConfig {
    pub fn is_address_safe(&self, address: u32) -> bool {
        if address < self.base_address || address >= self.flash_end {
            return false;
        }
        !(self.firmware_start..self.firmware_end).contains(&address)
    }

    pub fn slot_count(&self) -> usize {
        if self.slot_size == 0 || self.flash_end <= self.base_address {
            return 0;
        }
        ((self.flash_end - self.base_address) / self.slot_size) as usize
    }

    /// Number of slots actually addressed by (track, pattern) keys.
    pub fn used_slots(&self) -> usize {
        TRACK_COUNT * self.patterns_per_track
    }

    pub fn slot_address(&self, slot: usize) -> Option<u32> {
        if slot >= self.slot_count() {
            return None;
        }
        Some(self.base_address + slot as u32 * self.slot_size)
    }

    pub fn payload_capacity(&self) -> usize {
        (self.slot_size as usize).saturating_sub(HEADER_SIZE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_address_safe(self.base_address) {
            return Err(ConfigError::UnsafeBase(self.base_address));
        }
        if self.slot_size as usize <= HEADER_SIZE || self.slot_size % 4 != 0 {
            return Err(ConfigError::BadSlotSize(self.slot_size));
        }

        let sector = self.sectors.size;
        let mismatch = ConfigError::SectorMismatch {
            slot: self.slot_size,
            sector,
        };
        if sector == 0 || self.base_address < self.sectors.base {
            return Err(mismatch);
        }
        // every sector we erase must lie fully inside the pattern region
        let offset = self.base_address - self.sectors.base;
        let region = self.flash_end - self.base_address;
        if offset % sector != 0 || region % sector != 0 {
            return Err(mismatch);
        }
        if sector % self.slot_size != 0 && self.slot_size % sector != 0 {
            return Err(mismatch);
        }

        // the header stores the slot index in a single byte
        let max = 256 / TRACK_COUNT;
        if self.patterns_per_track == 0 || self.patterns_per_track > max {
            return Err(ConfigError::BadPatternCount {
                got: self.patterns_per_track,
                max,
            });
        }
        if self.used_slots() > self.slot_count() {
            return Err(ConfigError::RegionTooSmall {
                needed: self.used_slots(),
                available: self.slot_count(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub bpm: f32,
    pub ppqn: u32, // ticks per quarter note
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { bpm: 120.0, ppqn: 192 }
    }
}

impl ClockConfig {
    pub const MIN_BPM: f32 = 1.0;
    pub const MAX_BPM: f32 = 1000.0;

    // 120 bpm at 192 ppqn is ~2.6ms per tick
    pub fn tick_duration(&self) -> f32 {
        60.0 / (self.bpm * self.ppqn as f32)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // the range check also rejects NaN
        if !(Self::MIN_BPM..=Self::MAX_BPM).contains(&self.bpm) || self.ppqn == 0 {
            return Err(ConfigError::BadTempo {
                bpm: self.bpm,
                ppqn: self.ppqn,
            });
        }
        Ok(())
    }
}
