use std::ops::Range;

use crate::config::StorageConfig;

use super::crc::Crc32;
use super::device::{BlockDevice, FlashError};
use super::StorageError;

/// Checked access to the pattern region of flash.
///
/// Reads outside the region are reported as errors. Erases and programs
/// outside it halt: the only way to get there is a bug, and carrying on would
/// overwrite the running firmware.
pub struct BlockStore<D> {
    device: D,
    config: StorageConfig,
    crc: Crc32,
}

impl<D: BlockDevice> BlockStore<D> {
    pub fn new(config: StorageConfig, device: D) -> Self {
        if !config.is_address_safe(config.base_address) {
            panic!(
                "pattern region base {:#010x} is not a safe flash address",
                config.base_address
            );
        }
        Self {
            device,
            config,
            crc: Crc32::new(),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn crc(&self) -> &Crc32 {
        &self.crc
    }

    pub fn is_address_safe(&self, address: u32) -> bool {
        self.config.is_address_safe(address)
    }

    fn is_range_safe(&self, range: &Range<u32>) -> bool {
        if range.is_empty() {
            return true;
        }
        let overlaps_firmware =
            range.start < self.config.firmware_end && range.end > self.config.firmware_start;
        !overlaps_firmware
            && self.is_address_safe(range.start)
            && self.is_address_safe(range.end - 1)
    }

    pub fn sector_of(&self, address: u32) -> Option<u8> {
        self.config.sectors.sector_of(address)
    }

    pub fn sector_range(&self, sector: u8) -> Option<Range<u32>> {
        self.config.sectors.range(sector)
    }

    pub fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.is_empty() {
            return Ok(());
        }
        let range = address..address.saturating_add(buf.len() as u32);
        if !self.is_range_safe(&range) {
            return Err(StorageError::AddressOutOfRange {
                address,
                len: buf.len(),
            });
        }
        self.device.read(address, buf)?;
        Ok(())
    }

    pub fn erase(&mut self, sector: u8) -> Result<(), FlashError> {
        let safe = self
            .sector_range(sector)
            .is_some_and(|range| self.is_range_safe(&range));
        if !safe {
            panic!("refusing to erase flash sector {sector}: outside the pattern region");
        }
        tracing::trace!(sector, "erasing flash sector");
        self.device.erase_sector(sector)
    }

    pub fn program(&mut self, address: u32, word: u32) -> Result<(), FlashError> {
        if address % 4 != 0 || !self.is_range_safe(&(address..address.saturating_add(4))) {
            panic!("refusing to program flash at {address:#010x}: outside the pattern region");
        }
        self.device.program_word(address, word)
    }

    // Program a word aligned run of bytes; the tail is padded with erased bytes.
    // Words that are still fully erased are skipped.
    pub fn program_bytes(&mut self, address: u32, bytes: &[u8]) -> Result<(), FlashError> {
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut word = [0xFF; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            let word = u32::from_le_bytes(word);
            if word != 0xFFFF_FFFF {
                self.program(address + (i as u32) * 4, word)?;
            }
        }
        Ok(())
    }
}
