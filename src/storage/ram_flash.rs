// In-memory NOR flash for host runs and tests. Behaves like the real part:
// erased bytes read 0xFF and programming can only clear bits, so a write
// without a preceding erase fails the same way it would on the board.
use crate::config::{SectorLayout, StorageConfig};

use super::device::{BlockDevice, FlashError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlashStats {
    pub reads: usize,
    pub erases: usize,
    pub programs: usize,
}

#[derive(Clone, Debug)]
pub struct RamFlash {
    origin: u32,
    data: Vec<u8>,
    sectors: SectorLayout,
    stats: FlashStats,
    // remaining operations that should report failure, for fault injection
    failing_reads: usize,
    failing_erases: usize,
    failing_programs: usize,
}

impl RamFlash {
    pub fn new(origin: u32, len: usize, sectors: SectorLayout) -> Self {
        Self {
            origin,
            data: vec![0xFF; len],
            sectors,
            stats: FlashStats::default(),
            failing_reads: 0,
            failing_erases: 0,
            failing_programs: 0,
        }
    }

    // covers the whole chip, firmware area included
    pub fn for_config(config: &StorageConfig) -> Self {
        let origin = config.firmware_start.min(config.base_address);
        let len = config.flash_end.saturating_sub(origin) as usize;
        Self::new(origin, len, config.sectors)
    }

    pub fn stats(&self) -> FlashStats {
        self.stats
    }

    pub fn fail_next_reads(&mut self, count: usize) {
        self.failing_reads = count;
    }

    pub fn fail_next_erases(&mut self, count: usize) {
        self.failing_erases = count;
    }

    pub fn fail_next_programs(&mut self, count: usize) {
        self.failing_programs = count;
    }

    pub fn peek(&self, address: u32, len: usize) -> Option<&[u8]> {
        let start = self.offset(address, len).ok()?;
        Some(&self.data[start..start + len])
    }

    // xor a byte in place, simulating a bit rot / interrupted write
    pub fn corrupt(&mut self, address: u32, mask: u8) -> bool {
        match self.offset(address, 1) {
            Ok(i) => {
                self.data[i] ^= mask;
                true
            }
            Err(_) => false,
        }
    }

    fn offset(&self, address: u32, len: usize) -> Result<usize, FlashError> {
        let start = address
            .checked_sub(self.origin)
            .ok_or(FlashError::OutOfBounds(address))? as usize;
        if start + len > self.data.len() {
            return Err(FlashError::OutOfBounds(address));
        }
        Ok(start)
    }
}

impl BlockDevice for RamFlash {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.stats.reads += 1;
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(FlashError::ReadFailed(address));
        }
        let start = self.offset(address, buf.len())?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn erase_sector(&mut self, sector: u8) -> Result<(), FlashError> {
        self.stats.erases += 1;
        let range = self
            .sectors
            .range(sector)
            .ok_or(FlashError::NoSuchSector(sector))?;
        let start = self
            .offset(range.start, range.len())
            .map_err(|_| FlashError::NoSuchSector(sector))?;
        if self.failing_erases > 0 {
            self.failing_erases -= 1;
            return Err(FlashError::EraseFailed(sector));
        }
        self.data[start..start + range.len()].fill(0xFF);
        Ok(())
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), FlashError> {
        self.stats.programs += 1;
        if address % 4 != 0 {
            return Err(FlashError::Unaligned(address));
        }
        let start = self.offset(address, 4)?;
        if self.failing_programs > 0 {
            self.failing_programs -= 1;
            return Err(FlashError::ProgramFailed(address));
        }
        let mut ok = true;
        for (cell, byte) in self.data[start..start + 4].iter_mut().zip(word.to_le_bytes()) {
            *cell &= byte;
            ok &= *cell == byte;
        }
        if ok {
            Ok(())
        } else {
            Err(FlashError::ProgramFailed(address))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flash() -> RamFlash {
        RamFlash::for_config(&StorageConfig::default())
    }

    #[test]
    fn starts_erased() {
        let flash = flash();
        assert_eq!(flash.peek(0x0806_0000, 4), Some(&[0xFF; 4][..]));
    }

    #[test]
    fn programming_only_clears_bits() {
        let mut flash = flash();
        flash.program_word(0x0806_0000, 0x1234_5678).unwrap();
        assert_eq!(flash.peek(0x0806_0000, 4), Some(&[0x78, 0x56, 0x34, 0x12][..]));

        // setting bits back needs an erase
        assert_eq!(
            flash.program_word(0x0806_0000, 0xFFFF_FFFF),
            Err(FlashError::ProgramFailed(0x0806_0000))
        );

        flash.erase_sector(7).unwrap();
        flash.program_word(0x0806_0000, 0xFFFF_0000).unwrap();
        assert_eq!(flash.peek(0x0806_0000, 4), Some(&[0x00, 0x00, 0xFF, 0xFF][..]));
    }

    #[test]
    fn erase_touches_only_its_sector() {
        let mut flash = flash();
        flash.program_word(0x0807_FFFC, 0).unwrap();
        flash.program_word(0x0808_0000, 0).unwrap();
        flash.erase_sector(8).unwrap();
        assert_eq!(flash.peek(0x0807_FFFC, 4), Some(&[0u8; 4][..]));
        assert_eq!(flash.peek(0x0808_0000, 4), Some(&[0xFF; 4][..]));
    }

    #[test]
    fn rejects_unaligned_and_out_of_range() {
        let mut flash = flash();
        assert_eq!(flash.program_word(0x0806_0002, 0), Err(FlashError::Unaligned(0x0806_0002)));
        assert_eq!(flash.program_word(0x0810_0000, 0), Err(FlashError::OutOfBounds(0x0810_0000)));
        assert_eq!(flash.erase_sector(12), Err(FlashError::NoSuchSector(12)));
        let mut buf = [0u8; 8];
        assert!(flash.read(0x080F_FFFC, &mut buf).is_err());
    }

    #[test]
    fn injected_faults_are_consumed() {
        let mut flash = flash();
        flash.fail_next_programs(1);
        assert!(flash.program_word(0x0806_0000, 0).is_err());
        assert!(flash.program_word(0x0806_0000, 0).is_ok());
        assert_eq!(flash.stats().programs, 2);
    }
}
