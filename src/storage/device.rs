// The flash controller seen by the storage layer. Real hardware memory maps the
// array and polls the controller; tests plug in RamFlash. Every call returns only
// once the controller reports the operation finished.

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FlashError {
    #[error("address {0:#010x} is not backed by the device")]
    OutOfBounds(u32),

    #[error("sector {0} does not exist")]
    NoSuchSector(u8),

    #[error("erase of sector {0} failed")]
    EraseFailed(u8),

    #[error("programming the word at {0:#010x} failed")]
    ProgramFailed(u32),

    #[error("word address {0:#010x} is not 4 byte aligned")]
    Unaligned(u32),

    #[error("read at {0:#010x} failed")]
    ReadFailed(u32),
}

pub trait BlockDevice {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    fn erase_sector(&mut self, sector: u8) -> Result<(), FlashError>;

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), FlashError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(address, buf)
    }

    fn erase_sector(&mut self, sector: u8) -> Result<(), FlashError> {
        (**self).erase_sector(sector)
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), FlashError> {
        (**self).program_word(address, word)
    }
}
