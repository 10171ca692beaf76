// Flash side of pattern storage: checksummed slots in a reserved flash region,
// fronted by a small write-back cache of decoded bundles.

mod block_store;
mod cache;
mod codec;
mod crc;
mod device;
mod header;
mod ram_flash;

pub use block_store::BlockStore;
pub use cache::{CacheStats, PatternCache};
pub use codec::{decode, encode, PatternStore};
pub use crc::Crc32;
pub use device::{BlockDevice, FlashError};
pub use header::{PatternHeader, Rejection, HEADER_SIZE, PATTERN_MAGIC};
pub use ram_flash::{FlashStats, RamFlash};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error(transparent)]
    Flash(#[from] FlashError),

    #[error("pattern slot {0} does not exist")]
    NoSuchSlot(usize),

    #[error("{len} bytes at {address:#010x} fall outside the pattern region")]
    AddressOutOfRange { address: u32, len: usize },

    #[error("pattern payload of {size} bytes exceeds the slot capacity of {capacity}")]
    PayloadTooLarge { size: usize, capacity: usize },
}
