// Versioned little-endian serialization for pattern payloads and modulator banks.
//
// Data is always written at DataVersion::LATEST. A reader is created with the
// version found on disk; fields added after that version are not read but take
// the default passed to `read_since`. The version each field first appeared in
// is listed in `since`, so the whole migration history is in one place.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum DataVersion {
    V1 = 1, // initial layout
    V2 = 2, // step velocity, modulator amplitude
    V3 = 3, // step probability, modulator lfo mode
}

impl DataVersion {
    pub const OLDEST: DataVersion = DataVersion::V1;
    pub const LATEST: DataVersion = DataVersion::V3;

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(DataVersion::V1),
            2 => Some(DataVersion::V2),
            3 => Some(DataVersion::V3),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// First version that carries each optional field.
pub mod since {
    use super::DataVersion;

    pub const STEP_VELOCITY: DataVersion = DataVersion::V2;
    pub const STEP_PROBABILITY: DataVersion = DataVersion::V3;
    pub const MODULATOR_AMPLITUDE: DataVersion = DataVersion::V2;
    pub const MODULATOR_LFO_MODE: DataVersion = DataVersion::V3;
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SerializeError {
    #[error("payload ended early: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("invalid {what} tag {value}")]
    BadTag { what: &'static str, value: u8 },
}

/// A fixed-size little-endian value.
pub trait Wire: Sized + Copy {
    const SIZE: usize;

    fn put<W: Write>(self, out: &mut W) -> io::Result<()>;

    fn take<R: Read>(input: &mut R) -> io::Result<Self>;
}

macro_rules! impl_wire {
    ($($ty:ty => $read:ident, $write:ident);* $(;)?) => {
        $(
            impl Wire for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn put<W: Write>(self, out: &mut W) -> io::Result<()> {
                    out.$write::<LittleEndian>(self)
                }

                fn take<R: Read>(input: &mut R) -> io::Result<Self> {
                    input.$read::<LittleEndian>()
                }
            }
        )*
    };
}

impl_wire! {
    u16 => read_u16, write_u16;
    u32 => read_u32, write_u32;
}

impl Wire for u8 {
    const SIZE: usize = 1;

    fn put<W: Write>(self, out: &mut W) -> io::Result<()> {
        out.write_u8(self)
    }

    fn take<R: Read>(input: &mut R) -> io::Result<Self> {
        input.read_u8()
    }
}

impl Wire for i8 {
    const SIZE: usize = 1;

    fn put<W: Write>(self, out: &mut W) -> io::Result<()> {
        out.write_i8(self)
    }

    fn take<R: Read>(input: &mut R) -> io::Result<Self> {
        input.read_i8()
    }
}

impl Wire for bool {
    const SIZE: usize = 1;

    fn put<W: Write>(self, out: &mut W) -> io::Result<()> {
        out.write_u8(u8::from(self))
    }

    fn take<R: Read>(input: &mut R) -> io::Result<Self> {
        Ok(input.read_u8()? != 0)
    }
}

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write<T: Wire>(&mut self, value: T) {
        // a Vec grows as needed, so writing into it cannot fail
        let _ = value.put(&mut self.buf);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub struct Reader<'a> {
    bytes: &'a [u8], // what is left to read
    version: DataVersion,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8], version: DataVersion) -> Self {
        Self { bytes, version }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len()
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], SerializeError> {
        if len > self.remaining() {
            return Err(SerializeError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    pub fn read<T: Wire>(&mut self) -> Result<T, SerializeError> {
        let remaining = self.remaining();
        // reading from a slice only fails by running out (UnexpectedEof)
        T::take(&mut self.bytes).map_err(|_| SerializeError::Truncated {
            needed: T::SIZE,
            remaining,
        })
    }

    /// Reads a field that only exists from `introduced` on; older data gets `default`.
    pub fn read_since<T: Wire>(
        &mut self,
        introduced: DataVersion,
        default: T,
    ) -> Result<T, SerializeError> {
        if self.version < introduced {
            return Ok(default);
        }
        self.read()
    }
}
