// Pattern bundles <-> flash slots. A slot is a header followed by the payload;
// the payload is always written before the header so a save that dies halfway
// leaves a slot that reads as absent instead of half a pattern.

use std::ops::Range;

use crate::config::StorageConfig;
use crate::pipeline::modulator::ModulatorBank;
use crate::pipeline::project::PatternBundle;
use crate::pipeline::serialize::{DataVersion, Reader, Writer};

use super::block_store::BlockStore;
use super::crc::Crc32;
use super::device::BlockDevice;
use super::header::{PatternHeader, Rejection, HEADER_SIZE};
use super::StorageError;

/// Serializes `bundle` for `slot` at the latest data version.
pub fn encode(
    bundle: &PatternBundle,
    slot: usize,
    capacity: usize,
    crc: &Crc32,
) -> Result<(PatternHeader, Vec<u8>), StorageError> {
    let mut w = Writer::new();
    bundle.write(&mut w);
    seal(w.finish(), slot, capacity, crc)
}

/// Checks `payload` against `header` and parses it with the version it was written with.
pub fn decode(
    header: &PatternHeader,
    payload: &[u8],
    slot: usize,
    crc: &Crc32,
) -> Result<PatternBundle, Rejection> {
    let (version, payload) = verify(header, payload, slot, crc)?;
    let mut r = Reader::new(payload, version);
    Ok(PatternBundle::read(&mut r)?)
}

fn seal(
    payload: Vec<u8>,
    slot: usize,
    capacity: usize,
    crc: &Crc32,
) -> Result<(PatternHeader, Vec<u8>), StorageError> {
    if payload.len() > capacity {
        return Err(StorageError::PayloadTooLarge {
            size: payload.len(),
            capacity,
        });
    }
    let header = PatternHeader::new(slot, crc.checksum(&payload), payload.len() as u32);
    Ok((header, payload))
}

// header fields plus crc; hands back the version to parse with and the payload proper
fn verify<'a>(
    header: &PatternHeader,
    payload: &'a [u8],
    slot: usize,
    crc: &Crc32,
) -> Result<(DataVersion, &'a [u8]), Rejection> {
    let version = header.check(slot, payload.len())?;
    let payload = &payload[..header.data_size as usize];
    let computed = crc.checksum(payload);
    if computed != header.checksum {
        return Err(Rejection::ChecksumMismatch {
            stored: header.checksum,
            computed,
        });
    }
    Ok((version, payload))
}

pub struct PatternStore<D> {
    blocks: BlockStore<D>,
}

impl<D: BlockDevice> PatternStore<D> {
    pub fn new(config: StorageConfig, device: D) -> Self {
        Self {
            blocks: BlockStore::new(config, device),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        self.blocks.config()
    }

    pub fn block_store(&self) -> &BlockStore<D> {
        &self.blocks
    }

    pub fn block_store_mut(&mut self) -> &mut BlockStore<D> {
        &mut self.blocks
    }

    pub fn into_inner(self) -> D {
        self.blocks.into_device()
    }

    // header stores the index in one byte
    pub fn slot_count(&self) -> usize {
        self.config().slot_count().min(usize::from(u8::MAX) + 1)
    }

    fn slot_range(&self, slot: usize) -> Result<Range<u32>, StorageError> {
        if slot >= self.slot_count() {
            return Err(StorageError::NoSuchSlot(slot));
        }
        let start = self
            .config()
            .slot_address(slot)
            .ok_or(StorageError::NoSuchSlot(slot))?;
        Ok(start..start + self.config().slot_size)
    }

    fn read_header(&mut self, slot: usize) -> Result<PatternHeader, StorageError> {
        let range = self.slot_range(slot)?;
        let mut raw = [0u8; HEADER_SIZE];
        self.blocks.read(range.start, &mut raw)?;
        Ok(PatternHeader::from_bytes(&raw))
    }

    /// True if the slot carries a plausible header. The payload is not checksummed.
    pub fn exists(&mut self, slot: usize) -> Result<bool, StorageError> {
        let header = self.read_header(slot)?;
        Ok(header.check(slot, self.config().payload_capacity()).is_ok())
    }

    // header and payload of a slot whose header checks out; the payload is not verified yet
    fn read_record(&mut self, slot: usize) -> Result<Option<(PatternHeader, Vec<u8>)>, StorageError> {
        let range = self.slot_range(slot)?;
        let header = self.read_header(slot)?;
        if let Err(reason) = header.check(slot, self.config().payload_capacity()) {
            // erased slots are the common case, not worth a log line
            if header.magic != u32::MAX {
                tracing::debug!(slot, %reason, "ignoring slot");
            }
            return Ok(None);
        }
        let mut payload = vec![0u8; header.data_size as usize];
        self.blocks.read(range.start + HEADER_SIZE as u32, &mut payload)?;
        Ok(Some((header, payload)))
    }

    fn write_record(
        &mut self,
        range: &Range<u32>,
        header: &PatternHeader,
        payload: &[u8],
    ) -> Result<(), StorageError> {
        self.clear_slot(range)?;
        self.blocks
            .program_bytes(range.start + HEADER_SIZE as u32, payload)?;
        self.blocks.program_bytes(range.start, &header.to_bytes())?;
        Ok(())
    }

    /// `Ok(None)` for an empty or invalid slot; `Err` only when the device fails.
    pub fn load(&mut self, slot: usize) -> Result<Option<PatternBundle>, StorageError> {
        let Some((header, payload)) = self.read_record(slot)? else {
            return Ok(None);
        };
        match decode(&header, &payload, slot, self.blocks.crc()) {
            Ok(bundle) => Ok(Some(bundle)),
            Err(reason) => {
                tracing::warn!(slot, %reason, "pattern slot failed validation");
                Ok(None)
            }
        }
    }

    pub fn save(&mut self, slot: usize, bundle: &PatternBundle) -> Result<(), StorageError> {
        let range = self.slot_range(slot)?;
        let (header, payload) = encode(
            bundle,
            slot,
            self.config().payload_capacity(),
            self.blocks.crc(),
        )?;
        self.write_record(&range, &header, &payload)?;
        tracing::debug!(slot, bytes = payload.len(), "pattern saved");
        Ok(())
    }

    /// The modulator bank lives in the first slot after the pattern slots.
    pub fn modulator_slot(&self) -> usize {
        self.config().used_slots()
    }

    pub fn save_modulators(&mut self, bank: &ModulatorBank) -> Result<(), StorageError> {
        let slot = self.modulator_slot();
        let range = self.slot_range(slot)?;
        let mut w = Writer::new();
        bank.write(&mut w);
        let (header, payload) = seal(
            w.finish(),
            slot,
            self.config().payload_capacity(),
            self.blocks.crc(),
        )?;
        self.write_record(&range, &header, &payload)?;
        tracing::debug!(slot, "modulators saved");
        Ok(())
    }

    /// Same contract as `load`: older saves come back with the newer fields defaulted.
    pub fn load_modulators(&mut self) -> Result<Option<ModulatorBank>, StorageError> {
        let slot = self.modulator_slot();
        let Some((header, payload)) = self.read_record(slot)? else {
            return Ok(None);
        };
        let parsed = verify(&header, &payload, slot, self.blocks.crc()).and_then(|(version, payload)| {
            let mut r = Reader::new(payload, version);
            Ok(ModulatorBank::read(&mut r)?)
        });
        match parsed {
            Ok(bank) => Ok(Some(bank)),
            Err(reason) => {
                tracing::warn!(slot, %reason, "modulator slot failed validation");
                Ok(None)
            }
        }
    }

    /// Invalidates one slot. Other slots in the same sector are kept.
    pub fn erase(&mut self, slot: usize) -> Result<(), StorageError> {
        let range = self.slot_range(slot)?;
        self.clear_slot(&range)
    }

    // Flash only erases whole sectors: snapshot every sector the slot touches,
    // erase it, then put back whatever lies outside the slot.
    fn clear_slot(&mut self, slot: &Range<u32>) -> Result<(), StorageError> {
        let first = self
            .blocks
            .sector_of(slot.start)
            .ok_or(StorageError::AddressOutOfRange {
                address: slot.start,
                len: slot.len(),
            })?;
        let last = self
            .blocks
            .sector_of(slot.end - 1)
            .ok_or(StorageError::AddressOutOfRange {
                address: slot.end - 1,
                len: 1,
            })?;

        for sector in first..=last {
            let Some(range) = self.blocks.sector_range(sector) else {
                return Err(StorageError::AddressOutOfRange {
                    address: slot.start,
                    len: slot.len(),
                });
            };
            let mut snapshot = vec![0u8; range.len()];
            self.blocks.read(range.start, &mut snapshot)?;
            self.blocks.erase(sector)?;

            let keep_before = range.start..slot.start.clamp(range.start, range.end);
            let keep_after = slot.end.clamp(range.start, range.end)..range.end;
            for keep in [keep_before, keep_after] {
                if keep.is_empty() {
                    continue;
                }
                let from = (keep.start - range.start) as usize;
                let to = (keep.end - range.start) as usize;
                self.blocks.program_bytes(keep.start, &snapshot[from..to])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::modulator::{LfoMode, Shape};
    use crate::pipeline::project::TrackPattern;
    use crate::pipeline::test_fixture::demo_bundle;
    use crate::storage::{FlashError, RamFlash};

    fn store() -> PatternStore<RamFlash> {
        let config = StorageConfig::default();
        let flash = RamFlash::for_config(&config);
        PatternStore::new(config, flash)
    }

    fn slot_address(slot: usize) -> u32 {
        StorageConfig::default().slot_address(slot).unwrap()
    }

    #[test]
    fn save_then_load_round_trips() {
        let mut store = store();
        let bundle = demo_bundle(1);
        store.save(12, &bundle).unwrap();
        assert!(store.exists(12).unwrap());
        assert_eq!(store.load(12).unwrap(), Some(bundle));
    }

    #[test]
    fn empty_slot_is_absent() {
        let mut store = store();
        assert!(!store.exists(0).unwrap());
        assert_eq!(store.load(0).unwrap(), None);
    }

    #[test]
    fn any_payload_bit_flip_reads_as_absent() {
        let mut store = store();
        store.save(3, &demo_bundle(2)).unwrap();
        let payload_start = slot_address(3) + HEADER_SIZE as u32;
        for offset in [0u32, 17, 400, 2000] {
            let mut flash = store.into_inner();
            assert!(flash.corrupt(payload_start + offset, 0x10));
            store = PatternStore::new(StorageConfig::default(), flash);
            assert_eq!(store.load(3).unwrap(), None, "flip at +{offset} went unnoticed");

            // undo and confirm the slot comes back
            let mut flash = store.into_inner();
            flash.corrupt(payload_start + offset, 0x10);
            store = PatternStore::new(StorageConfig::default(), flash);
            assert!(store.load(3).unwrap().is_some());
        }
    }

    #[test]
    fn corrupted_checksum_field_reads_as_absent() {
        let mut store = store();
        store.save(3, &demo_bundle(2)).unwrap();
        let mut flash = store.into_inner();
        flash.corrupt(slot_address(3) + 8, 0x01);
        let mut store = PatternStore::new(StorageConfig::default(), flash);
        assert_eq!(store.load(3).unwrap(), None);
    }

    #[test]
    fn oversized_payload_is_refused_before_touching_flash() {
        let config = StorageConfig {
            slot_size: 0x1000,
            ..StorageConfig::default()
        };
        let flash = RamFlash::for_config(&config);
        let mut store = PatternStore::new(config, flash);
        let err = store.save(0, &demo_bundle(0)).unwrap_err();
        assert!(matches!(
            err,
            StorageError::PayloadTooLarge { capacity: 4072, .. }
        ));
        assert_eq!(store.into_inner().stats().erases, 0);
    }

    #[test]
    fn saving_keeps_sibling_slots_in_the_sector() {
        let mut store = store();
        let a = demo_bundle(1);
        let b = demo_bundle(2);
        store.save(0, &a).unwrap();
        store.save(1, &b).unwrap();
        store.save(15, &b).unwrap();

        // slot 0, 1 and 15 share sector 7
        let c = demo_bundle(3);
        store.save(0, &c).unwrap();
        assert_eq!(store.load(0).unwrap(), Some(c));
        assert_eq!(store.load(1).unwrap(), Some(b.clone()));
        assert_eq!(store.load(15).unwrap(), Some(b.clone()));

        store.erase(0).unwrap();
        assert_eq!(store.load(0).unwrap(), None);
        assert_eq!(store.load(1).unwrap(), Some(b));
    }

    #[test]
    fn interrupted_save_leaves_slot_absent() {
        let mut store = store();
        store.save(2, &demo_bundle(1)).unwrap();

        store.block_store_mut().device_mut().fail_next_programs(1);
        let err = store.save(2, &demo_bundle(4)).unwrap_err();
        assert!(matches!(err, StorageError::Flash(FlashError::ProgramFailed(_))));
        assert_eq!(store.load(2).unwrap(), None);
    }

    #[test]
    fn read_failure_is_an_error_not_absence() {
        let mut store = store();
        store.block_store_mut().device_mut().fail_next_reads(1);
        assert!(matches!(
            store.load(0),
            Err(StorageError::Flash(FlashError::ReadFailed(_)))
        ));
    }

    #[test]
    fn slot_beyond_region_is_rejected() {
        let mut store = store();
        assert_eq!(store.slot_count(), 80);
        assert_eq!(store.load(80), Err(StorageError::NoSuchSlot(80)));
        assert_eq!(
            store.save(200, &PatternBundle::default()),
            Err(StorageError::NoSuchSlot(200))
        );
    }

    #[test]
    fn header_from_another_slot_is_rejected() {
        let mut store = store();
        store.save(4, &demo_bundle(1)).unwrap();

        // copy slot 4 wholesale into slot 5
        let raw = store
            .block_store()
            .device()
            .peek(slot_address(4), 0x2000)
            .unwrap()
            .to_vec();
        store
            .block_store_mut()
            .program_bytes(slot_address(5), &raw)
            .unwrap();
        assert!(!store.exists(5).unwrap());
        assert_eq!(store.load(5).unwrap(), None);
    }

    #[test]
    fn version_one_payload_gets_new_field_defaults() {
        // hand written V1 layout: steps have no velocity / probability bytes
        let mut payload = vec![0u8]; // note track
        payload.extend_from_slice(b"OLD\0\0\0\0\0\0");
        payload.extend_from_slice(&[0xFF, 3]); // scale -1, root 3
        payload.extend_from_slice(&24u16.to_le_bytes());
        payload.extend_from_slice(&[0, 0, 0, 63]); // reset, run mode, first, last
        for i in 0..64u32 {
            let raw: u32 = if i % 2 == 0 { 1 | (2 << 1) } else { 0 };
            payload.extend_from_slice(&raw.to_le_bytes());
            payload.extend_from_slice(&[60, 0xFF, 0xFF, 0xFF]);
        }
        payload.extend_from_slice(&[2; 7]); // remaining tracks are midi/cv

        let crc = Crc32::new();
        let header = PatternHeader {
            version: 1,
            ..PatternHeader::new(6, crc.checksum(&payload), payload.len() as u32)
        };

        let mut store = store();
        let base = slot_address(6);
        let blocks = store.block_store_mut();
        blocks.program_bytes(base + HEADER_SIZE as u32, &payload).unwrap();
        blocks.program_bytes(base, &header.to_bytes()).unwrap();

        let bundle = store.load(6).unwrap().expect("v1 slot should load");
        let seq = bundle.note(0).unwrap();
        assert_eq!(seq.name(), "OLD");
        assert_eq!(seq.root_note(), 3);
        assert_eq!(seq.divisor(), 24);
        let step = seq.steps()[0];
        assert!(step.gate());
        assert_eq!(step.length(), 2);
        assert_eq!(step.notes(), [60, -1, -1, -1]);
        assert_eq!(step.velocity(), 127);
        assert_eq!(step.probability(), 100);
        assert!(!seq.steps()[1].gate());
        assert_eq!(bundle.tracks[1], TrackPattern::MidiCv);
    }

    #[test]
    fn modulators_have_their_own_slot() {
        let mut store = store();
        assert_eq!(store.modulator_slot(), 64);
        assert_eq!(store.load_modulators().unwrap(), None);

        let bundle = demo_bundle(4);
        store.save(63, &bundle).unwrap();
        let mut bank = ModulatorBank::default();
        bank.slots[1].set_shape(Shape::Adsr);
        bank.slots[1].set_amplitude(40);
        bank.slots[6].set_mode(LfoMode::Sync);
        store.save_modulators(&bank).unwrap();

        assert_eq!(store.load_modulators().unwrap(), Some(bank));
        assert_eq!(store.load(63).unwrap(), Some(bundle));
        assert_eq!(store.load(64).unwrap(), None);
    }

    #[test]
    fn version_one_modulators_get_full_amplitude() {
        let mut bank = ModulatorBank::default();
        for m in bank.slots.iter_mut() {
            m.set_amplitude(5);
            m.set_mode(LfoMode::Retrigger);
            m.set_depth(33);
        }
        let mut w = Writer::new();
        bank.write(&mut w);
        // each record is 20 bytes; V1 had no lfo mode (byte 11) and no trailing amplitude
        let payload: Vec<u8> = w
            .finish()
            .chunks(20)
            .flat_map(|record| {
                let mut old = record[..19].to_vec();
                old.remove(11);
                old
            })
            .collect();

        let crc = Crc32::new();
        let header = PatternHeader {
            version: 1,
            ..PatternHeader::new(64, crc.checksum(&payload), payload.len() as u32)
        };
        let mut store = store();
        let base = slot_address(64);
        let blocks = store.block_store_mut();
        blocks.program_bytes(base + HEADER_SIZE as u32, &payload).unwrap();
        blocks.program_bytes(base, &header.to_bytes()).unwrap();

        let old = store.load_modulators().unwrap().expect("v1 bank should load");
        for m in &old.slots {
            assert_eq!(m.amplitude(), 127);
            assert_eq!(m.mode(), LfoMode::Free);
            assert_eq!(m.depth(), 33);
        }
    }

    #[test]
    fn decode_reports_why() {
        let crc = Crc32::new();
        let (header, mut payload) = encode(&demo_bundle(0), 9, 8000, &crc).unwrap();
        assert!(decode(&header, &payload, 9, &crc).is_ok());
        assert!(matches!(
            decode(&header, &payload, 8, &crc),
            Err(Rejection::WrongIndex { .. })
        ));
        payload[100] ^= 1;
        assert!(matches!(
            decode(&header, &payload, 9, &crc),
            Err(Rejection::ChecksumMismatch { .. })
        ));
    }
}
