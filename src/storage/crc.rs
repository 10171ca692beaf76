// Reflected CRC32 (poly 0xEDB88320, init 0xFFFFFFFF, final complement).
// Every pattern ever written to flash was stamped with this exact checksum,
// so the algorithm can never change.

const POLYNOMIAL: u32 = 0xEDB8_8320;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = (crc >> 1) ^ (POLYNOMIAL & (crc & 1).wrapping_neg());
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[derive(Clone, Debug)]
pub struct Crc32 {
    table: [u32; 256],
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    pub const fn new() -> Self {
        Self { table: build_table() }
    }

    pub fn checksum(&self, bytes: &[u8]) -> u32 {
        !self.update(0xFFFF_FFFF, bytes)
    }

    // raw register update, no init/final xor
    fn update(&self, mut crc: u32, bytes: &[u8]) -> u32 {
        for &b in bytes {
            crc = (crc >> 8) ^ self.table[((crc ^ u32::from(b)) & 0xFF) as usize];
        }
        crc
    }
}

#[cfg(test)]
mod tests {
    use super::Crc32;

    #[test]
    fn matches_reference_check_value() {
        let crc = Crc32::new();
        assert_eq!(crc.checksum(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc.checksum(b""), 0);
        assert_eq!(crc.checksum(b"The quick brown fox jumps over the lazy dog"), 0x414F_A339);
    }

    #[test]
    fn chunked_update_matches_one_shot() {
        let crc = Crc32::new();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let (a, b) = data.split_at(377);
        let chunked = !crc.update(crc.update(0xFFFF_FFFF, a), b);
        assert_eq!(chunked, crc.checksum(&data));
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let crc = Crc32::new();
        let mut data = vec![0x5Au8; 64];
        let before = crc.checksum(&data);
        data[17] ^= 0x04;
        assert_ne!(crc.checksum(&data), before);
    }
}
