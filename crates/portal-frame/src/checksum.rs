//! CRC-16/ARC.
//!
//! Used only to tell whether a payload is the same as the last one seen.
//! It is not an integrity check and the codec never verifies it.

const POLY: u16 = 0xA001;

static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-16/ARC of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut hasher = Crc16::new();
    hasher.update(data);
    hasher.finish()
}

/// Incremental CRC-16/ARC.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc16 {
    crc: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.crc = (self.crc >> 8) ^ TABLE[usize::from((self.crc ^ u16::from(byte)) & 0xFF)];
        }
    }

    pub fn finish(&self) -> u16 {
        self.crc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16(b"123456789"), 0xBB3D);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(crc16(b""), 0);
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = Crc16::new();
        hasher.update(b"1234");
        hasher.update(b"56789");
        assert_eq!(hasher.finish(), crc16(b"123456789"));
    }

    #[test]
    fn distinguishes_different_payloads() {
        assert_ne!(crc16(b"hello"), crc16(b"world"));
        assert_eq!(crc16(b"hello"), crc16(b"hello"));
    }
}
