//! MSB-first bit packing for prefix codes
//!
//! The writer packs codes into bytes starting from the most significant bit
//! and zero-fills the unused low bits of the final byte. The reader walks a
//! byte slice bit by bit up to an explicit bit length, so padding is never
//! mistaken for data.

/// Packs variable-length codes into bytes, MSB first.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Partial byte, filled from bit 7 downwards
    current: u8,
    /// Bits used in `current` (always < 8)
    used: u8,
}

impl BitWriter {
    /// Create a writer with room for roughly `capacity` output bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            current: 0,
            used: 0,
        }
    }

    /// Append the low `len` bits of `code`, most significant first
    pub fn write_code(&mut self, code: u64, len: u8) {
        debug_assert!(len <= 64);

        for shift in (0..len).rev() {
            let bit = ((code >> shift) & 1) as u8;
            self.current |= bit << (7 - self.used);
            self.used += 1;

            if self.used == 8 {
                self.bytes.push(self.current);
                self.current = 0;
                self.used = 0;
            }
        }
    }

    /// Total number of bits written so far
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.used as usize
    }

    /// Flush the partial byte and return `(bytes, padding_bits)`
    pub fn finish(mut self) -> (Vec<u8>, u8) {
        let padding = if self.used == 0 { 0 } else { 8 - self.used };
        if self.used > 0 {
            self.bytes.push(self.current);
        }
        (self.bytes, padding)
    }
}

/// Reads single bits, MSB first, from a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
    bit_len: usize,
}

impl<'a> BitReader<'a> {
    /// Read at most `bit_len` bits from `data`
    pub fn new(data: &'a [u8], bit_len: usize) -> Self {
        Self {
            data,
            position: 0,
            bit_len: bit_len.min(data.len() * 8),
        }
    }

    /// Next bit, or `None` once `bit_len` bits have been consumed
    pub fn read_bit(&mut self) -> Option<bool> {
        if self.position >= self.bit_len {
            return None;
        }

        let byte = self.data[self.position / 8];
        let bit = (byte >> (7 - (self.position % 8))) & 1;
        self.position += 1;
        Some(bit == 1)
    }

    /// Bits consumed so far
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bits left before `bit_len`
    pub fn remaining(&self) -> usize {
        self.bit_len - self.position
    }
}
