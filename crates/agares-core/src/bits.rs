//! Double-ended bit-level buffer with byte-aligned internal storage.
//!
//! `BitBuffer` keeps three segments: loose bits pending at the front
//! (`prefix`), fully packed bytes (`data`), and loose bits pending at the
//! back (`postfix`). Pushing a ninth loose bit packs the eight oldest into
//! a byte, so the loose segments hold fewer than eight bits except
//! transiently inside a push. Packed bytes are in stream order, read
//! MSB-first.

use std::collections::VecDeque;

/// A double-ended queue of single bits.
///
/// Bits are `0` or `1` stored one per byte in the loose segments. The
/// invariant `len() == prefix + 8 * data + postfix` holds at all times.
#[derive(Debug, Clone, Default)]
pub struct BitBuffer {
    prefix: VecDeque<u8>,
    data: VecDeque<u8>,
    postfix: VecDeque<u8>,
}

impl BitBuffer {
    /// Create an empty bit buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer over pre-packed bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            prefix: VecDeque::new(),
            data: bytes.iter().copied().collect(),
            postfix: VecDeque::new(),
        }
    }

    /// Total number of bits held.
    pub fn len(&self) -> usize {
        self.prefix.len() + 8 * self.data.len() + self.postfix.len()
    }

    /// True if no bits are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all bits.
    pub fn clear(&mut self) {
        self.prefix.clear();
        self.data.clear();
        self.postfix.clear();
    }

    /// Push a bit at the front of the stream.
    pub fn push_front(&mut self, bit: u8) {
        self.prefix.push_front(bit);
        if self.prefix.len() > 8 {
            // Pack the eight bits nearest the data segment; the bit closest
            // to data becomes the least significant.
            let mut byte = 0u8;
            let mut base = 1u8;
            for _ in 0..8 {
                if let Some(bit) = self.prefix.pop_back() {
                    byte = byte.wrapping_add(bit.wrapping_mul(base));
                }
                base = base.wrapping_shl(1);
            }
            self.data.push_front(byte);
        }
    }

    /// Push a bit at the back of the stream.
    pub fn push_back(&mut self, bit: u8) {
        self.postfix.push_back(bit);
        if self.postfix.len() > 8 {
            // The bit nearest the data segment becomes the most significant.
            let mut byte = 0u8;
            let mut base = 0b1000_0000u8;
            for _ in 0..8 {
                if let Some(bit) = self.postfix.pop_front() {
                    byte = byte.wrapping_add(bit.wrapping_mul(base));
                }
                base >>= 1;
            }
            self.data.push_back(byte);
        }
    }

    /// The first bit of the stream, materializing it from packed storage
    /// if needed. Returns `None` on an empty buffer.
    pub fn front(&mut self) -> Option<u8> {
        if self.prefix.is_empty() {
            if self.data.is_empty() {
                let bit = self.postfix.pop_front()?;
                self.prefix.push_back(bit);
            } else if let Some(mut byte) = self.data.pop_front() {
                for _ in 0..8 {
                    self.prefix.push_front(byte & 1);
                    byte >>= 1;
                }
            }
        }
        self.prefix.front().copied()
    }

    /// The last bit of the stream, materializing it from packed storage
    /// if needed. Returns `None` on an empty buffer.
    pub fn back(&mut self) -> Option<u8> {
        if self.postfix.is_empty() {
            if self.data.is_empty() {
                let bit = self.prefix.pop_back()?;
                self.postfix.push_front(bit);
            } else if let Some(mut byte) = self.data.pop_back() {
                for _ in 0..8 {
                    self.postfix.push_front(byte & 1);
                    byte >>= 1;
                }
            }
        }
        self.postfix.back().copied()
    }

    /// Remove and return the first bit.
    pub fn pop_front(&mut self) -> Option<u8> {
        let bit = self.front()?;
        self.prefix.pop_front();
        Some(bit)
    }

    /// Remove and return the last bit.
    pub fn pop_back(&mut self) -> Option<u8> {
        let bit = self.back()?;
        self.postfix.pop_back();
        Some(bit)
    }

    /// Serialize all bits into bytes, MSB-first, padding the final partial
    /// byte with `pad_bit`.
    ///
    /// A prefix of exactly eight pending bits is consolidated into packed
    /// storage first; otherwise the buffer contents are left as they are,
    /// so the buffer remains usable afterwards. An empty buffer yields an
    /// empty vector; fewer than eight bits yield exactly one padded byte.
    pub fn padded_bytes(&mut self, pad_bit: u8) -> Vec<u8> {
        if self.prefix.len() == 8 {
            let mut byte = 0u8;
            let mut base = 1u8;
            for _ in 0..8 {
                if let Some(bit) = self.prefix.pop_back() {
                    byte = byte.wrapping_add(bit.wrapping_mul(base));
                }
                base = base.wrapping_shl(1);
            }
            self.data.push_front(byte);
        }

        let mut output = Vec::with_capacity(self.len() / 8 + 1);
        let mut byte = 0u8;
        // base wraps to zero after eight shifts, marking a full byte.
        let mut base = 1u8;
        let put = |bit: u8, byte: &mut u8, base: &mut u8, output: &mut Vec<u8>| {
            *byte = (*byte << 1) + bit;
            *base = base.wrapping_shl(1);
            if *base == 0 {
                output.push(*byte);
                *byte = 0;
                *base = 1;
            }
        };

        if self.prefix.is_empty() {
            output.extend(self.data.iter().copied());
        } else {
            for &bit in &self.prefix {
                put(bit, &mut byte, &mut base, &mut output);
            }
            for &data_byte in &self.data {
                let mut data_base = 0b1000_0000u8;
                for _ in 0..8 {
                    let bit = u8::from(data_byte & data_base > 0);
                    data_base >>= 1;
                    put(bit, &mut byte, &mut base, &mut output);
                }
            }
        }
        for &bit in &self.postfix {
            put(bit, &mut byte, &mut base, &mut output);
        }

        // Pad the trailing partial byte.
        while base != 1 {
            put(pad_bit, &mut byte, &mut base, &mut output);
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_both_ends() {
        let mut bits = BitBuffer::new();

        for bit in [1, 0, 0, 0, 1, 0] {
            bits.push_front(bit);
        }
        // 010001
        assert_eq!(bits.len(), 6);
        assert_eq!(bits.front(), Some(0));
        assert_eq!(bits.back(), Some(1));

        for bit in [0, 1, 1, 0, 1, 1] {
            bits.push_back(bit);
        }
        // 010001011011
        assert_eq!(bits.len(), 12);
        assert_eq!(bits.front(), Some(0));
        assert_eq!(bits.back(), Some(1));

        assert_eq!(bits.pop_front(), Some(0));
        assert_eq!(bits.len(), 11);
        assert_eq!(bits.pop_front(), Some(1));
        assert_eq!(bits.len(), 10);
        assert_eq!(bits.pop_back(), Some(1));
        assert_eq!(bits.len(), 9);
        assert_eq!(bits.pop_back(), Some(1));
        assert_eq!(bits.len(), 8);
        assert_eq!(bits.back(), Some(0));

        bits.clear();
        assert_eq!(bits.len(), 0);
        assert_eq!(bits.pop_front(), None);
        assert_eq!(bits.pop_back(), None);
    }

    #[test]
    fn test_padded_bytes_front_pushes() {
        let mut bits = BitBuffer::new();
        for bit in [1, 0, 0, 1, 1, 0] {
            bits.push_front(bit);
        }
        assert_eq!(bits.len(), 6);
        // 011001--
        assert_eq!(bits.padded_bytes(0), vec![0b0110_0100]);

        for bit in [1, 0, 1, 1] {
            bits.push_front(bit);
        }
        assert_eq!(bits.len(), 10);
        // 11 01011001 -
        assert_eq!(bits.padded_bytes(1), vec![0b1101_0110, 0b0111_1111]);

        for bit in [0, 1, 1, 0] {
            bits.push_back(bit);
        }
        assert_eq!(bits.len(), 14);
        assert_eq!(bits.padded_bytes(0), vec![0b1101_0110, 0b0101_1000]);

        for bit in [0, 1, 0, 0, 1, 0] {
            bits.push_back(bit);
        }
        assert_eq!(bits.len(), 20);
        assert_eq!(
            bits.padded_bytes(0),
            vec![0b1101_0110, 0b0101_1001, 0b0010_0000]
        );
    }

    #[test]
    fn test_padded_bytes_back_pushes() {
        let mut bits = BitBuffer::new();
        for bit in [0, 1, 0, 0, 1, 0, 0, 1, 1, 0] {
            bits.push_back(bit);
        }
        assert_eq!(bits.len(), 10);
        assert_eq!(bits.padded_bytes(0), vec![0b0100_1001, 0b1000_0000]);

        for bit in [0, 1, 1, 1, 1, 0, 0, 0, 1, 0] {
            bits.push_back(bit);
        }
        assert_eq!(bits.len(), 20);
        assert_eq!(
            bits.padded_bytes(0),
            vec![0b0100_1001, 0b1001_1110, 0b0010_0000]
        );

        for bit in [0, 1, 0, 0, 1, 0, 1, 1] {
            bits.push_front(bit);
        }
        assert_eq!(bits.len(), 28);
        assert_eq!(
            bits.padded_bytes(0),
            vec![0b1101_0010, 0b0100_1001, 0b1001_1110, 0b0010_0000]
        );
    }

    #[test]
    fn test_empty_buffer_yields_no_bytes() {
        let mut bits = BitBuffer::new();
        assert!(bits.is_empty());
        assert!(bits.padded_bytes(1).is_empty());
    }

    #[test]
    fn test_front_borrows_from_postfix() {
        let mut bits = BitBuffer::new();
        bits.push_back(1);
        assert_eq!(bits.front(), Some(1));
        assert_eq!(bits.pop_front(), Some(1));
        assert!(bits.is_empty());
    }
}
