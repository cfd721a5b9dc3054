//! Stateless byte subsampling codec.
//!
//! Quantizes every byte by an integer factor. Unlike the trained codecs
//! this one is lossy by construction: decoding multiplies back and the low
//! `log2(factor)` bits are gone. Useful as a cheap resolution-reduction
//! transform on dense byte fields.

use std::io::{Read, Write};

use agares_core::{Codec, DataCallback, Result};

use crate::store::{read_u64, write_u64, Persist};

/// Byte quantizer with a fixed integer factor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsampleCodec {
    factor: usize,
}

impl SubsampleCodec {
    /// Creates a codec with the given factor. A factor of zero is clamped
    /// to one so encode never divides by zero.
    pub fn new(factor: usize) -> Self {
        SubsampleCodec {
            factor: factor.max(1),
        }
    }

    /// The quantization factor.
    pub fn factor(&self) -> usize {
        self.factor
    }

    pub fn set_factor(&mut self, factor: usize) {
        self.factor = factor.max(1);
    }
}

impl Default for SubsampleCodec {
    fn default() -> Self {
        SubsampleCodec::new(1)
    }
}

impl Codec for SubsampleCodec {
    /// `gram[0]` is the factor; defaults to 1 when empty.
    fn with_gram(gram: &[usize]) -> Self {
        SubsampleCodec::new(gram.first().copied().unwrap_or(1))
    }

    /// Nothing to train.
    fn build(&mut self, _callback: DataCallback<'_>) -> Result<()> {
        Ok(())
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input
            .iter()
            .map(|&byte| (byte as usize / self.factor) as u8)
            .collect())
    }

    /// Multiplies back; products above 255 keep only the low byte.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input
            .iter()
            .map(|&byte| (byte as usize).wrapping_mul(self.factor) as u8)
            .collect())
    }
}

impl Persist for SubsampleCodec {
    fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.factor as u64)
    }

    fn load<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(SubsampleCodec::new(read_u64(reader)? as usize))
    }
}
