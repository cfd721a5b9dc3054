//! Core data model: grams, symbols, record fields.

use serde::{Deserialize, Serialize};

/// A gram is a short byte string, the atomic unit codecs count and replace.
pub type Gram = Vec<u8>;

/// A dictionary symbol in a gram-to-code mapping.
///
/// `Unknown` is the reserved pad/unknown entry. The original tables keyed it
/// by the empty string; a dedicated variant keeps it from colliding with a
/// legitimately empty gram. It serializes as an empty key on disk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Symbol {
    /// The reserved unknown-gram / pad entry.
    Unknown,
    /// A concrete gram from the training corpus.
    Gram(Gram),
}

impl Symbol {
    /// Byte representation used by the on-disk table format.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Symbol::Unknown => &[],
            Symbol::Gram(gram) => gram,
        }
    }

    /// Reconstruct a symbol from its on-disk byte representation.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            Symbol::Unknown
        } else {
            Symbol::Gram(bytes)
        }
    }

    /// Clear-text bytes emitted when this symbol is decoded.
    /// The unknown symbol decodes to nothing.
    pub fn text(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// An index/weight pair, as found in index fields and labels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexPair {
    /// Feature or class index.
    pub index: u64,
    /// Associated weight, 1.0 unless written explicitly.
    pub weight: f64,
}

impl IndexPair {
    pub fn new(index: u64, weight: f64) -> Self {
        Self { index, weight }
    }
}

/// One record field: either sparse indices or a raw byte payload.
///
/// Only `Bytes` fields pass through codecs; `Index` fields are copied
/// through the pipeline untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Sparse (index, weight) pairs.
    Index(Vec<IndexPair>),
    /// Raw byte payload.
    Bytes(Vec<u8>),
}

impl Field {
    /// Borrow the byte payload, if this is a bytes field.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Field::Bytes(bytes) => Some(bytes),
            Field::Index(_) => None,
        }
    }
}

/// Declared format of each record field in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldFormat {
    /// `idx[:weight]` comma list.
    Index,
    /// Lowercase hex byte string.
    Bytes,
}

/// One dataset record: fields, label, and its 0-based position in the file.
#[derive(Debug, Clone)]
pub struct Sample {
    pub fields: Vec<Field>,
    pub label: IndexPair,
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_bytes_roundtrip() {
        let gram = Symbol::Gram(b"ab".to_vec());
        assert_eq!(gram.as_bytes(), b"ab");
        assert_eq!(Symbol::from_bytes(b"ab".to_vec()), gram);
        assert_eq!(Symbol::from_bytes(Vec::new()), Symbol::Unknown);
        assert!(Symbol::Unknown.text().is_empty());
    }

    #[test]
    fn test_field_as_bytes() {
        let bytes = Field::Bytes(vec![1, 2, 3]);
        assert_eq!(bytes.as_bytes(), Some(&[1u8, 2, 3][..]));
        let index = Field::Index(vec![IndexPair::new(7, 1.0)]);
        assert_eq!(index.as_bytes(), None);
    }
}
