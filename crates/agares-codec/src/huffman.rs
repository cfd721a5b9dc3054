//! Bit-level Huffman codec over byte-grams of one or more lengths.
//!
//! The codec counts gram-aligned occurrences of every configured gram
//! length, builds a single Huffman tree over all of them, and encodes with
//! a greedy longest-match-first choice per byte position. The reserved
//! unknown gram is given frequency [`UNKNOWN_FREQUENCY`], larger than any
//! real frequency share, which forces it into a one-bit code - that bit
//! doubles as the pad bit for the final partial byte and as the fallback
//! code for out-of-vocabulary bytes.
//!
//! The greedy multi-length choice is a local optimum per position, not a
//! global shortest-encoding search; this is deliberate and must stay so
//! for encode/decode parity with existing dictionaries.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::io::{Read, Write};

use tracing::debug;

use agares_core::{BitBuffer, Codec, DataCallback, Error, Result, Symbol};

use crate::store::{
    read_bytes, read_f64, read_u64, write_bytes, write_f64, write_u64, Persist,
};

/// Reserved frequency of the unknown gram. Relative frequencies of real
/// grams sum to at most 1.0 per configured length, so 2.0 always wins the
/// last heap merge and ends up one bit from the root.
pub const UNKNOWN_FREQUENCY: f64 = 2.0;

/// Arena node of the Huffman tree. Leaves carry the decoded symbol;
/// internal nodes carry both child handles.
#[derive(Debug, Clone)]
struct Node {
    symbol: Symbol,
    value: f64,
    left: Option<usize>,
    right: Option<usize>,
}

impl Node {
    fn leaf(symbol: Symbol, value: f64) -> Self {
        Self {
            symbol,
            value,
            left: None,
            right: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Min-heap entry during tree construction.
struct HeapEntry {
    value: f64,
    /// Smallest symbol in the entry's subtree; breaks frequency ties so
    /// the same corpus always builds the same tree.
    symbol: Symbol,
    node: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Reversed so the std max-heap pops the smallest frequency.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .value
            .total_cmp(&self.value)
            .then_with(|| other.symbol.cmp(&self.symbol))
    }
}

/// Frequency-weighted prefix-free bit code over byte-grams.
#[derive(Debug, Clone, Default)]
pub struct HuffmanCodec {
    gram: Vec<usize>,
    frequency: HashMap<Symbol, f64>,
    table: HashMap<Symbol, Vec<u8>>,
    /// Tree arena; root at index 0 when non-empty. Not persisted -
    /// rebuilt from the tables after load.
    tree: Vec<Node>,
}

impl HuffmanCodec {
    /// Create a codec for the given gram lengths (defaults to `[1]`).
    pub fn new(gram: Vec<usize>) -> Self {
        let gram = if gram.is_empty() { vec![1] } else { gram };
        Self {
            gram,
            ..Self::default()
        }
    }

    /// Configured gram lengths.
    pub fn gram(&self) -> &[usize] {
        &self.gram
    }

    /// Gram frequency table, including the unknown sentinel.
    pub fn frequency(&self) -> &HashMap<Symbol, f64> {
        &self.frequency
    }

    /// Gram-to-bit-code table.
    pub fn table(&self) -> &HashMap<Symbol, Vec<u8>> {
        &self.table
    }

    /// Install tables directly (e.g. after deserialization) and rebuild
    /// the decode tree from them.
    pub fn set_tables(
        &mut self,
        frequency: HashMap<Symbol, f64>,
        table: HashMap<Symbol, Vec<u8>>,
    ) -> Result<()> {
        self.tree = Self::build_tree_from_table(&frequency, &table)?;
        self.frequency = frequency;
        self.table = table;
        Ok(())
    }

    fn build_frequency_from_data(
        &self,
        callback: DataCallback<'_>,
    ) -> Result<HashMap<Symbol, f64>> {
        let mut total = 0usize;
        let mut count: HashMap<Vec<u8>, usize> = HashMap::new();
        while let Some(input) = callback()? {
            for &g in &self.gram {
                if g == 0 || input.len() < g {
                    continue;
                }
                let mut j = 0;
                while j + g <= input.len() {
                    *count.entry(input[j..j + g].to_vec()).or_insert(0) += 1;
                    total += 1;
                    j += g;
                }
            }
        }

        let mut frequency = HashMap::with_capacity(count.len() + 1);
        for (gram, occurrences) in count {
            frequency.insert(Symbol::Gram(gram), occurrences as f64 / total as f64);
        }
        // The unknown gram gets a one-bit code, also used for padding.
        frequency.insert(Symbol::Unknown, UNKNOWN_FREQUENCY);
        Ok(frequency)
    }

    fn build_tree_from_frequency(frequency: &HashMap<Symbol, f64>) -> Vec<Node> {
        let mut arena: Vec<Node> = Vec::with_capacity(2 * frequency.len());
        let mut heap = BinaryHeap::with_capacity(frequency.len());
        for (symbol, &value) in frequency {
            arena.push(Node::leaf(symbol.clone(), value));
            heap.push(HeapEntry {
                value,
                symbol: symbol.clone(),
                node: arena.len() - 1,
            });
        }

        while heap.len() > 1 {
            // The smaller frequency goes right, giving code 1.
            let right = match heap.pop() {
                Some(entry) => entry,
                None => break,
            };
            let left = match heap.pop() {
                Some(entry) => entry,
                None => break,
            };
            let value = left.value + right.value;
            arena.push(Node {
                symbol: Symbol::Unknown,
                value,
                left: Some(left.node),
                right: Some(right.node),
            });
            heap.push(HeapEntry {
                value,
                symbol: left.symbol.min(right.symbol),
                node: arena.len() - 1,
            });
        }

        match heap.pop() {
            Some(root) => Self::reindex(&arena, root.node),
            None => Vec::new(),
        }
    }

    /// Rewrite an arena in preorder so the root lands at index 0.
    fn reindex(arena: &[Node], root: usize) -> Vec<Node> {
        fn copy(arena: &[Node], index: usize, output: &mut Vec<Node>) -> usize {
            let slot = output.len();
            output.push(Node::leaf(arena[index].symbol.clone(), arena[index].value));
            if let Some(left) = arena[index].left {
                let child = copy(arena, left, output);
                output[slot].left = Some(child);
            }
            if let Some(right) = arena[index].right {
                let child = copy(arena, right, output);
                output[slot].right = Some(child);
            }
            slot
        }

        let mut output = Vec::with_capacity(arena.len());
        copy(arena, root, &mut output);
        output
    }

    fn build_table_from_tree(tree: &[Node]) -> HashMap<Symbol, Vec<u8>> {
        fn walk(tree: &[Node], index: usize, prefix: Vec<u8>, table: &mut HashMap<Symbol, Vec<u8>>) {
            let node = &tree[index];
            if node.is_leaf() {
                table.insert(node.symbol.clone(), prefix);
                return;
            }
            if let Some(left) = node.left {
                let mut left_prefix = prefix.clone();
                left_prefix.push(0);
                walk(tree, left, left_prefix, table);
            }
            if let Some(right) = node.right {
                let mut right_prefix = prefix;
                right_prefix.push(1);
                walk(tree, right, right_prefix, table);
            }
        }

        let mut table = HashMap::new();
        if !tree.is_empty() {
            walk(tree, 0, Vec::new(), &mut table);
        }
        table
    }

    /// Replay a code table into a tree isomorphic to the one the table was
    /// derived from. Keys and values must match the frequency table.
    fn build_tree_from_table(
        frequency: &HashMap<Symbol, f64>,
        table: &HashMap<Symbol, Vec<u8>>,
    ) -> Result<Vec<Node>> {
        let mut tree = vec![Node::leaf(Symbol::Unknown, 0.0)];
        for (symbol, code) in table {
            let value = *frequency
                .get(symbol)
                .ok_or_else(|| Error::corrupted("code table key missing from frequency table"))?;
            let mut current = 0usize;
            for &bit in code {
                tree[current].value += value;
                let child = if bit == 0 {
                    tree[current].left
                } else {
                    tree[current].right
                };
                current = match child {
                    Some(index) => index,
                    None => {
                        tree.push(Node::leaf(Symbol::Unknown, 0.0));
                        let index = tree.len() - 1;
                        if bit == 0 {
                            tree[current].left = Some(index);
                        } else {
                            tree[current].right = Some(index);
                        }
                        index
                    }
                };
            }
            tree[current].symbol = symbol.clone();
            tree[current].value = value;
        }
        Ok(tree)
    }

    fn pad_bit(&self) -> Result<u8> {
        self.table
            .get(&Symbol::Unknown)
            .and_then(|code| code.first().copied())
            .ok_or(Error::NotBuilt("huffman code table"))
    }

    fn encode_single_gram_length(&self, input: &[u8], gram_length: usize) -> Result<Vec<u8>> {
        let pad_bit = self.pad_bit()?;
        let mut bits = BitBuffer::new();
        let mut i = 0;
        while i < input.len() {
            if i + gram_length <= input.len() {
                let key = Symbol::Gram(input[i..i + gram_length].to_vec());
                if let Some(code) = self.table.get(&key) {
                    for &bit in code {
                        bits.push_back(bit);
                    }
                    i += gram_length;
                    continue;
                }
            }
            bits.push_back(pad_bit);
            i += 1;
        }
        Ok(bits.padded_bytes(pad_bit))
    }

    fn encode_multi_gram_length(
        &self,
        input: &[u8],
        min_gram: usize,
        max_gram: usize,
    ) -> Result<Vec<u8>> {
        let pad_bit = self.pad_bit()?;

        // bits[j] holds the encoding of the input up to byte i - max_gram + j.
        let mut bits: VecDeque<BitBuffer> = (0..max_gram).map(|_| BitBuffer::new()).collect();
        let mut i = min_gram - 1;
        while i < input.len() {
            // Greedy choice: among the gram lengths ending at this byte,
            // pick the one minimizing accumulated prefix bits + code bits.
            let mut best_gram = 0usize;
            let mut best_length = usize::MAX;
            let mut best_code: Option<&Vec<u8>> = None;
            for &g in &self.gram {
                if g == 0 || g > i + 1 {
                    continue;
                }
                let key = Symbol::Gram(input[i + 1 - g..=i].to_vec());
                if let Some(code) = self.table.get(&key) {
                    let total = bits[max_gram - g].len() + code.len();
                    if best_length > total {
                        best_length = total;
                        best_gram = g;
                        best_code = Some(code);
                    }
                }
            }

            let current = if let Some(code) = best_code {
                let mut current = bits[max_gram - best_gram].clone();
                for &bit in code {
                    current.push_back(bit);
                }
                current
            } else {
                // No gram matched; the pad bit encodes this byte.
                let mut current = bits[bits.len() - 1].clone();
                current.push_back(pad_bit);
                current
            };
            bits.pop_front();
            bits.push_back(current);
            i += 1;
        }

        let mut last = bits.pop_back().unwrap_or_default();
        Ok(last.padded_bytes(pad_bit))
    }
}

impl Codec for HuffmanCodec {
    fn with_gram(gram: &[usize]) -> Self {
        Self::new(gram.to_vec())
    }

    fn build(&mut self, callback: DataCallback<'_>) -> Result<()> {
        self.frequency = self.build_frequency_from_data(callback)?;
        self.tree = Self::build_tree_from_frequency(&self.frequency);
        self.table = Self::build_table_from_tree(&self.tree);
        debug!(
            grams = self.frequency.len() - 1,
            lengths = ?self.gram,
            "built huffman dictionary"
        );
        Ok(())
    }

    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let lengths = self.gram.iter().copied().filter(|&g| g > 0);
        let min_gram = lengths.clone().min().unwrap_or(1);
        let max_gram = lengths.max().unwrap_or(1);
        if min_gram == max_gram {
            self.encode_single_gram_length(input, min_gram)
        } else {
            self.encode_multi_gram_length(input, min_gram, max_gram)
        }
    }

    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        if self.tree.is_empty() {
            return Err(Error::NotBuilt("huffman tree"));
        }
        let mut output = Vec::new();
        let mut current = 0usize;
        for &byte in input {
            let mut base = 0b1000_0000u8;
            for _ in 0..8 {
                let bit = byte & base > 0;
                base >>= 1;
                let next = if bit {
                    self.tree[current].right
                } else {
                    self.tree[current].left
                };
                // Trailing pad bits either complete a final symbol or
                // dead-end mid-path; a mid-path end is silently dropped.
                current = next.ok_or_else(|| Error::corrupted("bit code walks off the tree"))?;
                let node = &self.tree[current];
                if node.is_leaf() {
                    output.extend_from_slice(node.symbol.text());
                    current = 0;
                }
            }
        }
        Ok(output)
    }
}

impl Persist for HuffmanCodec {
    fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.gram.len() as u64)?;
        for &g in &self.gram {
            write_u64(writer, g as u64)?;
        }

        let mut frequency: Vec<(&Symbol, &f64)> = self.frequency.iter().collect();
        frequency.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        write_u64(writer, frequency.len() as u64)?;
        for (symbol, &value) in frequency {
            write_bytes(writer, symbol.as_bytes())?;
            write_f64(writer, value)?;
        }

        let mut table: Vec<(&Symbol, &Vec<u8>)> = self.table.iter().collect();
        table.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
        write_u64(writer, table.len() as u64)?;
        for (symbol, code) in table {
            write_bytes(writer, symbol.as_bytes())?;
            // One byte per bit, matching the in-memory representation.
            write_bytes(writer, code)?;
        }
        Ok(())
    }

    fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let gram_count = read_u64(reader)? as usize;
        let mut gram = Vec::with_capacity(gram_count);
        for _ in 0..gram_count {
            gram.push(read_u64(reader)? as usize);
        }

        let frequency_count = read_u64(reader)? as usize;
        let mut frequency = HashMap::with_capacity(frequency_count);
        for _ in 0..frequency_count {
            let key = Symbol::from_bytes(read_bytes(reader)?);
            let value = read_f64(reader)?;
            frequency.insert(key, value);
        }

        let table_count = read_u64(reader)? as usize;
        let mut table = HashMap::with_capacity(table_count);
        for _ in 0..table_count {
            let key = Symbol::from_bytes(read_bytes(reader)?);
            let code = read_bytes(reader)?;
            table.insert(key, code);
        }

        let mut codec = HuffmanCodec::new(gram);
        codec.set_tables(frequency, table)?;
        Ok(codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::roundtrip;

    fn corpus() -> Vec<&'static [u8]> {
        vec![
            b"hello world!",
            b"bytesteady",
            b"text classification and tagging",
        ]
    }

    fn corpus_callback(data: Vec<&'static [u8]>) -> impl FnMut() -> Result<Option<Vec<u8>>> {
        let mut position = 0;
        move || {
            if position < data.len() {
                position += 1;
                Ok(Some(data[position - 1].to_vec()))
            } else {
                position = 0;
                Ok(None)
            }
        }
    }

    fn build_codec(gram: Vec<usize>) -> HuffmanCodec {
        let mut codec = HuffmanCodec::new(gram);
        let mut callback = corpus_callback(corpus());
        codec.build(&mut callback).unwrap();
        codec
    }

    #[test]
    fn test_unknown_gram_gets_one_bit_code() {
        let codec = build_codec(vec![1]);
        assert_eq!(codec.table()[&Symbol::Unknown].len(), 1);
    }

    #[test]
    fn test_code_table_is_prefix_free() {
        let codec = build_codec(vec![1, 2, 4]);
        let codes: Vec<&Vec<u8>> = codec.table().values().collect();
        for (i, a) in codes.iter().enumerate() {
            for (j, b) in codes.iter().enumerate() {
                if i != j {
                    assert!(
                        !(a.len() <= b.len() && b[..a.len()] == a[..]),
                        "code {a:?} is a prefix of {b:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_build_is_reproducible() {
        // Equal-frequency merges are tie-broken on symbols, so two
        // builds on the same corpus yield identical tables.
        let first = build_codec(vec![1, 2, 4]);
        let second = build_codec(vec![1, 2, 4]);
        assert_eq!(first.table(), second.table());
        assert_eq!(first.frequency(), second.frequency());
    }

    #[test]
    fn test_roundtrip_single_gram_length() {
        let codec = build_codec(vec![1]);
        let encoded = codec.encode(b"bytesteady").unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), b"bytesteady");
    }

    #[test]
    fn test_roundtrip_multi_gram_length() {
        let codec = build_codec(vec![1, 2, 4]);
        for text in corpus() {
            let encoded = codec.encode(text).unwrap();
            assert_eq!(codec.decode(&encoded).unwrap(), text, "text {text:?}");
        }
    }

    #[test]
    fn test_unknown_bytes_encode_without_error() {
        let codec = build_codec(vec![1]);
        // Bytes absent from the corpus encode as pad bits and decode to
        // the unknown symbol's empty text.
        let encoded = codec.encode(&[0xff, 0xfe]).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_encode_empty_input() {
        let codec = build_codec(vec![1]);
        assert!(codec.encode(&[]).unwrap().is_empty());
        assert!(codec.decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unbuilt_codec_encode_fails() {
        let codec = HuffmanCodec::new(vec![1]);
        assert!(matches!(codec.encode(b"x"), Err(Error::NotBuilt(_))));
    }

    #[test]
    fn test_rebuilt_tree_matches_tables() {
        let original = build_codec(vec![1, 2]);
        let mut rebuilt = HuffmanCodec::new(vec![1, 2]);
        rebuilt
            .set_tables(original.frequency().clone(), original.table().clone())
            .unwrap();

        let encoded = original.encode(b"bytesteady").unwrap();
        assert_eq!(rebuilt.encode(b"bytesteady").unwrap(), encoded);
        assert_eq!(rebuilt.decode(&encoded).unwrap(), b"bytesteady");
    }

    #[test]
    fn test_persistence_roundtrip() {
        let original = build_codec(vec![1, 2, 4]);
        let restored: HuffmanCodec = roundtrip(&original);

        assert_eq!(restored.gram(), original.gram());
        assert_eq!(restored.frequency().len(), original.frequency().len());
        assert_eq!(restored.table(), original.table());

        let encoded = original.encode(b"bytesteady").unwrap();
        assert_eq!(restored.encode(b"bytesteady").unwrap(), encoded);
        assert_eq!(restored.decode(&encoded).unwrap(), b"bytesteady");
    }
}
