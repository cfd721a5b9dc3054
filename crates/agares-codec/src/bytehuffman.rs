//! Byte-granular Huffman codec over fixed-size byte grams.
//!
//! A 256-ary variant of the Huffman codec: codes are byte strings rather
//! than bit strings, so encode and decode never touch a bit buffer. The
//! price is coarser codes; the payoff is much faster coding and a decoder
//! that is a plain byte-indexed trie walk.
//!
//! The reserved unknown symbol is assigned frequency zero so it lands on
//! the longest code. Encoding emits it once per run of unrecognized grams
//! and for the trailing partial gram; decoding it produces no output, so
//! out-of-vocabulary data decodes to a subsequence of the input.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::io::{Read, Write};

use tracing::debug;

use agares_core::{Codec, DataCallback, Error, Result, Symbol};

use crate::store::{
    read_bytes, read_f64, read_u64, write_bytes, write_f64, write_u64, Persist,
};

/// Arity of the code tree. One child per byte value.
const ARITY: usize = 256;

/// Decoder trie node. Leaves carry the symbol whose text they emit.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    key: Symbol,
    value: f64,
    children: Vec<Node>,
}

impl Node {
    fn leaf(key: Symbol, value: f64) -> Self {
        Node {
            key,
            value,
            children: Vec::new(),
        }
    }
}

/// Min-heap adapter ordered by frequency, then by key for determinism.
struct HeapEntry(Node);

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
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .0
            .value
            .total_cmp(&self.0.value)
            .then_with(|| other.0.key.cmp(&self.0.key))
    }
}

/// Trained 256-ary Huffman codec.
#[derive(Debug, Clone)]
pub struct BytehuffmanCodec {
    gram: usize,
    frequency: HashMap<Symbol, f64>,
    code: HashMap<Symbol, Vec<u8>>,
    tree: Node,
}

impl BytehuffmanCodec {
    /// Creates an untrained codec for the given gram length. Zero is
    /// clamped to one.
    pub fn new(gram: usize) -> Self {
        BytehuffmanCodec {
            gram: gram.max(1),
            frequency: HashMap::new(),
            code: HashMap::new(),
            tree: Node::leaf(Symbol::Unknown, 0.0),
        }
    }

    pub fn gram(&self) -> usize {
        self.gram
    }

    pub fn frequency(&self) -> &HashMap<Symbol, f64> {
        &self.frequency
    }

    pub fn code(&self) -> &HashMap<Symbol, Vec<u8>> {
        &self.code
    }

    /// Replaces the trained tables and rebuilds the decoder trie.
    pub fn set_tables(
        &mut self,
        frequency: HashMap<Symbol, f64>,
        code: HashMap<Symbol, Vec<u8>>,
    ) -> Result<()> {
        self.frequency = frequency;
        self.code = code;
        self.tree = Self::build_tree_from_code(&self.frequency, &self.code)?;
        Ok(())
    }

    /// Counts aligned grams across the corpus and normalizes to relative
    /// frequencies. The unknown symbol is added with frequency zero so it
    /// receives the longest code.
    fn build_frequency_from_data(
        &self,
        callback: DataCallback<'_>,
    ) -> Result<HashMap<Symbol, f64>> {
        let mut count: HashMap<Symbol, u64> = HashMap::new();
        let mut total = 0u64;
        while let Some(input) = callback()? {
            let mut i = 0;
            while i + self.gram <= input.len() {
                let key = Symbol::Gram(input[i..i + self.gram].to_vec());
                *count.entry(key).or_insert(0) += 1;
                total += 1;
                i += self.gram;
            }
        }

        let mut frequency: HashMap<Symbol, f64> = count
            .into_iter()
            .map(|(key, n)| (key, n as f64 / total as f64))
            .collect();
        frequency.insert(Symbol::Unknown, 0.0);
        Ok(frequency)
    }

    /// Merges the lowest-frequency nodes 256 at a time. A first merge of
    /// `len % 255` nodes brings the queue to one modulo 255 so the final
    /// reduction lands on exactly one root.
    fn build_tree_from_frequency(frequency: &HashMap<Symbol, f64>) -> Node {
        let mut queue: BinaryHeap<HeapEntry> = frequency
            .iter()
            .map(|(key, &value)| HeapEntry(Node::leaf(key.clone(), value)))
            .collect();

        if queue.len() % 255 != 1 {
            let residual = queue.len() % 255;
            let mut node = Node::leaf(Symbol::Unknown, 0.0);
            for _ in 0..residual {
                if let Some(HeapEntry(child)) = queue.pop() {
                    node.value += child.value;
                    node.children.push(child);
                }
            }
            queue.push(HeapEntry(node));
        }
        while queue.len() > 1 {
            let mut node = Node::leaf(Symbol::Unknown, 0.0);
            for _ in 0..ARITY {
                match queue.pop() {
                    Some(HeapEntry(child)) => {
                        node.value += child.value;
                        node.children.push(child);
                    }
                    None => break,
                }
            }
            queue.push(HeapEntry(node));
        }

        match queue.pop() {
            Some(HeapEntry(root)) => root,
            None => Node::leaf(Symbol::Unknown, 0.0),
        }
    }

    /// Reads byte codes off the trie, one byte per level.
    fn build_code_from_tree(tree: &Node) -> HashMap<Symbol, Vec<u8>> {
        fn walk(node: &Node, prefix: &mut Vec<u8>, code: &mut HashMap<Symbol, Vec<u8>>) {
            if node.children.is_empty() {
                code.insert(node.key.clone(), prefix.clone());
            } else {
                for (i, child) in node.children.iter().enumerate() {
                    prefix.push(i as u8);
                    walk(child, prefix, code);
                    prefix.pop();
                }
            }
        }

        let mut code = HashMap::new();
        walk(tree, &mut Vec::new(), &mut code);
        code
    }

    /// Rebuilds the decoder trie by replaying every code path, growing
    /// placeholder children as needed.
    fn build_tree_from_code(
        frequency: &HashMap<Symbol, f64>,
        code: &HashMap<Symbol, Vec<u8>>,
    ) -> Result<Node> {
        let mut tree = Node::leaf(Symbol::Unknown, 0.0);
        let mut keys: Vec<&Symbol> = code.keys().collect();
        keys.sort();
        for key in keys {
            let value = *frequency
                .get(key)
                .ok_or_else(|| Error::corrupted("code table key missing from frequency table"))?;
            let mut current = &mut tree;
            for &byte in &code[key] {
                let index = byte as usize;
                current.value += value;
                while current.children.len() <= index {
                    current.children.push(Node::leaf(Symbol::Unknown, 0.0));
                }
                current = &mut current.children[index];
            }
            current.key = key.clone();
            current.value = value;
        }
        Ok(tree)
    }

    fn unrecognized_code(&self) -> Result<&Vec<u8>> {
        self.code
            .get(&Symbol::Unknown)
            .ok_or(Error::NotBuilt("bytehuffman code table"))
    }
}

impl Codec for BytehuffmanCodec {
    /// `gram[0]` is the gram length; defaults to 1 when empty.
    fn with_gram(gram: &[usize]) -> Self {
        BytehuffmanCodec::new(gram.first().copied().unwrap_or(1))
    }

    fn build(&mut self, callback: DataCallback<'_>) -> Result<()> {
        self.frequency = self.build_frequency_from_data(callback)?;
        self.tree = Self::build_tree_from_frequency(&self.frequency);
        self.code = Self::build_code_from_tree(&self.tree);
        debug!(
            gram = self.gram,
            symbols = self.code.len(),
            "built bytehuffman code table"
        );
        Ok(())
    }

    /// Replaces each recognized aligned gram with its byte code. A run of
    /// unrecognized bytes, and any trailing partial gram, is condensed to
    /// a single unknown code.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let unrecognized_code = self.unrecognized_code()?;

        let mut output = Vec::new();
        let mut unrecognized_gram = false;
        let mut i = 0;
        while i < input.len() {
            if i + self.gram <= input.len() {
                let key = Symbol::Gram(input[i..i + self.gram].to_vec());
                if let Some(code) = self.code.get(&key) {
                    if unrecognized_gram {
                        output.extend_from_slice(unrecognized_code);
                    }
                    output.extend_from_slice(code);
                    unrecognized_gram = false;
                    i += self.gram;
                } else {
                    unrecognized_gram = true;
                    i += 1;
                }
            } else {
                // Trailing partial gram, absorbs any pending unknown run.
                output.extend_from_slice(unrecognized_code);
                unrecognized_gram = false;
                i = input.len();
            }
        }
        if unrecognized_gram {
            output.extend_from_slice(unrecognized_code);
        }
        Ok(output)
    }

    /// Walks the trie one input byte per level, emitting the leaf symbol's
    /// text and restarting at the root.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        if self.code.is_empty() {
            return Err(Error::NotBuilt("bytehuffman tree"));
        }
        let mut output = Vec::new();
        let mut current = &self.tree;
        for &byte in input {
            current = current
                .children
                .get(byte as usize)
                .ok_or_else(|| Error::corrupted("byte code walks off the tree"))?;
            if current.children.is_empty() {
                output.extend_from_slice(current.key.text());
                current = &self.tree;
            }
        }
        Ok(output)
    }
}

impl Persist for BytehuffmanCodec {
    fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.gram as u64)?;

        let mut frequency: Vec<(&Symbol, f64)> =
            self.frequency.iter().map(|(k, &v)| (k, v)).collect();
        frequency.sort_by(|a, b| a.0.cmp(b.0));
        write_u64(writer, frequency.len() as u64)?;
        for (symbol, value) in frequency {
            write_bytes(writer, symbol.as_bytes())?;
            write_f64(writer, value)?;
        }

        let mut code: Vec<(&Symbol, &Vec<u8>)> = self.code.iter().collect();
        code.sort_by(|a, b| a.0.cmp(b.0));
        write_u64(writer, code.len() as u64)?;
        for (symbol, bytes) in code {
            write_bytes(writer, symbol.as_bytes())?;
            write_bytes(writer, bytes)?;
        }
        Ok(())
    }

    fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let gram = read_u64(reader)? as usize;

        let frequency_count = read_u64(reader)? as usize;
        let mut frequency = HashMap::with_capacity(frequency_count);
        for _ in 0..frequency_count {
            let key = Symbol::from_bytes(read_bytes(reader)?);
            let value = read_f64(reader)?;
            frequency.insert(key, value);
        }

        let code_count = read_u64(reader)? as usize;
        let mut code = HashMap::with_capacity(code_count);
        for _ in 0..code_count {
            let key = Symbol::from_bytes(read_bytes(reader)?);
            let bytes = read_bytes(reader)?;
            code.insert(key, bytes);
        }

        let mut codec = BytehuffmanCodec::new(gram);
        codec.set_tables(frequency, code)?;
        Ok(codec)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::store::tests::roundtrip;

    fn corpus() -> Vec<&'static [u8]> {
        vec![
            b"hello world!",
            b"bytesteady",
            b"text classification and tagging",
        ]
    }

    fn corpus_callback(position: &mut usize) -> Result<Option<Vec<u8>>> {
        let data = corpus();
        if *position >= data.len() {
            *position = 0;
            return Ok(None);
        }
        let input = data[*position].to_vec();
        *position += 1;
        Ok(Some(input))
    }

    fn built(gram: usize) -> BytehuffmanCodec {
        let mut codec = BytehuffmanCodec::new(gram);
        let mut position = 0;
        codec
            .build(&mut || corpus_callback(&mut position))
            .unwrap();
        codec
    }

    #[test]
    fn test_frequency_sums_to_one() {
        let codec = built(2);
        assert_eq!(codec.frequency()[&Symbol::Unknown], 0.0);
        let total: f64 = codec.frequency().values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_has_longest_code() {
        let codec = built(1);
        let unknown_len = codec.code()[&Symbol::Unknown].len();
        for bytes in codec.code().values() {
            assert!(bytes.len() <= unknown_len);
        }
    }

    #[test]
    fn test_roundtrip_in_dictionary() {
        let codec = built(1);
        for input in corpus() {
            let encoded = codec.encode(input).unwrap();
            assert_eq!(codec.decode(&encoded).unwrap(), input);
        }
    }

    #[test]
    fn test_out_of_vocabulary_decodes_to_subsequence() {
        let codec = built(1);
        let input: &[u8] = b"A quick brown fox jumps over the lazy dog.";
        let encoded = codec.encode(input).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert!(encoded.len() <= input.len());

        let known: HashSet<u8> = corpus().concat().into_iter().collect();
        let expected: Vec<u8> = input
            .iter()
            .copied()
            .filter(|byte| known.contains(byte))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_trailing_partial_gram_dropped() {
        let codec = built(2);
        // Odd-length input from the corpus alphabet: the final byte cannot
        // form a full gram and is condensed to the unknown code.
        let input: &[u8] = b"bytes";
        let encoded = codec.encode(input).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, b"byte");
    }

    #[test]
    fn test_rebuilt_tree_matches() {
        let codec = built(2);
        let mut other = BytehuffmanCodec::new(2);
        other
            .set_tables(codec.frequency().clone(), codec.code().clone())
            .unwrap();
        for input in corpus() {
            let encoded = codec.encode(input).unwrap();
            assert_eq!(other.decode(&encoded).unwrap(), codec.decode(&encoded).unwrap());
        }
    }

    #[test]
    fn test_unbuilt_codec_errors() {
        let codec = BytehuffmanCodec::new(1);
        assert!(matches!(codec.encode(b"x"), Err(Error::NotBuilt(_))));
        assert!(matches!(codec.decode(b"x"), Err(Error::NotBuilt(_))));
    }

    #[test]
    fn test_persistence_roundtrip() {
        let codec = built(2);
        let loaded = roundtrip(&codec);
        assert_eq!(loaded.gram(), codec.gram());
        assert_eq!(loaded.frequency(), codec.frequency());
        assert_eq!(loaded.code(), codec.code());
        for input in corpus() {
            let encoded = codec.encode(input).unwrap();
            assert_eq!(loaded.decode(&encoded).unwrap(), codec.decode(&encoded).unwrap());
        }
    }
}
