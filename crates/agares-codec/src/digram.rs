//! Hierarchical digram promotion codec.
//!
//! Generalizes the byte-pair codec to variable gram lengths. Training
//! counts every sub-gram up to `gram_size` bytes inside `gram_size`-sized
//! chunks, with the count table bounded by `count_size` entries and
//! low-count eviction below `count_threshold`. Promotion then repeatedly
//! takes the highest-count digram whose clear text is not yet a symbol
//! and assigns it the next free `dict_size`-byte key, discounting the
//! sub-grams it subsumes so counts stay additive.
//!
//! Encode chunks the input at `gram_size` boundaries and applies the
//! replacement list inside each chunk; decode runs the list backwards
//! over the whole input.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use tracing::debug;

use agares_core::{Codec, DataCallback, Result};

use crate::bytepair::ReplacePair;
use crate::store::{read_bytes, read_u64, write_bytes, write_u64, Persist};

/// Trained hierarchical digram codec.
#[derive(Debug, Clone)]
pub struct DigramCodec {
    dict_size: usize,
    gram_size: usize,
    count_size: usize,
    count_threshold: u64,
    count: HashMap<Vec<u8>, u64>,
    base_gram_set: HashSet<Vec<u8>>,
    gram_text: HashMap<Vec<u8>, Vec<u8>>,
    replace: Vec<ReplacePair>,
}

/// Increments a big-endian byte counter in place. Returns 1 when the
/// counter wraps around to all zeros.
fn increase(key: &mut [u8]) -> u8 {
    for digit in (0..key.len()).rev() {
        if key[digit] == 255 {
            key[digit] = 0;
        } else {
            key[digit] += 1;
            return 0;
        }
    }
    1
}

/// Subtracts `amount` from the count of `sub`, evicting the entry when it
/// would reach zero or below.
fn discount(count: &mut HashMap<Vec<u8>, u64>, sub: &[u8], amount: u64) {
    if let Some(value) = count.get_mut(sub) {
        if amount < *value {
            *value -= amount;
        } else {
            count.remove(sub);
        }
    }
}

impl DigramCodec {
    /// Creates an untrained codec. `dict_size` is clamped to at least one;
    /// the remaining limits default to unbounded (and a zero threshold).
    pub fn new(
        dict_size: usize,
        gram_size: usize,
        count_size: usize,
        count_threshold: u64,
    ) -> Self {
        DigramCodec {
            dict_size: dict_size.max(1),
            gram_size,
            count_size,
            count_threshold,
            count: HashMap::new(),
            base_gram_set: HashSet::new(),
            gram_text: HashMap::new(),
            replace: Vec::new(),
        }
    }

    pub fn dict_size(&self) -> usize {
        self.dict_size
    }

    pub fn gram_size(&self) -> usize {
        self.gram_size
    }

    pub fn count_size(&self) -> usize {
        self.count_size
    }

    pub fn count_threshold(&self) -> u64 {
        self.count_threshold
    }

    /// The replacement list, longest source first.
    pub fn replace(&self) -> &[ReplacePair] {
        &self.replace
    }

    pub fn set_replace(&mut self, replace: Vec<ReplacePair>) {
        self.replace = replace;
    }

    /// The bounded sub-gram count table. Empty until built.
    pub fn count(&self) -> &HashMap<Vec<u8>, u64> {
        &self.count
    }

    /// Base grams that actually occur in the corpus. Empty until built.
    pub fn base_gram_set(&self) -> &HashSet<Vec<u8>> {
        &self.base_gram_set
    }

    /// Mapping from symbol keys to the clear text they stand for.
    pub fn gram_text(&self) -> &HashMap<Vec<u8>, Vec<u8>> {
        &self.gram_text
    }

    /// Replaces every dict-aligned occurrence of `source` in `output`.
    fn replace_bytes(&self, source: &[u8], target: &[u8], output: &mut Vec<u8>) {
        let mut position = 0;
        while position + source.len() <= output.len() {
            if position % self.dict_size == 0
                && output[position..position + source.len()] == *source
            {
                output.splice(position..position + source.len(), target.iter().copied());
                position += target.len();
            } else {
                position += 1;
            }
        }
    }

    /// Counts every sub-gram of length 1..=`gram_size` within each
    /// `gram_size` chunk, trimming the tail that cannot fill a whole
    /// dict-sized symbol. The table is cut back after each record once it
    /// exceeds `count_size`.
    fn build_count_from_data(&mut self, callback: DataCallback<'_>) -> Result<()> {
        self.count.clear();
        while let Some(input) = callback()? {
            let input_size = input.len() / self.dict_size * self.dict_size;
            let mut i = 0;
            while i < input_size {
                let chunk_end = i.saturating_add(self.gram_size).min(input_size);
                for j in i..chunk_end {
                    let mut g = 1;
                    while g <= self.gram_size && j + g <= chunk_end {
                        *self
                            .count
                            .entry(input[j..j + g].to_vec())
                            .or_insert(0) += 1;
                        g += 1;
                    }
                }
                i = i.saturating_add(self.gram_size);
            }
            if self.count.len() > self.count_size {
                let threshold = self.count_threshold;
                self.count.retain(|_, value| *value >= threshold);
            }
        }
        Ok(())
    }

    /// Walks the whole `dict_size`-byte key space, recording which base
    /// grams occur and discounting their count from every proper
    /// sub-gram so frequencies stay additive.
    fn build_base_gram_set_from_count(&mut self) {
        self.base_gram_set.clear();
        let mut base_gram = vec![0u8; self.dict_size];
        loop {
            if let Some(&base_count) = self.count.get(&base_gram) {
                self.base_gram_set.insert(base_gram.clone());
                let mut g = 1;
                while g <= self.gram_size && g < base_gram.len() {
                    discount(&mut self.count, &base_gram[..g], base_count);
                    g += 1;
                }
                for i in 1..base_gram.len() {
                    let mut g = 1;
                    while g <= self.gram_size && i + g <= base_gram.len() {
                        discount(&mut self.count, &base_gram[i..i + g], base_count);
                        g += 1;
                    }
                }
            }
            if increase(&mut base_gram) != 0 {
                break;
            }
        }
    }

    /// The promotion loop. Each round pairs every known symbol with every
    /// other, picks the highest-count pairing whose clear text is not yet
    /// a symbol, assigns it the next free key, and discounts the
    /// boundary-crossing sub-grams the new symbol subsumes.
    fn build_gram_text_from_count(&mut self) {
        self.gram_text.clear();
        let mut source_set: HashSet<Vec<u8>> = HashSet::new();
        for gram in &self.base_gram_set {
            self.gram_text.insert(gram.clone(), gram.clone());
            source_set.insert(gram.clone());
        }

        loop {
            // Candidate digrams over the current symbol set. Ties go to
            // the longer, then lexicographically smaller, clear text.
            let mut best: Option<(Vec<u8>, Vec<u8>, u64)> = None;
            for (left_key, left_text) in &self.gram_text {
                for right_text in self.gram_text.values() {
                    let text = [left_text.as_slice(), right_text].concat();
                    if source_set.contains(&text) {
                        continue;
                    }
                    let Some(&value) = self.count.get(&text) else {
                        continue;
                    };
                    let better = match &best {
                        None => true,
                        Some((_, best_text, best_value)) => {
                            value
                                .cmp(best_value)
                                .then_with(|| text.len().cmp(&best_text.len()))
                                .then_with(|| best_text.cmp(&text))
                                .is_gt()
                        }
                    };
                    if better {
                        best = Some((left_key.clone(), text, value));
                    }
                }
            }
            let Some((left_key, source, _)) = best else {
                break;
            };

            let mut target = vec![0u8; self.dict_size];
            let mut exhausted = false;
            while self.gram_text.contains_key(&target) {
                if increase(&mut target) != 0 {
                    exhausted = true;
                    break;
                }
            }
            if exhausted {
                break;
            }

            let left_text = self.gram_text[&left_key].clone();
            let source_count = self.count.get(&source).copied().unwrap_or(0);
            self.gram_text.insert(target, source.clone());
            source_set.insert(source.clone());

            // Discount the halves and every sub-gram crossing the join
            // boundary, excluding the source itself.
            let right_text = source[left_text.len()..].to_vec();
            discount(&mut self.count, &left_text, source_count);
            discount(&mut self.count, &right_text, source_count);
            let right_begin = left_text.len();
            let mut g = right_begin + 1;
            while g <= self.gram_size && g < source.len() {
                discount(&mut self.count, &source[..g], source_count);
                g += 1;
            }
            for i in 1..right_begin {
                let mut g = right_begin - i + 1;
                while g <= self.gram_size && i + g <= source.len() {
                    discount(&mut self.count, &source[i..i + g], source_count);
                    g += 1;
                }
            }

            // Drop promoted symbols whose text was discounted away.
            let base = &self.base_gram_set;
            let count = &self.count;
            let removed: Vec<Vec<u8>> = self
                .gram_text
                .iter()
                .filter(|(_, text)| !base.contains(*text) && !count.contains_key(*text))
                .map(|(key, _)| key.clone())
                .collect();
            for key in removed {
                if let Some(text) = self.gram_text.remove(&key) {
                    source_set.remove(&text);
                }
            }
        }
    }

    /// Orders the replacements longest clear text first.
    fn build_replace_from_gram_text(&mut self) {
        let mut replace: Vec<ReplacePair> = self
            .gram_text
            .iter()
            .filter(|(key, text)| key != text)
            .map(|(key, text)| (text.clone(), key.clone()))
            .collect();
        replace.sort_by(|a, b| {
            b.0.len()
                .cmp(&a.0.len())
                .then_with(|| a.0.cmp(&b.0))
                .then_with(|| a.1.cmp(&b.1))
        });
        self.replace = replace;
    }
}

impl Codec for DigramCodec {
    /// `gram[0]` is the dict size, `gram[1]` the max gram length,
    /// `gram[2]` the count table bound, `gram[3]` the eviction threshold.
    fn with_gram(gram: &[usize]) -> Self {
        DigramCodec::new(
            gram.first().copied().unwrap_or(1),
            gram.get(1).copied().unwrap_or(usize::MAX),
            gram.get(2).copied().unwrap_or(usize::MAX),
            gram.get(3).copied().unwrap_or(0) as u64,
        )
    }

    fn build(&mut self, callback: DataCallback<'_>) -> Result<()> {
        self.build_count_from_data(callback)?;
        self.build_base_gram_set_from_count();
        self.build_gram_text_from_count();
        self.build_replace_from_gram_text();
        debug!(
            dict_size = self.dict_size,
            symbols = self.replace.len(),
            "built digram replace list"
        );
        Ok(())
    }

    /// Applies the replacement list within each `gram_size` chunk, so no
    /// replacement straddles a chunk boundary.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(input.len());
        let mut i = 0;
        while i < input.len() {
            let end = i.saturating_add(self.gram_size).min(input.len());
            let mut chunk = input[i..end].to_vec();
            for (source, target) in &self.replace {
                self.replace_bytes(source, target, &mut chunk);
            }
            output.extend_from_slice(&chunk);
            i = i.saturating_add(self.gram_size);
        }
        Ok(output)
    }

    /// Undoes the replacement list in reverse order over the whole input.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = input.to_vec();
        for (source, target) in self.replace.iter().rev() {
            self.replace_bytes(target, source, &mut output);
        }
        Ok(output)
    }
}

impl Persist for DigramCodec {
    fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.dict_size as u64)?;
        write_u64(writer, self.gram_size as u64)?;
        write_u64(writer, self.replace.len() as u64)?;
        for (source, target) in &self.replace {
            write_bytes(writer, source)?;
            write_bytes(writer, target)?;
        }
        Ok(())
    }

    fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let dict_size = read_u64(reader)? as usize;
        let gram_size = read_u64(reader)? as usize;
        let count = read_u64(reader)? as usize;
        let mut replace = Vec::with_capacity(count);
        for _ in 0..count {
            let source = read_bytes(reader)?;
            let target = read_bytes(reader)?;
            replace.push((source, target));
        }
        let mut codec = DigramCodec::new(dict_size, gram_size, usize::MAX, 0);
        codec.set_replace(replace);
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

    fn built(gram: &[usize]) -> DigramCodec {
        let mut codec = DigramCodec::with_gram(gram);
        let mut position = 0;
        codec
            .build(&mut || corpus_callback(&mut position))
            .unwrap();
        codec
    }

    #[test]
    fn test_with_gram_defaults() {
        let codec = DigramCodec::with_gram(&[2, 64, 100, 5]);
        assert_eq!(codec.dict_size(), 2);
        assert_eq!(codec.gram_size(), 64);
        assert_eq!(codec.count_size(), 100);
        assert_eq!(codec.count_threshold(), 5);

        let codec = DigramCodec::with_gram(&[]);
        assert_eq!(codec.dict_size(), 1);
        assert_eq!(codec.gram_size(), usize::MAX);
        assert_eq!(codec.count_size(), usize::MAX);
        assert_eq!(codec.count_threshold(), 0);
    }

    #[test]
    fn test_base_grams_match_corpus_bytes() {
        let codec = built(&[1, 8]);
        for input in corpus() {
            for &byte in input {
                assert!(codec.base_gram_set().contains(&vec![byte]));
            }
        }
    }

    #[test]
    fn test_replace_sources_are_known_text() {
        let codec = built(&[2, 8]);
        for (source, target) in codec.replace() {
            assert_eq!(target.len(), 2);
            assert!(source.len() > 2);
            assert_eq!(codec.gram_text()[target], *source);
        }
        for pair in codec.replace().windows(2) {
            assert!(pair[0].0.len() >= pair[1].0.len());
        }
    }

    #[test]
    fn test_roundtrip_corpus() {
        for gram in [&[1usize, 8][..], &[2, 8][..]] {
            let codec = built(gram);
            for input in corpus() {
                let encoded = codec.encode(input).unwrap();
                assert_eq!(codec.decode(&encoded).unwrap(), input);
            }
        }
    }

    #[test]
    fn test_count_eviction() {
        // One record of eight 'a' bytes with a count bound of one and a
        // threshold of five: the "aa" entry (count 4) is evicted, "a"
        // (count 8) survives, and nothing is left to promote.
        let mut codec = DigramCodec::with_gram(&[1, 2, 1, 5]);
        let mut sent = false;
        codec
            .build(&mut || {
                if sent {
                    sent = false;
                    return Ok(None);
                }
                sent = true;
                Ok(Some(b"aaaaaaaa".to_vec()))
            })
            .unwrap();
        assert_eq!(codec.count().len(), 1);
        assert_eq!(codec.count()[&b"a".to_vec()], 8);
        assert!(codec.replace().is_empty());
    }

    #[test]
    fn test_untrained_is_identity() {
        let codec = DigramCodec::with_gram(&[1, 8]);
        let input = b"agares".to_vec();
        assert_eq!(codec.encode(&input).unwrap(), input);
        assert_eq!(codec.decode(&input).unwrap(), input);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let codec = built(&[2, 8]);
        let loaded = roundtrip(&codec);
        assert_eq!(loaded.dict_size(), codec.dict_size());
        assert_eq!(loaded.gram_size(), codec.gram_size());
        assert_eq!(loaded.replace(), codec.replace());
        for input in corpus() {
            assert_eq!(
                loaded.encode(input).unwrap(),
                codec.encode(input).unwrap()
            );
        }
    }
}
