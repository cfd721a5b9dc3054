//! Greedy byte-pair merge codec.
//!
//! Repeatedly replaces the most frequent adjacent pair of grams in the
//! training corpus with a fresh gram-sized key that never occurs in the
//! data. The accumulated replacement list is the codec: encoding applies
//! it forward, decoding applies it backward. Counting and replacement
//! across records run on a rayon pool sized by the codec's thread count.
//!
//! Replacement keys are drawn from a big-endian byte counter, so keys are
//! only collision-free against the corpus the codec was trained on.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use agares_core::{Codec, DataCallback, Error, Result};

use crate::store::{read_bytes, read_u64, write_bytes, write_u64, Persist};

/// A replacement step: `source` bytes become `target` bytes on encode.
pub type ReplacePair = (Vec<u8>, Vec<u8>);

/// Trained byte-pair merge codec.
#[derive(Debug, Clone)]
pub struct BytepairCodec {
    gram: usize,
    threads: usize,
    data: Vec<Vec<u8>>,
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

impl BytepairCodec {
    /// Creates an untrained codec. Gram length and thread count are
    /// clamped to at least one.
    pub fn new(gram: usize, threads: usize) -> Self {
        BytepairCodec {
            gram: gram.max(1),
            threads: threads.max(1),
            data: Vec::new(),
            gram_text: HashMap::new(),
            replace: Vec::new(),
        }
    }

    pub fn gram(&self) -> usize {
        self.gram
    }

    /// The replacement list, longest source first.
    pub fn replace(&self) -> &[ReplacePair] {
        &self.replace
    }

    pub fn set_replace(&mut self, replace: Vec<ReplacePair>) {
        self.replace = replace;
    }

    /// The training corpus in its fully merged state. Empty until built.
    pub fn data(&self) -> &[Vec<u8>] {
        &self.data
    }

    /// Mapping from replacement keys (and base grams) to the original
    /// text they stand for. Empty until built.
    pub fn gram_text(&self) -> &HashMap<Vec<u8>, Vec<u8>> {
        &self.gram_text
    }

    fn pool(&self) -> Result<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| Error::worker(e.to_string()))
    }

    /// Replaces every gram-aligned occurrence of `source` in `output`.
    fn replace_bytes(&self, source: &[u8], target: &[u8], output: &mut Vec<u8>) {
        let mut position = 0;
        while position + source.len() <= output.len() {
            if position % self.gram == 0 && output[position..position + source.len()] == *source {
                output.splice(position..position + source.len(), target.iter().copied());
                position += target.len();
            } else {
                position += 1;
            }
        }
    }

    /// Collects the set of aligned grams and the count of aligned digrams
    /// (overlapping, stepping one gram at a time) across all records.
    fn count_all(
        &self,
        pool: &ThreadPool,
        data: &[Vec<u8>],
    ) -> (HashSet<Vec<u8>>, HashMap<Vec<u8>, u64>) {
        use rayon::prelude::*;

        pool.install(|| {
            data.par_iter()
                .fold(
                    || (HashSet::new(), HashMap::new()),
                    |(mut grams, mut digrams), input| {
                        let mut i = 0;
                        while i + self.gram <= input.len() {
                            grams.insert(input[i..i + self.gram].to_vec());
                            i += self.gram;
                        }
                        let mut i = 0;
                        while i + 2 * self.gram <= input.len() {
                            *digrams
                                .entry(input[i..i + 2 * self.gram].to_vec())
                                .or_insert(0u64) += 1;
                            i += self.gram;
                        }
                        (grams, digrams)
                    },
                )
                .reduce(
                    || (HashSet::new(), HashMap::new()),
                    |(mut grams, mut digrams), (other_grams, other_digrams)| {
                        grams.extend(other_grams);
                        for (digram, count) in other_digrams {
                            *digrams.entry(digram).or_insert(0) += count;
                        }
                        (grams, digrams)
                    },
                )
        })
    }

    /// Applies one replacement across every record in parallel.
    fn replace_all(
        &self,
        pool: &ThreadPool,
        source: &[u8],
        target: &[u8],
        data: &mut [Vec<u8>],
    ) {
        use rayon::prelude::*;

        pool.install(|| {
            data.par_iter_mut()
                .for_each(|record| self.replace_bytes(source, target, record));
        });
    }

    /// The merge loop. Each round counts digrams, draws the next unused
    /// key from the counter, and merges the most frequent digram into it.
    /// Stops when no digram remains or the key space is exhausted.
    fn build_gram_text(&mut self, pool: &ThreadPool) -> Result<()> {
        let mut base_gram_set: HashSet<Vec<u8>> = HashSet::new();
        self.gram_text.clear();
        for input in &self.data {
            let mut i = 0;
            while i + self.gram <= input.len() {
                let gram = input[i..i + self.gram].to_vec();
                self.gram_text.insert(gram.clone(), gram.clone());
                base_gram_set.insert(gram);
                i += self.gram;
            }
        }

        loop {
            let (mut gram_set, digram_count) = self.count_all(pool, &self.data);
            // Base grams stay reserved even after they are merged away,
            // which keeps the replace list valid on fresh input.
            gram_set.extend(base_gram_set.iter().cloned());

            let mut target = vec![0u8; self.gram];
            let mut exhausted = false;
            while gram_set.contains(&target) {
                if increase(&mut target) != 0 {
                    exhausted = true;
                    break;
                }
            }
            if exhausted {
                break;
            }

            // Most frequent digram; ties go to the smallest source so
            // builds are reproducible.
            let best = digram_count
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)));
            let source = match best {
                Some((source, _)) => source.clone(),
                None => break,
            };

            // Detach the corpus while replacing so the worker borrow of
            // `self` does not alias the records being rewritten.
            let mut data = std::mem::take(&mut self.data);
            self.replace_all(pool, &source, &target, &mut data);
            self.data = data;
            let left = self
                .gram_text
                .get(&source[..self.gram])
                .cloned()
                .ok_or_else(|| Error::corrupted("digram half missing from gram table"))?;
            let right = self
                .gram_text
                .get(&source[self.gram..])
                .cloned()
                .ok_or_else(|| Error::corrupted("digram half missing from gram table"))?;
            self.gram_text.insert(target, [left, right].concat());
        }
        Ok(())
    }

    /// Orders the replacements longest original text first, so encoding
    /// always matches the most specific merge available.
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

impl Codec for BytepairCodec {
    /// `gram[0]` is the gram length, `gram[1]` the worker count; both
    /// default to 1.
    fn with_gram(gram: &[usize]) -> Self {
        BytepairCodec::new(
            gram.first().copied().unwrap_or(1),
            gram.get(1).copied().unwrap_or(1),
        )
    }

    fn build(&mut self, callback: DataCallback<'_>) -> Result<()> {
        self.data.clear();
        while let Some(input) = callback()? {
            self.data.push(input);
        }

        let pool = self.pool()?;
        self.build_gram_text(&pool)?;
        self.build_replace_from_gram_text();
        debug!(
            gram = self.gram,
            merges = self.replace.len(),
            "built bytepair replace list"
        );
        Ok(())
    }

    /// Applies the replacement list in order. An untrained codec is the
    /// identity transform.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = input.to_vec();
        for (source, target) in &self.replace {
            self.replace_bytes(source, target, &mut output);
        }
        Ok(output)
    }

    /// Undoes the replacement list in reverse order.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = input.to_vec();
        for (source, target) in self.replace.iter().rev() {
            self.replace_bytes(target, source, &mut output);
        }
        Ok(output)
    }
}

impl Persist for BytepairCodec {
    fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u64(writer, self.gram as u64)?;
        write_u64(writer, self.replace.len() as u64)?;
        for (source, target) in &self.replace {
            write_bytes(writer, source)?;
            write_bytes(writer, target)?;
        }
        Ok(())
    }

    fn load<R: Read>(reader: &mut R) -> Result<Self> {
        let gram = read_u64(reader)? as usize;
        let count = read_u64(reader)? as usize;
        let mut replace = Vec::with_capacity(count);
        for _ in 0..count {
            let source = read_bytes(reader)?;
            let target = read_bytes(reader)?;
            replace.push((source, target));
        }
        let mut codec = BytepairCodec::new(gram, 1);
        codec.set_replace(replace);
        Ok(codec)
    }
}
