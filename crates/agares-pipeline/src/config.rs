//! Pipeline configuration.

use serde::{Deserialize, Serialize};

use agares_core::FieldFormat;

/// Which codec family to train and apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// Bit-level Huffman codes over byte grams.
    #[default]
    Huffman,
    /// Byte-level 256-ary Huffman codes.
    Bytehuffman,
    /// Greedy byte-pair merges.
    Bytepair,
    /// Hierarchical digram promotion.
    Digram,
    /// Stateless byte quantization.
    Subsample,
}

/// Everything needed to run a build/encode/decode pass over a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Input dataset path.
    pub data: String,
    /// Per-field record format.
    pub format: Vec<FieldFormat>,
    /// Codec family for trained fields.
    pub codec: CodecKind,
    /// Per-field gram configuration; an empty entry leaves the field
    /// untouched.
    pub gram: Vec<Vec<usize>>,
    /// Worker thread count. Zero means one per logical CPU.
    #[serde(default)]
    pub threads: usize,
}

impl PipelineConfig {
    /// Worker count with the zero default resolved.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_threads() {
        let config = PipelineConfig {
            data: "train.txt".into(),
            format: vec![FieldFormat::Bytes, FieldFormat::Index],
            codec: CodecKind::Bytepair,
            gram: vec![vec![2, 4], vec![]],
            threads: 0,
        };
        assert!(config.effective_threads() >= 1);
        assert_eq!(
            PipelineConfig {
                threads: 3,
                ..config
            }
            .effective_threads(),
            3
        );
    }
}
