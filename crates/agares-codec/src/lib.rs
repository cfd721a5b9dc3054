//! # Agares Codec
//!
//! Trained, reversible byte-stream codecs used as text preprocessing
//! transforms. Every codec here is built once from a training corpus,
//! serialized compactly, and then applied losslessly to arbitrary byte
//! payloads - including out-of-vocabulary data - under concurrent
//! encode/decode workloads.
//!
//! ## Codec Families
//!
//! | Codec | Dictionary | Output granularity |
//! |-------|------------|--------------------|
//! | [`HuffmanCodec`] | prefix-free bit codes over byte-grams | bits |
//! | [`BytehuffmanCodec`] | 256-ary Huffman codes over byte-grams | bytes |
//! | [`BytepairCodec`] | greedy most-frequent-pair merges | bytes |
//! | [`DigramCodec`] | hierarchical digram promotion, bounded counts | bytes |
//! | [`SubsampleCodec`] | none (stateless quantizer) | bytes |
//!
//! All implement [`agares_core::Codec`] and [`Persist`] for binary
//! save/load of their tables.

pub mod bytehuffman;
pub mod bytepair;
pub mod digram;
pub mod huffman;
pub mod store;
pub mod subsample;

pub use bytehuffman::BytehuffmanCodec;
pub use bytepair::BytepairCodec;
pub use digram::DigramCodec;
pub use huffman::HuffmanCodec;
pub use store::{load_table, save_table, Persist};
pub use subsample::SubsampleCodec;
