//! # Agares Pipeline
//!
//! Dataset plumbing around the codec families: a thread-safe text record
//! reader ([`Data`]), a per-field codec trainer ([`Builder`]), and a
//! parallel transcoder ([`Coder`]) that keeps output records in input
//! order through an index-keyed reorder heap.
//!
//! A typical pass:
//!
//! ```no_run
//! use agares_codec::BytehuffmanCodec;
//! use agares_core::FieldFormat;
//! use agares_pipeline::{Builder, Coder, Data};
//!
//! # fn main() -> agares_core::Result<()> {
//! let data = Data::open("train.txt", vec![FieldFormat::Bytes, FieldFormat::Index])?;
//! let builder = Builder::new(&data, vec![vec![2], vec![]]);
//! let codecs: std::collections::HashMap<usize, BytehuffmanCodec> =
//!     builder.build(|_, _| {})?;
//!
//! data.rewind()?;
//! let coder = Coder::with_threads(&data, &codecs, "encoded.txt", 4);
//! coder.encode(|_| {})?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod coder;
pub mod config;
pub mod data;

pub use builder::Builder;
pub use coder::Coder;
pub use config::{CodecKind, PipelineConfig};
pub use data::Data;
