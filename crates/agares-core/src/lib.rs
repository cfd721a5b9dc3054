//! # Agares Core
//!
//! Core types for the Agares byte-gram codec library.
//!
//! Agares is named after the 2nd demon of the Ars Goetia, said to grant
//! understanding of languages - fitting for a library whose codecs learn
//! the structure of byte-level text.
//!
//! This crate holds the pieces every other Agares crate builds on:
//!
//! - [`BitBuffer`] - a double-ended bit queue with byte-aligned storage
//! - [`Codec`] - the build/encode/decode trait all codec families implement
//! - [`Error`] / [`Result`] - the shared error type
//! - record model types ([`Field`], [`FieldFormat`], [`Sample`])

pub mod bits;
pub mod error;
pub mod traits;
pub mod types;

pub use bits::BitBuffer;
pub use error::{Error, Result};
pub use traits::{Codec, DataCallback};
pub use types::{Field, FieldFormat, Gram, IndexPair, Sample, Symbol};
