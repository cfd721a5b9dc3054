//! The codec trait seam shared by all trained byte-stream transforms.

use crate::error::Result;

/// Corpus callback used during `build`.
///
/// Each call returns the next raw byte chunk of the training corpus, or
/// `None` when the corpus is exhausted. A callback must reset its own
/// cursor when it reports exhaustion, so the same callback can be handed
/// to another `build` afterwards.
pub type DataCallback<'a> = &'a mut dyn FnMut() -> Result<Option<Vec<u8>>>;

/// A build/encode/decode triple over byte streams.
///
/// Codecs are trained once from a corpus, then applied to arbitrary byte
/// payloads, including out-of-vocabulary data. `encode` and `decode` take
/// `&self` and are safe to share across threads once built.
pub trait Codec: Sized + Send + Sync {
    /// Construct a codec from its gram-size specification. The meaning of
    /// each position is codec-specific, mirroring the builder gram flags.
    fn with_gram(gram: &[usize]) -> Self;

    /// Train the codec dictionary from a corpus callback.
    ///
    /// Training data must be non-empty; an empty corpus leaves the codec
    /// with degenerate tables and later encodes fail with `NotBuilt`.
    fn build(&mut self, callback: DataCallback<'_>) -> Result<()>;

    /// Transform a byte payload. Out-of-vocabulary input is handled by the
    /// codec's pad/unknown mechanism, never an error.
    fn encode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Reverse `encode`. For input fully covered by the trained dictionary
    /// this is an exact inverse; pad/unknown substitutions decode to the
    /// unknown sentinel's (empty) text.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;
}
