//! Per-field codec training over a dataset.
//!
//! For every field with a non-empty gram configuration, the builder
//! rewinds the dataset and trains one codec of the chosen family on that
//! field's bytes, feeding the codec's data callback straight from the
//! record stream. The result is the per-field codec table the coder
//! applies.

use std::collections::HashMap;

use tracing::info;

use agares_core::{Codec, Error, Result, Sample};

use crate::data::Data;

/// Trains one codec per configured field.
pub struct Builder<'a> {
    data: &'a Data,
    gram: Vec<Vec<usize>>,
}

impl<'a> Builder<'a> {
    /// `gram[i]` configures the codec for field `i`; an empty entry skips
    /// the field (it passes through the coder untouched).
    pub fn new(data: &'a Data, gram: Vec<Vec<usize>>) -> Self {
        Builder { data, gram }
    }

    pub fn gram(&self) -> &[Vec<usize>] {
        &self.gram
    }

    /// Builds the per-field codec table. The callback runs once per
    /// record consumed during training, with the field being trained.
    pub fn build<C, F>(&self, mut callback: F) -> Result<HashMap<usize, C>>
    where
        C: Codec,
        F: FnMut(usize, &Sample),
    {
        let mut codecs = HashMap::new();
        for (field, gram) in self.gram.iter().enumerate() {
            if gram.is_empty() {
                continue;
            }
            self.data.rewind()?;
            let mut codec = C::with_gram(gram);
            codec.build(&mut || match self.data.next_sample()? {
                Some(sample) => {
                    let bytes = sample
                        .fields
                        .get(field)
                        .and_then(|f| f.as_bytes())
                        .ok_or(Error::FieldType { field })?
                        .to_vec();
                    callback(field, &sample);
                    Ok(Some(bytes))
                }
                None => {
                    // Reset for a codec that makes another pass.
                    self.data.rewind()?;
                    Ok(None)
                }
            })?;
            info!(field, gram = ?gram, "trained field codec");
            codecs.insert(field, codec);
        }
        Ok(codecs)
    }
}
