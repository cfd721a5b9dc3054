//! Text dataset reader.
//!
//! One record per line, fields space-separated in the declared format
//! order, label last:
//!
//! ```text
//! 68656c6c6f 3,7:0.5 1
//! ```
//!
//! Byte fields are hex pairs, index fields are `idx[:weight]` comma
//! lists, and the label is a single `idx[:weight]`. The reader hands out
//! one sample per call together with its 0-based record index; a single
//! internal lock spans the whole parse of one record, so concurrent
//! callers each receive a distinct, complete sample.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use agares_core::{Error, Field, FieldFormat, IndexPair, Result, Sample};

struct Reader {
    file: BufReader<File>,
    count: usize,
}

/// Shared dataset file handle. Safe to read from multiple threads.
pub struct Data {
    path: PathBuf,
    format: Vec<FieldFormat>,
    reader: Mutex<Reader>,
}

fn malformed(index: usize, message: impl Into<String>) -> Error {
    Error::MalformedRecord {
        index,
        message: message.into(),
    }
}

/// Parses one `idx[:weight]` token.
fn parse_pair(token: &str, index: usize) -> Result<IndexPair> {
    let (idx, weight) = match token.split_once(':') {
        Some((idx, weight)) => {
            let weight: f64 = weight
                .parse()
                .map_err(|_| malformed(index, format!("bad weight in {token:?}")))?;
            (idx, weight)
        }
        None => (token, 1.0),
    };
    let idx: u64 = idx
        .parse()
        .map_err(|_| malformed(index, format!("bad index in {token:?}")))?;
    Ok(IndexPair::new(idx, weight))
}

/// Parses an `idx[:weight]` comma list.
fn parse_index_field(token: &str, index: usize) -> Result<Field> {
    let mut pairs = Vec::new();
    for part in token.split(',') {
        pairs.push(parse_pair(part, index)?);
    }
    Ok(Field::Index(pairs))
}

/// Parses a hex byte string.
fn parse_bytes_field(token: &str, index: usize) -> Result<Field> {
    if token.len() % 2 != 0 {
        return Err(malformed(index, format!("odd-length hex field {token:?}")));
    }
    let mut bytes = Vec::with_capacity(token.len() / 2);
    for pair in token.as_bytes().chunks(2) {
        let text = std::str::from_utf8(pair)
            .map_err(|_| malformed(index, "non-ascii hex field"))?;
        let byte = u8::from_str_radix(text, 16)
            .map_err(|_| malformed(index, format!("bad hex pair {text:?}")))?;
        bytes.push(byte);
    }
    Ok(Field::Bytes(bytes))
}

impl Data {
    /// Opens the dataset at `path` with the given per-field formats.
    pub fn open<P: AsRef<Path>>(path: P, format: Vec<FieldFormat>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = BufReader::new(File::open(&path)?);
        Ok(Data {
            path,
            format,
            reader: Mutex::new(Reader { file, count: 0 }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> &[FieldFormat] {
        &self.format
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Reader>> {
        self.reader
            .lock()
            .map_err(|_| Error::worker("dataset reader lock poisoned"))
    }

    /// Reads the next record. Returns `Ok(None)` at end of file; a record
    /// that does not match the declared format is an error.
    pub fn next_sample(&self) -> Result<Option<Sample>> {
        let mut reader = self.lock()?;

        let mut line = String::new();
        let index = reader.count;
        loop {
            line.clear();
            if reader.file.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                break;
            }
        }

        let mut tokens = line.split_whitespace();
        let mut fields = Vec::with_capacity(self.format.len());
        for (i, format) in self.format.iter().enumerate() {
            let token = tokens
                .next()
                .ok_or_else(|| malformed(index, format!("missing field {i}")))?;
            let field = match format {
                FieldFormat::Index => parse_index_field(token, index)?,
                FieldFormat::Bytes => parse_bytes_field(token, index)?,
            };
            fields.push(field);
        }
        let label_token = tokens
            .next()
            .ok_or_else(|| malformed(index, "missing label"))?;
        let label = parse_pair(label_token, index)?;
        if tokens.next().is_some() {
            return Err(malformed(index, "trailing tokens after label"));
        }

        reader.count += 1;
        Ok(Some(Sample {
            fields,
            label,
            index,
        }))
    }

    /// Seeks back to the start of the file and resets the record counter.
    pub fn rewind(&self) -> Result<()> {
        let mut reader = self.lock()?;
        reader.file.seek(SeekFrom::Start(0))?;
        reader.count = 0;
        Ok(())
    }

    /// Seeks to a byte offset previously reported by [`Data::offset`],
    /// resuming the record counter at `count`.
    pub fn seek(&self, offset: u64, count: usize) -> Result<()> {
        let mut reader = self.lock()?;
        reader.file.seek(SeekFrom::Start(offset))?;
        reader.count = count;
        Ok(())
    }

    /// Current byte offset in the file.
    pub fn offset(&self) -> Result<u64> {
        let mut reader = self.lock()?;
        Ok(reader.file.stream_position()?)
    }

    /// Number of records handed out since open, rewind, or seek.
    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.count)
    }
}
