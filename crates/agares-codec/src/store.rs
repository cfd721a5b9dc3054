//! Binary persistence for trained codecs.
//!
//! Every codec serializes its tables through the [`Persist`] trait using a
//! small set of little-endian primitives. A set of per-field codecs is
//! bundled into a single table file by [`save_table`] / [`load_table`],
//! framed with a magic tag and a format version so stale or foreign files
//! are rejected up front.
//!
//! Layout of a table file:
//!
//! ```text
//! magic   [u8; 4]  b"AGCD"
//! version u64      format version, currently 1
//! count   u64      number of (field, codec) entries
//! entries          count times: field index u64, then the codec payload
//! ```
//!
//! Entries are written in ascending field order so files are byte-for-byte
//! reproducible for the same table.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use agares_core::{Error, Result};

/// Magic tag at the start of every codec table file.
pub const MAGIC: [u8; 4] = *b"AGCD";

/// Current table file format version.
pub const VERSION: u64 = 1;

/// Binary save/load of a codec's trained tables.
///
/// Implementations write only their own payload; framing (magic, version,
/// field indices) is handled by [`save_table`] and [`load_table`].
pub trait Persist: Sized {
    /// Serializes the codec's tables to `writer`.
    fn save<W: Write>(&self, writer: &mut W) -> Result<()>;

    /// Deserializes a codec from `reader`, rebuilding any derived state
    /// (such as decode trees) from the stored tables.
    fn load<R: Read>(reader: &mut R) -> Result<Self>;
}

/// Writes a `u64` in little-endian byte order.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Reads a little-endian `u64`.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

/// Writes an `f64` in little-endian byte order.
pub fn write_f64<W: Write>(writer: &mut W, value: f64) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Reads a little-endian `f64`.
pub fn read_f64<R: Read>(reader: &mut R) -> Result<f64> {
    let mut buffer = [0u8; 8];
    reader.read_exact(&mut buffer)?;
    Ok(f64::from_le_bytes(buffer))
}

/// Writes a length-prefixed byte string.
pub fn write_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    write_u64(writer, bytes.len() as u64)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Upper bound on the buffer preallocated from a length prefix. Longer
/// strings still load, growing as bytes actually arrive.
const PREALLOC_LIMIT: u64 = 1 << 20;

/// Reads a length-prefixed byte string.
///
/// The prefix comes from the file and is untrusted, so the buffer is
/// filled through a bounded read instead of allocated up front; a
/// corrupt prefix fails once the stream runs dry.
pub fn read_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let length = read_u64(reader)?;
    let mut bytes = Vec::with_capacity(length.min(PREALLOC_LIMIT) as usize);
    reader.by_ref().take(length).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != length {
        return Err(Error::corrupted(format!(
            "byte string truncated: expected {length} bytes, found {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Saves a per-field codec table to `path`.
///
/// Fields are written in ascending index order.
pub fn save_table<C: Persist, P: AsRef<Path>>(
    table: &HashMap<usize, C>,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&MAGIC)?;
    write_u64(&mut writer, VERSION)?;
    write_u64(&mut writer, table.len() as u64)?;

    let mut fields: Vec<usize> = table.keys().copied().collect();
    fields.sort_unstable();
    for field in fields {
        write_u64(&mut writer, field as u64)?;
        table[&field].save(&mut writer)?;
    }
    writer.flush()?;
    debug!(path = %path.display(), fields = table.len(), "saved codec table");
    Ok(())
}

/// Loads a per-field codec table from `path`.
pub fn load_table<C: Persist, P: AsRef<Path>>(path: P) -> Result<HashMap<usize, C>> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(Error::corrupted(format!(
            "bad magic in codec table {}",
            path.display()
        )));
    }
    let version = read_u64(&mut reader)?;
    if version != VERSION {
        return Err(Error::corrupted(format!(
            "unsupported codec table version {version}"
        )));
    }

    let count = read_u64(&mut reader)? as usize;
    let mut table = HashMap::with_capacity(count);
    for _ in 0..count {
        let field = read_u64(&mut reader)? as usize;
        let codec = C::load(&mut reader)?;
        table.insert(field, codec);
    }
    debug!(path = %path.display(), fields = count, "loaded codec table");
    Ok(table)
}
