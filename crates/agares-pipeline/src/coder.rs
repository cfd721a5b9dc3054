//! Order-preserving parallel encode/decode over a dataset.
//!
//! Workers pull records from the shared [`Data`] source, run every byte
//! field through its per-field codec, and hand the result to a shared
//! `write` keyed by record index. Write holds a min-heap of pending
//! records plus a next-expected counter, draining in-order entries to the
//! output file, so output order always equals input order no matter how
//! threads interleave. The heap is unbounded: one stalled worker grows it
//! without limit, which [`Coder::pending`] makes observable.
//!
//! The per-record callback runs after the record's write completes and
//! with no internal lock held.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;

use tracing::debug;

use agares_core::{Codec, Error, Field, IndexPair, Result, Sample};

use crate::data::Data;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encode,
    Decode,
}

/// A transformed record waiting for its turn in the output order.
struct Pending {
    index: usize,
    fields: Vec<Field>,
    label: IndexPair,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

struct WriteState {
    file: Option<BufWriter<File>>,
    queue: BinaryHeap<Reverse<Pending>>,
    next: usize,
}

/// Parallel per-field transcoder with in-order output.
pub struct Coder<'a, C: Codec> {
    data: &'a Data,
    codecs: &'a HashMap<usize, C>,
    path: PathBuf,
    threads: usize,
    state: Mutex<WriteState>,
}

fn format_pair(output: &mut String, pair: &IndexPair) {
    use std::fmt::Write as _;
    if pair.weight == 1.0 {
        let _ = write!(output, "{}", pair.index);
    } else {
        let _ = write!(output, "{}:{}", pair.index, pair.weight);
    }
}

/// Formats one output line: fields space-terminated, label last.
fn format_line(fields: &[Field], label: &IndexPair) -> String {
    use std::fmt::Write as _;

    let mut line = String::new();
    for field in fields {
        match field {
            Field::Index(pairs) => {
                for (i, pair) in pairs.iter().enumerate() {
                    if i > 0 {
                        line.push(',');
                    }
                    format_pair(&mut line, pair);
                }
            }
            Field::Bytes(bytes) => {
                for byte in bytes {
                    let _ = write!(line, "{byte:02x}");
                }
            }
        }
        line.push(' ');
    }
    format_pair(&mut line, label);
    line.push('\n');
    line
}

impl<'a, C: Codec> Coder<'a, C> {
    /// Creates a coder writing to `path`, with one worker per logical CPU.
    pub fn new<P: AsRef<Path>>(data: &'a Data, codecs: &'a HashMap<usize, C>, path: P) -> Self {
        Self::with_threads(data, codecs, path, num_cpus::get())
    }

    /// Creates a coder with an explicit worker count.
    pub fn with_threads<P: AsRef<Path>>(
        data: &'a Data,
        codecs: &'a HashMap<usize, C>,
        path: P,
        threads: usize,
    ) -> Self {
        Coder {
            data,
            codecs,
            path: path.as_ref().to_path_buf(),
            threads: threads.max(1),
            state: Mutex::new(WriteState {
                file: None,
                queue: BinaryHeap::new(),
                next: 0,
            }),
        }
    }

    /// Encodes every record of the dataset. The callback runs once per
    /// record after it is written out.
    pub fn encode<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Sample) + Sync,
    {
        self.run(Direction::Encode, &callback)
    }

    /// Decodes every record of the dataset.
    pub fn decode<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(&Sample) + Sync,
    {
        self.run(Direction::Decode, &callback)
    }

    /// Records written so far.
    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.next)
    }

    /// Records transformed but still waiting for earlier indices. Grows
    /// without bound if one worker stalls far behind the others.
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.queue.len())
    }

    /// Flushes and closes the output file.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        if let Some(mut file) = state.file.take() {
            file.flush()?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WriteState>> {
        self.state
            .lock()
            .map_err(|_| Error::worker("coder write lock poisoned"))
    }

    fn run<F>(&self, direction: Direction, callback: &F) -> Result<()>
    where
        F: Fn(&Sample) + Sync,
    {
        {
            let mut state = self.lock()?;
            state.next = 0;
            state.queue.clear();
        }
        debug!(threads = self.threads, path = %self.path.display(), "coder started");

        let results: Vec<Result<()>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.threads);
            for _ in 0..self.threads {
                handles.push(scope.spawn(move || self.job(direction, callback)));
            }
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(Error::worker("coder worker panicked")),
                })
                .collect()
        });
        results.into_iter().collect::<Result<()>>()?;
        self.close()
    }

    /// One worker: pull, transform, write, notify. Stops at end of data
    /// or on the first failure.
    fn job<F>(&self, direction: Direction, callback: &F) -> Result<()>
    where
        F: Fn(&Sample) + Sync,
    {
        while let Some(sample) = self.data.next_sample()? {
            let mut fields = Vec::with_capacity(sample.fields.len());
            for (i, field) in sample.fields.iter().enumerate() {
                let field = match self.codecs.get(&i) {
                    Some(codec) => {
                        let bytes = field
                            .as_bytes()
                            .ok_or(Error::FieldType { field: i })?;
                        let transformed = match direction {
                            Direction::Encode => codec.encode(bytes)?,
                            Direction::Decode => codec.decode(bytes)?,
                        };
                        Field::Bytes(transformed)
                    }
                    None => field.clone(),
                };
                fields.push(field);
            }
            self.write(Pending {
                index: sample.index,
                fields,
                label: sample.label,
            })?;
            callback(&sample);
        }
        Ok(())
    }

    /// Queues one transformed record and drains every record that is now
    /// next in line to the output file.
    fn write(&self, pending: Pending) -> Result<()> {
        let mut state = self.lock()?;
        if state.file.is_none() {
            state.file = Some(BufWriter::new(File::create(&self.path)?));
        }

        state.queue.push(Reverse(pending));
        while state
            .queue
            .peek()
            .is_some_and(|Reverse(top)| top.index == state.next)
        {
            let Some(Reverse(top)) = state.queue.pop() else {
                break;
            };
            let line = format_line(&top.fields, &top.label);
            match &mut state.file {
                Some(file) => file.write_all(line.as_bytes())?,
                None => return Err(Error::worker("output file closed during write")),
            }
            state.next += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let fields = vec![
            Field::Bytes(vec![0xde, 0xad]),
            Field::Index(vec![IndexPair::new(3, 1.0), IndexPair::new(7, 0.5)]),
        ];
        let label = IndexPair::new(2, 1.0);
        assert_eq!(format_line(&fields, &label), "dead 3,7:0.5 2\n");

        let label = IndexPair::new(2, 2.5);
        assert_eq!(format_line(&[], &label), "2:2.5\n");
    }

    #[test]
    fn test_format_empty_bytes_field() {
        let fields = vec![Field::Bytes(Vec::new())];
        assert_eq!(format_line(&fields, &IndexPair::new(0, 1.0)), " 0\n");
    }
}
