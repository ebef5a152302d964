//! Streaming key partitioner with a hard RAM budget.
//!
//! Keys are copied NUL-terminated into one contiguous buffer. Whenever the
//! next key would not fit, the buffer is scattered into ascending-bucket
//! order (stable per bucket) and written out as one run file. A global
//! per-bucket histogram is maintained across the whole pass; it is the only
//! state the merge phase needs besides the run files themselves.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info};

use crate::error::BrzError;
use crate::hash::HashState;
use crate::keyset::KeySource;

/// Hard cap on keys per bucket; sizes are stored as bytes.
pub(crate) const MAX_BUCKET_SIZE: u32 = 255;

/// Run-file cap; beyond this the memory budget is too small for the input.
pub(crate) const MAX_RUNS: u32 = 1024;

pub(crate) fn run_file_name(index: u32) -> String {
    format!("{index}.run")
}

/// Per-pass output: the global histogram and how many runs were written.
#[derive(Debug)]
pub(crate) struct Partition {
    pub size: Vec<u8>,
    pub nflushes: u32,
}

/// One buffered key: its byte offset in the buffer and its bucket.
struct Record {
    offset: u32,
    bucket: u32,
}

/// Stream every key from `source` once, spilling bucket-ordered runs into
/// `dir`. Fails with `BucketOverflow` as soon as any bucket becomes
/// unrepresentable, which the caller handles by drawing a fresh h3.
pub(crate) fn partition<S: KeySource + ?Sized>(
    source: &mut S,
    h3: &HashState,
    k: u32,
    c: f32,
    budget: usize,
    dir: &Path,
    verbosity: bool,
) -> Result<Partition, BrzError> {
    source.rewind()?;
    let m = source.nkeys();
    if verbosity {
        info!("partitioning {m} keys into {k} buckets");
    }

    let mut size = vec![0u8; k as usize];
    let mut buffer: Vec<u8> = Vec::with_capacity(budget);
    let mut records: Vec<Record> = Vec::new();
    let mut nflushes = 0u32;

    for _ in 0..m {
        let key = source.next_key()?.ok_or_else(|| {
            BrzError::InvalidConfig("key source yielded fewer keys than nkeys".into())
        })?;
        if key.contains(&0) {
            return Err(BrzError::NulKey);
        }
        if key.len() + 1 > budget {
            return Err(BrzError::InvalidConfig(format!(
                "key of {} bytes exceeds the {budget}-byte memory budget",
                key.len()
            )));
        }

        if buffer.len() + key.len() + 1 > budget {
            flush_run(dir, nflushes, &buffer, &records, k, verbosity)?;
            buffer.clear();
            records.clear();
            nflushes += 1;
            if nflushes > MAX_RUNS {
                return Err(BrzError::TooManyRuns(MAX_RUNS));
            }
        }

        let bucket = h3.hash(key) % k;
        let count = size[bucket as usize] as u32;
        // Representability checks, evaluated on the pre-increment count like
        // the rest of the pipeline expects: the bucket is full, or its
        // vertex count floor(c*count) no longer fits the byte-indexed range.
        if count == MAX_BUCKET_SIZE {
            return Err(BrzError::BucketOverflow);
        }
        if c >= 1.0 && (((c * count as f32) as u32) & 0xff) < count {
            return Err(BrzError::BucketOverflow);
        }

        records.push(Record {
            offset: buffer.len() as u32,
            bucket,
        });
        buffer.extend_from_slice(key);
        buffer.push(0);
        size[bucket as usize] = (count + 1) as u8;
    }

    if !buffer.is_empty() {
        flush_run(dir, nflushes, &buffer, &records, k, verbosity)?;
        nflushes += 1;
        if nflushes > MAX_RUNS {
            return Err(BrzError::TooManyRuns(MAX_RUNS));
        }
    }

    debug!("partition pass complete: {nflushes} runs");
    Ok(Partition { size, nflushes })
}

/// Scatter the buffered keys into bucket order and write them out as one
/// NUL-terminated run file.
fn flush_run(
    dir: &Path,
    index: u32,
    buffer: &[u8],
    records: &[Record],
    k: u32,
    verbosity: bool,
) -> Result<(), BrzError> {
    if verbosity {
        info!("flushing {} keys to run {index}", records.len());
    } else {
        debug!("flushing {} keys to run {index}", records.len());
    }

    let mut counts = vec![0u32; k as usize];
    for rec in records {
        counts[rec.bucket as usize] += 1;
    }
    // Exclusive prefix sum over every bucket, zeros included.
    let mut cursor = vec![0u32; k as usize];
    let mut sum = 0u32;
    for (slot, &count) in cursor.iter_mut().zip(&counts) {
        *slot = sum;
        sum += count;
    }

    // Each buffered key ends where the next one starts.
    let mut extents: Vec<(u32, u32)> = vec![(0, 0); records.len()];
    for (i, rec) in records.iter().enumerate() {
        let end = records
            .get(i + 1)
            .map(|next| next.offset)
            .unwrap_or(buffer.len() as u32);
        let slot = cursor[rec.bucket as usize];
        extents[slot as usize] = (rec.offset, end);
        cursor[rec.bucket as usize] += 1;
    }

    let file = File::create(dir.join(run_file_name(index)))?;
    let mut writer = BufWriter::new(file);
    for &(start, end) in &extents {
        writer.write_all(&buffer[start as usize..end as usize])?;
    }
    writer.flush()?;
    Ok(())
}
