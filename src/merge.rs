//! Reconstructing complete buckets from the partitioner's run files.
//!
//! Each run is already in ascending bucket order, so repeatedly draining the
//! run whose lookahead key has the smallest bucket id reassembles every
//! bucket in ascending order with purely sequential reads.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;

use crate::error::BrzError;
use crate::hash::HashState;
use crate::partition::run_file_name;

/// Sequential reader of one run file's NUL-terminated keys.
pub(crate) struct RunReader {
    reader: BufReader<File>,
}

impl RunReader {
    pub fn open(dir: &Path, index: u32) -> Result<Self, BrzError> {
        let file = File::open(dir.join(run_file_name(index)))?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    /// Next key without its terminator; `None` at end of file.
    pub fn next_key(&mut self) -> Result<Option<Vec<u8>>, BrzError> {
        let mut key = Vec::new();
        let read = self.reader.read_until(0, &mut key)?;
        if read == 0 {
            return Ok(None);
        }
        if key.pop() != Some(0) {
            return Err(BrzError::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "run file ends inside a key",
            )));
        }
        Ok(Some(key))
    }
}

/// K-way merge over all runs, yielding `(bucket id, keys)` for every
/// non-empty bucket in ascending bucket order.
pub(crate) struct BucketMerger<'a> {
    runs: Vec<RunReader>,
    lookahead: Vec<Option<(u32, Vec<u8>)>>,
    h3: &'a HashState,
    k: u32,
    size: &'a [u8],
    remaining: u32,
}

impl<'a> BucketMerger<'a> {
    pub fn new(
        dir: &Path,
        nflushes: u32,
        h3: &'a HashState,
        k: u32,
        size: &'a [u8],
        nkeys: u32,
    ) -> Result<Self, BrzError> {
        let mut runs = Vec::with_capacity(nflushes as usize);
        let mut lookahead = Vec::with_capacity(nflushes as usize);
        for i in 0..nflushes {
            let mut run = RunReader::open(dir, i)?;
            let first = run.next_key()?;
            runs.push(run);
            lookahead.push(match first {
                Some(key) => Some((h3.hash(&key) % k, key)),
                None => None,
            });
        }
        Ok(Self {
            runs,
            lookahead,
            h3,
            k,
            size,
            remaining: nkeys,
        })
    }

    fn refill(&mut self, i: usize) -> Result<(), BrzError> {
        self.lookahead[i] = match self.runs[i].next_key()? {
            Some(key) => Some((self.h3.hash(&key) % self.k, key)),
            None => None,
        };
        Ok(())
    }

    /// Run index holding the smallest lookahead bucket id.
    fn min_run(&self) -> Option<usize> {
        self.lookahead
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|(bucket, _)| (i, *bucket)))
            .min_by_key(|&(_, bucket)| bucket)
            .map(|(i, _)| i)
    }

    fn inconsistent(detail: &str) -> BrzError {
        BrzError::Io(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("run files inconsistent with bucket histogram: {detail}"),
        ))
    }

    fn next_bucket(&mut self) -> Result<Option<(u32, Vec<Vec<u8>>)>, BrzError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        let first = match self.min_run() {
            Some(i) => i,
            None => return Err(Self::inconsistent("runs exhausted with keys outstanding")),
        };
        let bucket = self.lookahead[first].as_ref().map(|(b, _)| *b).unwrap();
        let expected = self.size[bucket as usize] as usize;
        let mut keys: Vec<Vec<u8>> = Vec::with_capacity(expected);

        while keys.len() < expected {
            let i = match self.min_run() {
                Some(i) => i,
                None => return Err(Self::inconsistent("bucket is short of keys")),
            };
            match &self.lookahead[i] {
                Some((b, _)) if *b == bucket => {}
                _ => return Err(Self::inconsistent("bucket is short of keys")),
            }
            // Drain this run as long as it stays in the current bucket.
            while matches!(self.lookahead[i], Some((b, _)) if b == bucket) {
                let (_, key) = self.lookahead[i].take().unwrap();
                if keys.len() == expected {
                    return Err(Self::inconsistent("bucket holds extra keys"));
                }
                keys.push(key);
                self.refill(i)?;
            }
        }

        self.remaining -= expected as u32;
        Ok(Some((bucket, keys)))
    }
}

impl Iterator for BucketMerger<'_> {
    type Item = Result<(u32, Vec<Vec<u8>>), BrzError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_bucket().transpose()
    }
}
