//! The partitioned construction driver.
//!
//! A build is a loop over partition hashes: stream the keys into
//! bucket-ordered runs, merge the runs back one bucket at a time, hand each
//! bucket to the inner builder, and spool finished g arrays to disk whenever
//! the retained bytes exceed the memory budget. A bucket overflow or an
//! unbuildable bucket discards the attempt and re-partitions under a fresh
//! h3 seed.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use crate::bmz8::{vertex_count, Bmz8};
use crate::config::BrzConfig;
use crate::error::BrzError;
use crate::hash::HashState;
use crate::keyset::KeySource;
use crate::merge::BucketMerger;
use crate::mphf::BrzMphf;
use crate::partition::partition;

/// Partition-hash attempts before the build is abandoned.
const OUTER_ATTEMPTS: u32 = 20;

/// Average keys per bucket targeted by the bucket-count formula.
const KEYS_PER_BUCKET: u32 = 170;

/// Owner of all construction state. The scoped temporary directory (run
/// files and the g-spool) lives exactly as long as the builder, so both a
/// finished build and a builder dropped mid-way leave the disk clean.
#[derive(Debug)]
pub struct BrzBuilder {
    config: BrzConfig,
    temp: TempDir,
    rng: StdRng,
}

impl BrzBuilder {
    pub fn new(config: BrzConfig) -> Result<Self, BrzError> {
        config.validate()?;
        let temp = tempfile::Builder::new()
            .prefix("brz-mph-")
            .tempdir_in(&config.tmp_dir)?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, temp, rng })
    }

    /// Path of the builder's scoped temporary directory.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Consume the builder and produce the artifact. The key source is read
    /// in a single streaming pass per partition attempt.
    pub fn build<S: KeySource + ?Sized>(mut self, source: &mut S) -> Result<BrzMphf, BrzError> {
        let m = source.nkeys();
        let k = m.div_ceil(KEYS_PER_BUCKET).max(1);
        if self.config.verbosity {
            info!("building MPHF over {m} keys ({k} buckets)");
        }

        for attempt in 1..=OUTER_ATTEMPTS {
            let h3 = HashState::new(self.config.hashfuncs[2], self.rng.random());
            match self.try_build(source, h3, k, m) {
                Ok(mphf) => {
                    if self.config.verbosity {
                        info!("minimal perfect hash generated on attempt {attempt}");
                    }
                    return Ok(mphf);
                }
                Err(BrzError::BucketOverflow) | Err(BrzError::BucketAssignFailed(_)) => {
                    warn!(
                        "partition attempt {attempt}/{OUTER_ATTEMPTS} failed, \
                         retrying with a fresh partition hash"
                    );
                }
                Err(other) => return Err(other),
            }
        }
        Err(BrzError::BuildFailed(OUTER_ATTEMPTS))
    }

    /// One full attempt under a fixed h3.
    fn try_build<S: KeySource + ?Sized>(
        &mut self,
        source: &mut S,
        h3: HashState,
        k: u32,
        m: u32,
    ) -> Result<BrzMphf, BrzError> {
        let c = self.config.c;
        let budget = self.config.budget_bytes();
        let dir = self.temp.path().to_path_buf();

        let part = partition(
            source,
            &h3,
            k,
            c,
            budget,
            &dir,
            self.config.verbosity,
        )?;
        let size = part.size;

        let mut offset = vec![0u32; k as usize];
        for i in 1..k as usize {
            offset[i] = offset[i - 1] + size[i - 1] as u32;
        }

        // Every bucket needs hash states in the artifact; empty buckets keep
        // these fresh ones, built buckets overwrite them below.
        let mut h1: Vec<HashState> = (0..k)
            .map(|_| HashState::new(self.config.hashfuncs[0], self.rng.random()))
            .collect();
        let mut h2: Vec<HashState> = (0..k)
            .map(|_| HashState::new(self.config.hashfuncs[1], self.rng.random()))
            .collect();

        // Empty buckets are complete from the start with a zero-length g.
        let mut g: Vec<Option<Vec<u8>>> = size
            .iter()
            .map(|&s| if s == 0 { Some(Vec::new()) } else { None })
            .collect();
        let mut spool = GSpool::create(dir.join("g.spool"))?;
        let mut retained = 0usize;
        let mut max_bucket = 0usize;

        if self.config.verbosity {
            info!("generating per-bucket functions from {} runs", part.nflushes);
        }
        let merger = BucketMerger::new(&dir, part.nflushes, &h3, k, &size, m)?;
        for item in merger {
            let (bucket, keys) = item?;
            max_bucket = max_bucket.max(keys.len());

            let bmz = Bmz8::build(
                &keys,
                c,
                (self.config.hashfuncs[0], self.config.hashfuncs[1]),
                &mut self.rng,
            )?;
            h1[bucket as usize] = bmz.h1;
            h2[bucket as usize] = bmz.h2;
            retained += bmz.g.len();
            g[bucket as usize] = Some(bmz.g);

            if retained > budget {
                retained -= spool.flush_completed(&mut g)?;
            }
        }
        debug!("largest bucket: {max_bucket} keys");

        spool.flush_completed(&mut g)?;
        debug_assert!(g.iter().all(|slot| slot.is_none()));

        let expected: usize = size
            .iter()
            .map(|&s| vertex_count(c, s as u32) as usize)
            .sum();
        let g_table = spool.into_table(expected)?;

        BrzMphf::from_parts(k, c, m, h3, h1, h2, size, offset, g_table)
    }
}

/// Append-only spill file for finished g arrays, written strictly in bucket
/// order. Buckets are completed in ascending order (the merger is ordered),
/// so flushing is always a contiguous prefix walk.
struct GSpool {
    path: PathBuf,
    writer: BufWriter<File>,
    next_bucket: usize,
}

impl GSpool {
    fn create(path: PathBuf) -> Result<Self, BrzError> {
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            writer,
            next_bucket: 0,
        })
    }

    /// Write out and drop every completed bucket from the front of `g`.
    /// Returns how many in-memory bytes were released.
    fn flush_completed(&mut self, g: &mut [Option<Vec<u8>>]) -> Result<usize, BrzError> {
        let mut released = 0;
        while self.next_bucket < g.len() {
            match g[self.next_bucket].take() {
                Some(buf) => {
                    self.writer.write_all(&buf)?;
                    released += buf.len();
                    self.next_bucket += 1;
                }
                None => break,
            }
        }
        Ok(released)
    }

    /// Finish writing and read the whole spool back as the artifact's
    /// concatenated g-table.
    fn into_table(mut self, expected: usize) -> Result<Vec<u8>, BrzError> {
        self.writer.flush()?;
        drop(self.writer);

        let mut table = Vec::with_capacity(expected);
        File::open(&self.path)?.read_to_end(&mut table)?;
        if table.len() != expected {
            return Err(BrzError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "g-spool holds {} bytes, expected {expected}",
                    table.len()
                ),
            )));
        }
        Ok(table)
    }
}
