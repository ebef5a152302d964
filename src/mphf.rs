//! The immutable minimal-perfect-hash artifact.
//!
//! On disk an artifact is a small bincode header (magic, version, length,
//! CRC32) followed by a packed little-endian body:
//!
//! ```text
//! k            : u32
//! h1/h2 blobs  : (len u32 + bytes) per bucket, interleaved
//! h3 blob      : len u32 + bytes
//! c            : f32
//! m            : u32
//! size[]       : u8  x k
//! offset[]     : u32 x k
//! g-table      : g[0] .. g[k-1] concatenated, each of length n[i]
//! ```
//!
//! `n[i]` is never stored: load recomputes it from `c` and `size[i]`.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bmz8::{edge_endpoints, vertex_count};
use crate::error::BrzError;
use crate::hash::{HashState, HASH_BLOB_LEN};

const MAGIC: &[u8; 8] = b"BRZMPH01";
const FORMAT_VERSION: u32 = 1;

/// Outer container header, bincode-encoded ahead of the packed body.
#[derive(Debug, Serialize, Deserialize)]
struct FileHeader {
    magic: [u8; 8],
    version: u32,
    body_len: u64,
    checksum: u32,
    nkeys: u32,
}

impl FileHeader {
    fn new(body: &[u8], nkeys: u32) -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            body_len: body.len() as u64,
            checksum: crc32fast::hash(body),
            nkeys,
        }
    }

    fn validate(&self) -> Result<(), BrzError> {
        if &self.magic != MAGIC {
            return Err(BrzError::CorruptArtifact(format!(
                "bad magic {:?}",
                self.magic
            )));
        }
        if self.version != FORMAT_VERSION {
            return Err(BrzError::CorruptArtifact(format!(
                "unsupported format version {}",
                self.version
            )));
        }
        if self.body_len > 1 << 32 {
            return Err(BrzError::CorruptArtifact(format!(
                "implausible body length {}",
                self.body_len
            )));
        }
        Ok(())
    }
}

/// A built minimal perfect hash: `index` maps every construction key to a
/// distinct value in `[0, len)`. Immutable and freely shareable across
/// threads.
#[derive(Debug, Clone, PartialEq)]
pub struct BrzMphf {
    k: u32,
    c: f32,
    m: u32,
    h3: HashState,
    h1: Vec<HashState>,
    h2: Vec<HashState>,
    size: Vec<u8>,
    offset: Vec<u32>,
    g: Vec<u8>,
    /// Derived: byte offset of each bucket's g slice in `g`.
    g_start: Vec<u32>,
}

impl BrzMphf {
    /// Assemble and cross-check an artifact from its raw parts. Shared by
    /// the builder and `load`, so a corrupt file cannot produce an
    /// inconsistent value.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        k: u32,
        c: f32,
        m: u32,
        h3: HashState,
        h1: Vec<HashState>,
        h2: Vec<HashState>,
        size: Vec<u8>,
        offset: Vec<u32>,
        g: Vec<u8>,
    ) -> Result<Self, BrzError> {
        let corrupt = |detail: String| Err(BrzError::CorruptArtifact(detail));

        if k == 0 {
            return corrupt("zero buckets".into());
        }
        if !(0.93..=2.0).contains(&c) {
            return corrupt(format!("load factor {c} outside [0.93, 2.0]"));
        }
        if h1.len() != k as usize
            || h2.len() != k as usize
            || size.len() != k as usize
            || offset.len() != k as usize
        {
            return corrupt("per-bucket array lengths disagree with k".into());
        }

        let total: u64 = size.iter().map(|&s| s as u64).sum();
        if total != m as u64 {
            return corrupt(format!("bucket sizes sum to {total}, expected {m}"));
        }

        let mut expected_offset = 0u32;
        for i in 0..k as usize {
            if offset[i] != expected_offset {
                return corrupt(format!("offset[{i}] is not the prefix sum of sizes"));
            }
            expected_offset += size[i] as u32;
        }

        let mut g_start = Vec::with_capacity(k as usize);
        let mut g_len = 0u32;
        for &s in &size {
            g_start.push(g_len);
            g_len += vertex_count(c, s as u32);
        }
        if g.len() != g_len as usize {
            return corrupt(format!(
                "g-table holds {} bytes, expected {g_len}",
                g.len()
            ));
        }

        Ok(Self {
            k,
            c,
            m,
            h3,
            h1,
            h2,
            size,
            offset,
            g,
            g_start,
        })
    }

    /// The id of `key` in `[0, len)`. Total: a key that was not part of the
    /// build gets a well-formed but meaningless answer.
    #[inline]
    pub fn index(&self, key: &[u8]) -> u32 {
        let bucket = (self.h3.hash(key) % self.k) as usize;
        let size = self.size[bucket] as u32;
        if size == 0 {
            return self.offset[bucket];
        }
        let n = vertex_count(self.c, size);
        let (a, b) = edge_endpoints(self.h1[bucket].hash(key), self.h2[bucket].hash(key), n);
        let start = self.g_start[bucket] as usize;
        let sum = self.g[start + a as usize].wrapping_add(self.g[start + b as usize]);
        self.offset[bucket] + sum as u32 % size
    }

    /// Number of keys the function was built over.
    pub fn len(&self) -> u32 {
        self.m
    }

    pub fn is_empty(&self) -> bool {
        self.m == 0
    }

    pub fn bucket_count(&self) -> u32 {
        self.k
    }

    pub fn load_factor(&self) -> f32 {
        self.c
    }

    // ----- serialization -------------------------------------------------

    pub fn dump<W: Write>(&self, writer: &mut W) -> Result<(), BrzError> {
        let body = self.encode_body();
        let header = FileHeader::new(&body, self.m);
        bincode::serialize_into(&mut *writer, &header)?;
        writer.write_all(&body)?;
        Ok(())
    }

    pub fn load<R: Read>(reader: &mut R) -> Result<Self, BrzError> {
        let header: FileHeader = bincode::deserialize_from(&mut *reader)?;
        header.validate()?;

        let mut body = vec![0u8; header.body_len as usize];
        reader.read_exact(&mut body)?;
        if crc32fast::hash(&body) != header.checksum {
            return Err(BrzError::CorruptArtifact("checksum mismatch".into()));
        }

        let mphf = Self::decode_body(&body)?;
        if mphf.m != header.nkeys {
            return Err(BrzError::CorruptArtifact(format!(
                "header says {} keys, body says {}",
                header.nkeys, mphf.m
            )));
        }
        Ok(mphf)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BrzError> {
        let mut bytes = Vec::new();
        self.dump(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self, BrzError> {
        Self::load(&mut bytes)
    }

    /// Write the artifact to `path` atomically: the file appears complete or
    /// not at all.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), BrzError> {
        let mut file = AtomicFile::create(path.as_ref())?;
        self.dump(&mut file)?;
        file.commit()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, BrzError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::load(&mut reader)
    }

    fn encode_body(&self) -> Vec<u8> {
        let hash_blob = HASH_BLOB_LEN + 4;
        let len = 4
            + self.k as usize * 2 * hash_blob
            + hash_blob
            + 4
            + 4
            + self.size.len()
            + self.offset.len() * 4
            + self.g.len();
        let mut body = Vec::with_capacity(len);

        body.extend_from_slice(&self.k.to_le_bytes());
        for i in 0..self.k as usize {
            write_hash_blob(&mut body, &self.h1[i]);
            write_hash_blob(&mut body, &self.h2[i]);
        }
        write_hash_blob(&mut body, &self.h3);
        body.extend_from_slice(&self.c.to_le_bytes());
        body.extend_from_slice(&self.m.to_le_bytes());
        body.extend_from_slice(&self.size);
        for &off in &self.offset {
            body.extend_from_slice(&off.to_le_bytes());
        }
        body.extend_from_slice(&self.g);
        body
    }

    fn decode_body(body: &[u8]) -> Result<Self, BrzError> {
        let mut reader = BodyReader::new(body);

        let k = reader.take_u32()?;
        if k == 0 || k as u64 > body.len() as u64 {
            return Err(BrzError::CorruptArtifact(format!(
                "implausible bucket count {k}"
            )));
        }

        let mut h1 = Vec::with_capacity(k as usize);
        let mut h2 = Vec::with_capacity(k as usize);
        for _ in 0..k {
            h1.push(read_hash_blob(&mut reader)?);
            h2.push(read_hash_blob(&mut reader)?);
        }
        let h3 = read_hash_blob(&mut reader)?;

        let c = reader.take_f32()?;
        let m = reader.take_u32()?;
        let size = reader.take_bytes(k as usize)?.to_vec();
        let mut offset = Vec::with_capacity(k as usize);
        for _ in 0..k {
            offset.push(reader.take_u32()?);
        }
        let g = reader.rest().to_vec();

        Self::from_parts(k, c, m, h3, h1, h2, size, offset, g)
    }
}

fn write_hash_blob(body: &mut Vec<u8>, state: &HashState) {
    let blob = state.dump();
    body.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    body.extend_from_slice(&blob);
}

fn read_hash_blob(reader: &mut BodyReader<'_>) -> Result<HashState, BrzError> {
    let len = reader.take_u32()? as usize;
    if len != HASH_BLOB_LEN {
        return Err(BrzError::CorruptArtifact(format!(
            "hash blob of {len} bytes, expected {HASH_BLOB_LEN}"
        )));
    }
    HashState::load(reader.take_bytes(len)?)
}

/// Bounds-checked cursor over the packed body.
struct BodyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take_bytes(&mut self, len: usize) -> Result<&'a [u8], BrzError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| BrzError::CorruptArtifact("truncated artifact body".into()))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, BrzError> {
        let b = self.take_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn take_f32(&mut self) -> Result<f32, BrzError> {
        let b = self.take_bytes(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}

/// Write-to-temp-then-rename file writer; the temp file is removed if the
/// write never commits.
struct AtomicFile {
    temp_path: PathBuf,
    final_path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl AtomicFile {
    fn create(path: &Path) -> Result<Self, BrzError> {
        let final_path = path.to_path_buf();
        let temp_path = final_path.with_extension("tmp");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        Ok(Self {
            temp_path,
            final_path,
            writer: Some(BufWriter::new(file)),
        })
    }

    fn commit(mut self) -> Result<(), BrzError> {
        let writer = self.writer.take().expect("commit called twice");
        let file = writer
            .into_inner()
            .map_err(|e| BrzError::Io(e.into_error()))?;
        file.sync_all()?;
        std::fs::rename(&self.temp_path, &self.final_path)?;
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer
            .as_mut()
            .expect("write after commit")
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.as_mut().expect("flush after commit").flush()
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}
