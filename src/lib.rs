//! # brz-mph
//!
//! Minimal perfect hash functions for key sets that do not fit in RAM.
//!
//! Construction streams keys once, partitions them into small buckets with a
//! global hash, spills bucket-ordered runs to disk under a caller-supplied
//! memory budget, and builds one tiny byte-table function per bucket. The
//! result is a compact artifact mapping every construction key to a distinct
//! integer in `[0, n)` with two hash evaluations and two byte loads.
//!
//! ## Example
//!
//! ```rust
//! use brz_mph::{BrzBuilder, BrzConfig, SliceKeySource};
//!
//! let keys: Vec<Vec<u8>> = (0..10_000)
//!     .map(|i| format!("key{i:07}").into_bytes())
//!     .collect();
//!
//! let config = BrzConfig::new().tmp_dir(std::env::temp_dir());
//! let mut source = SliceKeySource::new(&keys);
//! let mphf = BrzBuilder::new(config).unwrap().build(&mut source).unwrap();
//!
//! // Every key gets a distinct id below the key count.
//! let id = mphf.index(b"key0000042");
//! assert!(id < mphf.len());
//!
//! // Artifacts round-trip through bytes or files.
//! let bytes = mphf.to_bytes().unwrap();
//! let loaded = brz_mph::BrzMphf::from_bytes(&bytes).unwrap();
//! assert_eq!(loaded.index(b"key0000042"), id);
//! ```
//!
//! Lookups for keys outside the construction set return a well-formed but
//! meaningless id; pair the function with stored keys if membership matters.

mod bits;
mod bmz8;
mod builder;
mod config;
mod error;
mod graph;
mod hash;
mod keyset;
mod merge;
mod mphf;
mod partition;

pub use builder::BrzBuilder;
pub use config::BrzConfig;
pub use error::BrzError;
pub use hash::{HashKind, HashState};
pub use keyset::{KeySource, SliceKeySource};
pub use mphf::BrzMphf;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn build(keys: &[Vec<u8>]) -> BrzMphf {
        let config = BrzConfig::new().tmp_dir(std::env::temp_dir());
        let mut source = SliceKeySource::new(keys);
        BrzBuilder::new(config).unwrap().build(&mut source).unwrap()
    }

    #[test]
    fn basic_bijectivity() {
        let keys: Vec<Vec<u8>> = (0..2000)
            .map(|i| format!("lib-key-{i}").into_bytes())
            .collect();
        let mphf = build(&keys);

        assert_eq!(mphf.len(), 2000);
        let ids: HashSet<u32> = keys.iter().map(|k| mphf.index(k)).collect();
        assert_eq!(ids.len(), 2000);
        assert!(ids.iter().all(|&id| id < 2000));
    }

    #[test]
    fn single_key_maps_to_zero() {
        let keys = vec![b"x".to_vec()];
        let mphf = build(&keys);
        assert_eq!(mphf.index(b"x"), 0);
        assert_eq!(mphf.len(), 1);
    }

    #[test]
    fn foreign_keys_do_not_panic() {
        let keys: Vec<Vec<u8>> = (0..100).map(|i| format!("member-{i}").into_bytes()).collect();
        let mphf = build(&keys);
        for i in 0..1000 {
            let _ = mphf.index(format!("stranger-{i}").as_bytes());
        }
        let _ = mphf.index(b"");
    }
}
