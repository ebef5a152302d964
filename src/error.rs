use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrzError {
    /// A bucket collected more than 255 keys (or its vertex count left the
    /// byte-indexable range). Recovered internally by repartitioning with a
    /// fresh top-level hash; escapes only as `BuildFailed`.
    #[error("a bucket exceeded the 255-key limit during partitioning")]
    BucketOverflow,

    /// The per-bucket builder could not assign byte values for one bucket.
    /// Recovered internally like `BucketOverflow`.
    #[error("bucket assignment failed after {0} hash attempts")]
    BucketAssignFailed(u32),

    #[error("minimal perfect hash construction failed after {0} partition attempts")]
    BuildFailed(u32),

    #[error("partitioning produced more than {0} run files; raise the memory budget")]
    TooManyRuns(u32),

    #[error("key contains a NUL byte")]
    NulKey,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
