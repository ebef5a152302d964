//! Build an MPHF over a million keys under a small memory budget, to watch
//! the external-memory path (run spills, k-way merge, g-spool) in action.
//! Run with RUST_LOG=debug for per-stage progress.

use std::time::Instant;

use brz_mph::{BrzBuilder, BrzConfig, SliceKeySource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let n = 1_000_000usize;
    println!("generating {n} keys");
    let keys: Vec<Vec<u8>> = (0..n).map(|i| format!("user:{i:09}").into_bytes()).collect();

    let config = BrzConfig::new()
        .tmp_dir(std::env::temp_dir())
        .memory_availability(64)
        .verbosity(true);

    let start = Instant::now();
    let mut source = SliceKeySource::new(&keys);
    let mphf = BrzBuilder::new(config)?.build(&mut source)?;
    println!("built in {:.2?} ({} buckets)", start.elapsed(), mphf.bucket_count());

    let start = Instant::now();
    let mut checksum = 0u64;
    for key in &keys {
        checksum = checksum.wrapping_add(mphf.index(key) as u64);
    }
    let elapsed = start.elapsed();
    // The ids are exactly 0..n, so their sum is fixed.
    assert_eq!(checksum, (n as u64 * (n as u64 - 1)) / 2);
    println!(
        "looked up {n} keys in {elapsed:.2?} ({:.0} ns/key)",
        elapsed.as_nanos() as f64 / n as f64
    );

    let bytes = mphf.to_bytes()?;
    println!(
        "artifact: {} bytes ({:.2} bits/key)",
        bytes.len(),
        bytes.len() as f64 * 8.0 / n as f64
    );

    Ok(())
}
