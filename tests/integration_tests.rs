//! End-to-end construction, evaluation, and serialization scenarios.

use std::collections::HashSet;

use brz_mph::{BrzBuilder, BrzConfig, BrzError, BrzMphf, HashKind, SliceKeySource};

fn config() -> BrzConfig {
    BrzConfig::new().tmp_dir(std::env::temp_dir())
}

fn build(keys: &[Vec<u8>], config: BrzConfig) -> Result<BrzMphf, BrzError> {
    let mut source = SliceKeySource::new(keys);
    BrzBuilder::new(config)?.build(&mut source)
}

fn numbered_keys(count: usize) -> Vec<Vec<u8>> {
    (0..count).map(|i| format!("key{i:07}").into_bytes()).collect()
}

fn assert_minimal_perfect(mphf: &BrzMphf, keys: &[Vec<u8>]) {
    assert_eq!(mphf.len() as usize, keys.len());
    let ids: HashSet<u32> = keys.iter().map(|k| mphf.index(k)).collect();
    assert_eq!(ids.len(), keys.len(), "ids are not distinct");
    assert!(
        ids.iter().all(|&id| (id as usize) < keys.len()),
        "an id fell outside [0, n)"
    );
}

// ============================================================================
// CONSTRUCTION & EVALUATION
// ============================================================================

#[test]
fn four_keys_yield_a_permutation() {
    let keys: Vec<Vec<u8>> = ["a", "b", "c", "d"]
        .iter()
        .map(|s| s.as_bytes().to_vec())
        .collect();
    let mphf = build(&keys, config()).unwrap();

    let mut ids: Vec<u32> = keys.iter().map(|k| mphf.index(k)).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1, 2, 3]);
}

#[test]
fn ten_thousand_keys_are_minimal_perfect() {
    let keys = numbered_keys(10_000);
    let mphf = build(&keys, config()).unwrap();
    assert_minimal_perfect(&mphf, &keys);
}

#[test]
fn single_key_maps_to_zero() {
    let keys = vec![b"x".to_vec()];
    let mphf = build(&keys, config()).unwrap();
    assert_eq!(mphf.index(b"x"), 0);
}

#[test]
fn empty_key_set_builds() {
    let keys: Vec<Vec<u8>> = Vec::new();
    let mphf = build(&keys, config()).unwrap();
    assert!(mphf.is_empty());
}

#[test]
fn variable_length_and_empty_keys() {
    let mut keys: Vec<Vec<u8>> = (0..500)
        .map(|i| {
            let len = 1 + (i * 7) % 60;
            format!("{i:-^width$}", width = len).into_bytes()
        })
        .collect();
    keys.push(Vec::new()); // the empty key is a valid key
    keys.sort();
    keys.dedup();

    let mphf = build(&keys, config()).unwrap();
    assert_minimal_perfect(&mphf, &keys);
}

#[test]
fn murmur_hash_family_builds() {
    let keys = numbered_keys(3_000);
    let mphf = build(&keys, config().hashfuncs([HashKind::Murmur2; 3])).unwrap();
    assert_minimal_perfect(&mphf, &keys);
}

#[test]
fn sparse_load_factor_builds() {
    let keys = numbered_keys(5_000);
    let mphf = build(&keys, config().load_factor(0.93)).unwrap();
    assert_minimal_perfect(&mphf, &keys);
}

// ============================================================================
// EXTERNAL-MEMORY PATH
// ============================================================================

#[test]
fn multi_run_build_under_one_mib_budget() {
    // ~2.4 MB of keys against a 1 MiB buffer: the partitioner must spill
    // several runs and the merger must stitch buckets back across them.
    let keys = numbered_keys(200_000);
    let scratch = tempfile::tempdir().unwrap();
    let mphf = build(&keys, config().tmp_dir(scratch.path()).memory_availability(1)).unwrap();
    assert_minimal_perfect(&mphf, &keys);

    // All run files and the g-spool vanished with the builder.
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

// ============================================================================
// SERIALIZATION
// ============================================================================

#[test]
fn dump_load_round_trip_preserves_lookups() {
    let keys = numbered_keys(10_000);
    let mphf = build(&keys, config()).unwrap();

    let bytes = mphf.to_bytes().unwrap();
    let loaded = BrzMphf::from_bytes(&bytes).unwrap();

    assert_eq!(loaded, mphf);
    for key in &keys {
        assert_eq!(loaded.index(key), mphf.index(key));
    }
}

#[test]
fn identical_builds_are_byte_identical() {
    let keys = numbered_keys(4_000);
    let first = build(&keys, config().seed(123)).unwrap();
    let second = build(&keys, config().seed(123)).unwrap();
    assert_eq!(
        first.to_bytes().unwrap(),
        second.to_bytes().unwrap(),
        "same inputs and seed must reproduce the artifact bit for bit"
    );
}

#[test]
fn different_seeds_still_agree_on_minimality() {
    let keys = numbered_keys(1_000);
    for seed in [1u64, 2, 3] {
        let mphf = build(&keys, config().seed(seed)).unwrap();
        assert_minimal_perfect(&mphf, &keys);
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn nul_bytes_in_keys_are_rejected() {
    let keys = vec![b"fine".to_vec(), b"not\0fine".to_vec()];
    let err = build(&keys, config()).unwrap_err();
    assert!(matches!(err, BrzError::NulKey));
}

#[test]
fn out_of_range_load_factor_is_rejected() {
    let err = BrzBuilder::new(config().load_factor(0.5)).unwrap_err();
    assert!(matches!(err, BrzError::InvalidConfig(_)));
}

#[test]
fn foreign_keys_get_in_range_meaningless_answers() {
    let keys = numbered_keys(1_000);
    let mphf = build(&keys, config()).unwrap();
    // Never a panic; the answer itself carries no meaning.
    for i in 0..10_000 {
        let _ = mphf.index(format!("not-a-member-{i}").as_bytes());
    }
}
