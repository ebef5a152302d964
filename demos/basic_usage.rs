use brz_mph::{BrzBuilder, BrzConfig, BrzMphf, SliceKeySource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("brz-mph - Basic Usage");
    println!("=====================");

    let fruits = ["apple", "banana", "orange", "grape", "kiwi", "mango"];
    let keys: Vec<Vec<u8>> = fruits.iter().map(|f| f.as_bytes().to_vec()).collect();

    let config = BrzConfig::new().tmp_dir(std::env::temp_dir()).verbosity(true);
    let mut source = SliceKeySource::new(&keys);
    let mphf = BrzBuilder::new(config)?.build(&mut source)?;

    println!("\nBuilt an MPHF over {} keys:", mphf.len());
    for fruit in &fruits {
        println!("  {:>8} -> {}", fruit, mphf.index(fruit.as_bytes()));
    }

    // The ids are a permutation of 0..len, so they index a value table
    // directly with no empty slots.
    let mut stock = vec![0u32; mphf.len() as usize];
    for (i, fruit) in fruits.iter().enumerate() {
        stock[mphf.index(fruit.as_bytes()) as usize] = 10 + i as u32;
    }
    println!("\nStock via MPHF slots:");
    for fruit in &fruits {
        let count = stock[mphf.index(fruit.as_bytes()) as usize];
        println!("  {fruit:>8}: {count} crates");
    }

    // Round-trip through bytes.
    let bytes = mphf.to_bytes()?;
    let loaded = BrzMphf::from_bytes(&bytes)?;
    println!("\nArtifact is {} bytes; round-trip OK: {}", bytes.len(), loaded == mphf);

    Ok(())
}
