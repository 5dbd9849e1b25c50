use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::collections::HashMap;

use super::*;

#[test]
fn test_city_hasher() {
    let mut map: HashMap<Vec<u8>, u64, CityHasher> = HashMap::with_hasher(CityHasher::new());
    for i in 0..1000_u64 {
        map.insert(i.to_string().into_bytes(), i);
    }
    for i in 0..1000_u64 {
        assert_eq!(map.get(i.to_string().as_bytes()), Some(&i));
    }
    assert_eq!(map.len(), 1000);
}

#[test]
fn test_to_bucket() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_to_bucket {}", seed);

    let n = [1, 7, 1000][rng.gen::<usize>() % 3];
    let mut counts = vec![0_usize; n];
    for _i in 0..10_000 {
        let value: [u8; 16] = rng.gen();
        let bucket = to_bucket(&value, n);
        assert!(bucket < n);
        assert_eq!(bucket, to_bucket(&value, n));
        counts[bucket] += 1;
    }
    assert_eq!(counts.iter().sum::<usize>(), 10_000);
}
