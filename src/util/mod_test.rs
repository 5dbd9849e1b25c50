use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

#[test]
fn test_encode_id() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_encode_id {}", seed);

    let mut ids: Vec<u64> = (0..1000).map(|_| rng.gen::<u64>() >> (rng.gen::<u32>() % 64)).collect();
    ids.extend_from_slice(&[0, 1, 255, 256, u64::MAX]);

    for id in ids.iter() {
        assert_eq!(decode_id(&encode_id(*id)).unwrap(), *id);
    }

    // byte ordering matches numeric ordering.
    let mut keys: Vec<[u8; 8]> = ids.iter().map(|id| encode_id(*id)).collect();
    keys.sort();
    ids.sort();
    let decoded: Vec<u64> = keys.iter().map(|k| decode_id(k).unwrap()).collect();
    assert_eq!(decoded, ids);

    assert!(decode_id(&[1, 2, 3]).is_err());
}
