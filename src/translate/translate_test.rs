use arbitrary::Unstructured;
use rand::{prelude::random, rngs::SmallRng, seq::SliceRandom, Rng, SeedableRng};

use std::{collections::HashSet, env, fs, thread};

use super::*;

fn scratch_config(name: &str, kind: Kind, seed: u64) -> Config {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut config: Config = {
        let bytes = rng.gen::<[u8; 32]>();
        let mut uns = Unstructured::new(&bytes);
        uns.arbitrary().unwrap()
    };
    let dir: path::PathBuf = [env::temp_dir(), format!("{}-{}", name, kind).into()]
        .iter()
        .collect();
    fs::remove_dir_all(&dir).ok();

    config.kind = kind;
    config.dir = dir.into_os_string();
    config
}

const KINDS: [Kind; 3] = [Kind::Mem, Kind::Bucket, Kind::Batch];

#[test]
fn test_kind() {
    for kind in KINDS.iter() {
        assert_eq!(kind.to_string().parse::<Kind>().unwrap(), *kind);
    }
    assert!("lmdb".parse::<Kind>().is_err());
}

#[test]
fn test_translate_contract() {
    let seed: u64 = random();
    println!("test_translate_contract {}", seed);

    for kind in KINDS.iter() {
        let config = scratch_config("test-translate-contract", *kind, seed);
        println!("test_translate_contract {:?}", config);
        let t = open(config).unwrap();

        // monotonic and stable.
        for (i, color) in ["red", "blue", "green"].iter().enumerate() {
            assert_eq!(t.get_id("color", color.as_bytes()).unwrap(), i as u64);
        }
        assert_eq!(t.get_id("color", b"blue").unwrap(), 1);
        assert_eq!(t.get_id("color", b"red").unwrap(), 0);

        // frames own their identifier space.
        assert_eq!(t.get_id("size", b"blue").unwrap(), 0);
        assert_eq!(t.get_id("size", b"").unwrap(), 1);

        // round trip.
        assert_eq!(t.get("color", 2).unwrap(), b"green".to_vec());
        assert_eq!(t.get("size", 1).unwrap(), b"".to_vec());

        match t.get("color", 3) {
            Err(crate::Error::KeyNotFound(_, _)) => (),
            res => panic!("{} unexpected {:?}", kind, res),
        }
        match t.get("shape", 0) {
            Err(crate::Error::KeyNotFound(_, _)) => (),
            res => panic!("{} unexpected {:?}", kind, res),
        }

        assert_eq!(t.to_frames().unwrap(), vec!["color", "size"]);

        t.close().unwrap();
        t.close().unwrap();
        match t.get_id("color", b"red") {
            Err(crate::Error::Closed(_, _)) => (),
            res => panic!("{} unexpected {:?}", kind, res),
        }
    }
}

#[test]
fn test_translate_bijection() {
    let seed: u64 = random();
    let mut rng = SmallRng::seed_from_u64(seed);
    println!("test_translate_bijection {}", seed);

    for kind in KINDS.iter() {
        let t = open(scratch_config("test-translate-bijection", *kind, seed)).unwrap();

        let mut values: Vec<Vec<u8>> = vec![];
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let value: Vec<u8> = {
                let n = rng.gen::<usize>() % 8;
                (0..n).map(|_| rng.gen::<u8>() % 4).collect()
            };
            let id = t.get_id("rand", &value).unwrap();
            if seen.insert(value.clone()) {
                assert_eq!(id, values.len() as u64, "{} {:?}", kind, value);
                values.push(value);
            } else {
                assert_eq!(values[id as usize], value);
            }
        }

        for (id, value) in values.iter().enumerate() {
            assert_eq!(t.get_id("rand", value).unwrap(), id as u64);
            assert_eq!(&t.get("rand", id as u64).unwrap(), value);
        }

        t.close().unwrap();
    }
}

#[test]
fn test_translate_concurrent() {
    let seed: u64 = random();
    println!("test_translate_concurrent {}", seed);

    let (n_threads, n_values) = (8, 1000);
    for kind in KINDS.iter() {
        let t = open(scratch_config("test-translate-concurrent", *kind, seed)).unwrap();

        let mut handles = vec![];
        for i in 0..n_threads {
            let t = Arc::clone(&t);
            handles.push(thread::spawn(move || {
                let mut rng = SmallRng::seed_from_u64(seed + i);
                let mut values: Vec<String> =
                    (0..n_values).map(|j| format!("value-{}", j)).collect();
                values.shuffle(&mut rng);

                values
                    .into_iter()
                    .map(|v| {
                        let id = t.get_id("frame", v.as_bytes()).unwrap();
                        (v, id)
                    })
                    .collect::<Vec<(String, u64)>>()
            }));
        }

        let mut results: Vec<Vec<(String, u64)>> = vec![];
        for handle in handles {
            let mut items = handle.join().unwrap();
            items.sort();
            results.push(items);
        }
        for items in results[1..].iter() {
            assert_eq!(items, &results[0], "{}", kind);
        }

        let mut ids: Vec<u64> = results[0].iter().map(|(_, id)| *id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..n_values).collect::<Vec<u64>>(), "{}", kind);

        for (value, id) in results[0].iter() {
            assert_eq!(t.get("frame", *id).unwrap(), value.as_bytes().to_vec());
        }

        t.close().unwrap();
    }
}

#[test]
fn test_translate_bulk_add() {
    let seed: u64 = random();
    println!("test_translate_bulk_add {}", seed);

    let n = BULK_BATCH + 123;
    let values: Vec<Vec<u8>> = (0..n).map(|i| format!("v{}", i).into_bytes()).collect();

    for kind in KINDS.iter() {
        let t = open(scratch_config("test-translate-bulk-add", *kind, seed)).unwrap();

        t.bulk_add("bulk", &values).unwrap();
        for i in [0, 1, BULK_BATCH - 1, BULK_BATCH, n - 1].iter() {
            assert_eq!(t.get("bulk", *i as u64).unwrap(), values[*i]);
            assert_eq!(t.get_id("bulk", &values[*i]).unwrap(), *i as u64);
        }
        // new values continue the sequence.
        assert_eq!(t.get_id("bulk", b"fresh").unwrap(), n as u64);

        // frame is no more empty.
        assert!(t.bulk_add("bulk", &values[..1]).is_err());
        // duplicates are rejected.
        let dups = vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec()];
        assert!(t.bulk_add("dups", &dups).is_err());

        t.close().unwrap();
    }
}
