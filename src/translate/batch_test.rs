use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use std::{collections::HashMap, env, fs, path, thread};

use super::*;
use crate::translate::Kind;

fn scratch_config(name: &str) -> Config {
    let dir: path::PathBuf = [env::temp_dir(), name.into()].iter().collect();
    fs::remove_dir_all(&dir).ok();

    let mut config = Config::new(dir.as_os_str(), Kind::Batch);
    config.set_map_size(64 * 1024 * 1024).set_fsync(false);
    config
}

#[test]
fn test_batch_translator() {
    let seed: u64 = random();
    println!("test_batch_translator {}", seed);

    let mut config = scratch_config("test-batch-translator");
    config.set_batch_size(16);

    let t = Arc::new(BatchTranslator::open(config.clone()).unwrap());
    let mut handles = vec![];
    for i in 0..8 {
        let t = Arc::clone(&t);
        handles.push(thread::spawn(move || {
            let mut rng = SmallRng::seed_from_u64(seed + i);
            let mut items = vec![];
            for _ in 0..500 {
                let value = format!("user-{}", rng.gen::<u32>() % 2000);
                let id = t.get_id("users", value.as_bytes()).unwrap();
                items.push((value, id));
            }
            items
        }));
    }

    let mut assigned: HashMap<String, u64> = HashMap::new();
    for handle in handles {
        for (value, id) in handle.join().unwrap() {
            match assigned.get(&value) {
                Some(prev) => assert_eq!(*prev, id, "{}", value),
                None => {
                    assigned.insert(value, id);
                }
            }
        }
    }
    let mut ids: Vec<u64> = assigned.values().cloned().collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..(assigned.len() as u64)).collect::<Vec<u64>>());

    t.close().unwrap();
    std::mem::drop(t);

    // reopen, listing the frame up front.
    config.set_frames(vec!["users".to_string(), "empty".to_string()]);
    let t = BatchTranslator::open(config).unwrap();
    assert_eq!(t.to_frames().unwrap(), vec!["empty", "users"]);
    for (value, id) in assigned.iter() {
        assert_eq!(t.get("users", *id).unwrap(), value.as_bytes().to_vec());
        assert_eq!(t.get_id("users", value.as_bytes()).unwrap(), *id);
    }
    let n = assigned.len() as u64;
    assert_eq!(t.get_id("users", b"user-new").unwrap(), n);
    assert_eq!(t.get_id("empty", b"first").unwrap(), 0);
}

#[test]
fn test_batch_drop() {
    let config = scratch_config("test-batch-drop");
    {
        let t = BatchTranslator::open(config.clone()).unwrap();
        assert_eq!(t.get_id("f", b"x").unwrap(), 0);
        // dropped without close.
    }
    let t = BatchTranslator::open(config).unwrap();
    assert_eq!(t.get_id("f", b"y").unwrap(), 1);
    assert_eq!(t.get("f", 0).unwrap(), b"x".to_vec());
    t.close().unwrap();
}

#[test]
fn test_batch_failed_write() {
    let mut config = scratch_config("test-batch-failed-write");
    config.set_map_size(128 * 1024);
    let t = BatchTranslator::open(config).unwrap();

    assert!(t.get_id("f", &vec![0xab_u8; 4 * 1024 * 1024]).is_err());
    assert_eq!(t.get_id("f", b"small").unwrap(), 0);
    assert_eq!(t.get_id("f", b"other").unwrap(), 1);
    assert_eq!(t.get("f", 0).unwrap(), b"small".to_vec());
    t.close().unwrap();
}
