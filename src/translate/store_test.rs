use std::{env, fs, path};

use super::*;
use crate::translate::Kind;

fn scratch_dir(name: &str, map_size: usize) -> (path::PathBuf, Config) {
    let dir: path::PathBuf = [env::temp_dir(), name.into()].iter().collect();
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();

    let mut config = Config::new(dir.as_os_str(), Kind::Bucket);
    config.set_map_size(map_size).set_fsync(false);
    (dir, config)
}

#[test]
fn test_frame_assign() {
    let (dir, config) = scratch_dir("test-frame-assign", 64 * 1024 * 1024);
    let frame = Frame::open(&dir, "color", &config).unwrap();

    let (ids, n) = frame.assign(&["red", "blue", "red", "green"]).unwrap();
    assert_eq!(ids, vec![0, 1, 0, 2]);
    assert_eq!(n, 3);

    let (ids, n) = frame.assign(&["green", "pink"]).unwrap();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(n, 1);
    assert_eq!(frame.to_count(), 4);

    let (ids, n) = frame.assign(&Vec::<Vec<u8>>::new()).unwrap();
    assert!(ids.is_empty());
    assert_eq!(n, 0);
    assert_eq!(frame.lookup_value(3).unwrap(), Some(b"pink".to_vec()));
}

#[test]
fn test_frame_write_failure() {
    let (dir, config) = scratch_dir("test-frame-write-failure", 128 * 1024);
    let frame = Frame::open(&dir, "f", &config).unwrap();

    // a value larger than the map can't be committed.
    let huge = vec![0xab_u8; 4 * 1024 * 1024];
    match frame.assign(&[huge.as_slice()]) {
        Err(crate::Error::FailStore(_, msg)) => println!("{}", msg),
        res => panic!("unexpected {:?}", res),
    }
    assert_eq!(frame.to_count(), 0);
    assert_eq!(frame.lookup_value(0).unwrap(), None);

    // no identifier is lost to the failed write.
    let (ids, _) = frame.assign(&["small"]).unwrap();
    assert_eq!(ids, vec![0]);
    assert_eq!(frame.lookup_value(0).unwrap(), Some(b"small".to_vec()));
    assert_eq!(frame.lookup_id(&huge).unwrap(), None);
}

#[test]
fn test_frame_repair() {
    let (dir, config) = scratch_dir("test-frame-repair", 64 * 1024 * 1024);
    {
        let frame = Frame::open(&dir, "color", &config).unwrap();
        let (ids, _) = frame.assign(&["red", "blue"]).unwrap();
        assert_eq!(ids, vec![0, 1]);

        // forward mappings missing their reverse, as left by a crash
        // between the two commits.
        let orphans: Vec<([u8; 8], &[u8])> = vec![
            (util::encode_id(2), &b"green"[..]),
            (util::encode_id(3), &b"red"[..]),
        ];
        frame.ids.put_all(&orphans).unwrap();
        assert_eq!(frame.lookup_value(3).unwrap(), Some(b"red".to_vec()));
    }

    let frame = Frame::open(&dir, "color", &config).unwrap();
    assert_eq!(frame.to_count(), 2);
    assert_eq!(frame.lookup_value(2).unwrap(), None);
    assert_eq!(frame.lookup_value(3).unwrap(), None);
    assert_eq!(frame.lookup_id(b"red").unwrap(), Some(0));
    assert_eq!(frame.lookup_id(b"green").unwrap(), None);

    let (ids, _) = frame.assign(&["green", "red"]).unwrap();
    assert_eq!(ids, vec![2, 0]);
}

#[test]
fn test_frame_bulk_add_failure() {
    let (dir, config) = scratch_dir("test-frame-bulk-add-failure", 1024 * 1024);
    let frame = Frame::open(&dir, "bulk", &config).unwrap();

    // first sub-batch commits, second one can't.
    let mut values: Vec<Vec<u8>> = (0..BULK_BATCH as u32).map(|i| i.to_be_bytes().to_vec()).collect();
    values.push(vec![0xcd_u8; 4 * 1024 * 1024]);
    assert!(frame.bulk_add(&values).is_err());

    assert_eq!(frame.to_count(), 0);
    assert_eq!(frame.lookup_value(0).unwrap(), None);
    assert_eq!(frame.lookup_id(&values[0]).unwrap(), None);

    let values: Vec<Vec<u8>> = (0..100_u32).map(|i| i.to_be_bytes().to_vec()).collect();
    frame.bulk_add(&values).unwrap();
    assert_eq!(frame.to_count(), 100);
    for (id, value) in values.iter().enumerate() {
        assert_eq!(frame.lookup_id(value).unwrap(), Some(id as u64));
    }
}
