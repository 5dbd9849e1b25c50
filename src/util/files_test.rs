use serde::Deserialize;

use std::env;

use super::*;

#[derive(Debug, Deserialize, PartialEq)]
struct Profile {
    name: String,
    workers: usize,
}

fn scratch_dir(name: &str) -> path::PathBuf {
    let dir: path::PathBuf = [env::temp_dir(), name.into()].iter().collect();
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_load_toml() {
    let dir = scratch_dir("test-files-load-toml");
    let loc: path::PathBuf = [dir.clone(), "profile.toml".into()].iter().collect();
    fs::write(&loc, "name = \"ingest\"\nworkers = 4\n").unwrap();

    let profile: Profile = load_toml(&loc).unwrap();
    assert_eq!(
        profile,
        Profile {
            name: "ingest".to_string(),
            workers: 4
        }
    );

    fs::write(&loc, "name = \n").unwrap();
    assert!(load_toml::<_, Profile>(&loc).is_err());

    let loc = find_config(Some(loc.clone().into_os_string()), &[]).unwrap();
    assert!(loc.ends_with("profile.toml"));
}

#[test]
fn test_lock_dir() {
    let dir = scratch_dir("test-files-lock-dir");

    let fd = lock_dir(&dir).unwrap();
    match lock_dir(&dir) {
        Err(crate::Error::InvalidFile(_, _)) => (),
        Err(err) => panic!("unexpected {}", err),
        Ok(_) => panic!("expected lock failure"),
    }
    std::mem::drop(fd);
    lock_dir(&dir).unwrap();
}

#[test]
fn test_sub_dirs() {
    let dir = scratch_dir("test-files-sub-dirs");
    for name in ["b-id", "a-id", "a-val"].iter() {
        fs::create_dir_all(dir.join(name)).unwrap();
    }
    fs::write(dir.join("LOCK"), b"").unwrap();

    let names = sub_dirs(&dir).unwrap();
    assert_eq!(names, vec!["a-id", "a-val", "b-id"]);
}
