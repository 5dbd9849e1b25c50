use fs2::FileExt;
use serde::de::DeserializeOwned;

use std::{ffi, fs, path};

use crate::Result;

/// Load toml file and parse it into type `T`.
pub fn load_toml<P, T>(loc: P) -> Result<T>
where
    P: AsRef<path::Path>,
    T: DeserializeOwned,
{
    let loc = loc.as_ref();
    let data = err_at!(IOError, fs::read(loc), "reading {:?}", loc)?;
    let s = err_at!(FailConvert, std::str::from_utf8(&data), "{:?}", loc)?;
    err_at!(FailParse, toml::from_str(s), "config {:?}", loc)
}

/// Find config file. If `loc` is supplied use that, else look for files
/// matching `names` in the current directory and the home directory, in
/// that order.
pub fn find_config(loc: Option<ffi::OsString>, names: &[&str]) -> Option<path::PathBuf> {
    match loc {
        Some(loc) => Some(loc.into()),
        None => {
            let mut dirs = vec![];
            if let Ok(dir) = std::env::current_dir() {
                dirs.push(dir)
            }
            if let Some(dir) = dirs::home_dir() {
                dirs.push(dir)
            }
            for dir in dirs.into_iter() {
                for name in names.iter() {
                    let loc = dir.join(name);
                    if loc.is_file() {
                        return Some(loc);
                    }
                }
            }
            None
        }
    }
}

/// Create `dir`, if missing, and acquire an exclusive lock on its `LOCK`
/// file. The lock is held until the returned file is dropped.
pub fn lock_dir(dir: &path::Path) -> Result<fs::File> {
    err_at!(IOError, fs::create_dir_all(dir), "create dir {:?}", dir)?;

    let file: path::PathBuf = [dir.to_path_buf(), "LOCK".into()].iter().collect();
    let fd = {
        let mut opts = fs::OpenOptions::new();
        err_at!(
            IOError,
            opts.read(true).write(true).create(true).open(&file),
            "open {:?}",
            file
        )?
    };
    err_at!(InvalidFile, fd.try_lock_exclusive(), "locked by another process {:?}", file)?;

    Ok(fd)
}

/// Return the file-names of all sub-directories under `dir`.
pub fn sub_dirs(dir: &path::Path) -> Result<Vec<ffi::OsString>> {
    let mut names = vec![];
    for item in err_at!(IOError, fs::read_dir(dir), "read dir {:?}", dir)? {
        let entry = err_at!(IOError, item)?;
        if err_at!(IOError, entry.file_type())?.is_dir() {
            names.push(entry.file_name())
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
#[path = "files_test.rs"]
mod files_test;
