//! Persistent translator, with writers serialized per value-bucket.
//!
//! A fixed array of mutexes is indexed by the city-hash of the value, so
//! that racing callers for the same new value serialize on the same mutex
//! and only one of them reaches the frame's writer. Readers never take a
//! lock.

use log::info;

use std::{
    fs,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Mutex,
    },
};

use crate::{
    hash,
    translate::{store::Frames, Config, Translator},
    util::files,
    Result,
};

/// Translator persisted in lmdb, refer to module documentation.
pub struct BucketTranslator {
    name: String,
    frames: Frames,
    buckets: Vec<Mutex<()>>,
    lock_file: Mutex<Option<fs::File>>,
    closed: AtomicBool,
}

impl BucketTranslator {
    /// Open translator under `config.dir`, create the directory if missing.
    /// Previously persisted frames and their mappings are recovered.
    pub fn open(config: Config) -> Result<BucketTranslator> {
        let dir = config.to_dir();
        let lock_file = files::lock_dir(&dir)?;
        let frames = Frames::open(&dir, &config)?;

        let n = std::cmp::max(config.buckets, 1);
        let buckets = (0..n).map(|_| Mutex::new(())).collect();
        info!(target: "pdk", "bucket-translator {:?} with {} buckets", dir, n);

        Ok(BucketTranslator {
            name: format!("{:?}", dir),
            frames,
            buckets,
            lock_file: Mutex::new(Some(lock_file)),
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(SeqCst) {
            err_at!(Closed, msg: "bucket-translator {}", self.name)
        } else {
            Ok(())
        }
    }
}

impl Translator for BucketTranslator {
    fn get_id(&self, frame: &str, value: &[u8]) -> Result<u64> {
        self.check_open()?;

        let frame = self.frames.get_or_create(frame)?;
        if let Some(id) = frame.lookup_id(value)? {
            return Ok(id);
        }

        let bucket = &self.buckets[hash::to_bucket(value, self.buckets.len())];
        let _guard = err_at!(Fatal, bucket.lock())?;
        match frame.lookup_id(value)? {
            Some(id) => Ok(id),
            None => {
                let (ids, _) = frame.assign(&[value])?;
                Ok(ids[0])
            }
        }
    }

    fn get(&self, name: &str, id: u64) -> Result<Vec<u8>> {
        self.check_open()?;

        match self.frames.get(name)? {
            Some(frame) => match frame.lookup_value(id)? {
                Some(value) => Ok(value),
                None => err_at!(KeyNotFound, msg: "frame {:?} id {}", name, id),
            },
            None => err_at!(KeyNotFound, msg: "unknown frame {:?}", name),
        }
    }

    fn bulk_add(&self, name: &str, values: &[Vec<u8>]) -> Result<()> {
        self.check_open()?;
        self.frames.get_or_create(name)?.bulk_add(values)
    }

    fn to_frames(&self) -> Result<Vec<String>> {
        self.check_open()?;
        self.frames.to_names()
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, SeqCst) {
            return Ok(());
        }

        self.frames.close()?;
        err_at!(Fatal, self.lock_file.lock())?.take();
        info!(target: "pdk", "bucket-translator {} closed", self.name);
        Ok(())
    }
}

#[cfg(test)]
#[path = "bucket_test.rs"]
mod bucket_test;
