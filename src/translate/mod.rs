//! Module implement dictionary encoding of values into dense identifiers.
//!
//! Values are translated within a named namespace called frame. Each frame
//! own its identifier space starting from ZERO, the Nth distinct value seen
//! for a frame gets identifier N-1. Mappings are never deleted and never
//! re-assigned. Frames are created lazily by [Translator::get_id] and
//! [Translator::bulk_add].
//!
//! All backends implement the same double checked lookup: a read-only
//! lookup of the value's reverse mapping, and on a miss, a re-check under
//! a write lock before minting the next identifier. So that concurrent
//! callers racing on the same new value see exactly one identifier.
//!
//! Backends are selected via [Config], refer to [open].

use serde::Deserialize;

use std::{ffi, fmt, path, result, str::FromStr, sync::Arc};

use crate::Result;

pub mod batch;
pub mod bucket;
pub mod mem;
mod store;

pub use store::BULK_BATCH;

/// Default number of lock buckets used by [bucket::BucketTranslator].
pub const BUCKETS: usize = 1000;
/// Default lmdb map size, per frame and direction.
pub const MAP_SIZE: usize = 1024 * 1024 * 1024;
/// Default number of assignments committed in a single batch by
/// [batch::BatchTranslator].
pub const BATCH_SIZE: usize = 1024;

/// Bidirectional value to identifier translation.
pub trait Translator: Send + Sync {
    /// Return the identifier for `value` within `frame`, assign the next
    /// identifier if `value` is seen for the first time. Unknown frames are
    /// created.
    fn get_id(&self, frame: &str, value: &[u8]) -> Result<u64>;

    /// Return the value assigned to `id` within `frame`. Unknown frame and
    /// unassigned identifier are reported as `KeyNotFound`.
    fn get(&self, frame: &str, id: u64) -> Result<Vec<u8>>;

    /// Load values into an empty `frame`, value at index `i` is assigned
    /// identifier `i`. Meant for initial loads, before concurrent
    /// [Translator::get_id] calls on the same frame.
    fn bulk_add(&self, frame: &str, values: &[Vec<u8>]) -> Result<()>;

    /// Return the list of known frames, sorted.
    fn to_frames(&self) -> Result<Vec<String>>;

    /// Flush and release resources. Subsequent calls, other than close,
    /// shall fail.
    fn close(&self) -> Result<()>;
}

/// Enumerates translator backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Mem,
    Bucket,
    Batch,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match self {
            Kind::Mem => write!(f, "mem"),
            Kind::Bucket => write!(f, "bucket"),
            Kind::Batch => write!(f, "batch"),
        }
    }
}

impl FromStr for Kind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Kind> {
        match s {
            "mem" => Ok(Kind::Mem),
            "bucket" => Ok(Kind::Bucket),
            "batch" => Ok(Kind::Batch),
            _ => err_at!(InvalidInput, msg: "invalid translator kind {:?}", s),
        }
    }
}

/// Configuration for translators.
#[derive(Clone, Debug)]
pub struct Config {
    /// Translator backend.
    pub kind: Kind,
    /// Directory for persisted translators, ignored by in-memory translator.
    pub dir: ffi::OsString,
    /// Frames to open up front, frames found under `dir` are opened anyway.
    pub frames: Vec<String>,
    /// Number of lock buckets.
    pub buckets: usize,
    /// lmdb map size, per frame and direction.
    pub map_size: usize,
    /// Maximum number of new assignments committed in a single batch.
    pub batch_size: usize,
    /// Sync to disk on every commit.
    pub fsync: bool,
}

impl<'a> arbitrary::Arbitrary<'a> for Config {
    fn arbitrary(u: &mut arbitrary::Unstructured) -> arbitrary::Result<Self> {
        let kind = *u.choose(&[Kind::Mem, Kind::Bucket, Kind::Batch])?;
        let buckets = *u.choose(&[1, 7, 100, BUCKETS])?;
        let batch_size = *u.choose(&[1, 16, BATCH_SIZE])?;

        let mut config = Config::new(std::env::temp_dir().as_os_str(), kind);
        config
            .set_buckets(buckets)
            .set_batch_size(batch_size)
            .set_map_size(64 * 1024 * 1024)
            .set_fsync(false);
        Ok(config)
    }
}

impl Config {
    pub fn new(dir: &ffi::OsStr, kind: Kind) -> Config {
        Config {
            kind,
            dir: dir.to_os_string(),
            frames: Vec::default(),
            buckets: BUCKETS,
            map_size: MAP_SIZE,
            batch_size: BATCH_SIZE,
            fsync: true,
        }
    }

    pub fn set_frames(&mut self, frames: Vec<String>) -> &mut Self {
        self.frames = frames;
        self
    }

    pub fn set_buckets(&mut self, buckets: usize) -> &mut Self {
        self.buckets = buckets;
        self
    }

    pub fn set_map_size(&mut self, map_size: usize) -> &mut Self {
        self.map_size = map_size;
        self
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    pub fn set_fsync(&mut self, fsync: bool) -> &mut Self {
        self.fsync = fsync;
        self
    }

    pub fn to_dir(&self) -> path::PathBuf {
        path::PathBuf::from(&self.dir)
    }
}

/// Open a translator as per `config`.
pub fn open(config: Config) -> Result<Arc<dyn Translator>> {
    let val: Arc<dyn Translator> = match config.kind {
        Kind::Mem => Arc::new(mem::MemTranslator::new()),
        Kind::Bucket => Arc::new(bucket::BucketTranslator::open(config)?),
        Kind::Batch => Arc::new(batch::BatchTranslator::open(config)?),
    };
    Ok(val)
}

#[cfg(test)]
#[path = "translate_test.rs"]
mod translate_test;
