//! Module implement batching import of mutations into the index server.
//!
//! Mutations come in two flavors, set-bit `(frame, row, col)` and
//! set-value `(frame, field, col, value)`. [Importer] keeps one bounded
//! channel and one writer thread per frame, for bits, and per frame/field,
//! for values. Writers are spawned on first use. A writer blocks for the
//! first mutation, gathers outstanding mutations upto `batch_size` and
//! imports them into the [Sink] with a single call.
//!
//! A full channel blocks the caller until the writer catches up. Closing
//! the importer closes all channels and waits for the writers to drain
//! them, so no accepted mutation is dropped on shutdown.

use log::{debug, error, info, warn};

use std::{
    collections::{HashMap, HashSet},
    fmt, result,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc, Mutex, RwLock,
    },
    thread, time,
};

use crate::{
    ingest::Indexer,
    util::thread::{self as rt, Rx, Thread},
    Result,
};

pub mod http;
mod mem;

pub use mem::MemSink;

/// Default channel size, per frame and per field.
pub const CHAN_SIZE: usize = 1024;
/// Default maximum number of mutations imported in one sink call.
pub const BATCH_SIZE: usize = 65536;
/// Default number of retries for a failed import.
pub const RETRIES: usize = 2;
/// Default backoff before the first retry, doubled for every retry.
pub const BACKOFF: time::Duration = time::Duration::from_millis(10);

/// Destination for index mutations, typically an index server.
pub trait Sink: Send + Sync + 'static {
    /// Create frame, if missing.
    fn create_frame(&self, frame: &str) -> Result<()>;

    /// Create an integer field under frame, if missing.
    fn create_field(&self, frame: &str, field: &str) -> Result<()>;

    /// Import bits as `(row, col)` pairs.
    fn import_bits(&self, frame: &str, bits: &[(u64, u64)]) -> Result<()>;

    /// Import field values as `(col, value)` pairs.
    fn import_values(&self, frame: &str, field: &str, vals: &[(u64, i64)]) -> Result<()>;
}

/// Configuration for [Importer].
#[derive(Clone, Debug)]
pub struct Config {
    /// Channel size, per frame and per field.
    pub chan_size: usize,
    /// Maximum number of mutations imported in one sink call.
    pub batch_size: usize,
    /// Number of times a failed import is retried.
    pub retries: usize,
    /// Backoff before first retry.
    pub backoff: time::Duration,
}

impl<'a> arbitrary::Arbitrary<'a> for Config {
    fn arbitrary(u: &mut arbitrary::Unstructured) -> arbitrary::Result<Self> {
        let chan_size = *u.choose(&[1, 2, 16, CHAN_SIZE])?;
        let batch_size = *u.choose(&[1, 3, 100, BATCH_SIZE])?;
        let retries = *u.choose(&[0, 1, RETRIES])?;

        let mut config = Config::new();
        config
            .set_chan_size(chan_size)
            .set_batch_size(batch_size)
            .set_retries(retries)
            .set_backoff(time::Duration::from_millis(1));
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

impl Config {
    pub fn new() -> Config {
        Config {
            chan_size: CHAN_SIZE,
            batch_size: BATCH_SIZE,
            retries: RETRIES,
            backoff: BACKOFF,
        }
    }

    pub fn set_chan_size(&mut self, chan_size: usize) -> &mut Self {
        self.chan_size = chan_size;
        self
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    pub fn set_retries(&mut self, retries: usize) -> &mut Self {
        self.retries = retries;
        self
    }

    pub fn set_backoff(&mut self, backoff: time::Duration) -> &mut Self {
        self.backoff = backoff;
        self
    }
}

/// Statistics gathered by import writers.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImportStats {
    /// Number of writer threads.
    pub n_writers: usize,
    /// Number of sink calls that succeeded.
    pub n_batches: usize,
    /// Number of mutations imported.
    pub n_items: usize,
    /// Number of retried sink calls.
    pub n_retries: usize,
    /// Number of batches given up after exhausting retries.
    pub n_failed: usize,
    /// Number of mutations dropped along with failed batches.
    pub n_dropped: usize,
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "writers:{} batches:{} items:{} retries:{} failed:{} dropped:{}",
            self.n_writers,
            self.n_batches,
            self.n_items,
            self.n_retries,
            self.n_failed,
            self.n_dropped
        )
    }
}

impl ImportStats {
    pub fn merge(&mut self, other: &ImportStats) {
        self.n_writers += other.n_writers;
        self.n_batches += other.n_batches;
        self.n_items += other.n_items;
        self.n_retries += other.n_retries;
        self.n_failed += other.n_failed;
        self.n_dropped += other.n_dropped;
    }
}

type Bits = Thread<(u64, u64), (), ImportStats>;
type Vals = Thread<(u64, i64), (), ImportStats>;

/// Batching import client, refer to module documentation.
pub struct Importer<S>
where
    S: Sink,
{
    config: Config,
    sink: Arc<S>,

    frames: Mutex<HashSet<String>>,
    fields: Mutex<HashSet<(String, String)>>,
    bits: RwLock<HashMap<String, Bits>>,
    vals: RwLock<HashMap<(String, String), Vals>>,

    stats: Mutex<ImportStats>,
    closed: AtomicBool,
}

impl<S> Importer<S>
where
    S: Sink,
{
    pub fn new(config: Config, sink: Arc<S>) -> Importer<S> {
        Importer {
            config,
            sink,

            frames: Mutex::new(HashSet::new()),
            fields: Mutex::new(HashSet::new()),
            bits: RwLock::new(HashMap::new()),
            vals: RwLock::new(HashMap::new()),

            stats: Mutex::new(ImportStats::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// Set bit `row` for column `col` under `frame`.
    pub fn set_bit(&self, frame: &str, row: u64, col: u64) -> Result<()> {
        self.check_open()?;

        {
            let bits = err_at!(Fatal, self.bits.read())?;
            if let Some(w) = bits.get(frame) {
                return w.to_tx().post((row, col));
            }
        }

        // sink calls may be slow, make them before taking the write lock.
        self.ensure_frame(frame)?;

        let tx = {
            let mut bits = err_at!(Fatal, self.bits.write())?;
            match bits.get(frame) {
                Some(w) => w.to_tx(),
                None => {
                    self.check_open()?;
                    let w = self.spawn_bits(frame);
                    let tx = w.to_tx();
                    bits.insert(frame.to_string(), w);
                    tx
                }
            }
        };
        tx.post((row, col))
    }

    /// Set integer `value` for column `col` under `frame`/`field`.
    pub fn set_value(&self, frame: &str, field: &str, col: u64, value: i64) -> Result<()> {
        self.check_open()?;

        let key = (frame.to_string(), field.to_string());
        {
            let vals = err_at!(Fatal, self.vals.read())?;
            if let Some(w) = vals.get(&key) {
                return w.to_tx().post((col, value));
            }
        }

        self.ensure_frame(frame)?;
        self.ensure_field(frame, field)?;

        let tx = {
            let mut vals = err_at!(Fatal, self.vals.write())?;
            match vals.get(&key) {
                Some(w) => w.to_tx(),
                None => {
                    self.check_open()?;
                    let w = self.spawn_vals(frame, field);
                    let tx = w.to_tx();
                    vals.insert(key, w);
                    tx
                }
            }
        };
        tx.post((col, value))
    }

    /// Close all channels and wait for writers to drain them. Calling this
    /// more than once is fine, every call return the cumulative stats.
    pub fn close_wait(&self) -> Result<ImportStats> {
        self.closed.store(true, SeqCst);

        let bits: Vec<Bits> = {
            let mut bits = err_at!(Fatal, self.bits.write())?;
            bits.drain().map(|(_, w)| w).collect()
        };
        let vals: Vec<Vals> = {
            let mut vals = err_at!(Fatal, self.vals.write())?;
            vals.drain().map(|(_, w)| w).collect()
        };

        let mut stats = err_at!(Fatal, self.stats.lock())?;
        for w in bits.into_iter() {
            stats.merge(&w.join()?);
        }
        for w in vals.into_iter() {
            stats.merge(&w.join()?);
        }

        Ok(*stats)
    }

    fn check_open(&self) -> Result<()> {
        match self.closed.load(SeqCst) {
            true => err_at!(Closed, msg: "importer closed"),
            false => Ok(()),
        }
    }

    // create calls are idempotent on the sink, concurrent callers may
    // both make it.
    fn ensure_frame(&self, frame: &str) -> Result<()> {
        if err_at!(Fatal, self.frames.lock())?.contains(frame) {
            return Ok(());
        }
        self.sink.create_frame(frame)?;
        err_at!(Fatal, self.frames.lock())?.insert(frame.to_string());
        Ok(())
    }

    fn ensure_field(&self, frame: &str, field: &str) -> Result<()> {
        let key = (frame.to_string(), field.to_string());
        if err_at!(Fatal, self.fields.lock())?.contains(&key) {
            return Ok(());
        }
        self.sink.create_field(frame, field)?;
        err_at!(Fatal, self.fields.lock())?.insert(key);
        Ok(())
    }

    fn spawn_bits(&self, frame: &str) -> Bits {
        let name = format!("import-{}", frame);
        debug!(target: "pdk", "spawning writer {:?}", name);

        let (config, sink) = (self.config.clone(), Arc::clone(&self.sink));
        let (frame, wname) = (frame.to_string(), name.clone());
        Thread::new_sync(&name, self.config.chan_size, move |rx| {
            move || writer(&wname, config, rx, |bits| sink.import_bits(&frame, bits))
        })
    }

    fn spawn_vals(&self, frame: &str, field: &str) -> Vals {
        let name = format!("import-{}/{}", frame, field);
        debug!(target: "pdk", "spawning writer {:?}", name);

        let (config, sink) = (self.config.clone(), Arc::clone(&self.sink));
        let (frame, field) = (frame.to_string(), field.to_string());
        let wname = name.clone();
        Thread::new_sync(&name, self.config.chan_size, move |rx| {
            move || writer(&wname, config, rx, |vals| sink.import_values(&frame, &field, vals))
        })
    }
}

impl<S> Indexer for Importer<S>
where
    S: Sink,
{
    fn add_bit(&self, frame: &str, col: u64, row: u64) -> Result<()> {
        self.set_bit(frame, row, col)
    }

    fn add_value(&self, frame: &str, field: &str, col: u64, value: i64) -> Result<()> {
        self.set_value(frame, field, col, value)
    }

    fn close(&self) -> Result<()> {
        let stats = self.close_wait()?;
        info!(target: "pdk", "importer closed {}", stats);
        Ok(())
    }
}

impl<S> Drop for Importer<S>
where
    S: Sink,
{
    fn drop(&mut self) {
        if let Err(err) = self.close_wait() {
            error!(target: "pdk", "importer drop {}", err)
        }
    }
}

// main loop for import writers, FIFO with respect to the channel.
fn writer<M, F>(name: &str, config: Config, rx: Rx<M>, mut import: F) -> ImportStats
where
    M: Copy,
    F: FnMut(&[M]) -> Result<()>,
{
    let mut stats = ImportStats {
        n_writers: 1,
        ..ImportStats::default()
    };

    let batch_size = std::cmp::max(config.batch_size, 1);
    while let Some(msgs) = rt::recv_batch(&rx, batch_size) {
        let items: Vec<M> = msgs.into_iter().map(|(m, _)| m).collect();

        let mut backoff = config.backoff;
        let mut attempt = 0;
        loop {
            match import(&items) {
                Ok(()) => {
                    stats.n_batches += 1;
                    stats.n_items += items.len();
                    break;
                }
                Err(err) if attempt < config.retries => {
                    warn!(target: "pdk", "{} retry {} after {:?}: {}", name, attempt, backoff, err);
                    stats.n_retries += 1;
                    attempt += 1;
                    thread::sleep(backoff);
                    backoff *= 2;
                }
                Err(err) => {
                    error!(
                        target: "pdk",
                        "{} dropping {} items after {} retries: {}", name, items.len(), attempt, err
                    );
                    stats.n_failed += 1;
                    stats.n_dropped += items.len();
                    break;
                }
            }
        }
    }

    debug!(target: "pdk", "{} exit {}", name, stats);
    stats
}
