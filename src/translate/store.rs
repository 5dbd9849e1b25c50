//! Lmdb backed storage for persistent translators.
//!
//! Each frame is persisted as two lmdb environments under the translator's
//! directory, `<frame>-id` mapping identifier to value and `<frame>-val`
//! mapping value to identifier. Identifiers are encoded as 8-byte big-endian.

use lmdb::{Cursor, Transaction};
use log::{debug, error, info, warn};

use std::{
    collections::{HashMap, HashSet},
    path,
    sync::{Arc, Mutex, RwLock},
};

use crate::{
    nexter::Nexter,
    translate::Config,
    util::{self, files},
    Result,
};

/// Number of values written per transaction by bulk-add.
pub const BULK_BATCH: usize = 10_000;

const ID_SUFFIX: &str = "-id";
const VAL_SUFFIX: &str = "-val";

// lmdb keys are limited to 511 bytes, longer values are keyed by their
// 128-bit city-hash in the reverse store.
const MAX_INLINE_KEY: usize = 500;
const TAG_INLINE: u8 = 0;
const TAG_HASHED: u8 = 1;

fn reverse_key(value: &[u8]) -> Vec<u8> {
    if value.len() <= MAX_INLINE_KEY {
        let mut key = Vec::with_capacity(value.len() + 1);
        key.push(TAG_INLINE);
        key.extend_from_slice(value);
        key
    } else {
        let mut key = Vec::with_capacity(17);
        key.push(TAG_HASHED);
        key.extend_from_slice(&cityhash_rs::cityhash_110_128(value).to_be_bytes());
        key
    }
}

/// Single lmdb environment with its default database.
pub struct Store {
    loc: path::PathBuf,
    env: lmdb::Environment,
    db: lmdb::Database,
}

impl Store {
    fn open(loc: path::PathBuf, config: &Config) -> Result<Store> {
        err_at!(IOError, std::fs::create_dir_all(&loc), "create dir {:?}", loc)?;

        let mut flags = lmdb::EnvironmentFlags::empty();
        flags.insert(lmdb::EnvironmentFlags::NO_TLS);
        if !config.fsync {
            flags.insert(lmdb::EnvironmentFlags::NO_SYNC);
            flags.insert(lmdb::EnvironmentFlags::NO_META_SYNC);
        }
        let env = err_at!(
            FailStore,
            lmdb::Environment::new()
                .set_flags(flags)
                .set_map_size(config.map_size)
                .open(&loc),
            "open {:?}",
            loc
        )?;
        let db = err_at!(FailStore, env.open_db(None), "open db {:?}", loc)?;

        Ok(Store { loc, env, db })
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = err_at!(FailStore, self.env.begin_ro_txn(), "{:?}", self.loc)?;
        match txn.get(self.db, &key) {
            Ok(data) => Ok(Some(data.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(err) => err_at!(FailStore, Err(err), "get {:?}", self.loc),
        }
    }

    fn last_key(&self) -> Result<Option<Vec<u8>>> {
        let txn = err_at!(FailStore, self.env.begin_ro_txn(), "{:?}", self.loc)?;
        let key = {
            let cursor = err_at!(FailStore, txn.open_ro_cursor(self.db))?;
            match cursor.get(None, None, lmdb_sys::MDB_LAST) {
                Ok((Some(key), _)) => Some(key.to_vec()),
                Ok((None, _)) | Err(lmdb::Error::NotFound) => None,
                Err(err) => err_at!(FailStore, Err(err), "last {:?}", self.loc)?,
            }
        };
        Ok(key)
    }

    fn put_all<K, V>(&self, items: &[(K, V)]) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let flags = lmdb::WriteFlags::empty();
        let mut txn = err_at!(FailStore, self.env.begin_rw_txn(), "{:?}", self.loc)?;
        for (key, value) in items.iter() {
            err_at!(FailStore, txn.put(self.db, key, value, flags), "{:?}", self.loc)?;
        }
        err_at!(FailStore, txn.commit(), "commit {:?}", self.loc)
    }

    fn delete_all<K>(&self, keys: &[K]) -> Result<()>
    where
        K: AsRef<[u8]>,
    {
        let mut txn = err_at!(FailStore, self.env.begin_rw_txn(), "{:?}", self.loc)?;
        for key in keys.iter() {
            match txn.del(self.db, key, None) {
                Ok(()) | Err(lmdb::Error::NotFound) => (),
                Err(err) => err_at!(FailStore, Err(err), "del {:?}", self.loc)?,
            }
        }
        err_at!(FailStore, txn.commit(), "commit {:?}", self.loc)
    }

    fn sync(&self) -> Result<()> {
        err_at!(FailStore, self.env.sync(true), "sync {:?}", self.loc)
    }
}

/// Persisted frame, bijective mapping between values and identifiers.
///
/// Writers serialize on the frame's write lock. The counter is advanced
/// only after both stores are committed, so a failed write never leaves a
/// gap in the identifier space.
pub struct Frame {
    name: String,
    ids: Store,
    vals: Store,
    nexter: Nexter,
    wlock: Mutex<()>,
}

impl Frame {
    fn open(dir: &path::Path, name: &str, config: &Config) -> Result<Frame> {
        let ids = Store::open(dir.join(name.to_string() + ID_SUFFIX), config)?;
        let vals = Store::open(dir.join(name.to_string() + VAL_SUFFIX), config)?;

        let start = repair(name, &ids, &vals)?;
        debug!(target: "pdk", "frame {:?} opened, next id {}", name, start);

        Ok(Frame {
            name: name.to_string(),
            ids,
            vals,
            nexter: Nexter::new(start),
            wlock: Mutex::new(()),
        })
    }

    /// Return the identifier that shall be assigned next.
    pub fn to_count(&self) -> u64 {
        self.nexter.to_count()
    }

    pub fn lookup_id(&self, value: &[u8]) -> Result<Option<u64>> {
        let id = match self.vals.get(&reverse_key(value))? {
            Some(data) => util::decode_id(&data)?,
            None => return Ok(None),
        };

        if value.len() > MAX_INLINE_KEY {
            match self.lookup_value(id)? {
                Some(stored) if stored == value => (),
                Some(_) => err_at!(
                    FailStore,
                    msg: "frame {:?} hash collision on id {}", self.name, id
                )?,
                None => return Ok(None),
            }
        }

        Ok(Some(id))
    }

    pub fn lookup_value(&self, id: u64) -> Result<Option<Vec<u8>>> {
        self.ids.get(&util::encode_id(id))
    }

    /// Return identifiers for `values`, in the same order, assigning the
    /// next identifiers to values seen for the first time. New assignments
    /// are persisted in one write per store. Also return the number of
    /// new assignments.
    pub fn assign<V>(&self, values: &[V]) -> Result<(Vec<u64>, u64)>
    where
        V: AsRef<[u8]>,
    {
        let _guard = err_at!(Fatal, self.wlock.lock())?;

        let start = self.nexter.to_count();
        let mut fresh: HashMap<&[u8], u64> = HashMap::new();
        let mut items: Vec<(u64, &[u8])> = vec![];
        let mut ids = Vec::with_capacity(values.len());

        for value in values.iter() {
            let value = value.as_ref();
            let id = match fresh.get(value) {
                Some(id) => *id,
                None => match self.lookup_id(value)? {
                    Some(id) => id,
                    None => {
                        let id = start + (items.len() as u64);
                        fresh.insert(value, id);
                        items.push((id, value));
                        id
                    }
                },
            };
            ids.push(id);
        }

        let n = items.len() as u64;
        self.write(&items)?;
        if !self.nexter.reserve(start, n) {
            err_at!(Fatal, msg: "frame {:?} counter moved from {}", self.name, start)?
        }

        Ok((ids, n))
    }

    // Persist assignments, the forward mapping is committed ahead of the
    // reverse mapping. If the reverse commit fails the forward mapping is
    // deleted, failing that it is dropped by `repair` on the next open.
    fn write<V>(&self, items: &[(u64, V)]) -> Result<()>
    where
        V: AsRef<[u8]>,
    {
        if items.is_empty() {
            return Ok(());
        }

        let fwd: Vec<([u8; 8], &[u8])> = items
            .iter()
            .map(|(id, value)| (util::encode_id(*id), value.as_ref()))
            .collect();
        self.ids.put_all(&fwd)?;

        let rev: Vec<(Vec<u8>, [u8; 8])> = fwd
            .iter()
            .map(|(id, value)| (reverse_key(value), *id))
            .collect();
        match self.vals.put_all(&rev) {
            Ok(()) => Ok(()),
            Err(err) => {
                let keys: Vec<[u8; 8]> = fwd.iter().map(|(id, _)| *id).collect();
                if let Err(e) = self.ids.delete_all(&keys) {
                    error!(target: "pdk", "frame {:?} undo forward: {}", self.name, e)
                }
                Err(err)
            }
        }
    }

    /// Value at index `i` is assigned identifier `i`. Frame must be empty
    /// and values must be unique. Either all values are assigned or none.
    pub fn bulk_add(&self, values: &[Vec<u8>]) -> Result<()> {
        {
            let mut seen = HashSet::with_capacity(values.len());
            for value in values.iter() {
                if !seen.insert(value.as_slice()) {
                    err_at!(InvalidInput, msg: "duplicate value in bulk {:?}", value)?
                }
            }
        }

        let _guard = err_at!(Fatal, self.wlock.lock())?;

        if self.to_count() != 0 {
            err_at!(
                InvalidInput,
                msg: "bulk-add on non-empty frame {:?}, count {}", self.name, self.to_count()
            )?
        }

        let n = values.len() as u64;
        for (i, chunk) in values.chunks(BULK_BATCH).enumerate() {
            let base = (i * BULK_BATCH) as u64;
            let items: Vec<(u64, &[u8])> = chunk
                .iter()
                .enumerate()
                .map(|(j, value)| (base + (j as u64), value.as_slice()))
                .collect();
            if let Err(err) = self.write(&items) {
                self.undo_bulk(&values[..(base as usize)]);
                return Err(err);
            }
        }

        if !self.nexter.reserve(0, n) {
            err_at!(Fatal, msg: "frame {:?} counter moved during bulk-add", self.name)?
        }
        info!(target: "pdk", "frame {:?} bulk loaded {} values", self.name, n);

        Ok(())
    }

    // delete sub-batches committed by a failed bulk-add.
    fn undo_bulk(&self, values: &[Vec<u8>]) {
        let rev: Vec<Vec<u8>> = values.iter().map(|v| reverse_key(v)).collect();
        let fwd: Vec<[u8; 8]> = (0..values.len() as u64).map(util::encode_id).collect();

        let res = self.vals.delete_all(&rev).and_then(|_| self.ids.delete_all(&fwd));
        if let Err(err) = res {
            error!(target: "pdk", "frame {:?} undo bulk-add: {}", self.name, err)
        }
    }

    fn sync(&self) -> Result<()> {
        self.ids.sync()?;
        self.vals.sync()
    }
}

// Drop forward mappings at the tail that have no matching reverse mapping,
// left behind by a write interrupted between the two commits. Return the
// identifier to be assigned next.
fn repair(name: &str, ids: &Store, vals: &Store) -> Result<u64> {
    let mut next = match ids.last_key()? {
        Some(key) => util::decode_id(&key)? + 1,
        None => 0,
    };

    let mut orphans = vec![];
    while next > 0 {
        let id = next - 1;
        let value = match ids.get(&util::encode_id(id))? {
            Some(value) => value,
            None => break,
        };
        match vals.get(&reverse_key(&value))? {
            Some(data) if util::decode_id(&data)? == id => break,
            _ => {
                orphans.push(util::encode_id(id));
                next = id;
            }
        }
    }

    if !orphans.is_empty() {
        warn!(target: "pdk", "frame {:?} dropping {} orphan ids", name, orphans.len());
        ids.delete_all(&orphans)?;
    }

    Ok(next)
}

/// Registry of persisted frames under a translator directory, frames are
/// created lazily.
pub struct Frames {
    dir: path::PathBuf,
    config: Config,
    frames: RwLock<HashMap<String, Arc<Frame>>>,
}

impl Frames {
    /// Open frames found under `dir` along with frames listed in `config`.
    pub fn open(dir: &path::Path, config: &Config) -> Result<Frames> {
        let mut names: Vec<String> = config.frames.clone();
        for name in files::sub_dirs(dir)?.into_iter() {
            match name.to_str() {
                Some(name) if name.ends_with(ID_SUFFIX) => {
                    let name = &name[..(name.len() - ID_SUFFIX.len())];
                    let val_dir = dir.join(name.to_string() + VAL_SUFFIX);
                    if val_dir.is_dir() && !names.iter().any(|n| n == name) {
                        names.push(name.to_string())
                    }
                }
                _ => (),
            }
        }

        let mut frames = HashMap::new();
        for name in names.into_iter() {
            validate_name(&name)?;
            let frame = Frame::open(dir, &name, config)?;
            frames.insert(name, Arc::new(frame));
        }
        info!(target: "pdk", "opened {} frames under {:?}", frames.len(), dir);

        Ok(Frames {
            dir: dir.to_path_buf(),
            config: config.clone(),
            frames: RwLock::new(frames),
        })
    }

    pub fn get(&self, name: &str) -> Result<Option<Arc<Frame>>> {
        let frames = err_at!(Fatal, self.frames.read())?;
        Ok(frames.get(name).map(Arc::clone))
    }

    pub fn get_or_create(&self, name: &str) -> Result<Arc<Frame>> {
        if let Some(frame) = self.get(name)? {
            return Ok(frame);
        }

        let mut frames = err_at!(Fatal, self.frames.write())?;
        match frames.get(name) {
            Some(frame) => Ok(Arc::clone(frame)),
            None => {
                validate_name(name)?;
                let frame = Arc::new(Frame::open(&self.dir, name, &self.config)?);
                frames.insert(name.to_string(), Arc::clone(&frame));
                Ok(frame)
            }
        }
    }

    pub fn to_names(&self) -> Result<Vec<String>> {
        let frames = err_at!(Fatal, self.frames.read())?;
        let mut names: Vec<String> = frames.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Flush all frames to disk and drop them.
    pub fn close(&self) -> Result<()> {
        let frames: Vec<Arc<Frame>> = {
            let mut frames = err_at!(Fatal, self.frames.write())?;
            frames.drain().map(|(_, f)| f).collect()
        };
        for frame in frames.iter() {
            frame.sync()?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|ch: char| ch == '/' || ch == '\\' || ch == '\0');
    if ok {
        Ok(())
    } else {
        err_at!(InvalidInput, msg: "invalid frame name {:?}", name)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
