//! Persistent translator, with new assignments committed in batches.
//!
//! Lookups are served directly from lmdb. On a miss, the request is sent to
//! a single writer thread. The writer blocks for the first request, gathers
//! as many outstanding requests as possible from its channel, and commits
//! all new assignments of a frame with one write transaction per store.
//! Requests are answered only after the commit, hence a caller always sees
//! its assignment durable (subject to `fsync` setting).

use log::{debug, error, info};

use std::{
    collections::HashMap,
    mem,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        mpsc, Arc, Mutex,
    },
};

use crate::{
    translate::{store::Frames, Config, Translator},
    util::{files, thread},
    Result,
};

/// Channel size for the writer thread.
pub const SYNC_BUFFER: usize = 1024;

#[derive(Debug)]
pub enum Req {
    // translate value, assigning a new identifier if needed.
    GetId { frame: String, value: Vec<u8> },
}

type Res = Result<u64>;

/// Translator persisted in lmdb, refer to module documentation.
pub struct BatchTranslator {
    name: String,
    frames: Arc<Frames>,
    writer: Mutex<Option<thread::Thread<Req, Res, u64>>>,
    tx: Mutex<Option<thread::Tx<Req, Res>>>,
    lock_file: Mutex<Option<std::fs::File>>,
    closed: AtomicBool,
}

impl BatchTranslator {
    /// Open translator under `config.dir`, create the directory if missing.
    /// Previously persisted frames and their mappings are recovered.
    pub fn open(config: Config) -> Result<BatchTranslator> {
        let dir = config.to_dir();
        let lock_file = files::lock_dir(&dir)?;
        let frames = Arc::new(Frames::open(&dir, &config)?);

        let name = format!("{:?}", dir);
        let batch_size = std::cmp::max(config.batch_size, 1);
        let writer = {
            let frames = Arc::clone(&frames);
            let name = format!("batch-translator-{}", name);
            thread::Thread::new_sync(&name, SYNC_BUFFER, move |rx| {
                move || {
                    let w = Writer {
                        frames,
                        batch_size,
                        rx,
                    };
                    w.run()
                }
            })
        };
        let tx = writer.to_tx();
        info!(target: "pdk", "batch-translator {} batch_size {}", name, batch_size);

        Ok(BatchTranslator {
            name,
            frames,
            writer: Mutex::new(Some(writer)),
            tx: Mutex::new(Some(tx)),
            lock_file: Mutex::new(Some(lock_file)),
            closed: AtomicBool::new(false),
        })
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(SeqCst) {
            err_at!(Closed, msg: "batch-translator {}", self.name)
        } else {
            Ok(())
        }
    }

    fn to_tx(&self) -> Result<thread::Tx<Req, Res>> {
        match err_at!(Fatal, self.tx.lock())?.as_ref() {
            Some(tx) => Ok(tx.clone()),
            None => err_at!(Closed, msg: "batch-translator {}", self.name),
        }
    }
}

impl Translator for BatchTranslator {
    fn get_id(&self, frame: &str, value: &[u8]) -> Result<u64> {
        self.check_open()?;

        if let Some(frame) = self.frames.get(frame)? {
            if let Some(id) = frame.lookup_id(value)? {
                return Ok(id);
            }
        }

        let req = Req::GetId {
            frame: frame.to_string(),
            value: value.to_vec(),
        };
        self.to_tx()?.request(req)?
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

        mem::drop(err_at!(Fatal, self.tx.lock())?.take());
        let writer = err_at!(Fatal, self.writer.lock())?.take();
        if let Some(writer) = writer {
            let n = writer.join()?;
            info!(target: "pdk", "batch-translator {} assigned {} ids", self.name, n);
        }

        self.frames.close()?;
        err_at!(Fatal, self.lock_file.lock())?.take();
        Ok(())
    }
}

impl Drop for BatchTranslator {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(target: "pdk", "batch-translator {} close: {}", self.name, err)
        }
    }
}

struct Writer {
    frames: Arc<Frames>,
    batch_size: usize,
    rx: thread::Rx<Req, Res>,
}

type Pending = Vec<(Vec<u8>, Option<mpsc::Sender<Res>>)>;

impl Writer {
    // return the number of identifiers assigned.
    fn run(self) -> u64 {
        let mut n_assigned = 0;

        while let Some(reqs) = thread::recv_batch(&self.rx, self.batch_size) {
            let mut groups: HashMap<String, Pending> = HashMap::new();
            for (req, tx) in reqs.into_iter() {
                match req {
                    Req::GetId { frame, value } => {
                        groups.entry(frame).or_default().push((value, tx))
                    }
                }
            }

            for (name, pending) in groups.into_iter() {
                let res = self.frames.get_or_create(&name).and_then(|frame| {
                    let values: Vec<&[u8]> = pending.iter().map(|(v, _)| v.as_slice()).collect();
                    frame.assign(&values)
                });
                match res {
                    Ok((ids, n)) => {
                        debug!(target: "pdk", "frame {:?} committed {} ids", name, n);
                        n_assigned += n;
                        for ((_, tx), id) in pending.into_iter().zip(ids.into_iter()) {
                            if let Some(tx) = tx {
                                tx.send(Ok(id)).ok();
                            }
                        }
                    }
                    Err(err) => {
                        error!(target: "pdk", "frame {:?} batch failed: {}", name, err);
                        for (_, tx) in pending.into_iter() {
                            if let Some(tx) = tx {
                                tx.send(Err(err.clone())).ok();
                            }
                        }
                    }
                }
            }
        }

        n_assigned
    }
}

#[cfg(test)]
#[path = "batch_test.rs"]
mod batch_test;
