//! In-memory translator, fastest and not durable.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Arc, RwLock,
    },
};

use crate::{hash::CityHasher, translate::Translator, Result};

/// Translator holding all frames in memory, each frame is protected by
/// its own read-write lock.
#[derive(Default)]
pub struct MemTranslator {
    frames: RwLock<HashMap<String, Arc<RwLock<Frame>>>>,
    closed: AtomicBool,
}

struct Frame {
    ids: Vec<Vec<u8>>,
    vals: HashMap<Vec<u8>, u64, CityHasher>,
}

impl Default for Frame {
    fn default() -> Frame {
        Frame {
            ids: Vec::default(),
            vals: HashMap::with_hasher(CityHasher::new()),
        }
    }
}

impl MemTranslator {
    pub fn new() -> MemTranslator {
        MemTranslator::default()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(SeqCst) {
            err_at!(Closed, msg: "mem-translator")
        } else {
            Ok(())
        }
    }

    fn get_frame(&self, name: &str) -> Result<Option<Arc<RwLock<Frame>>>> {
        let frames = err_at!(Fatal, self.frames.read())?;
        Ok(frames.get(name).map(Arc::clone))
    }

    fn get_or_create(&self, name: &str) -> Result<Arc<RwLock<Frame>>> {
        if let Some(frame) = self.get_frame(name)? {
            return Ok(frame);
        }

        let mut frames = err_at!(Fatal, self.frames.write())?;
        let frame = frames
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Frame::default())));
        Ok(Arc::clone(frame))
    }
}

impl Translator for MemTranslator {
    fn get_id(&self, frame: &str, value: &[u8]) -> Result<u64> {
        self.check_open()?;

        let frame = self.get_or_create(frame)?;
        {
            let r = err_at!(Fatal, frame.read())?;
            if let Some(id) = r.vals.get(value) {
                return Ok(*id);
            }
        }

        let mut w = err_at!(Fatal, frame.write())?;
        match w.vals.get(value).copied() {
            Some(id) => Ok(id),
            None => {
                let id = w.ids.len() as u64;
                w.ids.push(value.to_vec());
                w.vals.insert(value.to_vec(), id);
                Ok(id)
            }
        }
    }

    fn get(&self, name: &str, id: u64) -> Result<Vec<u8>> {
        self.check_open()?;

        let frame = match self.get_frame(name)? {
            Some(frame) => frame,
            None => err_at!(KeyNotFound, msg: "unknown frame {:?}", name)?,
        };
        let r = err_at!(Fatal, frame.read())?;
        match r.ids.get(id as usize) {
            Some(value) => Ok(value.to_vec()),
            None => err_at!(KeyNotFound, msg: "frame {:?} id {}", name, id),
        }
    }

    fn bulk_add(&self, name: &str, values: &[Vec<u8>]) -> Result<()> {
        self.check_open()?;

        let frame = self.get_or_create(name)?;
        let mut w = err_at!(Fatal, frame.write())?;
        if !w.ids.is_empty() {
            err_at!(InvalidInput, msg: "bulk-add on non-empty frame {:?}", name)?
        }

        let mut vals = HashMap::with_capacity_and_hasher(values.len(), CityHasher::new());
        for (id, value) in values.iter().enumerate() {
            if vals.insert(value.to_vec(), id as u64).is_some() {
                err_at!(InvalidInput, msg: "duplicate value in bulk {:?}", value)?
            }
        }
        w.vals = vals;
        w.ids = values.to_vec();

        Ok(())
    }

    fn to_frames(&self) -> Result<Vec<String>> {
        self.check_open()?;

        let frames = err_at!(Fatal, self.frames.read())?;
        let mut names: Vec<String> = frames.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, SeqCst) {
            err_at!(Fatal, self.frames.write())?.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "mem_test.rs"]
mod mem_test;
