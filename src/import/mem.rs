use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

use crate::{import::Sink, Result};

/// Sink recording every mutation in memory, useful for dry runs and
/// for testing the import pipeline without an index server.
#[derive(Default)]
pub struct MemSink {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    frames: BTreeSet<String>,
    fields: BTreeSet<(String, String)>,
    bits: BTreeMap<String, Vec<(u64, u64)>>,
    vals: BTreeMap<(String, String), Vec<(u64, i64)>>,
    n_imports: usize,
    failures: usize,
}

impl Inner {
    fn count_import(&mut self) -> Result<()> {
        match self.failures {
            0 => {
                self.n_imports += 1;
                Ok(())
            }
            _ => {
                self.failures -= 1;
                err_at!(FailSink, msg: "injected failure")
            }
        }
    }
}

impl MemSink {
    pub fn new() -> MemSink {
        MemSink::default()
    }

    /// Fail the next `n` import calls.
    pub fn set_failures(&self, n: usize) -> Result<()> {
        err_at!(Fatal, self.inner.lock())?.failures = n;
        Ok(())
    }

    /// Return created frames, sorted.
    pub fn to_frames(&self) -> Result<Vec<String>> {
        let inner = err_at!(Fatal, self.inner.lock())?;
        Ok(inner.frames.iter().cloned().collect())
    }

    /// Return created `(frame, field)` pairs, sorted.
    pub fn to_fields(&self) -> Result<Vec<(String, String)>> {
        let inner = err_at!(Fatal, self.inner.lock())?;
        Ok(inner.fields.iter().cloned().collect())
    }

    /// Return `(row, col)` bits imported under frame, in import order.
    pub fn to_bits(&self, frame: &str) -> Result<Vec<(u64, u64)>> {
        let inner = err_at!(Fatal, self.inner.lock())?;
        Ok(inner.bits.get(frame).cloned().unwrap_or_default())
    }

    /// Return `(col, value)` pairs imported under frame/field, in import
    /// order.
    pub fn to_values(&self, frame: &str, field: &str) -> Result<Vec<(u64, i64)>> {
        let inner = err_at!(Fatal, self.inner.lock())?;
        let key = (frame.to_string(), field.to_string());
        Ok(inner.vals.get(&key).cloned().unwrap_or_default())
    }

    /// Return the number of successful import calls.
    pub fn to_n_imports(&self) -> Result<usize> {
        Ok(err_at!(Fatal, self.inner.lock())?.n_imports)
    }
}

impl Sink for MemSink {
    fn create_frame(&self, frame: &str) -> Result<()> {
        let mut inner = err_at!(Fatal, self.inner.lock())?;
        inner.frames.insert(frame.to_string());
        Ok(())
    }

    fn create_field(&self, frame: &str, field: &str) -> Result<()> {
        let mut inner = err_at!(Fatal, self.inner.lock())?;
        if !inner.frames.contains(frame) {
            err_at!(FailSink, msg: "frame {:?} missing for field {:?}", frame, field)?
        }
        inner.fields.insert((frame.to_string(), field.to_string()));
        Ok(())
    }

    fn import_bits(&self, frame: &str, bits: &[(u64, u64)]) -> Result<()> {
        let mut inner = err_at!(Fatal, self.inner.lock())?;
        if !inner.frames.contains(frame) {
            err_at!(FailSink, msg: "frame {:?} missing", frame)?
        }
        inner.count_import()?;
        inner
            .bits
            .entry(frame.to_string())
            .or_insert_with(Vec::new)
            .extend_from_slice(bits);
        Ok(())
    }

    fn import_values(&self, frame: &str, field: &str, vals: &[(u64, i64)]) -> Result<()> {
        let mut inner = err_at!(Fatal, self.inner.lock())?;
        let key = (frame.to_string(), field.to_string());
        if !inner.fields.contains(&key) {
            err_at!(FailSink, msg: "field {:?}/{:?} missing", frame, field)?
        }
        inner.count_import()?;
        inner.vals.entry(key).or_insert_with(Vec::new).extend_from_slice(vals);
        Ok(())
    }
}
