//! Module implement identifier generators.
//!
//! [Nexter] is a plain monotonic counter. [RangeAllocator] hands out
//! disjoint, shard aligned, ranges of column identifiers, so that concurrent
//! ingestion workers can mint identifiers without per-identifier
//! coordination, each worker wrapping the shared allocator in its own
//! [RangeNexter].

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering::SeqCst},
        Arc, Mutex,
    },
};

use crate::Result;

/// Default shard width, number of columns held by a single shard of the
/// index.
pub const SHARD_WIDTH: u64 = 1 << 20;

/// Minimum allowed shard width.
pub const MIN_SHARD_WIDTH: u64 = 1 << 16;

/// Monotonic counter, safe for concurrent use.
#[derive(Default)]
pub struct Nexter {
    id: AtomicU64,
}

impl Nexter {
    /// Create a counter that shall issue `start` as its first identifier.
    pub fn new(start: u64) -> Nexter {
        Nexter {
            id: AtomicU64::new(start),
        }
    }

    /// Return the next identifier.
    pub fn next(&self) -> u64 {
        self.id.fetch_add(1, SeqCst)
    }

    /// Return the number of identifiers issued so far, this is same as the
    /// identifier that shall be issued next.
    pub fn to_count(&self) -> u64 {
        self.id.load(SeqCst)
    }

    /// Reserve `n` identifiers, only if the counter is at `from`. Return
    /// false if the counter has moved.
    pub fn reserve(&self, from: u64, n: u64) -> bool {
        self.id
            .compare_exchange(from, from.saturating_add(n), SeqCst, SeqCst)
            .is_ok()
    }
}

/// Half open range `[start, end)` of column identifiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdRange {
    pub start: u64,
    pub end: u64,
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end)
    }
}

impl IdRange {
    pub fn new(start: u64, end: u64) -> IdRange {
        IdRange { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Allocate shard aligned identifier ranges. Ranges given back are
/// re-issued, last-in-first-out, before minting new ranges.
pub struct RangeAllocator {
    shard_width: u64,
    inner: Mutex<Inner>,
}

struct Inner {
    next: u64,
    free: Vec<IdRange>,
}

impl RangeAllocator {
    /// Create a new allocator. `shard_width` must be a power of two and at
    /// least [MIN_SHARD_WIDTH], panics otherwise.
    pub fn new(shard_width: u64) -> RangeAllocator {
        assert!(
            shard_width.is_power_of_two() && shard_width >= MIN_SHARD_WIDTH,
            "shard_width {} must be a power of two >= {}",
            shard_width,
            MIN_SHARD_WIDTH
        );

        RangeAllocator {
            shard_width,
            inner: Mutex::new(Inner {
                next: 0,
                free: Vec::default(),
            }),
        }
    }

    pub fn to_shard_width(&self) -> u64 {
        self.shard_width
    }

    /// Get an exclusive range of identifiers.
    pub fn get(&self) -> Result<IdRange> {
        let mut inner = err_at!(Fatal, self.inner.lock())?;

        match inner.free.pop() {
            Some(r) => Ok(r),
            None => {
                let start = inner.next;
                let end = match start.checked_add(self.shard_width) {
                    Some(end) => end,
                    None => err_at!(Fatal, msg: "identifier space exhausted at {}", start)?,
                };
                inner.next = end;
                Ok(IdRange { start, end })
            }
        }
    }

    /// Give back a partially or fully unused range. Fully consumed ranges
    /// are ignored.
    pub fn give_back(&self, r: IdRange) -> Result<()> {
        if r.start > r.end {
            err_at!(InvalidInput, msg: "malformed range {}", r)
        } else if r.start == r.end {
            Ok(())
        } else {
            let mut inner = err_at!(Fatal, self.inner.lock())?;
            inner.free.push(r);
            Ok(())
        }
    }
}

/// Hand out identifiers one at a time from ranges fetched out of a shared
/// [RangeAllocator]. Meant to be owned by a single worker.
pub struct RangeNexter {
    allocator: Arc<RangeAllocator>,
    range: IdRange,
}

impl Clone for RangeNexter {
    /// Clones share the allocator but not the current range.
    fn clone(&self) -> Self {
        RangeNexter::new(Arc::clone(&self.allocator))
    }
}

impl RangeNexter {
    pub fn new(allocator: Arc<RangeAllocator>) -> RangeNexter {
        RangeNexter {
            allocator,
            range: IdRange::default(),
        }
    }

    /// Return the next identifier, fetch a fresh range from the allocator
    /// when the current range is exhausted.
    pub fn next(&mut self) -> Result<u64> {
        if self.range.is_empty() {
            self.range = self.allocator.get()?;
        }
        let id = self.range.start;
        self.range.start += 1;
        Ok(id)
    }

    /// Give back the unused remainder of the current range.
    pub fn give_back(&mut self) -> Result<()> {
        let r = std::mem::take(&mut self.range);
        self.allocator.give_back(r)
    }
}

#[cfg(test)]
#[path = "nexter_test.rs"]
mod nexter_test;
