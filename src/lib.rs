//! Package implement a toolkit to ingest records into a sharded bitmap index.
//!
//! Records arrive from a [Source][ingest::Source], are parsed into a property
//! graph, [Entity][ingest::Entity], and mapped into index mutations: set bits
//! under a row of some frame and integer values under some field of a frame.
//! Mutations are drained into the index server through batching importers,
//! refer to [import] module.
//!
//! **Value translation**
//!
//! Bitmap indexes address rows and columns by dense integer identifiers.
//! Values like `"red"` or a user-id string are dictionary encoded by a
//! [Translator][translate::Translator], that assigns, per frame, identifiers
//! in first-seen order starting from ZERO. The mapping is bijective and
//! append-only, and available in three flavors:
//!
//! * [MemTranslator][translate::mem::MemTranslator], in-memory only.
//! * [BucketTranslator][translate::bucket::BucketTranslator], persisted in
//!   lmdb, writers for the same value serialized via hash-bucketed mutexes.
//! * [BatchTranslator][translate::batch::BatchTranslator], persisted in
//!   lmdb, new values are assigned and committed in batches by a single
//!   writer thread.
//!
//! **Column identifiers**
//!
//! When records don't carry a natural key, column identifiers are generated
//! by [RangeNexter][nexter::RangeNexter] from shard-aligned ranges issued by
//! a shared [RangeAllocator][nexter::RangeAllocator].
//!
//! **Query results**
//!
//! Query responses from the index server carry raw identifiers. The [proxy]
//! module sits between clients and the index server and translates them back
//! to original values.

#![allow(clippy::type_complexity)]

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(FailParse, msg: "bad argument {}", arg);
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file_path));
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, std::fs::read(file_path), "read failed {:?}", file_path);
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

pub mod hash;
pub mod import;
pub mod ingest;
pub mod nexter;
pub mod proxy;
pub mod translate;
pub mod util;

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the
/// error location.
#[derive(Clone, PartialEq)]
pub enum Error {
    Fatal(String, String),
    IOError(String, String),
    InvalidInput(String, String),
    InvalidFile(String, String),
    KeyNotFound(String, String),
    IPCFail(String, String),
    ThreadFail(String, String),
    FailConvert(String, String),
    FailStore(String, String),
    FailParse(String, String),
    FailSink(String, String),
    Closed(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, msg) => write!(f, "{} Fatal: {}", p, msg),
            IOError(p, msg) => write!(f, "{} IOError: {}", p, msg),
            InvalidInput(p, msg) => write!(f, "{} InvalidInput: {}", p, msg),
            InvalidFile(p, msg) => write!(f, "{} InvalidFile: {}", p, msg),
            KeyNotFound(p, msg) => write!(f, "{} KeyNotFound: {}", p, msg),
            IPCFail(p, msg) => write!(f, "{} IPCFail: {}", p, msg),
            ThreadFail(p, msg) => write!(f, "{} ThreadFail: {}", p, msg),
            FailConvert(p, msg) => write!(f, "{} FailConvert: {}", p, msg),
            FailStore(p, msg) => write!(f, "{} FailStore: {}", p, msg),
            FailParse(p, msg) => write!(f, "{} FailParse: {}", p, msg),
            FailSink(p, msg) => write!(f, "{} FailSink: {}", p, msg),
            Closed(p, msg) => write!(f, "{} Closed: {}", p, msg),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}
