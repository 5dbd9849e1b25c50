//! Module implement the ingestion pipeline.
//!
//! ```text
//!            +--> worker: parse -> map -> dispatch --+
//!  Source ---+--> worker: parse -> map -> dispatch --+--> Indexer
//!            +--> worker: parse -> map -> dispatch --+
//! ```
//!
//! [Ingester] runs `concurrency` worker threads sharing a single [Source].
//! Every worker pulls a record, parses it into an [Entity] using the
//! [Parser], maps the entity into an [IndexRecord] using its own clone of
//! the [Mapper] and dispatches the record's mutations to the [Indexer].
//! Errors are isolated to the record that caused them, they are logged and
//! counted and the record is skipped. Workers exit when the source is
//! exhausted, after which the indexer is closed exactly once.

use log::{debug, error, info};

use std::{
    collections::BTreeMap,
    fmt, result,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
        Arc,
    },
    thread,
};

use crate::Result;

mod mapper;
mod parser;
mod source;

pub use mapper::{CollapsingMapper, BOOL_FRAME, COLUMN_FRAME, FIELD_FRAME};
pub use parser::{CsvParser, JsonParser};
pub use source::{CsvRecord, CsvSource, IterSource, LineSource};

/// Source of records, shared by all workers of an [Ingester].
pub trait Source: Send + Sync + 'static {
    type Record: Send;

    /// Return the next record, `None` at the end of stream. An error
    /// refers to a single record, the source shall continue after it.
    fn record(&self) -> Result<Option<Self::Record>>;
}

/// Parse records into property graphs.
pub trait Parser<R>: Send + Sync + 'static {
    fn parse(&self, record: R) -> Result<Entity>;
}

/// Map property graphs into index mutations. Every worker owns a clone.
pub trait Mapper: Clone + Send + 'static {
    fn map(&mut self, entity: &Entity) -> Result<IndexRecord>;

    /// Called once by every worker before it exits.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink for index mutations, shared by all workers of an [Ingester].
pub trait Indexer: Send + Sync + 'static {
    /// Set bit `row` under `frame` for column `col`.
    fn add_bit(&self, frame: &str, col: u64, row: u64) -> Result<()>;

    /// Set integer `value` under `frame`/`field` for column `col`.
    fn add_value(&self, frame: &str, field: &str, col: u64, value: i64) -> Result<()>;

    /// Flush all mutations.
    fn close(&self) -> Result<()>;
}

/// Literal values in a property graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Literal>),
    Map(BTreeMap<String, Literal>),
}

/// Property graph parsed from a single record. `subject` is the record's
/// natural key, if any.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entity {
    pub subject: Option<Vec<u8>>,
    pub props: BTreeMap<String, Literal>,
}

impl Entity {
    pub fn new() -> Entity {
        Entity::default()
    }

    pub fn set_subject(&mut self, subject: Vec<u8>) -> &mut Self {
        self.subject = Some(subject);
        self
    }

    pub fn insert(&mut self, name: &str, value: Literal) -> &mut Self {
        self.props.insert(name.to_string(), value);
        self
    }
}

/// Set bit `id` under `frame`.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub frame: String,
    pub id: u64,
}

/// Set `value` under `frame`/`field`.
#[derive(Clone, Debug, PartialEq)]
pub struct Val {
    pub frame: String,
    pub field: String,
    pub value: i64,
}

/// Mutations for a single column, derived from one record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexRecord {
    pub col: u64,
    pub rows: Vec<Row>,
    pub vals: Vec<Val>,
}

impl IndexRecord {
    pub fn new(col: u64) -> IndexRecord {
        IndexRecord {
            col,
            ..IndexRecord::default()
        }
    }

    fn dispatch<I: Indexer>(&self, indexer: &I) -> Result<()> {
        for row in self.rows.iter() {
            indexer.add_bit(&row.frame, self.col, row.id)?;
        }
        for val in self.vals.iter() {
            indexer.add_value(&val.frame, &val.field, self.col, val.value)?;
        }
        Ok(())
    }
}

/// Statistics from an [Ingester] run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IngestStats {
    pub n_records: usize,
    pub n_dispatched: usize,
    pub n_source_errors: usize,
    pub n_parse_errors: usize,
    pub n_map_errors: usize,
    pub n_dispatch_errors: usize,
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "records:{} dispatched:{} errors:{{source:{} parse:{} map:{} dispatch:{}}}",
            self.n_records,
            self.n_dispatched,
            self.n_source_errors,
            self.n_parse_errors,
            self.n_map_errors,
            self.n_dispatch_errors
        )
    }
}

#[derive(Default)]
struct Counters {
    n_records: AtomicUsize,
    n_dispatched: AtomicUsize,
    n_source_errors: AtomicUsize,
    n_parse_errors: AtomicUsize,
    n_map_errors: AtomicUsize,
    n_dispatch_errors: AtomicUsize,
}

impl Counters {
    fn to_stats(&self) -> IngestStats {
        IngestStats {
            n_records: self.n_records.load(SeqCst),
            n_dispatched: self.n_dispatched.load(SeqCst),
            n_source_errors: self.n_source_errors.load(SeqCst),
            n_parse_errors: self.n_parse_errors.load(SeqCst),
            n_map_errors: self.n_map_errors.load(SeqCst),
            n_dispatch_errors: self.n_dispatch_errors.load(SeqCst),
        }
    }
}

/// Pipeline orchestrator, refer to module documentation.
pub struct Ingester<S, P, M, I>
where
    S: Source,
    P: Parser<S::Record>,
    M: Mapper,
    I: Indexer,
{
    name: String,
    concurrency: usize,
    source: Arc<S>,
    parser: Arc<P>,
    mapper: M,
    indexer: Arc<I>,

    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl<S, P, M, I> Ingester<S, P, M, I>
where
    S: Source,
    P: Parser<S::Record>,
    M: Mapper,
    I: Indexer,
{
    /// Create a new pipeline, concurrency defaults to the number of cores.
    pub fn new(source: S, parser: P, mapper: M, indexer: Arc<I>) -> Self {
        Ingester {
            name: "ingest".to_string(),
            concurrency: num_cpus::get(),
            source: Arc::new(source),
            parser: Arc::new(parser),
            mapper,
            indexer,

            stop: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.name = name.to_string();
        self
    }

    /// Number of worker threads, minimum 1.
    pub fn set_concurrency(&mut self, concurrency: usize) -> &mut Self {
        self.concurrency = std::cmp::max(concurrency, 1);
        self
    }

    /// Return a handle, setting it to true shall stop the workers at the
    /// next record boundary.
    pub fn to_stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn to_stats(&self) -> IngestStats {
        self.counters.to_stats()
    }

    /// Run the pipeline until the source is exhausted, or until stopped.
    /// Indexer is closed before returning, and its result is returned.
    pub fn run(&self) -> Result<()> {
        info!(target: "pdk", "{} starting {} workers", self.name, self.concurrency);

        let mut handles = vec![];
        for id in 0..self.concurrency {
            let w = Worker {
                name: format!("{}-{}", self.name, id),
                source: Arc::clone(&self.source),
                parser: Arc::clone(&self.parser),
                mapper: self.mapper.clone(),
                indexer: Arc::clone(&self.indexer),
                stop: Arc::clone(&self.stop),
                counters: Arc::clone(&self.counters),
            };
            handles.push(thread::spawn(move || w.run()));
        }

        let mut n_panics = 0;
        for handle in handles.into_iter() {
            if handle.join().is_err() {
                n_panics += 1;
            }
        }

        let res = self.indexer.close();
        info!(target: "pdk", "{} done {}", self.name, self.to_stats());

        match n_panics {
            0 => res,
            n => err_at!(ThreadFail, msg: "{} {} workers panicked", self.name, n),
        }
    }
}

struct Worker<S, P, M, I>
where
    S: Source,
    P: Parser<S::Record>,
    M: Mapper,
    I: Indexer,
{
    name: String,
    source: Arc<S>,
    parser: Arc<P>,
    mapper: M,
    indexer: Arc<I>,
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl<S, P, M, I> Worker<S, P, M, I>
where
    S: Source,
    P: Parser<S::Record>,
    M: Mapper,
    I: Indexer,
{
    fn run(mut self) {
        let counters = Arc::clone(&self.counters);

        while !self.stop.load(SeqCst) {
            let record = match self.source.record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(err) => {
                    error!(target: "pdk", "{} source: {}", self.name, err);
                    counters.n_source_errors.fetch_add(1, SeqCst);
                    continue;
                }
            };
            counters.n_records.fetch_add(1, SeqCst);

            let entity = match self.parser.parse(record) {
                Ok(entity) => entity,
                Err(err) => {
                    error!(target: "pdk", "{} parse: {}", self.name, err);
                    counters.n_parse_errors.fetch_add(1, SeqCst);
                    continue;
                }
            };
            let rec = match self.mapper.map(&entity) {
                Ok(rec) => rec,
                Err(err) => {
                    error!(target: "pdk", "{} map: {}", self.name, err);
                    counters.n_map_errors.fetch_add(1, SeqCst);
                    continue;
                }
            };
            match rec.dispatch(self.indexer.as_ref()) {
                Ok(()) => counters.n_dispatched.fetch_add(1, SeqCst),
                Err(err) => {
                    error!(target: "pdk", "{} dispatch: {}", self.name, err);
                    counters.n_dispatch_errors.fetch_add(1, SeqCst)
                }
            };
        }

        if let Err(err) = self.mapper.close() {
            error!(target: "pdk", "{} mapper close: {}", self.name, err);
        }
        debug!(target: "pdk", "{} exit", self.name);
    }
}
