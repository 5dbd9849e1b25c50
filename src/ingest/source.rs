use log::warn;

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering::SeqCst},
        Mutex,
    },
};

use crate::{ingest::Source, Result};

/// Source of records from any iterator.
pub struct IterSource<I>
where
    I: Iterator,
{
    iter: Mutex<I>,
}

impl<I> IterSource<I>
where
    I: Iterator,
{
    pub fn new(iter: I) -> IterSource<I> {
        IterSource {
            iter: Mutex::new(iter),
        }
    }
}

impl<I> Source for IterSource<I>
where
    I: 'static + Send + Iterator,
    I::Item: Send,
{
    type Record = I::Item;

    fn record(&self) -> Result<Option<I::Item>> {
        Ok(err_at!(Fatal, self.iter.lock())?.next())
    }
}

/// Source of lines from a buffered reader, like a file of JSON documents
/// one per line. Blank lines are skipped, lines are trimmed of their
/// line terminator.
pub struct LineSource<R>
where
    R: io::BufRead,
{
    reader: Mutex<R>,
    eof: AtomicBool,
}

impl<R> LineSource<R>
where
    R: io::BufRead,
{
    pub fn new(reader: R) -> LineSource<R> {
        LineSource {
            reader: Mutex::new(reader),
            eof: AtomicBool::new(false),
        }
    }
}

impl<R> Source for LineSource<R>
where
    R: 'static + Send + io::BufRead,
{
    type Record = String;

    fn record(&self) -> Result<Option<String>> {
        let mut reader = err_at!(Fatal, self.reader.lock())?;

        let mut buf = vec![];
        loop {
            if self.eof.load(SeqCst) {
                break Ok(None);
            }

            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => self.eof.store(true, SeqCst),
                Ok(_) => {
                    while let Some(b'\n') | Some(b'\r') = buf.last() {
                        buf.pop();
                    }
                    if buf.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let line = std::mem::take(&mut buf);
                    break err_at!(FailConvert, String::from_utf8(line)).map(Some);
                }
                Err(err) => {
                    // further reads are unlikely to succeed.
                    warn!(target: "pdk", "line source stopped on error");
                    self.eof.store(true, SeqCst);
                    break err_at!(IOError, Err(err));
                }
            }
        }
    }
}

/// A row read from a CSV source, as `(header, value)` pairs.
pub type CsvRecord = Vec<(String, String)>;

/// Source of rows from CSV data, first row is treated as headers.
pub struct CsvSource<R>
where
    R: io::Read,
{
    headers: csv::StringRecord,
    reader: Mutex<csv::Reader<R>>,
}

impl<R> CsvSource<R>
where
    R: io::Read,
{
    pub fn new(rdr: R) -> Result<CsvSource<R>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(rdr);
        let headers = err_at!(FailParse, reader.headers())?.clone();

        Ok(CsvSource {
            headers,
            reader: Mutex::new(reader),
        })
    }

    pub fn to_headers(&self) -> Vec<String> {
        self.headers.iter().map(|h| h.to_string()).collect()
    }
}

impl<R> Source for CsvSource<R>
where
    R: 'static + Send + io::Read,
{
    type Record = CsvRecord;

    fn record(&self) -> Result<Option<CsvRecord>> {
        let mut reader = err_at!(Fatal, self.reader.lock())?;

        let mut row = csv::StringRecord::new();
        match reader.read_record(&mut row) {
            Ok(true) => {
                if row.len() > self.headers.len() {
                    err_at!(
                        FailParse,
                        msg: "csv line {:?} has {} values for {} headers",
                        row.position().map(|p| p.line()), row.len(), self.headers.len()
                    )?
                }
                let items = self
                    .headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.to_string(), v.to_string()))
                    .collect();
                Ok(Some(items))
            }
            Ok(false) => Ok(None),
            Err(err) => err_at!(FailParse, Err(err)),
        }
    }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
