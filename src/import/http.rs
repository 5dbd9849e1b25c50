//! Sink importing mutations into an index server over JSON/HTTP.
//!
//! Endpoints, relative to the server's base url:
//!
//! * `POST index/<index>`, create index.
//! * `POST index/<index>/frame/<frame>`, create frame.
//! * `POST index/<index>/frame/<frame>/field/<field>`, create integer field.
//! * `POST index/<index>/frame/<frame>/import`, body `{"rows": [..], "columns": [..]}`.
//! * `POST index/<index>/frame/<frame>/field/<field>/import`, body
//!   `{"columns": [..], "values": [..]}`.
//!
//! Creating something that already exists is answered with `409 Conflict`,
//! which is treated as success.

use log::debug;
use serde_json::json;

use std::time;

use crate::{import::Sink, Result};

/// Default timeout for every http request.
pub const TIMEOUT: time::Duration = time::Duration::from_secs(30);

pub struct HttpSink {
    host: url::Url,
    index: String,
    min: i64,
    max: i64,
    agent: ureq::Agent,
}

impl HttpSink {
    /// Create a sink for `index` hosted by server at `host`, like
    /// `http://localhost:10101`.
    pub fn new(host: &str, index: &str) -> Result<HttpSink> {
        let host = err_at!(InvalidInput, url::Url::parse(host), "host {:?}", host)?;
        if host.cannot_be_a_base() {
            err_at!(InvalidInput, msg: "host {:?} cannot be a base url", host.as_str())?
        }

        let val = HttpSink {
            host,
            index: index.to_string(),
            min: i64::MIN,
            max: i64::MAX,
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
        };
        Ok(val)
    }

    pub fn set_timeout(&mut self, timeout: time::Duration) -> &mut Self {
        self.agent = ureq::AgentBuilder::new().timeout(timeout).build();
        self
    }

    /// Set the range of values for integer fields created by this sink.
    pub fn set_field_range(&mut self, min: i64, max: i64) -> &mut Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Create the index, if missing.
    pub fn create_index(&self) -> Result<()> {
        let url = self.to_url(&[])?;
        self.post(url, json!({}), true)
    }

    fn to_url(&self, parts: &[&str]) -> Result<url::Url> {
        let mut url = self.host.clone();
        match url.path_segments_mut() {
            Ok(mut segs) => {
                segs.pop_if_empty().extend(&["index", self.index.as_str()]);
                segs.extend(parts);
            }
            Err(_) => err_at!(InvalidInput, msg: "bad host {:?}", self.host.as_str())?,
        }
        Ok(url)
    }

    fn post(&self, url: url::Url, body: serde_json::Value, conflict_ok: bool) -> Result<()> {
        debug!(target: "pdk", "POST {}", url);

        match self.agent.post(url.as_str()).send_json(body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(409, _)) if conflict_ok => Ok(()),
            Err(ureq::Error::Status(code, resp)) => {
                let text = resp.into_string().unwrap_or_default();
                err_at!(FailSink, msg: "POST {} status {} {:?}", url, code, text)
            }
            Err(err) => err_at!(FailSink, Err(err), "POST {}", url),
        }
    }
}

impl Sink for HttpSink {
    fn create_frame(&self, frame: &str) -> Result<()> {
        let url = self.to_url(&["frame", frame])?;
        self.post(url, json!({}), true)
    }

    fn create_field(&self, frame: &str, field: &str) -> Result<()> {
        let url = self.to_url(&["frame", frame, "field", field])?;
        let body = json!({"type": "int", "min": self.min, "max": self.max});
        self.post(url, body, true)
    }

    fn import_bits(&self, frame: &str, bits: &[(u64, u64)]) -> Result<()> {
        let url = self.to_url(&["frame", frame, "import"])?;
        let rows: Vec<u64> = bits.iter().map(|(row, _)| *row).collect();
        let columns: Vec<u64> = bits.iter().map(|(_, col)| *col).collect();
        self.post(url, json!({"rows": rows, "columns": columns}), false)
    }

    fn import_values(&self, frame: &str, field: &str, vals: &[(u64, i64)]) -> Result<()> {
        let url = self.to_url(&["frame", frame, "field", field, "import"])?;
        let columns: Vec<u64> = vals.iter().map(|(col, _)| *col).collect();
        let values: Vec<i64> = vals.iter().map(|(_, val)| *val).collect();
        self.post(url, json!({"columns": columns, "values": values}), false)
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;
