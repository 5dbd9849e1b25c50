//! Module implement a reverse proxy translating query results.
//!
//! Index servers answer queries with raw row identifiers. [Proxy] sits
//! between clients and the index server, relays every request upstream
//! and, for queries, rewrites identifiers in the results back into the
//! values they were translated from.
//!
//! Query bodies are parsed to learn the frame of every top-level call,
//! refer to [query]. The upstream response `{"results": [..]}` carries one
//! result per call, in call order. Results of calls targeting a frame are
//! translated when they are shaped as:
//!
//! * a list of `{"id"|"key": <number>, "count": <number>}` objects, like
//!   a TopN result.
//! * a single object carrying an `"id"` or `"key"` number.
//!
//! Every other result, numbers, booleans and row sets, is left untouched.
//! Identifiers are replaced with their value, as string when the value is
//! valid UTF-8, lossily converted otherwise.

use log::{debug, warn};
use regex::Regex;

use std::sync::Arc;

use crate::{translate::Translator, Result};

mod http;
pub mod query;
mod server;

pub use self::http::HttpUpstream;
pub use server::serve;

use query::{Call, QueryParser};

/// Headers not relayed between hops.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Request relayed by the proxy. `path` includes the query string, if any.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Response relayed by the proxy.
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    fn new_json(status: u16, value: &serde_json::Value) -> Response {
        Response {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: value.to_string().into_bytes(),
        }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Upstream index server.
pub trait Upstream: Send + Sync + 'static {
    /// Relay request to upstream. Non-success statuses are returned as
    /// response, errors are reserved for failing to reach the upstream.
    fn forward(&self, req: Request) -> Result<Response>;
}

/// Translating proxy, refer to module documentation.
pub struct Proxy<U>
where
    U: Upstream,
{
    upstream: U,
    translator: Arc<dyn Translator>,
    parser: QueryParser,
    query_path: Regex,
}

impl<U> Proxy<U>
where
    U: Upstream,
{
    pub fn new(upstream: U, translator: Arc<dyn Translator>) -> Result<Proxy<U>> {
        let val = Proxy {
            upstream,
            translator,
            parser: QueryParser::new()?,
            query_path: err_at!(Fatal, Regex::new(r"^/index/[^/]+/query(\?.*)?$"))?,
        };
        Ok(val)
    }

    /// Handle a single request. An error is returned only if the upstream
    /// could not be reached.
    pub fn handle(&self, req: Request) -> Result<Response> {
        let is_query =
            req.method.eq_ignore_ascii_case("POST") && self.query_path.is_match(&req.path);
        if !is_query {
            return self.upstream.forward(req);
        }

        let calls = match self.parse_query(&req.body) {
            Ok(calls) => calls,
            Err(err) => {
                debug!(target: "pdk", "bad query {:?}: {}", req.path, err);
                let msg = serde_json::json!({"error": err.to_string()});
                return Ok(Response::new_json(400, &msg));
            }
        };

        let mut resp = self.upstream.forward(req)?;
        if !resp.is_success() {
            return Ok(resp);
        }

        let value: serde_json::Value = match serde_json::from_slice(&resp.body) {
            Ok(value) => value,
            Err(err) => {
                warn!(target: "pdk", "upstream response not json: {}", err);
                return Ok(resp);
            }
        };

        let value = translate_response(self.translator.as_ref(), &calls, value);
        resp.body = value.to_string().into_bytes();
        Ok(resp)
    }

    fn parse_query(&self, body: &[u8]) -> Result<Vec<Call>> {
        let text = err_at!(FailParse, std::str::from_utf8(body))?;
        self.parser.parse(text)
    }
}

/// Rewrite identifiers in query results, refer to module documentation.
/// Identifiers that fail to translate are left as they are.
pub fn translate_response(
    translator: &dyn Translator,
    calls: &[Call],
    mut value: serde_json::Value,
) -> serde_json::Value {
    if let Some(serde_json::Value::Array(results)) = value.get_mut("results") {
        for (call, result) in calls.iter().zip(results.iter_mut()) {
            let frame = match call.to_frame() {
                Some(frame) => frame,
                None => continue,
            };
            match result {
                serde_json::Value::Array(items) => {
                    for item in items.iter_mut() {
                        if item.get("count").is_some() {
                            translate_item(translator, frame, item);
                        }
                    }
                }
                serde_json::Value::Object(_) => translate_item(translator, frame, result),
                _ => (),
            }
        }
    }

    value
}

fn translate_item(translator: &dyn Translator, frame: &str, item: &mut serde_json::Value) {
    let obj = match item {
        serde_json::Value::Object(obj) => obj,
        _ => return,
    };

    for key in ["id", "key"].iter() {
        let id = match obj.get(*key).and_then(|id| id.as_u64()) {
            Some(id) => id,
            None => continue,
        };
        match translator.get(frame, id) {
            Ok(value) => {
                let value = String::from_utf8_lossy(&value).to_string();
                obj.insert(key.to_string(), serde_json::Value::String(value));
            }
            Err(err) => warn!(target: "pdk", "translate {}/{}: {}", frame, id, err),
        }
        break;
    }
}

#[cfg(test)]
#[path = "proxy_test.rs"]
mod proxy_test;
