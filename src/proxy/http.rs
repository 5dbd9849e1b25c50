use log::debug;

use std::{io::Read, time};

use crate::{
    proxy::{Request, Response, Upstream, HOP_BY_HOP_HEADERS},
    Result,
};

/// Default timeout for relayed requests.
pub const TIMEOUT: time::Duration = time::Duration::from_secs(300);

/// Upstream reached over HTTP. Blocking, meant to be called from a
/// blocking thread-pool.
pub struct HttpUpstream {
    host: url::Url,
    agent: ureq::Agent,
}

impl HttpUpstream {
    /// Create an upstream for server at `host`, like `http://localhost:10101`.
    pub fn new(host: &str) -> Result<HttpUpstream> {
        let host = err_at!(InvalidInput, url::Url::parse(host), "host {:?}", host)?;
        if host.cannot_be_a_base() {
            err_at!(InvalidInput, msg: "host {:?} cannot be a base url", host.as_str())?
        }

        Ok(HttpUpstream {
            host,
            agent: new_agent(TIMEOUT),
        })
    }

    pub fn set_timeout(&mut self, timeout: time::Duration) -> &mut Self {
        self.agent = new_agent(timeout);
        self
    }

    fn to_url(&self, path: &str) -> Result<url::Url> {
        err_at!(InvalidInput, self.host.join(path), "path {:?}", path)
    }
}

fn new_agent(timeout: time::Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).redirects(0).build()
}

impl Upstream for HttpUpstream {
    fn forward(&self, req: Request) -> Result<Response> {
        let url = self.to_url(&req.path)?;
        debug!(target: "pdk", "{} {}", req.method, url);

        let mut request = self.agent.request(&req.method, url.as_str());
        for (name, value) in req.headers.iter() {
            if !HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                request = request.set(name, value);
            }
        }

        let res = match req.body.is_empty() {
            true => request.call(),
            false => request.send_bytes(&req.body),
        };
        let resp = match res {
            Ok(resp) => resp,
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(err) => err_at!(IOError, Err(err), "{} {}", req.method, url)?,
        };

        let status = resp.status();
        let mut headers = vec![];
        for name in resp.headers_names().into_iter() {
            if HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                continue;
            }
            if let Some(value) = resp.header(&name) {
                headers.push((name.clone(), value.to_string()));
            }
        }

        let mut body = vec![];
        err_at!(IOError, resp.into_reader().read_to_end(&mut body))?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
