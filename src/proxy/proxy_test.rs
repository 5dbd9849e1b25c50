use serde_json::json;

use std::sync::Mutex;

use super::*;
use crate::translate::mem::MemTranslator;

struct MockUpstream {
    reqs: Mutex<Vec<Request>>,
    status: u16,
    body: Vec<u8>,
}

impl MockUpstream {
    fn new(status: u16, body: &str) -> MockUpstream {
        MockUpstream {
            reqs: Mutex::new(vec![]),
            status,
            body: body.as_bytes().to_vec(),
        }
    }
}

impl Upstream for Arc<MockUpstream> {
    fn forward(&self, req: Request) -> Result<Response> {
        self.reqs.lock().unwrap().push(req);
        Ok(Response {
            status: self.status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: self.body.clone(),
        })
    }
}

fn new_translator() -> Arc<dyn Translator> {
    let translator: Arc<dyn Translator> = Arc::new(MemTranslator::new());
    let colors: Vec<Vec<u8>> = ["black", "white", "grey", "red", "pink", "cyan", "teal", "blue"]
        .iter()
        .map(|c| c.as_bytes().to_vec())
        .collect();
    translator.bulk_add("color", &colors).unwrap();
    translator.get_id("raw", &[0xff, 0x61]).unwrap();
    translator
}

fn query_request(query: &str) -> Request {
    Request {
        method: "POST".to_string(),
        path: "/index/users/query".to_string(),
        headers: vec![],
        body: query.as_bytes().to_vec(),
    }
}

#[test]
fn test_translate_response() {
    let translator = new_translator();
    let parser = QueryParser::new().unwrap();

    let calls = parser.parse("TopN(color, n=2)").unwrap();
    let value = json!({"results": [[{"key": 3, "count": 10}, {"key": 7, "count": 4}]]});
    assert_eq!(
        translate_response(translator.as_ref(), &calls, value),
        json!({"results": [[{"key": "red", "count": 10}, {"key": "blue", "count": 4}]]})
    );

    let calls = parser
        .parse("Count(Bitmap(frame=color, rowID=1)) TopN(frame=raw) Bitmap(color, rowID=3) Row(color) TopN(size)")
        .unwrap();
    let value = json!({"results": [
        7,
        [{"id": 0, "count": 1}],
        {"attrs": {}, "bits": [1, 2]},
        {"id": 2, "bits": [5]},
        [{"id": 99, "count": 1}],
    ]});
    assert_eq!(
        translate_response(translator.as_ref(), &calls, value),
        json!({"results": [
            7,
            [{"id": "\u{fffd}a", "count": 1}],
            {"attrs": {}, "bits": [1, 2]},
            {"id": "grey", "bits": [5]},
            [{"id": 99, "count": 1}],
        ]})
    );

    // unknown identifiers and shapes are left untouched.
    let calls = parser.parse("TopN(color) TopN(color)").unwrap();
    let value = json!({"results": [[{"key": 100, "count": 1}, {"key": "x"}], true]});
    assert_eq!(
        translate_response(translator.as_ref(), &calls, value.clone()),
        value
    );
    let value = json!({"error": "bad"});
    assert_eq!(
        translate_response(translator.as_ref(), &calls, value.clone()),
        value
    );
}

#[test]
fn test_proxy_handle() {
    let body = r#"{"results":[[{"key":3,"count":10},{"key":7,"count":4}]]}"#;
    let upstream = Arc::new(MockUpstream::new(200, body));
    let proxy = Proxy::new(Arc::clone(&upstream), new_translator()).unwrap();

    let resp = proxy.handle(query_request("TopN(color, n=2)")).unwrap();
    assert_eq!(resp.status, 200);
    let value: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(
        value,
        json!({"results": [[{"key": "red", "count": 10}, {"key": "blue", "count": 4}]]})
    );

    // other requests are relayed as is.
    let mut req = query_request("TopN(color, n=2)");
    req.method = "GET".to_string();
    assert_eq!(proxy.handle(req).unwrap().body, body.as_bytes().to_vec());
    let mut req = query_request("TopN(color, n=2)");
    req.path = "/index/users/frame/color/import".to_string();
    assert_eq!(proxy.handle(req).unwrap().body, body.as_bytes().to_vec());

    // bad queries are not relayed.
    let n = upstream.reqs.lock().unwrap().len();
    let resp = proxy.handle(query_request("TopN(color")).unwrap();
    assert_eq!(resp.status, 400);
    let value: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
    assert!(value["error"].as_str().unwrap().contains("FailParse"));
    assert_eq!(upstream.reqs.lock().unwrap().len(), n);

    let resp = proxy.handle(query_request("TopN(\u{0}")).unwrap();
    assert_eq!(resp.status, 400);
}

#[test]
fn test_proxy_status() {
    let body = r#"{"results":[[{"key":3,"count":10}]]}"#;
    let upstream = Arc::new(MockUpstream::new(500, body));
    let proxy = Proxy::new(Arc::clone(&upstream), new_translator()).unwrap();

    // upstream failures are relayed untranslated.
    let resp = proxy.handle(query_request("TopN(color)")).unwrap();
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body, body.as_bytes().to_vec());

    let upstream = Arc::new(MockUpstream::new(200, "not json"));
    let proxy = Proxy::new(Arc::clone(&upstream), new_translator()).unwrap();
    let resp = proxy.handle(query_request("TopN(color)")).unwrap();
    assert_eq!(resp.body, b"not json".to_vec());
}

#[test]
fn test_proxy_server() {
    let body = r#"{"results":[[{"key":3,"count":10},{"key":7,"count":4}]]}"#;
    let upstream = Arc::new(MockUpstream::new(200, body));
    let proxy = Arc::new(Proxy::new(Arc::clone(&upstream), new_translator()).unwrap());

    let rt = tokio::runtime::Runtime::new().unwrap();
    let listener = rt
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = rt.spawn(serve(listener, proxy, async move {
        rx.await.ok();
    }));

    let url = format!("http://{}/index/users/query?profile=false", addr);
    let resp = ureq::post(&url)
        .set("x-request-id", "42")
        .send_string("TopN(color, n=2)")
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.header("content-type"), Some("application/json"));
    let value: serde_json::Value = serde_json::from_str(&resp.into_string().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({"results": [[{"key": "red", "count": 10}, {"key": "blue", "count": 4}]]})
    );

    match ureq::post(&url).send_string("TopN(") {
        Err(ureq::Error::Status(400, _)) => (),
        res => panic!("unexpected {:?}", res.map(|r| r.status())),
    }

    {
        let reqs = upstream.reqs.lock().unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].path, "/index/users/query?profile=false");
        assert!(reqs[0]
            .headers
            .iter()
            .any(|(n, v)| n == "x-request-id" && v == "42"));
    }

    tx.send(()).unwrap();
    rt.block_on(server).unwrap().unwrap();
}
