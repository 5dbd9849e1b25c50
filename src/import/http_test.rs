use std::{
    io::{BufRead, BufReader, Read, Write},
    net, thread,
};

use super::*;

// serve `n` requests, answer each with `status`, return (request-line, body)
// for every request.
fn serve(n: usize, status: u16) -> (String, thread::JoinHandle<Vec<(String, String)>>) {
    let listener = net::TcpListener::bind("127.0.0.1:0").unwrap();
    let host = format!("http://{}", listener.local_addr().unwrap());

    let handle = thread::spawn(move || {
        let mut reqs = vec![];
        for _ in 0..n {
            let (conn, _) = listener.accept().unwrap();
            let mut rd = BufReader::new(conn.try_clone().unwrap());

            let mut line = String::new();
            rd.read_line(&mut line).unwrap();
            let mut length = 0;
            loop {
                let mut header = String::new();
                rd.read_line(&mut header).unwrap();
                let header = header.trim_end().to_lowercase();
                if header.is_empty() {
                    break;
                } else if let Some(val) = header.strip_prefix("content-length:") {
                    length = val.trim().parse().unwrap();
                }
            }
            let mut body = vec![0; length];
            rd.read_exact(&mut body).unwrap();

            let resp = format!(
                "HTTP/1.1 {} X\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status
            );
            (&conn).write_all(resp.as_bytes()).unwrap();
            reqs.push((line.trim_end().to_string(), String::from_utf8(body).unwrap()));
        }
        reqs
    });

    (host, handle)
}

#[test]
fn test_http_url() {
    let sink = HttpSink::new("http://localhost:10101", "users").unwrap();
    assert_eq!(
        sink.to_url(&["frame", "color", "import"]).unwrap().as_str(),
        "http://localhost:10101/index/users/frame/color/import"
    );
    // path segments are escaped.
    assert_eq!(
        sink.to_url(&["frame", "a b/c"]).unwrap().as_str(),
        "http://localhost:10101/index/users/frame/a%20b%2Fc"
    );

    let sink = HttpSink::new("http://localhost:10101/base/", "users").unwrap();
    assert_eq!(
        sink.to_url(&[]).unwrap().as_str(),
        "http://localhost:10101/base/index/users"
    );

    assert!(HttpSink::new("localhost", "users").is_err());
    assert!(HttpSink::new("mailto:someone@localhost", "users").is_err());
}

#[test]
fn test_http_import() {
    let (host, handle) = serve(3, 200);
    let sink = HttpSink::new(&host, "idx").unwrap();

    sink.create_frame("color").unwrap();
    sink.import_bits("color", &[(1, 10), (2, 20)]).unwrap();
    sink.import_values("fields", "age", &[(10, -3)]).unwrap();

    let reqs = handle.join().unwrap();
    assert_eq!(reqs[0].0, "POST /index/idx/frame/color HTTP/1.1");

    assert_eq!(reqs[1].0, "POST /index/idx/frame/color/import HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&reqs[1].1).unwrap();
    assert_eq!(body, json!({"rows": [1, 2], "columns": [10, 20]}));

    assert_eq!(
        reqs[2].0,
        "POST /index/idx/frame/fields/field/age/import HTTP/1.1"
    );
    let body: serde_json::Value = serde_json::from_str(&reqs[2].1).unwrap();
    assert_eq!(body, json!({"columns": [10], "values": [-3]}));
}

#[test]
fn test_http_status() {
    let (host, handle) = serve(3, 409);
    let sink = HttpSink::new(&host, "idx").unwrap();

    // conflict on create is fine, not on import.
    sink.create_index().unwrap();
    sink.create_field("fields", "age").unwrap();
    match sink.import_bits("color", &[(1, 1)]) {
        Err(crate::Error::FailSink(_, _)) => (),
        res => panic!("unexpected {:?}", res),
    }

    let reqs = handle.join().unwrap();
    assert_eq!(reqs[0].0, "POST /index/idx HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&reqs[1].1).unwrap();
    assert_eq!(body["type"], json!("int"));
}
