use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    Json, Router,
};
use log::{error, info};

use std::{future::Future, sync::Arc};

use crate::{
    proxy::{Proxy, Request, Response, Upstream},
    Result,
};

/// Maximum size of a relayed request body.
pub const MAX_BODY: usize = 256 * 1024 * 1024;

/// Return a router relaying every request through `proxy`.
pub fn router<U>(proxy: Arc<Proxy<U>>) -> Router
where
    U: Upstream,
{
    Router::new()
        .fallback(handle::<U>)
        .layer(DefaultBodyLimit::max(MAX_BODY))
        .with_state(proxy)
}

/// Serve `proxy` on `listener` until `shutdown` completes. In-flight
/// requests are completed before returning.
pub async fn serve<U, F>(
    listener: tokio::net::TcpListener,
    proxy: Arc<Proxy<U>>,
    shutdown: F,
) -> Result<()>
where
    U: Upstream,
    F: Future<Output = ()> + Send + 'static,
{
    let addr = err_at!(IOError, listener.local_addr())?;
    info!(target: "pdk", "proxy listening on {}", addr);

    err_at!(
        IOError,
        axum::serve(listener, router(proxy))
            .with_graceful_shutdown(shutdown)
            .await
    )?;

    info!(target: "pdk", "proxy on {} shut down", addr);
    Ok(())
}

async fn handle<U>(
    State(proxy): State<Arc<Proxy<U>>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response
where
    U: Upstream,
{
    let path = match uri.path_and_query() {
        Some(pq) => pq.as_str().to_string(),
        None => uri.path().to_string(),
    };
    let headers = headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let req = Request {
        method: method.to_string(),
        path,
        headers,
        body: body.to_vec(),
    };

    match tokio::task::spawn_blocking(move || proxy.handle(req)).await {
        Ok(Ok(resp)) => to_http_response(resp),
        Ok(Err(err)) => {
            error!(target: "pdk", "{} {}: {}", method, uri, err);
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
        Err(err) => {
            error!(target: "pdk", "{} {}: {}", method, uri, err);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn to_http_response(resp: Response) -> axum::response::Response {
    let status = match StatusCode::from_u16(resp.status) {
        Ok(status) => status,
        Err(_) => {
            let msg = format!("invalid upstream status {}", resp.status);
            return error_response(StatusCode::BAD_GATEWAY, msg);
        }
    };

    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in resp.headers.iter() {
        builder = builder.header(name.as_str(), value.as_str());
    }
    match builder.body(Body::from(resp.body)) {
        Ok(resp) => resp,
        Err(err) => error_response(StatusCode::BAD_GATEWAY, err.to_string()),
    }
}

fn error_response(status: StatusCode, msg: String) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": msg }))).into_response()
}
