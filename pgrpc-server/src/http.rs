//! Component G: the wire transport. Binds `MethodCall` to two shapes —
//! `POST` with a JSON body, and `GET` with the method taken from the last
//! path segment and params from the query string (§6).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use serde_json::Value;

use pgrpc_core::model::MethodCall;

use crate::app::{AppState, CallOutcome};
use crate::rpc::{
    invalid_request_response, procedure_error_response, success_response, taxonomy_error_response,
    v1_error_response, RpcRequestBody,
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(post_root))
        .route("/:method", get(get_method).post(post_method))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /` with `{method, params?, id?, version?, jsonrpc?}` as the body.
async fn post_root(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: axum::body::Bytes,
) -> Response {
    let Ok(req) = serde_json::from_slice::<RpcRequestBody>(&body) else {
        return bad_request();
    };
    handle(state, req, &headers, peer).await
}

/// `POST /:method` — the method name is taken from the path; the body, if
/// present, supplies `params`/`id`/`version`/`jsonrpc` (convenience form).
async fn post_method(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    body: axum::body::Bytes,
) -> Response {
    let mut req = if body.is_empty() {
        RpcRequestBody {
            method: method.clone(),
            params: None,
            id: None,
            version: None,
            jsonrpc: None,
        }
    } else {
        match serde_json::from_slice::<RpcRequestBody>(&body) {
            Ok(req) => req,
            Err(_) => return bad_request(),
        }
    };
    req.method = method;
    handle(state, req, &headers, peer).await
}

/// `GET /:method` — params come from the query string. A key seen once is
/// a scalar; a key repeated is collected into an array (§6).
async fn get_method(
    State(state): State<Arc<AppState>>,
    Path(method): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let params = query.as_deref().map(parse_query_params).unwrap_or_default();
    let req = RpcRequestBody {
        method,
        params: Some(params),
        id: None,
        version: None,
        jsonrpc: None,
    };
    handle(state, req, &headers, peer).await
}

async fn handle(
    state: Arc<AppState>,
    req: RpcRequestBody,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Response {
    let host = observed_host(headers, peer);
    let params: IndexMap<String, Value> = req
        .params
        .unwrap_or_default()
        .into_iter()
        .collect();

    let call = MethodCall {
        method: req.method,
        params,
        host,
    };

    let id = req.id.clone();
    let version = req.version.clone();
    let jsonrpc = req.jsonrpc.clone();

    let outcome = state.handle(call).await;

    // A malformed envelope (here: a method that fails the identifier shape)
    // always gets the fixed 400 response, regardless of what the caller
    // echoed (§6): it is a wire-level rejection, not a taxonomy error.
    if let CallOutcome::Taxonomy(pgrpc_core::error::GatewayError::InvalidRequest) = &outcome {
        return bad_request();
    }

    let body = match outcome {
        CallOutcome::Success(value) => {
            success_response(id, version.as_deref(), jsonrpc.as_deref(), value)
        }
        CallOutcome::Taxonomy(err) => {
            taxonomy_error_response(id, version.as_deref(), jsonrpc.as_deref(), &err)
        }
        CallOutcome::Procedure(mapped) => {
            procedure_error_response(id, version.as_deref(), jsonrpc.as_deref(), &mapped)
        }
        CallOutcome::SignedProcedure(signed) => {
            v1_error_response(id, version.as_deref(), jsonrpc.as_deref(), &signed)
        }
    };

    json_response(StatusCode::OK, body)
}

/// `X-Forwarded-For`'s first hop, falling back to the observed socket peer.
fn observed_host(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// A minimal `application/x-www-form-urlencoded` query-string parser.
/// Repeated keys become a JSON array; a key seen once stays a scalar
/// string. Not worth a crate dependency for three lines of percent
/// decoding.
fn parse_query_params(query: &str) -> serde_json::Map<String, Value> {
    let mut out = serde_json::Map::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        };

        match out.remove(&key) {
            None => {
                out.insert(key, Value::String(value));
            }
            Some(Value::Array(mut items)) => {
                items.push(Value::String(value));
                out.insert(key, Value::Array(items));
            }
            Some(existing) => {
                out.insert(key, Value::Array(vec![existing, Value::String(value)]));
            }
        }
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn bad_request() -> Response {
    json_response(StatusCode::BAD_REQUEST, invalid_request_response())
}

fn json_response(status: StatusCode, body: Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        "application/json; charset=utf-8".parse().unwrap(),
    );
    response
}
