//! The JSON-RPC 2.0 / 1.1 wire envelope (§6).

use pgrpc_core::error::GatewayError;
use pgrpc_core::error_mapper::{MappedError, SignedErrorEnvelope};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Standard JSON-RPC error codes, plus the server-error range this gateway
/// uses for taxonomy members that have no standard code of their own.
pub mod error_codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const AMBIGUOUS_METHOD: i64 = -32000;
    pub const CONNECTION_LOST: i64 = -32001;
}

/// The request body, whether it arrived as a POST JSON object or was
/// reassembled from a GET's path segment and query string.
#[derive(Debug, Deserialize)]
pub struct RpcRequestBody {
    pub method: String,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub jsonrpc: Option<String>,
}

/// The fixed invalid-request body (§6): always HTTP 400, always this exact
/// shape, regardless of what envelope fields the caller supplied.
pub fn invalid_request_response() -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": {"code": error_codes::INVALID_REQUEST, "message": "Invalid Request."},
        "id": Value::Null,
    })
}

/// Builds a success envelope per the echo rules in §6.
pub fn success_response(
    id: Option<Value>,
    version: Option<&str>,
    jsonrpc: Option<&str>,
    result: Value,
) -> Value {
    let mut obj = Map::new();
    obj.insert("result".to_string(), result);

    if jsonrpc == Some("2.0") {
        obj.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    } else {
        obj.insert("error".to_string(), Value::Null);
    }

    if version == Some("1.1") {
        obj.insert("version".to_string(), Value::String("1.1".to_string()));
    }

    if let Some(id) = id {
        obj.insert("id".to_string(), id);
    }

    Value::Object(obj)
}

/// Builds an error envelope for a non-v1 taxonomy error.
pub fn taxonomy_error_response(
    id: Option<Value>,
    version: Option<&str>,
    jsonrpc: Option<&str>,
    err: &GatewayError,
) -> Value {
    let error = Value::Object(
        [
            ("code".to_string(), Value::from(code_for(err))),
            ("message".to_string(), Value::String(err.to_string())),
        ]
        .into_iter()
        .collect(),
    );
    error_envelope(id, version, jsonrpc, error)
}

/// Builds an error envelope for a `ProcedureError`, mapped through the
/// external `get_api_error_code` lookup.
pub fn procedure_error_response(
    id: Option<Value>,
    version: Option<&str>,
    jsonrpc: Option<&str>,
    mapped: &MappedError,
) -> Value {
    let error = serde_json::to_value(mapped).unwrap_or(Value::Null);
    error_envelope(id, version, jsonrpc, error)
}

/// Builds an error envelope for a v1 call, wrapping the signed payload
/// (§4.F: `{..., error: {signature, uuid, method, data}}`).
pub fn v1_error_response(
    id: Option<Value>,
    version: Option<&str>,
    jsonrpc: Option<&str>,
    signed: &SignedErrorEnvelope,
) -> Value {
    let error = serde_json::to_value(signed).unwrap_or(Value::Null);
    error_envelope(id, version, jsonrpc, error)
}

fn error_envelope(id: Option<Value>, version: Option<&str>, jsonrpc: Option<&str>, error: Value) -> Value {
    let mut obj = Map::new();
    obj.insert("error".to_string(), error);
    if jsonrpc == Some("2.0") {
        obj.insert("jsonrpc".to_string(), Value::String("2.0".to_string()));
    }
    if version == Some("1.1") {
        obj.insert("version".to_string(), Value::String("1.1".to_string()));
    }
    if let Some(id) = id {
        obj.insert("id".to_string(), id);
    }
    Value::Object(obj)
}

/// The generic JSON-RPC code for a taxonomy member. `ProcedureError` is
/// always rendered through the external `get_api_error_code` lookup
/// instead (see `pgrpc_core::error_mapper`); this is only used as its
/// fallback when that lookup path is bypassed (e.g. a v1 call whose
/// failure never reached a procedure at all).
pub fn code_for(err: &GatewayError) -> i64 {
    match err {
        GatewayError::InvalidRequest => error_codes::INVALID_REQUEST,
        GatewayError::InvalidParameters { .. } => error_codes::INVALID_PARAMS,
        GatewayError::UnknownMethod { .. } => error_codes::METHOD_NOT_FOUND,
        GatewayError::Ambiguous { .. } => error_codes::AMBIGUOUS_METHOD,
        GatewayError::InternalError { .. } => error_codes::INTERNAL_ERROR,
        GatewayError::ConnectionLost => error_codes::CONNECTION_LOST,
        // ProcedureError is always rendered through `procedure_error_response`
        // instead; this arm only exists so the match stays exhaustive.
        GatewayError::ProcedureError { .. } => error_codes::INTERNAL_ERROR,
    }
}
