//! The client-visible error taxonomy.

use thiserror::Error;

/// Every way a call can fail, from the wire boundary down to the database.
///
/// Variants map 1:1 to the JSON-RPC error payload the server boundary
/// produces; see `pgrpc-server`'s `rpc` module for that mapping.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("invalid request")]
    InvalidRequest,

    #[error("invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("ambiguous method: {method} matched {candidates} procedures")]
    Ambiguous { method: String, candidates: usize },

    #[error("procedure error: {tag}")]
    ProcedureError { tag: String, message: String },

    #[error("internal error: {reason}")]
    InternalError { reason: String },

    #[error("connection lost")]
    ConnectionLost,
}

impl GatewayError {
    pub fn invalid_parameters(reason: impl Into<String>) -> Self {
        GatewayError::InvalidParameters {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        GatewayError::InternalError {
            reason: reason.into(),
        }
    }
}
