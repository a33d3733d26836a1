//! Argument-name normalisation and the method/argument identifier shape.

use crate::error::GatewayError;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// `^[A-Za-z_][A-Za-z0-9_]*$`, optionally namespaced with a single leading
/// `ns.` segment of the same shape.
pub static METHOD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*\.)?[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// A bare identifier, used for both procedure and argument names.
pub static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

pub fn is_valid_method(method: &str) -> bool {
    METHOD_RE.is_match(method)
}

/// Splits `ns.method` into `(Some("ns"), "method")`, or `(None, "method")`.
pub fn split_namespace(method: &str) -> (Option<&str>, &str) {
    match method.split_once('.') {
        Some((ns, rest)) => (Some(ns), rest),
        None => (None, method),
    }
}

/// Lowercases every key and ensures it is `_`-prefixed. An argument name
/// that fails the identifier shape (§3: "same identifier shape" as a
/// method name) is `InvalidParameters`, same as two distinct input keys
/// colliding onto the same normalised key — the source object had two
/// arguments the catalog could never tell apart.
pub fn normalise_params(
    params: &IndexMap<String, Value>,
) -> Result<IndexMap<String, Value>, GatewayError> {
    let mut out = IndexMap::with_capacity(params.len());
    for (k, v) in params {
        if !IDENT_RE.is_match(k) {
            return Err(GatewayError::invalid_parameters(format!(
                "argument name `{k}` is not a valid identifier"
            )));
        }
        let normalised = normalise_key(k);
        if out.insert(normalised.clone(), v.clone()).is_some() {
            return Err(GatewayError::invalid_parameters(format!(
                "argument name collides with another after normalisation: {normalised}"
            )));
        }
    }
    Ok(out)
}

fn normalise_key(k: &str) -> String {
    let lower = k.to_lowercase();
    if lower.starts_with('_') {
        lower
    } else {
        format!("_{lower}")
    }
}
