//! Types flowing between the Resolver, Invoker and Shaper.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// The three keys that mark a v1 signed envelope (`{Signature, UUID, Data}`).
pub const V1_ENVELOPE_KEYS: [&str; 3] = ["Signature", "UUID", "Data"];

/// A JSON-RPC call as it arrives at the resolution engine, already stripped
/// of its wire-level envelope (HTTP headers, `jsonrpc`/`id` passthrough is
/// handled one layer up).
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub params: IndexMap<String, Value>,
    pub host: String,
}

impl MethodCall {
    /// True when `params`'s key set is exactly `{Signature, UUID, Data}`.
    pub fn is_v1(&self) -> bool {
        self.params.len() == V1_ENVELOPE_KEYS.len()
            && V1_ENVELOPE_KEYS.iter().all(|k| self.params.contains_key(*k))
    }
}

/// A single candidate row returned by a catalog query: one procedure that
/// might match a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogCandidate {
    pub schema: Option<Arc<str>>,
    pub proc: Arc<str>,
    pub requires_host: bool,
    pub returns_json: bool,
    pub returns_set: bool,
}

/// A call resolved to exactly one procedure, with its arguments normalised
/// and ready to bind by name.
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub schema: Option<Arc<str>>,
    pub proc: Arc<str>,
    pub returns_set: bool,
    pub returns_json: bool,
    pub params: IndexMap<String, Value>,
}

/// The value cached against a `cache_key`. A pure function of that key, so
/// two concurrent cache misses racing to populate the same slot may both
/// compute and insert it harmlessly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub schema: Option<Arc<str>>,
    pub proc: Arc<str>,
    pub returns_set: bool,
    pub returns_json: bool,
    pub requires_host: bool,
}

impl From<CatalogCandidate> for CacheEntry {
    fn from(c: CatalogCandidate) -> Self {
        CacheEntry {
            schema: c.schema,
            proc: c.proc,
            returns_set: c.returns_set,
            returns_json: c.returns_json,
            requires_host: c.requires_host,
        }
    }
}

/// One output row: column name to decoded JSON value, in the order the
/// driver returned the columns.
pub type Row = IndexMap<String, Value>;

/// An ordered sequence of rows returned by a procedure invocation.
pub type Rowset = Vec<Row>;
