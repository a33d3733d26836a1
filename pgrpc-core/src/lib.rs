//! The method-to-procedure resolution engine.
//!
//! This crate is backend-agnostic: it knows how to normalise a call, consult
//! a catalog through the [`CatalogQueries`] trait, cache the result, build
//! the invocation statement, and reshape the returned rows into JSON. It does
//! not know how to actually talk to a database; that lives in `pgrpc-postgres`.

pub mod cache;
pub mod error;
pub mod error_mapper;
pub mod invoker;
pub mod model;
pub mod normalise;
pub mod resolver;
pub mod retry;
pub mod shaper;
pub mod special_names;

pub use cache::{cache_key, ResolverCache};
pub use error::GatewayError;
pub use model::{
    CacheEntry, CatalogCandidate, MethodCall, ResolvedCall, Row, Rowset, V1_ENVELOPE_KEYS,
};
pub use resolver::{CatalogQueries, Resolver};
