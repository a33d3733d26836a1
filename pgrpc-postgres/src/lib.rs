//! The PostgreSQL backend: catalog queries, the connection facade, row
//! decoding and the two external-procedure wrappers, all built on `sqlx`.

pub mod catalog;
pub mod decode;
pub mod facade;
pub mod options;
pub mod procs;

pub use catalog::PgCatalogQueries;
pub use facade::ConnectionFacade;
pub use options::{connect_pool, ServiceDescriptor};
pub use procs::{PgErrorCodeLookup, PgSigner};
