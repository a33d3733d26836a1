//! Builds `sqlx`'s connect options from a resolved service description.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

/// The handful of connection parameters a `pg_service.conf` stanza supplies
/// (§6: "a service-name string to look up connection parameters...
/// `application_name`, `dbname`, optional user override").
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    pub application_name: Option<String>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ServiceDescriptor {
    /// `search_path` is not part of a `pg_service.conf` stanza; it comes from
    /// `--search-path` and is applied as a startup option on top of whatever
    /// the service file supplies (§4.A: unqualified method names otherwise
    /// search every schema, per `ServiceDescriptor`'s caller).
    pub fn to_connect_options(&self, search_path: Option<&str>) -> PgConnectOptions {
        let mut opts = PgConnectOptions::new();
        if let Some(app) = &self.application_name {
            opts = opts.application_name(app);
        }
        if let Some(db) = &self.dbname {
            opts = opts.database(db);
        }
        if let Some(user) = &self.user {
            opts = opts.username(user);
        }
        if let Some(host) = &self.host {
            opts = opts.host(host);
        }
        if let Some(port) = self.port {
            opts = opts.port(port);
        }
        if let Some(path) = search_path {
            opts = opts.options([("search_path", path)]);
        }
        opts
    }
}

/// Builds the shared pool. One pool per process; each HTTP request checks
/// out a connection for the duration of its single procedure call.
pub async fn connect_pool(
    descriptor: &ServiceDescriptor,
    max_connections: u32,
    search_path: Option<&str>,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(descriptor.to_connect_options(search_path))
        .await
}
