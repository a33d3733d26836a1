//! `pgrpcd`: a JSON-RPC gateway exposing a PostgreSQL catalog's stored
//! procedures, wiring components A-G together (§2).

mod app;
mod config;
mod http;
mod rpc;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pgrpc_postgres::{connect_pool, ConnectionFacade, PgCatalogQueries, PgErrorCodeLookup, PgSigner, ServiceDescriptor};
use pgrpc_core::resolver::Resolver;

use app::AppState;
use config::{default_service_file_path, Args, ServiceFile};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    let descriptor = resolve_service_descriptor(&args)?;

    let pool = connect_pool(&descriptor, args.max_connections, args.search_path.as_deref())
        .await
        .context("failed to connect to the target database")?;

    let state = Arc::new(AppState {
        resolver: Resolver::new(PgCatalogQueries::new(pool.clone())),
        facade: ConnectionFacade::new(pool.clone()),
        error_lookup: PgErrorCodeLookup::new(pool.clone()),
        signer: PgSigner::new(pool),
    });

    let router = http::router(state);
    let addr: SocketAddr = args
        .listen_addr
        .parse()
        .with_context(|| format!("invalid --listen-addr: {}", args.listen_addr))?;

    tracing::info!(%addr, "pgrpcd listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Looks up `--service` in the resolved service file, falling back to an
/// empty descriptor (connection parameters then come from `sqlx`'s own
/// libpq-compatible environment handling) when no service is named.
fn resolve_service_descriptor(args: &Args) -> anyhow::Result<ServiceDescriptor> {
    let Some(service) = &args.service else {
        return Ok(ServiceDescriptor::default());
    };

    let path = default_service_file_path(args.service_file.as_ref())
        .context("no service file path could be determined (set --service-file or PGSERVICEFILE)")?;

    let file = ServiceFile::load(&path)
        .with_context(|| format!("failed to read service file at {}", path.display()))?;

    file.descriptor(service)
        .with_context(|| format!("service `{service}` not found in {}", path.display()))
}
