//! CLI flags and the `pg_service.conf` reader (§6, §10.3).

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use pgrpc_postgres::ServiceDescriptor;

#[derive(Debug, Parser)]
#[command(name = "pgrpcd", about = "JSON-RPC gateway over stored procedures")]
pub struct Args {
    /// Service name to look up in pg_service.conf for connection parameters.
    #[arg(long)]
    pub service: Option<String>,

    /// Path to the service file. Defaults to `PGSERVICEFILE`/`~/.pg_service.conf`
    /// the way libpq itself resolves it.
    #[arg(long)]
    pub service_file: Option<PathBuf>,

    /// Address the HTTP gateway listens on.
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Sets the connection's `search_path` startup option. Leaving this
    /// unset lets the catalog queries search every schema instead of
    /// relying on the server's default search path.
    #[arg(long)]
    pub search_path: Option<String>,

    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or
    /// `pgrpc_server=debug,pgrpc_postgres=info`.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Maximum number of pooled database connections.
    #[arg(long, default_value_t = 10)]
    pub max_connections: u32,
}

/// A parsed `pg_service.conf`: `[service-name]` sections of `key=value`
/// lines. Intentionally minimal -- this format is three lines under a
/// header, not worth a crate dependency.
#[derive(Debug, Default)]
pub struct ServiceFile {
    services: HashMap<String, HashMap<String, String>>,
}

impl ServiceFile {
    pub fn parse(contents: &str) -> Self {
        let mut services: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current: Option<String> = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                current = Some(name.to_string());
                services.entry(name.to_string()).or_default();
                continue;
            }
            if let (Some(name), Some((key, value))) = (&current, line.split_once('=')) {
                services
                    .entry(name.clone())
                    .or_default()
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        Self { services }
    }

    pub fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    pub fn descriptor(&self, service: &str) -> Option<ServiceDescriptor> {
        let section = self.services.get(service)?;
        Some(ServiceDescriptor {
            application_name: section.get("application_name").cloned(),
            dbname: section.get("dbname").cloned(),
            user: section.get("user").cloned(),
            host: section.get("host").cloned(),
            port: section.get("port").and_then(|p| p.parse().ok()),
        })
    }
}

/// Resolves the effective service file path the way libpq does: explicit
/// flag, then `PGSERVICEFILE`, then `~/.pg_service.conf`.
pub fn default_service_file_path(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.clone());
    }
    if let Ok(p) = std::env::var("PGSERVICEFILE") {
        return Some(PathBuf::from(p));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".pg_service.conf"))
}
