//! Component B: a live database handle with ping-on-demand reconnect and
//! bounded retry, built over `sqlx::PgPool`.
//!
//! The pool itself supplies the TCP/TLS/auth machinery and already discards
//! broken connections on checkout; this type only adds the retry *policy*
//! §4.B asks for on top of that. Each request gets its own retry attempt
//! here rather than sharing one facade's state across requests -- that
//! keeps the resolver cache the only shared mutable state in the system
//! (§5), at the cost of not tracking a `TimedOut` mode across calls. See
//! `DESIGN.md` for the reasoning.

use pgrpc_core::error::GatewayError;
use pgrpc_core::invoker::{build_invocation, BoundArg, Invocation};
use pgrpc_core::model::{ResolvedCall, Rowset};
use pgrpc_core::retry::{classify, Disposition, DEFAULT_BACKOFF_UNIT};
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::decode::decode_row;

#[derive(Debug, Clone)]
pub struct ConnectionFacade {
    pool: PgPool,
    backoff_unit: Duration,
}

impl ConnectionFacade {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// `ping()` never issues `SELECT 1` on the fast path -- it just checks
    /// out and returns a pool connection, which already round-trips a
    /// health check before handing it back. The explicit `SELECT 1` only
    /// runs when a caller asks for a hard probe after a suspected failure.
    pub async fn ping(&self, hard: bool) -> Result<(), GatewayError> {
        let mut conn = self.pool.acquire().await.map_err(map_connect_err)?;
        if hard {
            sqlx::query("SELECT 1")
                .fetch_one(&mut *conn)
                .await
                .map_err(map_connect_err)?;
        }
        Ok(())
    }

    /// Builds and runs the invocation statement for `resolved`, applying
    /// the sqlstate-classified retry policy.
    pub async fn call_proc(&self, resolved: &ResolvedCall) -> Result<Rowset, GatewayError> {
        let Invocation { sql, args } = build_invocation(resolved);
        self.execute_with_retry(&sql, &args).await
    }

    async fn execute_with_retry(&self, sql: &str, args: &[BoundArg]) -> Result<Rowset, GatewayError> {
        match self.try_execute(sql, args).await {
            Ok(rows) => Ok(rows),
            Err((sqlstate, err)) => match classify(sqlstate.as_deref().unwrap_or(""), 1) {
                Disposition::QueryError => Err(map_query_err(err)),
                Disposition::PossiblyConnectionLevel => {
                    tracing::warn!(sqlstate = ?sqlstate, "possibly connection-level failure, retrying after probe");
                    tokio::time::sleep(self.backoff_unit).await;
                    if self.ping(true).await.is_err() {
                        tracing::error!("reconnect probe failed, giving up");
                        return Err(GatewayError::ConnectionLost);
                    }
                    match self.try_execute(sql, args).await {
                        Ok(rows) => Ok(rows),
                        Err((sqlstate2, err2)) => {
                            match classify(sqlstate2.as_deref().unwrap_or(""), 2) {
                                Disposition::QueryError => Err(map_query_err(err2)),
                                Disposition::PossiblyConnectionLevel => {
                                    tracing::error!("retry exhausted, connection lost");
                                    Err(GatewayError::ConnectionLost)
                                }
                            }
                        }
                    }
                }
            },
        }
    }

    async fn try_execute(
        &self,
        sql: &str,
        args: &[BoundArg],
    ) -> Result<Rowset, (Option<String>, sqlx::Error)> {
        let mut query = sqlx::query(sql);
        for arg in args {
            query = bind(query, arg);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| (sqlstate_of(&e), e))?;

        rows.iter()
            .map(|row| decode_row(row))
            .collect::<Result<Rowset, sqlx::Error>>()
            .map_err(|e| (sqlstate_of(&e), e))
    }
}

fn bind<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    arg: &'q BoundArg,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    match arg {
        BoundArg::JsonText(s) => query.bind(s),
        BoundArg::Raw(serde_json::Value::Null) => query.bind(None::<String>),
        BoundArg::Raw(serde_json::Value::Bool(b)) => query.bind(*b),
        BoundArg::Raw(serde_json::Value::String(s)) => query.bind(s),
        BoundArg::Raw(serde_json::Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        BoundArg::Raw(serde_json::Value::Array(items)) => bind_array(query, items),
        // Objects have no declared element type to encode a composite
        // against; JSON text is the only faithful "as-is" encoding left.
        BoundArg::Raw(other @ serde_json::Value::Object(_)) => query.bind(other.to_string()),
    }
}

/// Binds a JSON array as a native Postgres array when every element shares
/// one scalar type (nulls allowed throughout), matching §4.B's "bind
/// as-is" rule for the common case. A dynamically-built statement has no
/// declared element type to check against, so a mixed-type or nested array
/// falls back to JSON text rather than guessing.
fn bind_array<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    items: &'q [serde_json::Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    use serde_json::Value;

    if items.is_empty() {
        // No element seen at all, so there's nothing to infer a Postgres
        // array element type from; guessing one risks a type mismatch
        // against whatever the procedure actually declares.
        return query.bind(Value::Array(items.to_vec()).to_string());
    }

    let non_null = items.iter().filter(|v| !v.is_null());
    if non_null.clone().next().is_none() {
        // Every element is null: same problem as the empty case, just
        // discovered one element later.
        return query.bind(Value::Array(items.to_vec()).to_string());
    }

    if non_null.clone().all(|v| v.is_boolean()) {
        let bools: Vec<Option<bool>> = items.iter().map(|v| v.as_bool()).collect();
        return query.bind(bools);
    }

    if non_null.clone().all(|v| matches!(v, Value::Number(n) if n.is_i64() || n.is_u64())) {
        let ints: Vec<Option<i64>> = items.iter().map(|v| v.as_i64()).collect();
        return query.bind(ints);
    }

    if non_null.clone().all(|v| v.is_number()) {
        let floats: Vec<Option<f64>> = items.iter().map(|v| v.as_f64()).collect();
        return query.bind(floats);
    }

    if non_null.clone().all(|v| v.is_string()) {
        let strings: Vec<Option<String>> = items
            .iter()
            .map(|v| v.as_str().map(str::to_owned))
            .collect();
        return query.bind(strings);
    }

    // Empty, mixed-type, or containing a nested array/object: no single
    // Postgres array element type fits, so fall back to JSON text.
    query.bind(Value::Array(items.to_vec()).to_string())
}

fn sqlstate_of(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn map_query_err(err: sqlx::Error) -> GatewayError {
    match err {
        sqlx::Error::Database(db) => GatewayError::ProcedureError {
            tag: db.code().map(|c| c.into_owned()).unwrap_or_default(),
            message: db.message().to_string(),
        },
        other => GatewayError::internal(other.to_string()),
    }
}

fn map_connect_err(err: sqlx::Error) -> GatewayError {
    tracing::error!(error = %err, "connection probe failed");
    GatewayError::ConnectionLost
}
