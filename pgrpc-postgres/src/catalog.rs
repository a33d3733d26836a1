//! Component A: the three catalog queries against `pg_proc`/`pg_namespace`
//! and the application's `Functions` table.

use std::future::Future;
use std::sync::Arc;

use pgrpc_core::error::GatewayError;
use pgrpc_core::model::CatalogCandidate;
use pgrpc_core::resolver::CatalogQueries;
use sqlx::{PgPool, Row};

/// Name matching accepts either a case-insensitive exact match, or a
/// case-insensitive match after stripping every underscore not preceded by
/// a literal caret -- the "mild name mangling" that lets `GetUserFriends`
/// bind to `get_user_friends` (§3).
const MAP_WITH_PARAMS: &str = r#"
WITH candidates AS (
    SELECT
        p.proname::text AS proc,
        n.nspname::text AS schema,
        p.proretset AS returns_set,
        (t.typname IN ('json', 'jsonb')) AS returns_json,
        COALESCE(
            ARRAY(
                SELECT a.name
                FROM unnest(
                    COALESCE(p.proargnames, ARRAY[]::text[]),
                    COALESCE(p.proargmodes, array_fill('i'::"char", ARRAY[COALESCE(array_length(p.proargnames, 1), 0)]))
                ) AS a(name, mode)
                WHERE a.mode IN ('i', 'b')
            ),
            ARRAY[]::text[]
        ) AS declared_args
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    JOIN pg_type t ON t.oid = p.prorettype
    WHERE p.prokind = 'f'
      AND ($1::text IS NULL OR n.nspname = $1)
      AND (
            lower(p.proname) = lower($2)
         OR lower(regexp_replace(p.proname, '(?<!\^)_', '', 'g'))
            = lower(regexp_replace($2, '(?<!\^)_', '', 'g'))
      )
)
SELECT
    proc,
    schema,
    returns_set,
    returns_json,
    ('_host' = ANY(declared_args) AND NOT ('_host' = ANY($3::text[]))) AS requires_host
FROM candidates
WHERE array_remove(declared_args, '_host') <@ $3::text[]
  AND $3::text[] <@ declared_args
"#;

const MAP_NO_PARAMS: &str = r#"
WITH candidates AS (
    SELECT
        p.proname::text AS proc,
        n.nspname::text AS schema,
        p.proretset AS returns_set,
        (t.typname IN ('json', 'jsonb')) AS returns_json,
        COALESCE(
            ARRAY(
                SELECT a.name
                FROM unnest(
                    COALESCE(p.proargnames, ARRAY[]::text[]),
                    COALESCE(p.proargmodes, array_fill('i'::"char", ARRAY[COALESCE(array_length(p.proargnames, 1), 0)]))
                ) AS a(name, mode)
                WHERE a.mode IN ('i', 'b')
            ),
            ARRAY[]::text[]
        ) AS declared_args
    FROM pg_proc p
    JOIN pg_namespace n ON n.oid = p.pronamespace
    JOIN pg_type t ON t.oid = p.prorettype
    WHERE p.prokind = 'f'
      AND ($1::text IS NULL OR n.nspname = $1)
      AND (
            lower(p.proname) = lower($2)
         OR lower(regexp_replace(p.proname, '(?<!\^)_', '', 'g'))
            = lower(regexp_replace($2, '(?<!\^)_', '', 'g'))
      )
)
SELECT proc, schema, returns_set, returns_json,
       (declared_args = ARRAY['_host']::text[]) AS requires_host
FROM candidates
WHERE declared_args = ARRAY[]::text[] OR declared_args = ARRAY['_host']::text[]
"#;

const MAP_V1: &str = r#"
SELECT "Name"::text AS proc
FROM "Functions"
WHERE "ApiMethod" = $1
  AND (
        SELECT array_agg(DISTINCT k ORDER BY k)
        FROM unnest("ApiParams" || ARRAY['Password']::text[]) AS k
      )
      = (
        SELECT array_agg(DISTINCT k ORDER BY k)
        FROM unnest($2::text[]) AS k
      )
"#;

pub struct PgCatalogQueries {
    pool: PgPool,
}

impl PgCatalogQueries {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CatalogQueries for PgCatalogQueries {
    fn map_with_params(
        &self,
        schema: Option<&str>,
        name: &str,
        argnames: &[String],
    ) -> impl Future<Output = Result<Vec<CatalogCandidate>, GatewayError>> + Send {
        let pool = self.pool.clone();
        let schema = schema.map(str::to_owned);
        let name = name.to_owned();
        let argnames = argnames.to_vec();
        async move {
            let rows = sqlx::query(MAP_WITH_PARAMS)
                .bind(&schema)
                .bind(&name)
                .bind(&argnames)
                .fetch_all(&pool)
                .await
                .map_err(map_catalog_err)?;
            rows.iter().map(row_to_candidate).collect()
        }
    }

    fn map_no_params(
        &self,
        schema: Option<&str>,
        name: &str,
    ) -> impl Future<Output = Result<Vec<CatalogCandidate>, GatewayError>> + Send {
        let pool = self.pool.clone();
        let schema = schema.map(str::to_owned);
        let name = name.to_owned();
        async move {
            let rows = sqlx::query(MAP_NO_PARAMS)
                .bind(&schema)
                .bind(&name)
                .fetch_all(&pool)
                .await
                .map_err(map_catalog_err)?;
            rows.iter().map(row_to_candidate).collect()
        }
    }

    fn map_v1(
        &self,
        method: &str,
        data_keys: &[String],
    ) -> impl Future<Output = Result<Vec<Arc<str>>, GatewayError>> + Send {
        let pool = self.pool.clone();
        let method = method.to_owned();
        let data_keys = data_keys.to_vec();
        async move {
            let rows = sqlx::query(MAP_V1)
                .bind(&method)
                .bind(&data_keys)
                .fetch_all(&pool)
                .await
                .map_err(map_catalog_err)?;
            Ok(rows
                .iter()
                .map(|r| Arc::from(r.get::<String, _>("proc")))
                .collect())
        }
    }
}

fn row_to_candidate(row: &sqlx::postgres::PgRow) -> Result<CatalogCandidate, GatewayError> {
    Ok(CatalogCandidate {
        schema: Some(Arc::from(row.try_get::<String, _>("schema").map_err(map_catalog_err)?)),
        proc: Arc::from(row.try_get::<String, _>("proc").map_err(map_catalog_err)?),
        requires_host: row.try_get("requires_host").map_err(map_catalog_err)?,
        returns_json: row.try_get("returns_json").map_err(map_catalog_err)?,
        returns_set: row.try_get("returns_set").map_err(map_catalog_err)?,
    })
}

fn map_catalog_err(err: sqlx::Error) -> GatewayError {
    tracing::error!(error = %err, "catalog query failed");
    GatewayError::ConnectionLost
}
