//! Thin wrappers around the two external catalog functions the Error
//! Mapper invokes but does not implement.

use std::future::Future;

use pgrpc_core::error_mapper::{ErrorCodeLookup, Signer};
use sqlx::{PgPool, Row};

pub struct PgErrorCodeLookup {
    pool: PgPool,
}

impl PgErrorCodeLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ErrorCodeLookup for PgErrorCodeLookup {
    fn get_api_error_code(&self, tag: &str) -> impl Future<Output = Option<(String, i64)>> + Send {
        let pool = self.pool.clone();
        let tag = tag.to_owned();
        async move {
            let row = sqlx::query(r#"SELECT * FROM get_api_error_code($1)"#)
                .bind(&tag)
                .fetch_one(&pool)
                .await
                .ok()?;
            let name: String = row.try_get(0).ok()?;
            let code: i64 = row.try_get(1).ok()?;
            Some((name, code))
        }
    }
}

pub struct PgSigner {
    pool: PgPool,
}

impl PgSigner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Signer for PgSigner {
    fn sign(
        &self,
        method: &str,
        json_data: &str,
        uuid: &str,
    ) -> impl Future<Output = Option<String>> + Send {
        let pool = self.pool.clone();
        let method = method.to_owned();
        let json_data = json_data.to_owned();
        let uuid = uuid.to_owned();
        async move {
            let row = sqlx::query(r#"SELECT "OpenSSL_Sign"($1, $2, $3)"#)
                .bind(&method)
                .bind(&json_data)
                .bind(&uuid)
                .fetch_one(&pool)
                .await
                .ok()?;
            row.try_get(0).ok()
        }
    }
}
