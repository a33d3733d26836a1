//! Component C: normalises a call, consults the catalog, caches the result.

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::cache::{cache_key, ResolverCache};
use crate::error::GatewayError;
use crate::model::{CatalogCandidate, MethodCall, ResolvedCall};
use crate::normalise::{is_valid_method, normalise_params, split_namespace};
use crate::special_names::canonicalize;

/// The catalog-facing half of the Resolver (component A from the caller's
/// point of view). Implemented against a live database in `pgrpc-postgres`;
/// implemented against fixtures in this crate's own tests.
pub trait CatalogQueries {
    fn map_with_params(
        &self,
        schema: Option<&str>,
        name: &str,
        argnames: &[String],
    ) -> impl Future<Output = Result<Vec<CatalogCandidate>, GatewayError>> + Send;

    fn map_no_params(
        &self,
        schema: Option<&str>,
        name: &str,
    ) -> impl Future<Output = Result<Vec<CatalogCandidate>, GatewayError>> + Send;

    /// Validates a v1 envelope. Returns the matched external method rows;
    /// an empty vec means no dispatcher mapping exists for this method.
    fn map_v1(
        &self,
        method: &str,
        data_keys: &[String],
    ) -> impl Future<Output = Result<Vec<Arc<str>>, GatewayError>> + Send;
}

pub struct Resolver<C> {
    catalog: C,
    cache: ResolverCache,
}

impl<C: CatalogQueries> Resolver<C> {
    pub fn new(catalog: C) -> Self {
        Self {
            catalog,
            cache: ResolverCache::new(),
        }
    }

    pub fn cache(&self) -> &ResolverCache {
        &self.cache
    }

    pub async fn resolve(&self, call: &MethodCall) -> Result<ResolvedCall, GatewayError> {
        if !is_valid_method(&call.method) {
            return Err(GatewayError::InvalidRequest);
        }

        if call.is_v1() {
            return self.resolve_v1(call).await;
        }

        self.resolve_plain(call).await
    }

    async fn resolve_v1(&self, call: &MethodCall) -> Result<ResolvedCall, GatewayError> {
        let data = call
            .params
            .get("Data")
            .and_then(Value::as_object)
            .ok_or_else(|| GatewayError::invalid_parameters("v1 envelope: Data must be an object"))?;

        let data_keys: Vec<String> = data.keys().cloned().collect();

        let matches = self.catalog.map_v1(&call.method, &data_keys).await?;
        if matches.is_empty() {
            return Err(GatewayError::UnknownMethod {
                method: call.method.clone(),
            });
        }

        // Normalise the *envelope's own* keys (Signature, UUID, Data), not
        // Data's inner keys -- those were only used above for catalog
        // validation.
        let mut params = normalise_params(&call.params)?;
        params.insert("_host".to_string(), Value::String(call.host.clone()));
        params.insert("_method".to_string(), Value::String(call.method.clone()));

        Ok(ResolvedCall {
            schema: Some(Arc::from("public")),
            proc: Arc::from("api_call"),
            returns_set: false,
            returns_json: true,
            params,
        })
    }

    async fn resolve_plain(&self, call: &MethodCall) -> Result<ResolvedCall, GatewayError> {
        let normalised = normalise_params(&call.params)?;

        let (schema, bare_name) = split_namespace(&call.method);
        let canonical_name = canonicalize(bare_name);

        let mut argnames: Vec<String> = normalised.keys().cloned().collect();
        argnames.sort_unstable();

        let key = cache_key(schema, canonical_name, &argnames);

        if let Some(entry) = self.cache.get(&key) {
            return Ok(self.materialize(entry, normalised, &call.host));
        }

        tracing::debug!(method = %call.method, key = %key, "resolver cache miss, consulting catalog");

        let candidates = if normalised.is_empty() {
            self.catalog.map_no_params(schema, canonical_name).await?
        } else {
            self.catalog
                .map_with_params(schema, canonical_name, &argnames)
                .await?
        };

        match candidates.len() {
            0 => Err(GatewayError::UnknownMethod {
                method: call.method.clone(),
            }),
            1 => {
                let candidate = candidates.into_iter().next().unwrap();
                self.cache.insert(key, candidate.clone().into());
                Ok(self.materialize(candidate.into(), normalised, &call.host))
            }
            n => Err(GatewayError::Ambiguous {
                method: call.method.clone(),
                candidates: n,
            }),
        }
    }

    fn materialize(
        &self,
        entry: crate::model::CacheEntry,
        mut params: IndexMap<String, Value>,
        host: &str,
    ) -> ResolvedCall {
        if entry.requires_host {
            params.insert("_host".to_string(), Value::String(host.to_string()));
        }

        ResolvedCall {
            schema: entry.schema,
            proc: entry.proc,
            returns_set: entry.returns_set,
            returns_json: entry.returns_json,
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A stub catalog backed by a fixed table of candidates, with a call
    /// counter so tests can assert the cache actually saves a round trip.
    struct FixtureCatalog {
        with_params_calls: AtomicUsize,
        rows: Mutex<Vec<CatalogCandidate>>,
    }

    impl FixtureCatalog {
        fn new(rows: Vec<CatalogCandidate>) -> Self {
            Self {
                with_params_calls: AtomicUsize::new(0),
                rows: Mutex::new(rows),
            }
        }
    }

    impl CatalogQueries for FixtureCatalog {
        async fn map_with_params(
            &self,
            schema: Option<&str>,
            name: &str,
            _argnames: &[String],
        ) -> Result<Vec<CatalogCandidate>, GatewayError> {
            self.with_params_calls.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .filter(|c| c.proc.as_ref() == name && matches_schema(c, schema))
                .cloned()
                .collect())
        }

        async fn map_no_params(
            &self,
            schema: Option<&str>,
            name: &str,
        ) -> Result<Vec<CatalogCandidate>, GatewayError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .filter(|c| c.proc.as_ref() == name && matches_schema(c, schema))
                .cloned()
                .collect())
        }

        async fn map_v1(
            &self,
            _method: &str,
            _data_keys: &[String],
        ) -> Result<Vec<Arc<str>>, GatewayError> {
            Ok(vec![Arc::from("Deposit")])
        }
    }

    /// Mimics `map_with_params`/`map_no_params`'s own schema scoping
    /// (§4.A): an unqualified lookup (`schema == None`) sees every
    /// candidate, a qualified one only sees its own namespace.
    fn matches_schema(candidate: &CatalogCandidate, schema: Option<&str>) -> bool {
        match schema {
            None => true,
            Some(s) => candidate.schema.as_deref() == Some(s),
        }
    }

    fn call(method: &str, params: &[(&str, Value)], host: &str) -> MethodCall {
        MethodCall {
            method: method.to_string(),
            params: params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            host: host.to_string(),
        }
    }

    #[tokio::test]
    async fn unambiguous_resolution_populates_cache() {
        let catalog = FixtureCatalog::new(vec![CatalogCandidate {
            schema: Some(Arc::from("public")),
            proc: Arc::from("get_userid_by_username"),
            requires_host: false,
            returns_json: false,
            returns_set: false,
        }]);
        let resolver = Resolver::new(catalog);

        let c = call(
            "get_userid_by_username",
            &[("username", json!("joel"))],
            "1.2.3.4",
        );
        let resolved = resolver.resolve(&c).await.unwrap();
        assert_eq!(resolved.proc.as_ref(), "get_userid_by_username");
        assert_eq!(resolver.cache().len(), 1);

        // Second call hits the cache; the catalog is not consulted again.
        let before = resolver.catalog.with_params_calls.load(Ordering::SeqCst);
        resolver.resolve(&c).await.unwrap();
        let after = resolver.catalog.with_params_calls.load(Ordering::SeqCst);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn zero_matches_is_unknown_method() {
        let resolver = Resolver::new(FixtureCatalog::new(vec![]));
        let c = call("nope", &[], "h");
        assert!(matches!(
            resolver.resolve(&c).await,
            Err(GatewayError::UnknownMethod { .. })
        ));
    }

    #[tokio::test]
    async fn namespace_qualified_calls_do_not_share_a_cache_slot() {
        let candidate = |schema: &str| CatalogCandidate {
            schema: Some(Arc::from(schema)),
            proc: Arc::from("get_profile"),
            requires_host: false,
            returns_json: false,
            returns_set: false,
        };
        let resolver = Resolver::new(FixtureCatalog::new(vec![
            candidate("tenant_a"),
            candidate("tenant_b"),
        ]));

        let a = call("tenant_a.get_profile", &[("id", json!(1))], "h");
        let resolved_a = resolver.resolve(&a).await.unwrap();
        assert_eq!(resolved_a.schema.as_deref(), Some("tenant_a"));

        // Same bare method, same argument set, different namespace: must
        // not be served from tenant_a's cache slot.
        let b = call("tenant_b.get_profile", &[("id", json!(1))], "h");
        let resolved_b = resolver.resolve(&b).await.unwrap();
        assert_eq!(resolved_b.schema.as_deref(), Some("tenant_b"));

        assert_eq!(resolver.cache().len(), 2);
    }

    #[tokio::test]
    async fn two_matches_is_ambiguous() {
        let candidate = |proc: &str| CatalogCandidate {
            schema: Some(Arc::from("public")),
            proc: Arc::from(proc),
            requires_host: false,
            returns_json: false,
            returns_set: false,
        };
        let resolver = Resolver::new(FixtureCatalog::new(vec![candidate("foo"), candidate("foo")]));
        let c = call("foo", &[("a", json!(1))], "h");
        assert!(matches!(
            resolver.resolve(&c).await,
            Err(GatewayError::Ambiguous { .. })
        ));
    }

    #[tokio::test]
    async fn host_injected_when_required() {
        let catalog = FixtureCatalog::new(vec![CatalogCandidate {
            schema: Some(Arc::from("public")),
            proc: Arc::from("needs_host"),
            requires_host: true,
            returns_json: false,
            returns_set: false,
        }]);
        let resolver = Resolver::new(catalog);
        let c = call("needs_host", &[("username", json!("joel"))], "9.9.9.9");
        let resolved = resolver.resolve(&c).await.unwrap();
        assert_eq!(
            resolved.params.get("_host"),
            Some(&json!("9.9.9.9"))
        );
    }

    #[tokio::test]
    async fn v1_envelope_resolves_to_api_call() {
        let resolver = Resolver::new(FixtureCatalog::new(vec![]));
        let c = call(
            "Deposit",
            &[
                ("Signature", json!("sig")),
                ("UUID", json!("u")),
                (
                    "Data",
                    json!({"Amount": 10, "Currency": "EUR", "Password": "x"}),
                ),
            ],
            "10.0.0.1",
        );
        let resolved = resolver.resolve(&c).await.unwrap();
        assert_eq!(resolved.schema.as_deref(), Some("public"));
        assert_eq!(resolved.proc.as_ref(), "api_call");
        assert!(resolved.returns_json);
        assert!(resolved.params.contains_key("_signature"));
        assert!(resolved.params.contains_key("_uuid"));
        assert!(resolved.params.contains_key("_data"));
        assert!(resolved.params.contains_key("_host"));
        assert_eq!(resolved.params.get("_method"), Some(&json!("Deposit")));
    }

    #[tokio::test]
    async fn argument_name_collision_is_invalid_parameters() {
        let resolver = Resolver::new(FixtureCatalog::new(vec![]));
        let c = call(
            "foo",
            &[("UserId", json!(1)), ("_userid", json!(2))],
            "h",
        );
        assert!(matches!(
            resolver.resolve(&c).await,
            Err(GatewayError::InvalidParameters { .. })
        ));
    }
}
