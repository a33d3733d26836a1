//! The resolver cache: insert-only, keyed by a pure function of the call
//! signature, process-lifetime (see DESIGN.md open question 1).

use crate::model::CacheEntry;
use dashmap::DashMap;

/// `[schema "."] + method + "(" + sort(argnames).join(",") + ")"`.
///
/// `argnames` need not be pre-sorted; this function sorts a local copy, so
/// callers are insensitive to the iteration order of the source map (§8.3).
///
/// `schema` must be folded in: `map_with_params`/`map_no_params` are
/// schema-scoped (§4.A), so two namespaces exposing a same-named,
/// same-argument procedure (`tenant_a.get_profile`, `tenant_b.get_profile`)
/// resolve to different catalog rows and must not share a cache slot.
pub fn cache_key<I, S>(schema: Option<&str>, method: &str, argnames: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = argnames.into_iter().map(|s| s.as_ref().to_string()).collect();
    names.sort_unstable();
    match schema {
        Some(schema) => format!("{schema}.{method}({})", names.join(",")),
        None => format!("{method}({})", names.join(",")),
    }
}

/// A concurrent, insert-only map from cache key to resolved procedure.
///
/// Lock-striped rather than a single mutex, so two workers resolving
/// different keys never contend (§5: "no blocking shared mutexes outside
/// the cache" still allows the cache's own internal striping).
#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: DashMap<String, CacheEntry>,
}

impl ResolverCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.clone())
    }

    /// Insert unconditionally. A slot is a pure function of its key, so a
    /// racing second writer publishing the same value is harmless.
    pub fn insert(&self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_ignores_argument_order() {
        let a = cache_key(None, "get_user", ["_b", "_a"]);
        let b = cache_key(None, "get_user", ["_a", "_b"]);
        assert_eq!(a, b);
        assert_eq!(a, "get_user(_a,_b)");
    }

    #[test]
    fn cache_key_distinguishes_schemas() {
        let a = cache_key(Some("tenant_a"), "get_profile", ["_id"]);
        let b = cache_key(Some("tenant_b"), "get_profile", ["_id"]);
        let unqualified = cache_key(None, "get_profile", ["_id"]);
        assert_ne!(a, b);
        assert_ne!(a, unqualified);
        assert_ne!(b, unqualified);
    }

    #[test]
    fn racing_inserts_on_same_key_are_harmless() {
        let cache = ResolverCache::new();
        let entry = CacheEntry {
            schema: None,
            proc: "p".into(),
            returns_set: false,
            returns_json: false,
            requires_host: false,
        };
        cache.insert("k".into(), entry.clone());
        cache.insert("k".into(), entry.clone());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(entry));
    }
}
