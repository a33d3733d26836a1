//! The small fixed table that remaps certain method names to a canonical
//! procedure name before cache lookup (§4.C.3).

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Keys are matched against the method name (case-sensitive, as received,
/// before argument normalisation — only the method name is remapped here).
static REMAP: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("GetView", "get_view_json");
    m.insert("GetViewParams", "get_view_json");
    m
});

/// Returns the canonical name to use for cache lookup and catalog matching.
/// Names with no entry pass through unchanged.
pub fn canonicalize<'a>(method: &'a str) -> &'a str {
    REMAP.get(method).copied().unwrap_or(method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_aliases_collapse_to_one_procedure() {
        assert_eq!(canonicalize("GetView"), "get_view_json");
        assert_eq!(canonicalize("GetViewParams"), "get_view_json");
    }

    #[test]
    fn unknown_names_pass_through() {
        assert_eq!(canonicalize("get_userid_by_username"), "get_userid_by_username");
    }
}
