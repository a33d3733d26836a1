//! Component D: builds the invocation statement. Execution itself goes
//! through the Connection Facade, which lives in `pgrpc-postgres` since it
//! is the one piece that must actually speak to a database.

use crate::model::ResolvedCall;
use serde_json::Value;

/// One bound argument, already reduced to either a JSON-text encoding (for
/// object values) or a value that binds as-is (§4.B: "If any argument value
/// is an object, it is serialised to a JSON string before binding; all
/// other values bind as-is").
#[derive(Debug, Clone, PartialEq)]
pub enum BoundArg {
    JsonText(String),
    Raw(Value),
}

impl From<&Value> for BoundArg {
    fn from(v: &Value) -> Self {
        match v {
            Value::Object(_) => BoundArg::JsonText(v.to_string()),
            other => BoundArg::Raw(other.clone()),
        }
    }
}

/// The SQL text plus its positional bind values, in the same order as the
/// resolved call's params.
pub struct Invocation {
    pub sql: String,
    pub args: Vec<BoundArg>,
}

/// Builds `SELECT * FROM "schema"."proc"("a" := $1, "b" := $2, …)`.
/// Every argument is bound by name, never by position; an empty-arg
/// procedure yields `SELECT * FROM schema.proc()` with no parameter list.
pub fn build_invocation(resolved: &ResolvedCall) -> Invocation {
    let mut sql = String::from("SELECT * FROM ");

    if let Some(schema) = &resolved.schema {
        sql.push_str(&quote_ident(schema));
        sql.push('.');
    }
    sql.push_str(&quote_ident(&resolved.proc));
    sql.push('(');

    let mut args = Vec::with_capacity(resolved.params.len());
    for (i, (name, value)) in resolved.params.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&quote_ident(name));
        sql.push_str(" := $");
        sql.push_str(&(i + 1).to_string());
        args.push(BoundArg::from(value));
    }
    sql.push(')');

    Invocation { sql, args }
}

/// Double-quotes an identifier, doubling any embedded double quote.
fn quote_ident(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 2);
    out.push('"');
    for c in ident.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn empty_args_yields_bare_parens() {
        let resolved = ResolvedCall {
            schema: Some(Arc::from("public")),
            proc: Arc::from("noargs"),
            returns_set: false,
            returns_json: false,
            params: IndexMap::new(),
        };
        let inv = build_invocation(&resolved);
        assert_eq!(inv.sql, r#"SELECT * FROM "public"."noargs"()"#);
        assert!(inv.args.is_empty());
    }

    #[test]
    fn named_args_are_bound_in_declared_order() {
        let mut params = IndexMap::new();
        params.insert("_a".to_string(), json!(1));
        params.insert("_b".to_string(), json!("x"));
        let resolved = ResolvedCall {
            schema: Some(Arc::from("public")),
            proc: Arc::from("foo"),
            returns_set: false,
            returns_json: false,
            params,
        };
        let inv = build_invocation(&resolved);
        assert_eq!(
            inv.sql,
            r#"SELECT * FROM "public"."foo"("_a" := $1, "_b" := $2)"#
        );
        assert_eq!(inv.args, vec![BoundArg::Raw(json!(1)), BoundArg::Raw(json!("x"))]);
    }

    #[test]
    fn object_values_are_serialised_to_json_text() {
        let mut params = IndexMap::new();
        params.insert("_data".to_string(), json!({"a": 1}));
        let resolved = ResolvedCall {
            schema: Some(Arc::from("public")),
            proc: Arc::from("api_call"),
            returns_set: false,
            returns_json: true,
            params,
        };
        let inv = build_invocation(&resolved);
        assert_eq!(inv.args, vec![BoundArg::JsonText(r#"{"a":1}"#.to_string())]);
    }

    #[test]
    fn identifier_quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident(r#"weird"name"#), r#""weird""name""#);
    }

    #[test]
    fn no_schema_still_quotes_the_procedure_name() {
        let resolved = ResolvedCall {
            schema: None,
            proc: Arc::from("proc"),
            returns_set: false,
            returns_json: false,
            params: IndexMap::new(),
        };
        let inv = build_invocation(&resolved);
        assert_eq!(inv.sql, r#"SELECT * FROM "proc"()"#);
    }
}
