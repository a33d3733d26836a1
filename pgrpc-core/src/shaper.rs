//! Component E: reduces a rowset to a single JSON value.

use crate::error::GatewayError;
use crate::model::Rowset;
use serde_json::Value;

/// Reshapes `rowset` per the `returns_set`/`returns_json` rule (§4.E).
pub fn shape(rowset: &Rowset, returns_set: bool, returns_json: bool) -> Result<Value, GatewayError> {
    if returns_json {
        return shape_json(rowset);
    }

    if returns_set {
        shape_set(rowset)
    } else {
        shape_scalar(rowset)
    }
}

fn shape_json(rowset: &Rowset) -> Result<Value, GatewayError> {
    if rowset.len() != 1 || rowset[0].len() != 1 {
        return Err(GatewayError::internal(
            "returns_json procedure did not return exactly one row and one column",
        ));
    }
    let (_, raw) = rowset[0].iter().next().unwrap();
    match raw {
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| GatewayError::internal(format!("returns_json column is not valid JSON: {e}"))),
        // The driver may have already decoded a `json`/`jsonb` column for us.
        other => Ok(other.clone()),
    }
}

fn shape_scalar(rowset: &Rowset) -> Result<Value, GatewayError> {
    match rowset.len() {
        0 => Ok(Value::Null),
        1 => {
            let row = &rowset[0];
            match row.len() {
                0 => Err(GatewayError::internal("procedure returned zero columns")),
                1 => Ok(row.values().next().cloned().unwrap()),
                _ => Ok(Value::Object(
                    row.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                )),
            }
        }
        _ => Err(GatewayError::internal("function returned multiple rows")),
    }
}

fn shape_set(rowset: &Rowset) -> Result<Value, GatewayError> {
    if let Some(first) = rowset.first() {
        if first.is_empty() {
            return Err(GatewayError::internal("procedure returned zero columns"));
        }
        if first.len() == 1 {
            return Ok(Value::Array(
                rowset
                    .iter()
                    .map(|row| row.values().next().cloned().unwrap())
                    .collect(),
            ));
        }
    }

    Ok(Value::Array(
        rowset
            .iter()
            .map(|row| Value::Object(row.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn s1_scalar_return() {
        let rows = vec![row(&[("get_userid_by_username", json!(123))])];
        assert_eq!(shape(&rows, false, false).unwrap(), json!(123));
    }

    #[test]
    fn s2_multi_row_single_column() {
        let rows = vec![
            row(&[("host", json!("127.0.0.1"))]),
            row(&[("host", json!("192.168.0.1"))]),
            row(&[("host", json!("10.0.0.1"))]),
        ];
        assert_eq!(
            shape(&rows, true, false).unwrap(),
            json!(["127.0.0.1", "192.168.0.1", "10.0.0.1"])
        );
    }

    #[test]
    fn s3_single_row_multi_column() {
        let rows = vec![row(&[
            ("firstname", json!("Joel")),
            ("lastname", json!("Jacobson")),
            ("creationdate", json!("2012-05-25")),
        ])];
        assert_eq!(
            shape(&rows, false, false).unwrap(),
            json!({"firstname": "Joel", "lastname": "Jacobson", "creationdate": "2012-05-25"})
        );
    }

    #[test]
    fn s4_multi_row_multi_column() {
        let rows = vec![
            row(&[("userid", json!(1)), ("firstname", json!("A"))]),
            row(&[("userid", json!(2)), ("firstname", json!("B"))]),
        ];
        let shaped = shape(&rows, true, false).unwrap();
        assert!(shaped.is_array());
        assert_eq!(shaped.as_array().unwrap().len(), 2);
    }

    #[test]
    fn empty_set_is_empty_array() {
        let rows: Rowset = vec![];
        assert_eq!(shape(&rows, true, false).unwrap(), json!([]));
    }

    #[test]
    fn zero_rows_non_set_is_null() {
        let rows: Rowset = vec![];
        assert_eq!(shape(&rows, false, false).unwrap(), Value::Null);
    }

    #[test]
    fn multiple_rows_non_set_is_internal_error() {
        let rows = vec![row(&[("a", json!(1))]), row(&[("a", json!(2))])];
        assert!(matches!(shape(&rows, false, false), Err(GatewayError::InternalError { .. })));
    }

    #[test]
    fn returns_json_round_trips_without_restringifying() {
        let rows = vec![row(&[("result", json!(r#"{"a":1,"b":[2,3]}"#))])];
        let shaped = shape(&rows, false, true).unwrap();
        assert_eq!(shaped, json!({"a": 1, "b": [2, 3]}));
    }

    #[test]
    fn returns_json_with_wrong_shape_is_internal_error() {
        let rows = vec![
            row(&[("result", json!("{}"))]),
            row(&[("result", json!("{}"))]),
        ];
        assert!(matches!(shape(&rows, false, true), Err(GatewayError::InternalError { .. })));
    }
}
