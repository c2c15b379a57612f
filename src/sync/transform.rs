//! Row translation between Glide's column namespace and the destination
//! table. Pulls rename columns and coerce values to the mapping's declared
//! types; pushes reverse the rename and ship values as-is, since jsonb
//! already carries the right scalar kinds.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::db::models::{
    ColumnType, DestinationColumn, GLIDE_ROW_ID_COLUMN, GLIDE_ROW_ID_KEY, TableMapping,
};
use crate::glide::TableRow;

/// Why a single source row could not be transformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowError {
    #[error("row has no {GLIDE_ROW_ID_KEY}")]
    MissingRowId,
    #[error("column {column:?}: {detail}")]
    Transform { column: String, detail: String },
}

/// Turns one Glide row into the json object the upsert statement reads.
/// `glide_row_id` always comes from `$rowID`; mapped columns absent from
/// the row become NULL; unmapped columns are dropped.
pub fn transform_row(row: &TableRow, mapping: &TableMapping) -> Result<Value, RowError> {
    let row_id = row
        .get(GLIDE_ROW_ID_KEY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(RowError::MissingRowId)?;

    let mut out = Map::new();
    out.insert(
        GLIDE_ROW_ID_COLUMN.to_string(),
        Value::String(row_id.to_string()),
    );

    for (glide_key, column) in &mapping.column_mappings {
        if glide_key == GLIDE_ROW_ID_KEY || column.supabase_column_name == GLIDE_ROW_ID_COLUMN {
            continue;
        }
        let raw = row
            .get(glide_key)
            .or_else(|| row.get(&column.glide_column_name))
            .cloned()
            .unwrap_or(Value::Null);
        let value = coerce_value(raw, column.data_type).map_err(|detail| RowError::Transform {
            column: column.supabase_column_name.clone(),
            detail,
        })?;
        out.insert(column.supabase_column_name.clone(), value);
    }

    Ok(Value::Object(out))
}

/// Destination columns for the upsert statement: `glide_row_id` first,
/// then the mapped columns in mapping order.
pub fn destination_columns(mapping: &TableMapping) -> Vec<DestinationColumn> {
    let mut columns = vec![DestinationColumn {
        name: GLIDE_ROW_ID_COLUMN.to_string(),
        data_type: ColumnType::String,
    }];
    for (glide_key, column) in &mapping.column_mappings {
        if glide_key == GLIDE_ROW_ID_KEY || column.supabase_column_name == GLIDE_ROW_ID_COLUMN {
            continue;
        }
        columns.push(DestinationColumn {
            name: column.supabase_column_name.clone(),
            data_type: column.data_type,
        });
    }
    columns
}

/// Builds the `columnValues` payload for one local row, reversing the
/// column mapping. Keys are the Glide column ids the mapping is keyed by.
pub fn row_to_column_values(
    local_row: &Map<String, Value>,
    mapping: &TableMapping,
) -> Map<String, Value> {
    let mut values = Map::new();
    for (glide_key, column) in &mapping.column_mappings {
        if glide_key == GLIDE_ROW_ID_KEY || column.supabase_column_name == GLIDE_ROW_ID_COLUMN {
            continue;
        }
        let value = local_row
            .get(&column.supabase_column_name)
            .cloned()
            .unwrap_or(Value::Null);
        values.insert(glide_key.clone(), value);
    }
    values
}

/// Coerces one raw Glide value to the declared column type. Empty and
/// whitespace-only strings become NULL no matter the type; spreadsheet
/// cells have no distinct empty state.
pub fn coerce_value(value: Value, target: ColumnType) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if let Value::String(s) = &value
        && s.trim().is_empty()
    {
        return Ok(Value::Null);
    }

    match target {
        ColumnType::String | ColumnType::ImageUri | ColumnType::EmailAddress => {
            coerce_string(value)
        }
        ColumnType::Number => coerce_number(value),
        ColumnType::Boolean => coerce_boolean(value),
        ColumnType::DateTime => coerce_datetime(value),
    }
}

fn coerce_string(value: Value) -> Result<Value, String> {
    match value {
        Value::String(_) => Ok(value),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other @ (Value::Array(_) | Value::Object(_)) => serde_json::to_string(&other)
            .map(Value::String)
            .map_err(|e| format!("cannot serialize value as text: {e}")),
        Value::Null => Ok(Value::Null),
    }
}

fn coerce_number(value: Value) -> Result<Value, String> {
    match value {
        Value::Number(_) => Ok(value),
        Value::String(s) => {
            // tolerate currency formatting: "$1,234.56"
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ','))
                .collect();
            let parsed: f64 = cleaned
                .parse()
                .map_err(|_| format!("{s:?} is not a number"))?;
            serde_json::Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or_else(|| format!("{s:?} is not a finite number"))
        }
        Value::Bool(b) => Ok(Value::Number(u32::from(b).into())),
        other => Err(format!("cannot coerce {} to a number", type_name(&other))),
    }
}

fn coerce_boolean(value: Value) -> Result<Value, String> {
    match value {
        Value::Bool(_) => Ok(value),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("{s:?} is not a boolean")),
        },
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_none_or(|f| f != 0.0))),
        other => Err(format!("cannot coerce {} to a boolean", type_name(&other))),
    }
}

fn coerce_datetime(value: Value) -> Result<Value, String> {
    match value {
        Value::String(s) => {
            let raw = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Ok(Value::String(parsed.with_timezone(&Utc).to_rfc3339()));
            }
            if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
                return Ok(Value::String(parsed.and_utc().to_rfc3339()));
            }
            if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                && let Some(midnight) = parsed.and_hms_opt(0, 0, 0)
            {
                return Ok(Value::String(midnight.and_utc().to_rfc3339()));
            }
            Err(format!("{raw:?} is not a recognized timestamp"))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| Value::String(dt.to_rfc3339()))
            .ok_or_else(|| format!("{n} is not a valid epoch-millis timestamp")),
        other => Err(format!("cannot coerce {} to a timestamp", type_name(&other))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_case::test_case;

    use super::*;
    use crate::db::models::{ColumnMapping, ColumnMappings, SyncDirection};

    fn mapping_with(columns: &[(&str, &str, &str, ColumnType)]) -> TableMapping {
        let mut column_mappings = ColumnMappings::new();
        for (key, glide_name, supabase_name, data_type) in columns {
            column_mappings.insert(
                key.to_string(),
                ColumnMapping {
                    glide_column_name: glide_name.to_string(),
                    supabase_column_name: supabase_name.to_string(),
                    data_type: *data_type,
                },
            );
        }
        TableMapping::new(
            "native-table-1".to_string(),
            "Invoices".to_string(),
            "invoices".to_string(),
            column_mappings,
            SyncDirection::ToSupabase,
        )
    }

    #[test_case(json!("$1,234.56"), json!(1234.56); "currency string")]
    #[test_case(json!("42"), json!(42.0); "plain integer string")]
    #[test_case(json!(7), json!(7); "number passes through")]
    #[test_case(json!(true), json!(1); "true becomes one")]
    #[test_case(json!(""), json!(null); "empty string becomes null")]
    fn number_coercions(input: Value, expected: Value) {
        assert_eq!(coerce_value(input, ColumnType::Number).unwrap(), expected);
    }

    #[test]
    fn garbage_number_is_an_error() {
        let err = coerce_value(json!("twelve-ish"), ColumnType::Number).unwrap_err();
        assert!(err.contains("not a number"));
        assert!(coerce_value(json!([1, 2]), ColumnType::Number).is_err());
    }

    #[test_case(json!("yes"), json!(true); "yes")]
    #[test_case(json!("No"), json!(false); "no mixed case")]
    #[test_case(json!("TRUE"), json!(true); "uppercase true")]
    #[test_case(json!("0"), json!(false); "zero string")]
    #[test_case(json!(0), json!(false); "zero number")]
    #[test_case(json!(3), json!(true); "nonzero number")]
    #[test_case(json!(false), json!(false); "bool passes through")]
    fn boolean_coercions(input: Value, expected: Value) {
        assert_eq!(coerce_value(input, ColumnType::Boolean).unwrap(), expected);
    }

    #[test]
    fn maybe_is_not_a_boolean() {
        assert!(coerce_value(json!("maybe"), ColumnType::Boolean).is_err());
    }

    #[test]
    fn datetime_accepts_rfc3339_and_common_fallbacks() {
        assert_eq!(
            coerce_value(json!("2024-03-01T10:30:00-05:00"), ColumnType::DateTime).unwrap(),
            json!("2024-03-01T15:30:00+00:00")
        );
        assert_eq!(
            coerce_value(json!("2024-03-01 10:30:00"), ColumnType::DateTime).unwrap(),
            json!("2024-03-01T10:30:00+00:00")
        );
        assert_eq!(
            coerce_value(json!("2024-03-01"), ColumnType::DateTime).unwrap(),
            json!("2024-03-01T00:00:00+00:00")
        );
        assert!(coerce_value(json!("soonish"), ColumnType::DateTime).is_err());
    }

    #[test]
    fn string_targets_stringify_scalars_and_jsonify_composites() {
        assert_eq!(
            coerce_value(json!(42), ColumnType::String).unwrap(),
            json!("42")
        );
        assert_eq!(
            coerce_value(json!(true), ColumnType::String).unwrap(),
            json!("true")
        );
        assert_eq!(
            coerce_value(json!(["a", "b"]), ColumnType::String).unwrap(),
            json!("[\"a\",\"b\"]")
        );
    }

    #[test]
    fn transform_renames_columns_and_nulls_missing_ones() {
        let mapping = mapping_with(&[
            ("Name", "Name", "client_name", ColumnType::String),
            ("Amt", "Amount", "amount", ColumnType::Number),
            ("Paid", "Paid", "paid", ColumnType::Boolean),
        ]);
        let row: TableRow = serde_json::from_value(json!({
            "$rowID": "xK9mPq",
            "Name": "Acme",
            "Amt": "$1,200.00",
            "Ignored": "dropped silently"
        }))
        .unwrap();

        let out = transform_row(&row, &mapping).unwrap();
        assert_eq!(
            out,
            json!({
                "glide_row_id": "xK9mPq",
                "client_name": "Acme",
                "amount": 1200.0,
                "paid": null
            })
        );
    }

    #[test]
    fn transform_falls_back_to_display_name_lookup() {
        let mapping = mapping_with(&[("col-7", "Amount", "amount", ColumnType::Number)]);
        let row: TableRow =
            serde_json::from_value(json!({"$rowID": "r1", "Amount": 12.5})).unwrap();

        let out = transform_row(&row, &mapping).unwrap();
        assert_eq!(out["amount"], json!(12.5));
    }

    #[test]
    fn transform_requires_a_row_id() {
        let mapping = mapping_with(&[("Name", "Name", "client_name", ColumnType::String)]);
        let row: TableRow = serde_json::from_value(json!({"Name": "Acme"})).unwrap();
        assert_eq!(transform_row(&row, &mapping), Err(RowError::MissingRowId));

        let blank: TableRow =
            serde_json::from_value(json!({"$rowID": "   ", "Name": "Acme"})).unwrap();
        assert_eq!(transform_row(&blank, &mapping), Err(RowError::MissingRowId));
    }

    #[test]
    fn transform_reports_the_failing_column() {
        let mapping = mapping_with(&[("Amt", "Amount", "amount", ColumnType::Number)]);
        let row: TableRow =
            serde_json::from_value(json!({"$rowID": "r1", "Amt": "twelve"})).unwrap();

        match transform_row(&row, &mapping) {
            Err(RowError::Transform { column, .. }) => assert_eq!(column, "amount"),
            other => panic!("expected a transform error, got {other:?}"),
        }
    }

    #[test]
    fn destination_columns_lead_with_the_row_key() {
        let mapping = mapping_with(&[
            ("$rowID", "$rowID", "glide_row_id", ColumnType::String),
            ("Name", "Name", "client_name", ColumnType::String),
        ]);
        let columns = destination_columns(&mapping);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, GLIDE_ROW_ID_COLUMN);
        assert_eq!(columns[1].name, "client_name");
    }

    #[test]
    fn push_values_reverse_the_mapping() {
        let mapping = mapping_with(&[
            ("Name", "Name", "client_name", ColumnType::String),
            ("Amt", "Amount", "amount", ColumnType::Number),
        ]);
        let local: Map<String, Value> = serde_json::from_value(json!({
            "id": "3f2d9af2-1111-4222-8333-444455556666",
            "glide_row_id": "xK9mPq",
            "client_name": "Acme",
            "amount": 1200.5
        }))
        .unwrap();

        let values = row_to_column_values(&local, &mapping);
        assert_eq!(
            serde_json::to_value(values).unwrap(),
            json!({"Name": "Acme", "Amt": 1200.5})
        );
    }
}
