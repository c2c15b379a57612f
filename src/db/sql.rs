//! Builders for the dynamic SQL run against destination tables.
//!
//! Table and column names come from stored mapping rows, so every
//! identifier is checked against a strict pattern before it is ever
//! interpolated; row values only travel through bind parameters.

use once_cell::sync::Lazy;
use regex::Regex;

use super::DatabaseError;
use super::models::{ColumnType, DestinationColumn, GLIDE_ROW_ID_COLUMN, RelationshipMapping};

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid identifier regex"));

/// Lower-case snake identifiers only, within Postgres' 63-byte name limit.
pub fn is_safe_identifier(name: &str) -> bool {
    name.len() <= 63 && IDENTIFIER_RE.is_match(name)
}

fn quote_ident(name: &str) -> Result<String, DatabaseError> {
    if is_safe_identifier(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(DatabaseError::Query(format!(
            "unsafe SQL identifier: {name:?}"
        )))
    }
}

/// Expression extracting one column from a jsonb row element `r`,
/// cast to the SQL type matching the declared column type.
fn select_expr(column: &DestinationColumn) -> String {
    let key = &column.name;
    match column.data_type {
        ColumnType::String | ColumnType::ImageUri | ColumnType::EmailAddress => {
            format!("r->>'{key}'")
        }
        ColumnType::Number => format!("(r->>'{key}')::double precision"),
        ColumnType::Boolean => format!("(r->>'{key}')::boolean"),
        ColumnType::DateTime => format!("(r->>'{key}')::timestamptz"),
    }
}

/// Upsert statement taking a single jsonb array bind ($1). Each element is
/// an object keyed by destination column name; conflicts on `glide_row_id`
/// update the mapped columns and refresh `updated_at`.
pub fn build_upsert_sql(
    table: &str,
    columns: &[DestinationColumn],
) -> Result<String, DatabaseError> {
    if columns.is_empty() {
        return Err(DatabaseError::Query(
            "cannot upsert with no destination columns".to_string(),
        ));
    }

    let table_ident = quote_ident(table)?;
    let mut names = Vec::with_capacity(columns.len());
    let mut exprs = Vec::with_capacity(columns.len());
    for column in columns {
        names.push(quote_ident(&column.name)?);
        exprs.push(select_expr(column));
    }

    let mut updates = Vec::with_capacity(columns.len());
    for column in columns {
        if column.name == GLIDE_ROW_ID_COLUMN {
            continue;
        }
        let ident = quote_ident(&column.name)?;
        updates.push(format!("{ident} = EXCLUDED.{ident}"));
    }
    updates.push("\"updated_at\" = NOW()".to_string());

    Ok(format!(
        "INSERT INTO {table_ident} ({}) SELECT {} FROM jsonb_array_elements($1::jsonb) AS r ON CONFLICT (\"{GLIDE_ROW_ID_COLUMN}\") DO UPDATE SET {}",
        names.join(", "),
        exprs.join(", "),
        updates.join(", ")
    ))
}

/// Reads a page of destination rows as jsonb documents, in stable order.
pub fn build_fetch_sql(table: &str) -> Result<String, DatabaseError> {
    let table_ident = quote_ident(table)?;
    Ok(format!(
        "SELECT to_jsonb(t) AS doc FROM {table_ident} AS t ORDER BY t.\"id\" LIMIT $1 OFFSET $2"
    ))
}

pub fn build_count_sql(table: &str) -> Result<String, DatabaseError> {
    let table_ident = quote_ident(table)?;
    Ok(format!("SELECT COUNT(*) AS count FROM {table_ident}"))
}

/// Stamps the Glide row identifier onto a local row after an add-row
/// mutation reports it back.
pub fn build_set_row_id_sql(table: &str) -> Result<String, DatabaseError> {
    let table_ident = quote_ident(table)?;
    Ok(format!(
        "UPDATE {table_ident} SET \"{GLIDE_ROW_ID_COLUMN}\" = $1, \"updated_at\" = NOW() WHERE \"id\" = $2"
    ))
}

/// Backfills a foreign key from a denormalized rowid column. Only rows
/// whose fk value would actually change are touched, so repeated passes
/// are no-ops.
pub fn build_backfill_sql(rel: &RelationshipMapping) -> Result<String, DatabaseError> {
    let child = quote_ident(&rel.supabase_table)?;
    let parent = quote_ident(&rel.target_table)?;
    let rowid = quote_ident(&rel.rowid_column)?;
    let target = quote_ident(&rel.target_column)?;
    let fk = quote_ident(&rel.fk_column)?;
    Ok(format!(
        "UPDATE {child} AS child SET {fk} = parent.\"id\" FROM {parent} AS parent WHERE child.{rowid} IS NOT NULL AND child.{rowid} = parent.{target} AND child.{fk} IS DISTINCT FROM parent.\"id\""
    ))
}
