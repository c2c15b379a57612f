//! Mapping checks that run before any data moves. They return every
//! problem at once so a misconfigured mapping can be fixed in one pass.

use std::collections::HashSet;

use crate::db::models::{GLIDE_ROW_ID_COLUMN, GLIDE_ROW_ID_KEY, RelationshipMapping, TableMapping};
use crate::db::sql::is_safe_identifier;

/// Columns the engine maintains itself on destination tables.
const RESERVED_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Denormalized cross-reference columns follow this naming convention.
pub const ROWID_PREFIX: &str = "rowid_";

pub fn mapping_issues(mapping: &TableMapping) -> Vec<String> {
    let mut issues = Vec::new();

    if mapping.glide_table.trim().is_empty() {
        issues.push("glide_table cannot be empty".to_string());
    }
    if !is_safe_identifier(&mapping.supabase_table) {
        issues.push(format!(
            "destination table {:?} is not a safe identifier",
            mapping.supabase_table
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut mapped_columns = 0usize;

    for (glide_key, column) in &mapping.column_mappings {
        let dest = column.supabase_column_name.as_str();

        if glide_key == GLIDE_ROW_ID_KEY {
            if dest != GLIDE_ROW_ID_COLUMN {
                issues.push(format!(
                    "{GLIDE_ROW_ID_KEY} must map to {GLIDE_ROW_ID_COLUMN}, not {dest:?}"
                ));
            }
            continue;
        }

        mapped_columns += 1;

        if !is_safe_identifier(dest) {
            issues.push(format!(
                "destination column {dest:?} is not a safe identifier"
            ));
            continue;
        }
        if dest == GLIDE_ROW_ID_COLUMN {
            issues.push(format!(
                "{GLIDE_ROW_ID_COLUMN} can only be populated from {GLIDE_ROW_ID_KEY}"
            ));
        }
        if RESERVED_COLUMNS.contains(&dest) {
            issues.push(format!(
                "column {dest:?} is maintained by the engine and cannot be mapped"
            ));
        }
        if !seen.insert(dest) {
            issues.push(format!("column {dest:?} is mapped more than once"));
        }
    }

    if mapped_columns == 0 {
        issues.push(format!(
            "mapping must translate at least one column besides {GLIDE_ROW_ID_KEY}"
        ));
    }

    issues
}

pub fn relationship_issues(rel: &RelationshipMapping) -> Vec<String> {
    let mut issues = Vec::new();

    for (label, name) in [
        ("supabase_table", &rel.supabase_table),
        ("rowid_column", &rel.rowid_column),
        ("target_table", &rel.target_table),
        ("target_column", &rel.target_column),
        ("fk_column", &rel.fk_column),
    ] {
        if !is_safe_identifier(name) {
            issues.push(format!("{label} {name:?} is not a safe identifier"));
        }
    }

    if !rel.rowid_column.starts_with(ROWID_PREFIX) {
        issues.push(format!(
            "rowid_column {:?} must follow the {ROWID_PREFIX}<table> convention",
            rel.rowid_column
        ));
    }
    if rel.fk_column == "id" {
        issues.push("fk_column cannot be the primary key column".to_string());
    }

    issues
}
