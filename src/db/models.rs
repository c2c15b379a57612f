use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Destination column every synced table carries; upserts key on it.
pub const GLIDE_ROW_ID_COLUMN: &str = "glide_row_id";

/// Key under which the Glide API reports a row's identifier.
pub const GLIDE_ROW_ID_KEY: &str = "$rowID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ToSupabase,
    ToGlide,
    Both,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::ToSupabase => "to_supabase",
            SyncDirection::ToGlide => "to_glide",
            SyncDirection::Both => "both",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "to_supabase" => Some(SyncDirection::ToSupabase),
            "to_glide" => Some(SyncDirection::ToGlide),
            "both" => Some(SyncDirection::Both),
            _ => None,
        }
    }

    /// Whether a run with this direction reads rows out of Glide.
    pub fn pulls(&self) -> bool {
        matches!(self, SyncDirection::ToSupabase | SyncDirection::Both)
    }

    /// Whether a run with this direction writes rows back into Glide.
    pub fn pushes(&self) -> bool {
        matches!(self, SyncDirection::ToGlide | SyncDirection::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Started,
    Processing,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Started => "started",
            SyncStatus::Processing => "processing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "started" => Some(SyncStatus::Started),
            "processing" => Some(SyncStatus::Processing),
            "completed" => Some(SyncStatus::Completed),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncErrorType {
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "TRANSFORM_ERROR")]
    Transform,
    #[serde(rename = "API_ERROR")]
    Api,
    #[serde(rename = "RATE_LIMIT")]
    RateLimit,
    #[serde(rename = "NETWORK_ERROR")]
    Network,
}

impl SyncErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorType::Validation => "VALIDATION_ERROR",
            SyncErrorType::Transform => "TRANSFORM_ERROR",
            SyncErrorType::Api => "API_ERROR",
            SyncErrorType::RateLimit => "RATE_LIMIT",
            SyncErrorType::Network => "NETWORK_ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "VALIDATION_ERROR" => Some(SyncErrorType::Validation),
            "TRANSFORM_ERROR" => Some(SyncErrorType::Transform),
            "API_ERROR" => Some(SyncErrorType::Api),
            "RATE_LIMIT" => Some(SyncErrorType::RateLimit),
            "NETWORK_ERROR" => Some(SyncErrorType::Network),
            _ => None,
        }
    }
}

/// Declared type of a mapped column, in Glide's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "date-time")]
    DateTime,
    #[serde(rename = "image-uri")]
    ImageUri,
    #[serde(rename = "email-address")]
    EmailAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub glide_column_name: String,
    pub supabase_column_name: String,
    #[serde(default = "default_column_type")]
    pub data_type: ColumnType,
}

fn default_column_type() -> ColumnType {
    ColumnType::String
}

/// Per-table column translation, keyed by the Glide column identifier.
/// Ordered so generated SQL is stable across runs.
pub type ColumnMappings = BTreeMap<String, ColumnMapping>;

/// A destination column paired with its declared type, used when
/// building dynamic SQL against the destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationColumn {
    pub name: String,
    pub data_type: ColumnType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMapping {
    pub id: Uuid,
    pub glide_table: String,
    pub glide_table_display_name: String,
    pub supabase_table: String,
    pub column_mappings: ColumnMappings,
    pub sync_direction: SyncDirection,
    pub enabled: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub records_processed: i64,
    pub error_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TableMapping {
    pub fn new(
        glide_table: String,
        glide_table_display_name: String,
        supabase_table: String,
        column_mappings: ColumnMappings,
        sync_direction: SyncDirection,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            glide_table,
            glide_table_display_name,
            supabase_table,
            column_mappings,
            sync_direction,
            enabled: true,
            last_sync_at: None,
            records_processed: 0,
            error_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: Uuid,
    pub mapping_id: Option<Uuid>,
    pub status: SyncStatus,
    pub message: Option<String>,
    pub records_processed: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncLog {
    /// Fresh run entry in the `started` state; the mapping id is absent
    /// for relationship passes, which are not tied to a single mapping.
    pub fn started(mapping_id: Option<Uuid>, message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            mapping_id,
            status: SyncStatus::Started,
            message,
            records_processed: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    pub id: Uuid,
    pub mapping_id: Option<Uuid>,
    pub error_type: SyncErrorType,
    pub error_message: String,
    pub record_data: Option<Value>,
    pub retryable: bool,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SyncErrorRecord {
    pub fn new(
        mapping_id: Option<Uuid>,
        error_type: SyncErrorType,
        error_message: String,
        record_data: Option<Value>,
        retryable: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            mapping_id,
            error_type,
            error_message,
            record_data,
            retryable,
            resolved: false,
            resolution_notes: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipMapping {
    pub id: Uuid,
    pub supabase_table: String,
    pub rowid_column: String,
    pub target_table: String,
    pub target_column: String,
    pub fk_column: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RelationshipMapping {
    pub fn new(
        supabase_table: String,
        rowid_column: String,
        target_table: String,
        fk_column: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            supabase_table,
            rowid_column,
            target_table,
            target_column: GLIDE_ROW_ID_COLUMN.to_string(),
            fk_column,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_direction_round_trips_through_strings() {
        for direction in [
            SyncDirection::ToSupabase,
            SyncDirection::ToGlide,
            SyncDirection::Both,
        ] {
            assert_eq!(SyncDirection::parse(direction.as_str()), Some(direction));
        }
        assert_eq!(SyncDirection::parse("sideways"), None);
    }

    #[test]
    fn error_type_uses_screaming_wire_form() {
        assert_eq!(SyncErrorType::RateLimit.as_str(), "RATE_LIMIT");
        assert_eq!(
            serde_json::to_value(SyncErrorType::Validation).unwrap(),
            serde_json::json!("VALIDATION_ERROR")
        );
        assert_eq!(
            SyncErrorType::parse("NETWORK_ERROR"),
            Some(SyncErrorType::Network)
        );
    }

    #[test]
    fn column_mappings_parse_from_stored_json() {
        let raw = serde_json::json!({
            "$rowID": {
                "glide_column_name": "$rowID",
                "supabase_column_name": "glide_row_id"
            },
            "Name": {
                "glide_column_name": "Name",
                "supabase_column_name": "full_name",
                "data_type": "string"
            },
            "Amt": {
                "glide_column_name": "Amount",
                "supabase_column_name": "amount",
                "data_type": "number"
            }
        });

        let parsed: ColumnMappings = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["Amt"].data_type, ColumnType::Number);
        // data_type defaults to string when omitted
        assert_eq!(parsed["$rowID"].data_type, ColumnType::String);
    }

    #[test]
    fn new_mapping_starts_enabled_with_zero_counters() {
        let mapping = TableMapping::new(
            "native-table-1".to_string(),
            "Clients".to_string(),
            "clients".to_string(),
            ColumnMappings::new(),
            SyncDirection::ToSupabase,
        );
        assert!(mapping.enabled);
        assert_eq!(mapping.records_processed, 0);
        assert_eq!(mapping.error_count, 0);
        assert!(mapping.last_sync_at.is_none());
    }

    #[test]
    fn relationship_defaults_target_to_row_id_column() {
        let rel = RelationshipMapping::new(
            "invoices".to_string(),
            "rowid_clients".to_string(),
            "clients".to_string(),
            "client_id".to_string(),
        );
        assert_eq!(rel.target_column, GLIDE_ROW_ID_COLUMN);
        assert!(rel.enabled);
    }
}
