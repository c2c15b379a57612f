diesel::table! {
    gl_mappings (id) {
        id -> Uuid,
        glide_table -> Text,
        glide_table_display_name -> Text,
        supabase_table -> Text,
        column_mappings -> Jsonb,
        sync_direction -> Text,
        enabled -> Bool,
        last_sync_at -> Nullable<Timestamptz>,
        records_processed -> BigInt,
        error_count -> BigInt,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    gl_sync_logs (id) {
        id -> Uuid,
        mapping_id -> Nullable<Uuid>,
        status -> Text,
        message -> Nullable<Text>,
        records_processed -> BigInt,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    gl_sync_errors (id) {
        id -> Uuid,
        mapping_id -> Nullable<Uuid>,
        error_type -> Text,
        error_message -> Text,
        record_data -> Nullable<Jsonb>,
        retryable -> Bool,
        resolved -> Bool,
        resolution_notes -> Nullable<Text>,
        created_at -> Timestamptz,
        resolved_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    gl_relationship_mappings (id) {
        id -> Uuid,
        supabase_table -> Text,
        rowid_column -> Text,
        target_table -> Text,
        target_column -> Text,
        fk_column -> Text,
        enabled -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    gl_mappings,
    gl_sync_logs,
    gl_sync_errors,
    gl_relationship_mappings,
);
