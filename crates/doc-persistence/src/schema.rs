// Esquema Diesel compartido por SQLite y Postgres.
// Ids como texto, timestamps como milisegundos unix, metadatos como JSON en
// texto.
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    documents (id) {
        id -> Text,
        code -> Text,
        title -> Text,
        description -> Nullable<Text>,
        current_version_id -> Nullable<Text>,
        status -> Text,
        security_level -> Text,
        document_type -> Text,
        tags -> Text,
        retention_years -> Nullable<Integer>,
        owner_id -> Text,
        is_archived -> Bool,
        is_deleted -> Bool,
        revision -> BigInt,
        created_at_ts -> BigInt,
        updated_at_ts -> BigInt,
    }
}
diesel::table! {
    document_versions (id) {
        id -> Text,
        document_id -> Text,
        sequence -> BigInt,
        version_number -> Text,
        version_type -> Text,
        branch_name -> Text,
        parent_version_id -> Nullable<Text>,
        merge_source_version_id -> Nullable<Text>,
        superseded_by -> Nullable<Text>,
        content_ref -> Text,
        checksum -> Text,
        size_bytes -> BigInt,
        change_summary -> Nullable<Text>,
        status -> Text,
        is_current_version -> Bool,
        is_archived -> Bool,
        archived_from -> Nullable<Text>,
        is_deleted -> Bool,
        signature -> Nullable<Text>,
        watermark -> Nullable<Text>,
        compression -> Nullable<Text>,
        approved_by -> Nullable<Text>,
        approved_at_ts -> Nullable<BigInt>,
        retention_until_ts -> Nullable<BigInt>,
        access_count -> BigInt,
        last_accessed_at_ts -> Nullable<BigInt>,
        download_count -> BigInt,
        last_downloaded_at_ts -> Nullable<BigInt>,
        created_by -> Text,
        created_at_ts -> BigInt,
    }
}
diesel::table! {
    workflow_templates (id) {
        id -> Text,
        name -> Text,
        description -> Nullable<Text>,
        document_types -> Text,
        steps -> Text,
        is_active -> Bool,
        created_at_ts -> BigInt,
        updated_at_ts -> BigInt,
    }
}
diesel::table! {
    workflow_instances (id) {
        id -> Text,
        template_id -> Text,
        document_id -> Text,
        version_id -> Text,
        current_step_index -> BigInt,
        status -> Text,
        started_at_ts -> BigInt,
        started_by -> Text,
        completed_at_ts -> Nullable<BigInt>,
    }
}
diesel::table! {
    workflow_steps (workflow_instance_id, step_index) {
        workflow_instance_id -> Text,
        step_index -> BigInt,
        step_order -> BigInt,
        step_name -> Text,
        approver_role -> Text,
        is_required -> Bool,
        applicable -> Bool,
        status -> Text,
        approver_id -> Nullable<Text>,
        decided_at_ts -> Nullable<BigInt>,
        comments -> Nullable<Text>,
    }
}
diesel::table! {
    approvals (id) {
        id -> Text,
        workflow_instance_id -> Text,
        step_index -> BigInt,
        decision -> Text,
        approver_id -> Text,
        comments -> Nullable<Text>,
        timestamp_ts -> BigInt,
        sequence -> BigInt,
        prev_hash -> Text,
        entry_hash -> Text,
    }
}
diesel::table! {
    contents (content_ref) {
        content_ref -> Text,
        checksum -> Text,
        size_bytes -> BigInt,
        data -> Text,
        tombstoned -> Bool,
        created_at_ts -> BigInt,
    }
}
allow_tables_to_appear_in_same_query!(documents,
                                      document_versions,
                                      workflow_templates,
                                      workflow_instances,
                                      workflow_steps,
                                      approvals,
                                      contents);
