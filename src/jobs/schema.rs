//! Database schema for jobs.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const JOBS_TABLE_V0: Table = Table {
    name: "jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("shop", &SqlType::Text, non_null = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("entity", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("params", &SqlType::Text, non_null = true, default_value = Some("'{}'")),
        sqlite_column!("filters", &SqlType::Text, non_null = true, default_value = Some("'{}'")),
        sqlite_column!("format", &SqlType::Text),
        sqlite_column!("file_key", &SqlType::Text),
        sqlite_column!("file_url", &SqlType::Text),
        sqlite_column!("filename", &SqlType::Text),
        sqlite_column!("command_mode", &SqlType::Text),
        sqlite_column!("schedule_id", &SqlType::Text),
        sqlite_column!("progress", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("progress_message", &SqlType::Text),
        sqlite_column!("total_records", &SqlType::Integer),
        sqlite_column!("success_count", &SqlType::Integer),
        sqlite_column!("error_count", &SqlType::Integer),
        sqlite_column!("error", &SqlType::Text),
        sqlite_column!("errors", &SqlType::Text, non_null = true, default_value = Some("'[]'")),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer),
        sqlite_column!("completed_at", &SqlType::Integer),
        sqlite_column!("failed_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_jobs_shop_created", "shop, created_at"),
        ("idx_jobs_status", "status"),
        ("idx_jobs_created", "created_at"),
    ],
};

pub const JOBS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[JOBS_TABLE_V0],
    migration: None,
}];
