//! Database schema for queue.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const JOB_QUEUE_TABLE_V0: Table = Table {
    name: "job_queue",
    columns: &[
        sqlite_column!("seq", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("queue", &SqlType::Text, non_null = true),
        sqlite_column!("job_id", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!("enqueued_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_job_queue_job_id", "job_id")],
};

pub const QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[JOB_QUEUE_TABLE_V0],
    migration: None,
}];
