//! Database schema for schedules.db.
//!
//! Version 1 links schedules to the job their next firing runs and adds the
//! evaluator lease table.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};
use anyhow::Result;
use rusqlite::Connection;

const SCHEDULES_TABLE_V0: Table = Table {
    name: "schedules",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("shop", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("entity", &SqlType::Text, non_null = true),
        sqlite_column!("action", &SqlType::Text),
        sqlite_column!("params", &SqlType::Text, non_null = true, default_value = Some("'{}'")),
        sqlite_column!("filters", &SqlType::Text, non_null = true, default_value = Some("'{}'")),
        sqlite_column!("format", &SqlType::Text),
        sqlite_column!("file_key", &SqlType::Text),
        sqlite_column!("schedule_type", &SqlType::Text, non_null = true),
        sqlite_column!("schedule_time", &SqlType::Text),
        sqlite_column!("interval_minutes", &SqlType::Integer),
        sqlite_column!("day_of_week", &SqlType::Integer),
        sqlite_column!("day_of_month", &SqlType::Integer),
        sqlite_column!("enabled", &SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("last_run", &SqlType::Integer),
        sqlite_column!("next_run", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_schedules_shop", "shop"),
        ("idx_schedules_due", "enabled, next_run"),
    ],
};

const SCHEDULES_TABLE_V1: Table = Table {
    name: "schedules",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("shop", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("job_type", &SqlType::Text, non_null = true),
        sqlite_column!("entity", &SqlType::Text, non_null = true),
        sqlite_column!("action", &SqlType::Text),
        sqlite_column!("params", &SqlType::Text, non_null = true, default_value = Some("'{}'")),
        sqlite_column!("filters", &SqlType::Text, non_null = true, default_value = Some("'{}'")),
        sqlite_column!("format", &SqlType::Text),
        sqlite_column!("file_key", &SqlType::Text),
        sqlite_column!("schedule_type", &SqlType::Text, non_null = true),
        sqlite_column!("schedule_time", &SqlType::Text),
        sqlite_column!("interval_minutes", &SqlType::Integer),
        sqlite_column!("day_of_week", &SqlType::Integer),
        sqlite_column!("day_of_month", &SqlType::Integer),
        sqlite_column!("enabled", &SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("last_run", &SqlType::Integer),
        sqlite_column!("next_run", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("pending_job_id", &SqlType::Text),
    ],
    indices: &[
        ("idx_schedules_shop", "shop"),
        ("idx_schedules_due", "enabled, next_run"),
    ],
};

const SCHEDULER_LEASES_TABLE_V1: Table = Table {
    name: "scheduler_leases",
    columns: &[
        sqlite_column!("name", &SqlType::Text, is_primary_key = true),
        sqlite_column!("holder", &SqlType::Text, non_null = true),
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute("ALTER TABLE schedules ADD COLUMN pending_job_id TEXT", [])?;
    SCHEDULER_LEASES_TABLE_V1.create(conn)?;
    Ok(())
}

pub const SCHEDULES_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[SCHEDULES_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[SCHEDULES_TABLE_V1, SCHEDULER_LEASES_TABLE_V1],
        migration: Some(migrate_v0_to_v1),
    },
];
