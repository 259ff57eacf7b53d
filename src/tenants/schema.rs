//! Database schema for tenants.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const TENANTS_TABLE_V0: Table = Table {
    name: "tenants",
    columns: &[
        sqlite_column!("shop", &SqlType::Text, is_primary_key = true),
        sqlite_column!("is_active", &SqlType::Integer, non_null = true, default_value = Some("1")),
        sqlite_column!("first_seen_at", &SqlType::Integer, non_null = true),
        sqlite_column!("last_seen_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
};

pub const TENANTS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[TENANTS_TABLE_V0],
    migration: None,
}];
