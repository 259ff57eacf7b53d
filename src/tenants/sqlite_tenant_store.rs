use super::schema::TENANTS_VERSIONED_SCHEMAS;
use super::{Tenant, TenantStats, TenantStore};
use crate::sqlite_persistence::open_versioned_db;
use crate::timestamps::now_ms;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteTenantStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTenantStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, TENANTS_VERSIONED_SCHEMAS, "tenants")?;
        Ok(SqliteTenantStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_db(TENANTS_VERSIONED_SCHEMAS)?;
        Ok(SqliteTenantStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_tenant(row: &rusqlite::Row) -> rusqlite::Result<Tenant> {
        Ok(Tenant {
            shop: row.get("shop")?,
            is_active: row.get("is_active")?,
            first_seen_at: row.get("first_seen_at")?,
            last_seen_at: row.get("last_seen_at")?,
        })
    }
}

impl TenantStore for SqliteTenantStore {
    fn touch(&self, shop: &str) -> Result<Tenant> {
        let now = now_ms();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO tenants (shop, is_active, first_seen_at, last_seen_at) VALUES (?1, 1, ?2, ?2)
               ON CONFLICT(shop) DO UPDATE SET last_seen_at = excluded.last_seen_at, is_active = 1"#,
            rusqlite::params![shop, now],
        )
        .context("Failed to record tenant activity")?;
        let tenant = conn.query_row(
            "SELECT * FROM tenants WHERE shop = ?1",
            [shop],
            Self::row_to_tenant,
        )?;
        Ok(tenant)
    }

    fn get(&self, shop: &str) -> Result<Option<Tenant>> {
        let conn = self.conn.lock().unwrap();
        let tenant = conn
            .query_row(
                "SELECT * FROM tenants WHERE shop = ?1",
                [shop],
                Self::row_to_tenant,
            )
            .optional()?;
        Ok(tenant)
    }

    fn set_active(&self, shop: &str, active: bool) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(
            "UPDATE tenants SET is_active = ?1 WHERE shop = ?2",
            rusqlite::params![active, shop],
        )?)
    }

    fn stats(&self) -> Result<TenantStats> {
        let conn = self.conn.lock().unwrap();
        let (total, active): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM tenants",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(TenantStats {
            total_stores: total as usize,
            active_stores: active as usize,
            inactive_stores: (total - active) as usize,
        })
    }
}
