//! Schedule record storage and the evaluator lease.

use super::models::*;
use super::schema::SCHEDULES_VERSIONED_SCHEMAS;
use crate::jobs::{FileFormat, JobType};
use crate::sqlite_persistence::open_versioned_db;
use crate::timestamps::now_ms;
use anyhow::{Context, Result};
use rusqlite::{types::Type, Connection, OptionalExtension, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Outcome of a firing, persisted in one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRun {
    pub last_run: i64,
    pub next_run: i64,
    pub enabled: bool,
}

pub trait ScheduleStore: Send + Sync {
    fn create(&self, schedule: NewSchedule) -> Result<Schedule>;

    fn get(&self, id: &str) -> Result<Option<Schedule>>;

    /// Schedules owned by `shop`, newest first.
    fn list_by_tenant(&self, shop: &str) -> Result<Vec<Schedule>>;

    /// Enabled schedules with `next_run <= now`, most overdue first.
    fn list_due(&self, now: i64) -> Result<Vec<Schedule>>;

    /// Apply the allow-listed fields of `patch`, and `next_run` when given.
    fn update(&self, id: &str, patch: &SchedulePatch, next_run: Option<i64>) -> Result<usize>;

    fn set_pending_job(&self, id: &str, job_id: Option<&str>) -> Result<usize>;

    /// Persist a firing and forget the pending job.
    fn record_run(&self, id: &str, run: ScheduleRun) -> Result<usize>;

    fn delete(&self, id: &str) -> Result<usize>;

    fn count(&self) -> Result<usize>;

    /// Take or renew the named lease. Succeeds when the lease is free,
    /// expired, or already held by `holder`.
    fn try_acquire_lease(&self, name: &str, holder: &str, now: i64, ttl_ms: i64) -> Result<bool>;

    fn release_lease(&self, name: &str, holder: &str) -> Result<()>;
}

pub struct SqliteScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

fn invalid_column(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        Type::Text,
        format!("invalid {} value '{}'", column, value).into(),
    )
}

impl SqliteScheduleStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, SCHEDULES_VERSIONED_SCHEMAS, "schedules")?;
        Ok(SqliteScheduleStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_db(SCHEDULES_VERSIONED_SCHEMAS)?;
        Ok(SqliteScheduleStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_schedule(row: &rusqlite::Row) -> rusqlite::Result<Schedule> {
        let job_type: String = row.get("job_type")?;
        let format: Option<String> = row.get("format")?;
        let format = match format {
            Some(f) => Some(FileFormat::from_str(&f).ok_or_else(|| invalid_column("format", &f))?),
            None => None,
        };
        let params: String = row.get("params")?;
        let filters: String = row.get("filters")?;
        Ok(Schedule {
            id: row.get("id")?,
            shop: row.get("shop")?,
            name: row.get("name")?,
            job_type: JobType::from_str(&job_type)
                .ok_or_else(|| invalid_column("job_type", &job_type))?,
            entity: row.get("entity")?,
            action: row.get("action")?,
            params: serde_json::from_str(&params).map_err(|_| invalid_column("params", &params))?,
            filters: serde_json::from_str(&filters)
                .map_err(|_| invalid_column("filters", &filters))?,
            format,
            file_key: row.get("file_key")?,
            schedule_type: row.get("schedule_type")?,
            schedule_time: row.get("schedule_time")?,
            interval: row.get("interval_minutes")?,
            day_of_week: row.get("day_of_week")?,
            day_of_month: row.get("day_of_month")?,
            enabled: row.get("enabled")?,
            last_run: row.get("last_run")?,
            next_run: row.get("next_run")?,
            pending_job_id: row.get("pending_job_id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl ScheduleStore for SqliteScheduleStore {
    fn create(&self, new_schedule: NewSchedule) -> Result<Schedule> {
        let now = now_ms();
        let schedule = Schedule {
            id: uuid::Uuid::new_v4().to_string(),
            shop: new_schedule.shop,
            name: new_schedule.name,
            job_type: new_schedule.job_type,
            entity: new_schedule.entity,
            action: new_schedule.action,
            params: new_schedule.params,
            filters: new_schedule.filters,
            format: new_schedule.format,
            file_key: new_schedule.file_key,
            schedule_type: new_schedule.schedule_type,
            schedule_time: new_schedule.schedule_time,
            interval: new_schedule.interval,
            day_of_week: new_schedule.day_of_week,
            day_of_month: new_schedule.day_of_month,
            enabled: true,
            last_run: None,
            next_run: new_schedule.next_run,
            pending_job_id: new_schedule.pending_job_id,
            created_at: now,
            updated_at: now,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO schedules (
                id, shop, name, job_type, entity, action, params, filters, format,
                file_key, schedule_type, schedule_time, interval_minutes, day_of_week,
                day_of_month, enabled, next_run, pending_job_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"#,
            rusqlite::params![
                schedule.id,
                schedule.shop,
                schedule.name,
                schedule.job_type.as_str(),
                schedule.entity,
                schedule.action,
                serde_json::to_string(&schedule.params)?,
                serde_json::to_string(&schedule.filters)?,
                schedule.format.map(|f| f.as_str()),
                schedule.file_key,
                schedule.schedule_type,
                schedule.schedule_time,
                schedule.interval,
                schedule.day_of_week,
                schedule.day_of_month,
                schedule.enabled,
                schedule.next_run,
                schedule.pending_job_id,
                schedule.created_at,
                schedule.updated_at,
            ],
        )
        .context("Failed to insert schedule")?;
        Ok(schedule)
    }

    fn get(&self, id: &str) -> Result<Option<Schedule>> {
        let conn = self.conn.lock().unwrap();
        let schedule = conn
            .query_row(
                "SELECT * FROM schedules WHERE id = ?1",
                [id],
                Self::row_to_schedule,
            )
            .optional()?;
        Ok(schedule)
    }

    fn list_by_tenant(&self, shop: &str) -> Result<Vec<Schedule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM schedules WHERE shop = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let schedules = stmt
            .query_map([shop], Self::row_to_schedule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(schedules)
    }

    fn list_due(&self, now: i64) -> Result<Vec<Schedule>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM schedules WHERE enabled = 1 AND next_run <= ?1 ORDER BY next_run ASC",
        )?;
        let schedules = stmt
            .query_map([now], Self::row_to_schedule)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(schedules)
    }

    fn update(&self, id: &str, patch: &SchedulePatch, next_run: Option<i64>) -> Result<usize> {
        let mut assignments = vec!["updated_at = ?"];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(now_ms())];

        if let Some(name) = &patch.name {
            assignments.push("name = ?");
            values.push(Box::new(name.clone()));
        }
        if let Some(params) = &patch.params {
            assignments.push("params = ?");
            values.push(Box::new(serde_json::to_string(params)?));
        }
        if let Some(filters) = &patch.filters {
            assignments.push("filters = ?");
            values.push(Box::new(serde_json::to_string(filters)?));
        }
        if let Some(schedule_type) = &patch.schedule_type {
            assignments.push("schedule_type = ?");
            values.push(Box::new(schedule_type.clone()));
        }
        if let Some(schedule_time) = &patch.schedule_time {
            assignments.push("schedule_time = ?");
            values.push(Box::new(schedule_time.clone()));
        }
        if let Some(interval) = patch.interval {
            assignments.push("interval_minutes = ?");
            values.push(Box::new(interval));
        }
        if let Some(enabled) = patch.enabled {
            assignments.push("enabled = ?");
            values.push(Box::new(enabled));
        }
        if let Some(next_run) = next_run {
            assignments.push("next_run = ?");
            values.push(Box::new(next_run));
        }

        values.push(Box::new(id.to_string()));
        let sql = format!(
            "UPDATE schedules SET {} WHERE id = ?",
            assignments.join(", ")
        );
        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute(&sql, refs.as_slice())?)
    }

    fn set_pending_job(&self, id: &str, job_id: Option<&str>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE schedules SET pending_job_id = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![job_id, now_ms(), id],
        )?;
        Ok(updated)
    }

    fn record_run(&self, id: &str, run: ScheduleRun) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            r#"UPDATE schedules
               SET last_run = ?1, next_run = ?2, enabled = ?3, pending_job_id = NULL, updated_at = ?4
               WHERE id = ?5"#,
            rusqlite::params![run.last_run, run.next_run, run.enabled, now_ms(), id],
        )?;
        Ok(updated)
    }

    fn delete(&self, id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.execute("DELETE FROM schedules WHERE id = ?1", [id])?)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM schedules", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn try_acquire_lease(&self, name: &str, holder: &str, now: i64, ttl_ms: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"INSERT INTO scheduler_leases (name, holder, expires_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(name) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at
               WHERE scheduler_leases.holder = excluded.holder OR scheduler_leases.expires_at <= ?4"#,
            rusqlite::params![name, holder, now + ttl_ms, now],
        )?;
        Ok(changed > 0)
    }

    fn release_lease(&self, name: &str, holder: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM scheduler_leases WHERE name = ?1 AND holder = ?2",
            [name, holder],
        )?;
        Ok(())
    }
}
