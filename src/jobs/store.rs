//! Job record storage.
//!
//! SQLite-backed persistence for jobs, their status transitions and progress.

use super::models::*;
use super::schema::JOBS_VERSIONED_SCHEMAS;
use crate::pagination::PageRequest;
use crate::sqlite_persistence::open_versioned_db;
use crate::timestamps::now_ms;
use anyhow::Result;
use rusqlite::{types::Type, Connection, OptionalExtension, ToSql};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Durable collection of jobs.
///
/// Mutations report the number of rows they touched; an unknown id is a
/// silent no-op that reports zero.
pub trait JobStore: Send + Sync {
    /// Persist a new job, assigning its id and timestamps.
    fn create(&self, job: NewJob) -> Result<Job>;

    fn get(&self, id: &str) -> Result<Option<Job>>;

    /// Jobs owned by `shop`, newest first, with the total count.
    fn list_by_tenant(&self, shop: &str, page: PageRequest) -> Result<(Vec<Job>, usize)>;

    /// Every tenant's jobs, newest first, optionally narrowed to one shop.
    fn list_all(&self, shop: Option<&str>, page: PageRequest) -> Result<(Vec<Job>, usize)>;

    /// All jobs currently in `status`, oldest first.
    fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    /// Unconditionally set the status and merge `extra` into the record.
    fn set_status(&self, id: &str, status: JobStatus, extra: &JobStatusUpdate) -> Result<usize>;

    /// Like `set_status`, but only if the job is still in `from`.
    fn transition_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
        extra: &JobStatusUpdate,
    ) -> Result<usize>;

    fn set_progress(&self, id: &str, percent: u8, message: Option<&str>) -> Result<usize>;

    /// Link a job to the schedule it belongs to.
    fn attach_schedule(&self, id: &str, schedule_id: &str) -> Result<usize>;

    fn count_by_status(&self) -> Result<HashMap<JobStatus, usize>>;

    /// Cheap round trip used by health checks.
    fn ping(&self) -> Result<()>;
}

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

fn invalid_column(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        Type::Text,
        format!("invalid {} value '{}'", column, value).into(),
    )
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    column: &str,
) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    serde_json::from_str(&raw).map_err(|_| invalid_column(column, &raw))
}

impl SqliteJobStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, JOBS_VERSIONED_SCHEMAS, "jobs")?;
        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_db(JOBS_VERSIONED_SCHEMAS)?;
        Ok(SqliteJobStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let job_type: String = row.get("job_type")?;
        let status: String = row.get("status")?;
        let format: Option<String> = row.get("format")?;
        let format = match format {
            Some(f) => Some(FileFormat::from_str(&f).ok_or_else(|| invalid_column("format", &f))?),
            None => None,
        };
        Ok(Job {
            id: row.get("id")?,
            shop: row.get("shop")?,
            job_type: JobType::from_str(&job_type)
                .ok_or_else(|| invalid_column("job_type", &job_type))?,
            entity: row.get("entity")?,
            status: JobStatus::from_str(&status).ok_or_else(|| invalid_column("status", &status))?,
            params: json_column(row, "params")?,
            filters: json_column(row, "filters")?,
            format,
            file_key: row.get("file_key")?,
            file_url: row.get("file_url")?,
            filename: row.get("filename")?,
            command_mode: row.get("command_mode")?,
            schedule_id: row.get("schedule_id")?,
            progress: row.get("progress")?,
            progress_message: row.get("progress_message")?,
            total_records: row.get("total_records")?,
            success_count: row.get("success_count")?,
            error_count: row.get("error_count")?,
            error: row.get("error")?,
            errors: json_column(row, "errors")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            failed_at: row.get("failed_at")?,
        })
    }

    fn query_page(
        conn: &Connection,
        shop: Option<&str>,
        page: PageRequest,
    ) -> Result<(Vec<Job>, usize)> {
        let (where_clause, mut params): (&str, Vec<Box<dyn ToSql>>) = match shop {
            Some(shop) => ("WHERE shop = ?", vec![Box::new(shop.to_string())]),
            None => ("", vec![]),
        };

        let total: i64 = {
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            conn.query_row(
                &format!("SELECT COUNT(*) FROM jobs {}", where_clause),
                refs.as_slice(),
                |row| row.get(0),
            )?
        };

        params.push(Box::new(page.limit as i64));
        params.push(Box::new(page.offset()));
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
        // rowid breaks ties between jobs created within the same millisecond
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            where_clause
        ))?;
        let jobs = stmt
            .query_map(refs.as_slice(), Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((jobs, total as usize))
    }

    fn apply_status(
        conn: &Connection,
        id: &str,
        expected: Option<JobStatus>,
        status: JobStatus,
        extra: &JobStatusUpdate,
    ) -> Result<usize> {
        let now = now_ms();
        let mut assignments = vec!["status = ?", "updated_at = ?"];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(status.as_str()), Box::new(now)];

        match status {
            JobStatus::Processing => {
                assignments.push("started_at = ?");
                values.push(Box::new(now));
            }
            JobStatus::Completed | JobStatus::CompletedWithErrors => {
                assignments.push("completed_at = ?");
                values.push(Box::new(now));
                assignments.push("progress = 100");
            }
            JobStatus::Failed => {
                assignments.push("failed_at = ?");
                values.push(Box::new(now));
            }
            _ => {}
        }

        let text_fields = [
            ("file_key = ?", &extra.file_key),
            ("file_url = ?", &extra.file_url),
            ("filename = ?", &extra.filename),
            ("error = ?", &extra.error),
        ];
        for (assignment, value) in text_fields {
            if let Some(value) = value {
                assignments.push(assignment);
                values.push(Box::new(value.clone()));
            }
        }
        let count_fields = [
            ("total_records = ?", extra.total_records),
            ("success_count = ?", extra.success_count),
            ("error_count = ?", extra.error_count),
        ];
        for (assignment, value) in count_fields {
            if let Some(value) = value {
                assignments.push(assignment);
                values.push(Box::new(value));
            }
        }

        if !extra.errors.is_empty() {
            let existing: Option<String> = conn
                .query_row("SELECT errors FROM jobs WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(existing) = existing else {
                return Ok(0);
            };
            let mut errors: Vec<String> = serde_json::from_str(&existing).unwrap_or_default();
            errors.extend(extra.errors.iter().cloned());
            errors.truncate(MAX_JOB_ERRORS);
            assignments.push("errors = ?");
            values.push(Box::new(serde_json::to_string(&errors)?));
        }

        let mut sql = format!("UPDATE jobs SET {} WHERE id = ?", assignments.join(", "));
        values.push(Box::new(id.to_string()));
        if let Some(expected) = expected {
            sql.push_str(" AND status = ?");
            values.push(Box::new(expected.as_str()));
        }

        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        Ok(conn.execute(&sql, refs.as_slice())?)
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, new_job: NewJob) -> Result<Job> {
        let now = now_ms();
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            shop: new_job.shop,
            job_type: new_job.job_type,
            entity: new_job.entity,
            status: new_job.status,
            params: new_job.params,
            filters: new_job.filters,
            format: new_job.format,
            file_key: new_job.file_key,
            file_url: None,
            filename: None,
            command_mode: new_job.command_mode,
            schedule_id: new_job.schedule_id,
            progress: 0,
            progress_message: None,
            total_records: None,
            success_count: None,
            error_count: None,
            error: None,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO jobs (
                id, shop, job_type, entity, status, params, filters, format,
                file_key, command_mode, schedule_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
            rusqlite::params![
                job.id,
                job.shop,
                job.job_type.as_str(),
                job.entity,
                job.status.as_str(),
                serde_json::to_string(&job.params)?,
                serde_json::to_string(&job.filters)?,
                job.format.map(|f| f.as_str()),
                job.file_key,
                job.command_mode,
                job.schedule_id,
                job.created_at,
                job.updated_at,
            ],
        )?;
        Ok(job)
    }

    fn get(&self, id: &str) -> Result<Option<Job>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row("SELECT * FROM jobs WHERE id = ?1", [id], Self::row_to_job)
            .optional()?;
        Ok(job)
    }

    fn list_by_tenant(&self, shop: &str, page: PageRequest) -> Result<(Vec<Job>, usize)> {
        let conn = self.conn.lock().unwrap();
        Self::query_page(&conn, Some(shop), page)
    }

    fn list_all(&self, shop: Option<&str>, page: PageRequest) -> Result<(Vec<Job>, usize)> {
        let conn = self.conn.lock().unwrap();
        Self::query_page(&conn, shop, page)
    }

    fn list_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM jobs WHERE status = ?1 ORDER BY created_at ASC, rowid ASC")?;
        let jobs = stmt
            .query_map([status.as_str()], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn set_status(&self, id: &str, status: JobStatus, extra: &JobStatusUpdate) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Self::apply_status(&conn, id, None, status, extra)
    }

    fn transition_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
        extra: &JobStatusUpdate,
    ) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        Self::apply_status(&conn, id, Some(from), to, extra)
    }

    fn set_progress(&self, id: &str, percent: u8, message: Option<&str>) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let updated = match message.filter(|m| !m.is_empty()) {
            Some(message) => conn.execute(
                "UPDATE jobs SET progress = ?1, progress_message = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![percent, message, now_ms(), id],
            )?,
            None => conn.execute(
                "UPDATE jobs SET progress = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![percent, now_ms(), id],
            )?,
        };
        Ok(updated)
    }

    fn attach_schedule(&self, id: &str, schedule_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE jobs SET schedule_id = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![schedule_id, now_ms(), id],
        )?;
        Ok(updated)
    }

    fn count_by_status(&self) -> Result<HashMap<JobStatus, usize>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            if let Some(status) = JobStatus::from_str(&status) {
                counts.insert(status, count as usize);
            }
        }
        Ok(counts)
    }

    fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
