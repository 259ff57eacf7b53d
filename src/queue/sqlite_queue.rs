use super::events::JobEvents;
use super::schema::QUEUE_VERSIONED_SCHEMAS;
use super::{QueueConsumer, QueueMessage, QueuePublisher, QUEUE_NAME};
use crate::sqlite_persistence::open_versioned_db;
use crate::timestamps::now_ms;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Durable FIFO queue in its own SQLite file.
pub struct SqliteJobQueue {
    conn: Arc<Mutex<Connection>>,
    events: JobEvents,
}

impl SqliteJobQueue {
    pub fn new<P: AsRef<Path>>(db_path: P, events: JobEvents) -> Result<Self> {
        let conn = open_versioned_db(db_path, QUEUE_VERSIONED_SCHEMAS, "queue")?;
        Ok(SqliteJobQueue {
            conn: Arc::new(Mutex::new(conn)),
            events,
        })
    }

    #[cfg(test)]
    pub fn in_memory(events: JobEvents) -> Result<Self> {
        let conn = crate::sqlite_persistence::open_in_memory_db(QUEUE_VERSIONED_SCHEMAS)?;
        Ok(SqliteJobQueue {
            conn: Arc::new(Mutex::new(conn)),
            events,
        })
    }
}

#[async_trait]
impl QueuePublisher for SqliteJobQueue {
    async fn publish(&self, message: QueueMessage) -> Result<()> {
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO job_queue (queue, job_id, payload, enqueued_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    QUEUE_NAME,
                    message.job_id,
                    serde_json::to_string(&message.data)?,
                    now_ms()
                ],
            )
            .context("Failed to append to job queue")?;
        }
        debug!("Enqueued job {} on {}", message.job_id, QUEUE_NAME);
        self.events.notify(message);
        Ok(())
    }

    async fn is_enqueued(&self, job_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM job_queue WHERE queue = ?1 AND job_id = ?2 LIMIT 1",
                rusqlite::params![QUEUE_NAME, job_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn depth(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_queue WHERE queue = ?1",
            [QUEUE_NAME],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[async_trait]
impl QueueConsumer for SqliteJobQueue {
    async fn claim_next(&self) -> Result<Option<QueueMessage>> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let head = tx
            .query_row(
                "SELECT seq, job_id, payload FROM job_queue WHERE queue = ?1 ORDER BY seq ASC LIMIT 1",
                [QUEUE_NAME],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((seq, job_id, payload)) = head else {
            return Ok(None);
        };
        tx.execute("DELETE FROM job_queue WHERE seq = ?1", [seq])?;
        tx.commit()?;

        let data = serde_json::from_str(&payload)
            .with_context(|| format!("Corrupt queue payload for job {}", job_id))?;
        Ok(Some(QueueMessage { job_id, data }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn message(job_id: &str) -> QueueMessage {
        QueueMessage {
            job_id: job_id.to_string(),
            data: json!({"entity": "products"}),
        }
    }

    #[tokio::test]
    async fn test_fifo_claiming() {
        let queue = SqliteJobQueue::in_memory(JobEvents::new()).unwrap();
        queue.publish(message("a")).await.unwrap();
        queue.publish(message("b")).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), 2);
        assert!(queue.is_enqueued("a").await.unwrap());

        assert_eq!(queue.claim_next().await.unwrap().unwrap().job_id, "a");
        assert!(!queue.is_enqueued("a").await.unwrap());
        let claimed = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.job_id, "b");
        assert_eq!(claimed.data["entity"], "products");
        assert!(queue.claim_next().await.unwrap().is_none());
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_publish_broadcasts_job_created() {
        let events = JobEvents::new();
        let mut rx = events.subscribe();
        let queue = SqliteJobQueue::in_memory(events).unwrap();

        queue.publish(message("a")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().job_id, "a");
    }

    #[tokio::test]
    async fn test_messages_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db");
        {
            let queue = SqliteJobQueue::new(&path, JobEvents::new()).unwrap();
            queue.publish(message("a")).await.unwrap();
        }
        let queue = SqliteJobQueue::new(&path, JobEvents::new()).unwrap();
        assert_eq!(queue.claim_next().await.unwrap().unwrap().job_id, "a");
    }
}
