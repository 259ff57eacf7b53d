use super::QueueMessage;
use tokio::sync::broadcast;
use tracing::debug;

const EVENTS_CAPACITY: usize = 256;

/// In-process pub/sub for `job_created` notifications.
///
/// Listeners that fall behind lose the oldest events; the durable queue
/// remains the source of truth.
#[derive(Clone)]
pub struct JobEvents {
    sender: broadcast::Sender<QueueMessage>,
}

impl Default for JobEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl JobEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENTS_CAPACITY);
        JobEvents { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueMessage> {
        self.sender.subscribe()
    }

    /// Returns how many listeners received the event.
    pub fn notify(&self, message: QueueMessage) -> usize {
        match self.sender.send(message) {
            Ok(listeners) => listeners,
            Err(_) => {
                debug!("No job event listeners");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribers_receive_notifications() {
        let events = JobEvents::new();
        assert_eq!(
            events.notify(QueueMessage {
                job_id: "lost".to_string(),
                data: json!({}),
            }),
            0
        );

        let mut rx = events.subscribe();
        let delivered = events.notify(QueueMessage {
            job_id: "job-1".to_string(),
            data: json!({"entity": "products"}),
        });
        assert_eq!(delivered, 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.job_id, "job-1");
    }
}
