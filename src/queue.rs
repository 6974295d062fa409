//! Message queue access for the poll loop.

use crate::error::{sdk_severity, ProcessError, Result};
use async_trait::async_trait;
use aws_sdk_sqs as sqs;
use std::time::Duration;
use tracing::{debug, warn};

/// A message received from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Token required to delete this delivery.
    pub receipt_handle: String,
    pub body: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Receives up to `max_messages`, waiting at most `wait` for one to arrive.
    /// An empty vector means the wait elapsed with nothing available.
    async fn receive(&self, max_messages: i32, wait: Duration) -> Result<Vec<QueueMessage>>;

    /// Removes a delivered message so it is not redelivered.
    async fn delete(&self, message: &QueueMessage) -> Result<()>;
}

/// SQS queue client.
pub struct SqsQueue {
    client: sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub fn new(client: sqs::Client, queue_url: String) -> Self {
        Self { client, queue_url }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn receive(&self, max_messages: i32, wait: Duration) -> Result<Vec<QueueMessage>> {
        // SQS caps long polling at 20 seconds.
        let wait_secs = wait.as_secs().min(20) as i32;

        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_secs)
            .send()
            .await
            .map_err(|e| {
                ProcessError::queue_with(sdk_severity(&e), e.into_service_error())
            })?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let Some(receipt_handle) = message.receipt_handle else {
                    warn!(message_id = ?message.message_id, "Dropping message without receipt handle");
                    return None;
                };
                Some(QueueMessage {
                    message_id: message.message_id.unwrap_or_default(),
                    receipt_handle,
                    body: message.body.unwrap_or_default(),
                })
            })
            .collect::<Vec<_>>();

        debug!(count = messages.len(), "Received messages");
        Ok(messages)
    }

    async fn delete(&self, message: &QueueMessage) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await
            .map_err(|e| {
                ProcessError::queue_with(sdk_severity(&e), e.into_service_error())
            })?;

        debug!(message_id = %message.message_id, "Deleted message");
        Ok(())
    }
}
