//! Poll loop: one message in flight at a time.

use crate::config::{FailurePolicy, PollConfig};
use crate::error::{ProcessError, Severity};
use crate::processor::{MessageProcessor, ProcessOutcome};
use crate::queue::{MessageQueue, QueueMessage};
use crate::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What a single poll iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    /// The wait elapsed with no message.
    Idle,
    /// A message was processed; `deleted` tells whether it left the queue.
    Handled { deleted: bool },
    /// The queue call itself failed.
    QueueError,
}

/// Sequential consumer that feeds queue messages to the processor.
pub struct PollLoop {
    queue: Arc<dyn MessageQueue>,
    processor: MessageProcessor,
    config: PollConfig,
}

impl PollLoop {
    pub fn new(queue: Arc<dyn MessageQueue>, processor: MessageProcessor, config: PollConfig) -> Self {
        Self {
            queue,
            processor,
            config,
        }
    }

    /// Runs until `shutdown` is cancelled.
    ///
    /// Cancellation interrupts receive waits and backoff sleeps. A message
    /// already being processed is always finished (and deleted per policy)
    /// before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            wait_secs = self.config.wait_time.as_secs(),
            policy = ?self.config.failure_policy,
            "Worker started"
        );

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.receive_one() => received,
            };

            let result = match received {
                Some(Ok(message)) => self.handle(message).await,
                Some(Err(())) => PollResult::QueueError,
                None => PollResult::Idle,
            };

            let backoff = match result {
                PollResult::Idle => Some(self.config.idle_backoff),
                PollResult::QueueError => Some(self.config.error_backoff),
                PollResult::Handled { .. } => None,
            };

            if let Some(delay) = backoff {
                if !sleep_or_cancel(delay, &shutdown).await {
                    break;
                }
            }
        }

        info!("Worker stopped");
    }

    /// Receives at most one message and handles it.
    pub async fn poll_once(&self) -> PollResult {
        match self.receive_one().await {
            Some(Ok(message)) => self.handle(message).await,
            Some(Err(())) => PollResult::QueueError,
            None => PollResult::Idle,
        }
    }

    /// `None` when the wait elapsed empty, `Some(Err(()))` when the receive
    /// call failed (already logged).
    async fn receive_one(&self) -> Option<Result<QueueMessage, ()>> {
        match self.queue.receive(1, self.config.wait_time).await {
            Ok(messages) => messages.into_iter().next().map(Ok),
            Err(e) => {
                error!(error = %e, "Failed to receive messages");
                Some(Err(()))
            }
        }
    }

    async fn handle(&self, message: QueueMessage) -> PollResult {
        info!(message_id = %message.message_id, "Message received");

        let outcome = self.processor.process(&message.body).await;
        telemetry::record_outcome(&message.message_id, &outcome);

        if !self.should_delete(&outcome) {
            warn!(
                message_id = %message.message_id,
                "Leaving message on queue for redelivery"
            );
            return PollResult::Handled { deleted: false };
        }

        match self.queue.delete(&message).await {
            Ok(()) => PollResult::Handled { deleted: true },
            Err(e) => {
                error!(
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to delete message"
                );
                PollResult::QueueError
            }
        }
    }

    fn should_delete(&self, outcome: &Result<ProcessOutcome, ProcessError>) -> bool {
        match (self.config.failure_policy, outcome) {
            (_, Ok(_)) => true,
            (FailurePolicy::Discard, Err(_)) => true,
            (FailurePolicy::Redeliver, Err(e)) => e.severity() == Severity::Fatal,
        }
    }
}

/// Sleeps for `delay`. Returns `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
