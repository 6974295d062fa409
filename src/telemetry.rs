//! Structured logging for the worker.

use crate::config::LogFormat;
use crate::error::ProcessError;
use crate::processor::ProcessOutcome;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG` (default: info). `LogFormat::Json`
/// emits one JSON object per event for log shippers.
pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Emits one log line describing how a message ended.
///
/// Failures are logged with their severity so that silently discarded
/// messages can still be found in the logs.
pub fn record_outcome(message_id: &str, outcome: &Result<ProcessOutcome, ProcessError>) {
    match outcome {
        Ok(ProcessOutcome::Published { key }) => {
            info!(message_id, key = %key, "PDF uploaded");
        }
        Ok(ProcessOutcome::Skipped) => {
            info!(message_id, "Message skipped: no noteId");
        }
        Err(e) => {
            error!(
                message_id,
                severity = %e.severity(),
                error = %e,
                "Message processing failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcome() {
        // Should not panic without a subscriber installed
        record_outcome(
            "m-1",
            &Ok(ProcessOutcome::Published {
                key: "ACM010101AAA/F-100.pdf".to_string(),
            }),
        );
        record_outcome("m-2", &Ok(ProcessOutcome::Skipped));
        record_outcome("m-3", &Err(ProcessError::Render("boom".to_string())));
    }
}
