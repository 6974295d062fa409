//! Error taxonomy for message processing.

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use std::fmt;
use thiserror::Error;

/// Boxed source error from an infrastructure client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How the poll loop should treat a failed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Infrastructure trouble; the same message may succeed later.
    Recoverable,
    /// The message or its records can never be processed as-is.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Recoverable => write!(f, "recoverable"),
            Severity::Fatal => write!(f, "fatal"),
        }
    }
}

/// Record kinds read from the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Note,
    Customer,
    LineItem,
    Product,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Note => write!(f, "note"),
            RecordKind::Customer => write!(f, "customer"),
            RecordKind::LineItem => write!(f, "line item"),
            RecordKind::Product => write!(f, "product"),
        }
    }
}

/// Everything that can go wrong while processing one queue message.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("malformed message payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("{record} record is missing field `{field}`")]
    MissingField {
        record: RecordKind,
        field: &'static str,
    },

    #[error("failed to render document: {0}")]
    Render(String),

    #[error("only {rendered} of {expected} text lines matched a font face")]
    MissingFonts { expected: usize, rendered: usize },

    #[error("record store request failed: {source}")]
    RecordStore {
        #[source]
        source: BoxError,
        severity: Severity,
    },

    #[error("object store request failed: {source}")]
    ObjectStore {
        #[source]
        source: BoxError,
        severity: Severity,
    },

    #[error("queue request failed: {source}")]
    Queue {
        #[source]
        source: BoxError,
        severity: Severity,
    },

    #[error("timed out waiting for {operation}")]
    Timeout { operation: &'static str },
}

impl ProcessError {
    /// Classifies the error for the poll loop's deletion policy.
    pub fn severity(&self) -> Severity {
        match self {
            ProcessError::MalformedPayload(_)
            | ProcessError::NotFound { .. }
            | ProcessError::MissingField { .. }
            | ProcessError::Render(_) => Severity::Fatal,
            // Host misconfiguration; the message renders once fonts are installed.
            ProcessError::MissingFonts { .. } | ProcessError::Timeout { .. } => {
                Severity::Recoverable
            }
            ProcessError::RecordStore { severity, .. }
            | ProcessError::ObjectStore { severity, .. }
            | ProcessError::Queue { severity, .. } => *severity,
        }
    }

    /// A recoverable record store failure.
    pub fn record_store(err: impl Into<BoxError>) -> Self {
        Self::record_store_with(Severity::Recoverable, err)
    }

    pub fn record_store_with(severity: Severity, err: impl Into<BoxError>) -> Self {
        ProcessError::RecordStore {
            source: err.into(),
            severity,
        }
    }

    /// A recoverable object store failure.
    pub fn object_store(err: impl Into<BoxError>) -> Self {
        Self::object_store_with(Severity::Recoverable, err)
    }

    pub fn object_store_with(severity: Severity, err: impl Into<BoxError>) -> Self {
        ProcessError::ObjectStore {
            source: err.into(),
            severity,
        }
    }

    /// A recoverable queue failure.
    pub fn queue(err: impl Into<BoxError>) -> Self {
        Self::queue_with(Severity::Recoverable, err)
    }

    pub fn queue_with(severity: Severity, err: impl Into<BoxError>) -> Self {
        ProcessError::Queue {
            source: err.into(),
            severity,
        }
    }
}

/// Service error codes worth retrying: throttling, capacity and transient
/// server-side conditions.
const RETRYABLE_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "RequestThrottled",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "LimitExceededException",
    "TransactionConflictException",
    "InternalServerError",
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
    "SlowDown",
    "RequestTimeout",
    "RequestTimeoutException",
    "ExpiredToken",
    "ExpiredTokenException",
];

/// Classifies a service error by its code and HTTP status.
///
/// Throttling and 5xx responses are recoverable. Other 4xx responses
/// (missing table or bucket, validation, access denied) will fail the same
/// way on every delivery.
pub fn service_severity(code: Option<&str>, status: Option<u16>) -> Severity {
    if code.is_some_and(|code| RETRYABLE_CODES.contains(&code)) {
        return Severity::Recoverable;
    }
    match status {
        Some(429) | Some(500..=599) => Severity::Recoverable,
        Some(400..=499) => Severity::Fatal,
        _ => Severity::Recoverable,
    }
}

/// Classifies an AWS SDK error before it is narrowed to its service error.
///
/// Timeouts, dispatch failures and unparseable responses are transport
/// trouble and stay recoverable. A request that cannot even be built is
/// fatal. The smithy `SdkError` is shared by every AWS client crate.
pub fn sdk_severity<E: ProvideErrorMetadata>(err: &SdkError<E>) -> Severity {
    match err {
        SdkError::ServiceError(context) => service_severity(
            context.err().code(),
            Some(context.raw().status().as_u16()),
        ),
        SdkError::ConstructionFailure(_) => Severity::Fatal,
        _ => Severity::Recoverable,
    }
}

pub type Result<T> = std::result::Result<T, ProcessError>;

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::operation::get_item::GetItemError;

    #[test]
    fn test_data_errors_are_fatal() {
        let err = ProcessError::NotFound {
            kind: RecordKind::Note,
            id: "N1".to_string(),
        };
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(err.to_string(), "note not found: N1");

        let err = ProcessError::MissingField {
            record: RecordKind::Customer,
            field: "razonSocial",
        };
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(
            err.to_string(),
            "customer record is missing field `razonSocial`"
        );
    }

    #[test]
    fn test_infrastructure_errors_are_recoverable() {
        let err = ProcessError::object_store("connection reset");
        assert_eq!(err.severity(), Severity::Recoverable);

        let err = ProcessError::Timeout {
            operation: "note lookup",
        };
        assert_eq!(err.severity(), Severity::Recoverable);
        assert_eq!(err.to_string(), "timed out waiting for note lookup");
    }

    #[test]
    fn test_throttling_and_server_errors_are_recoverable() {
        for code in [
            "ThrottlingException",
            "ProvisionedThroughputExceededException",
            "RequestLimitExceeded",
            "InternalServerError",
            "SlowDown",
        ] {
            assert_eq!(
                service_severity(Some(code), Some(400)),
                Severity::Recoverable,
                "{}",
                code
            );
        }
        assert_eq!(service_severity(None, Some(503)), Severity::Recoverable);
        assert_eq!(service_severity(Some("Unknown"), Some(429)), Severity::Recoverable);
    }

    #[test]
    fn test_client_errors_are_fatal() {
        for (code, status) in [
            ("ResourceNotFoundException", 400),
            ("ValidationException", 400),
            ("NoSuchBucket", 404),
            ("AccessDenied", 403),
            ("AccessDeniedException", 400),
            ("AWS.SimpleQueueService.NonExistentQueue", 400),
        ] {
            assert_eq!(
                service_severity(Some(code), Some(status)),
                Severity::Fatal,
                "{}",
                code
            );
        }
    }

    #[test]
    fn test_unknown_status_is_recoverable() {
        assert_eq!(service_severity(None, None), Severity::Recoverable);
    }

    #[test]
    fn test_sdk_transport_errors_are_recoverable() {
        let err: SdkError<GetItemError> = SdkError::timeout_error("operation timed out");
        assert_eq!(sdk_severity(&err), Severity::Recoverable);
    }

    #[test]
    fn test_sdk_construction_failure_is_fatal() {
        let err: SdkError<GetItemError> = SdkError::construction_failure("missing table name");
        assert_eq!(sdk_severity(&err), Severity::Fatal);
    }

    #[test]
    fn test_classified_store_error_keeps_severity() {
        let err = ProcessError::record_store_with(Severity::Fatal, "ResourceNotFoundException");
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(
            err.to_string(),
            "record store request failed: ResourceNotFoundException"
        );
        assert_eq!(ProcessError::queue("reset").severity(), Severity::Recoverable);
    }

    #[test]
    fn test_missing_fonts_is_recoverable() {
        let err = ProcessError::MissingFonts {
            expected: 4,
            rendered: 0,
        };
        assert_eq!(err.severity(), Severity::Recoverable);
        assert_eq!(err.to_string(), "only 0 of 4 text lines matched a font face");
    }
}
