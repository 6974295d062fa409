//! Process configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// What the poll loop does with a message whose processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Delete every received message, whatever the outcome.
    Discard,
    /// Leave recoverable failures on the queue so they are redelivered.
    Redeliver,
}

impl FromStr for FailurePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "discard" => Ok(FailurePolicy::Discard),
            "redeliver" => Ok(FailurePolicy::Redeliver),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(()),
        }
    }
}

/// Record store collection names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub customers: String,
    pub notes: String,
    pub items: String,
    pub products: String,
    /// Secondary index on the items table keyed by `noteId`.
    pub items_note_index: Option<String>,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            customers: "Customers".to_string(),
            notes: "SalesNotes".to_string(),
            items: "SalesNoteItems".to_string(),
            products: "Products".to_string(),
            items_note_index: None,
        }
    }
}

/// Where rendered documents are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Bucket(String),
    Directory(PathBuf),
}

/// Poll loop timing and policy.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Long-poll wait per receive call.
    pub wait_time: Duration,
    /// Sleep after a poll that returned nothing.
    pub idle_backoff: Duration,
    /// Sleep after a receive or delete failure.
    pub error_backoff: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(10),
            idle_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            failure_policy: FailurePolicy::Discard,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub environment: String,
    pub region: String,
    pub queue_url: String,
    pub output: OutputTarget,
    pub api_public_url: String,
    pub http_port: u16,
    pub tables: TableNames,
    pub font_dir: Option<PathBuf>,
    pub poll: PollConfig,
    /// Upper bound on each record/object store call.
    pub call_timeout: Duration,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Loads configuration from the process environment, after reading
    /// `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let queue_url = var("SQS_QUEUE_URL").ok_or(ConfigError::Missing("SQS_QUEUE_URL"))?;

        let output = match (var("LOCAL_OUTPUT_DIR"), var("BUCKET_NAME")) {
            (Some(dir), _) => OutputTarget::Directory(PathBuf::from(dir)),
            (None, Some(bucket)) => OutputTarget::Bucket(bucket),
            (None, None) => return Err(ConfigError::Missing("BUCKET_NAME")),
        };

        let defaults = TableNames::default();
        let tables = TableNames {
            customers: or("TABLE_CUSTOMERS", &defaults.customers),
            notes: or("TABLE_NOTES", &defaults.notes),
            items: or("TABLE_ITEMS", &defaults.items),
            products: or("TABLE_PRODUCTS", &defaults.products),
            items_note_index: var("TABLE_ITEMS_NOTE_INDEX"),
        };

        let poll_defaults = PollConfig::default();
        let poll = PollConfig {
            wait_time: secs(&var, "WORKER_WAIT_TIME_SECS", poll_defaults.wait_time)?,
            idle_backoff: secs(&var, "WORKER_IDLE_BACKOFF_SECS", poll_defaults.idle_backoff)?,
            error_backoff: secs(&var, "WORKER_ERROR_BACKOFF_SECS", poll_defaults.error_backoff)?,
            failure_policy: parsed(&var, "WORKER_FAILURE_POLICY", poll_defaults.failure_policy)?,
        };

        Ok(Self {
            environment: or("APP_ENVIRONMENT", "local"),
            region: or("AWS_REGION", "us-east-1"),
            queue_url,
            output,
            api_public_url: or("API_PUBLIC_URL", "http://localhost:8002"),
            http_port: parsed(&var, "PORT", 8002)?,
            tables,
            font_dir: var("FONT_DIR").map(PathBuf::from),
            poll,
            call_timeout: secs(&var, "WORKER_CALL_TIMEOUT_SECS", Duration::from_secs(30))?,
            log_format: parsed(&var, "LOG_FORMAT", LogFormat::Pretty)?,
        })
    }
}

fn parsed<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn secs<V>(var: &V, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    parsed(var, name, default.as_secs()).map(Duration::from_secs)
}
