//! Notifications Worker Service
//!
//! Consumes sale note notifications from SQS, renders each note to PDF and
//! uploads it to S3 with send tags. A health endpoint is served alongside.
//!
//! ## Architecture
//!
//! - **Queue**: SQS long polling, one message in flight
//! - **Records**: DynamoDB tables for customers, notes, items and products
//! - **Renderer**: SVG layout converted by svg2pdf
//! - **Storage**: S3 bucket, or a local directory via `LOCAL_OUTPUT_DIR`
//!
//! See `config` for the full list of environment variables.

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use notifications_worker::{
    config::{OutputTarget, WorkerConfig},
    health,
    processor::MessageProcessor,
    publisher::{FsObjectStore, ObjectStore, Publisher, S3ObjectStore},
    queue::SqsQueue,
    renderer::SaleNoteRenderer,
    store::DynamoRecordStore,
    telemetry,
    worker::PollLoop,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = WorkerConfig::from_env().context("Failed to load configuration")?;

    telemetry::init_logging(config.log_format);

    info!("Starting notifications worker");
    info!(
        "Configuration: environment={}, region={}, queue_url={}, api_public_url={}",
        config.environment, config.region, config.queue_url, config.api_public_url
    );

    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .load()
        .await;

    let object_store: Arc<dyn ObjectStore> = match &config.output {
        OutputTarget::Bucket(bucket) => {
            info!("Publishing to bucket {}", bucket);
            Arc::new(S3ObjectStore::new(
                aws_sdk_s3::Client::new(&aws_config),
                bucket.clone(),
            ))
        }
        OutputTarget::Directory(dir) => {
            info!("Publishing to local directory {}", dir.display());
            Arc::new(FsObjectStore::new(dir.clone()))
        }
    };

    let store = Arc::new(DynamoRecordStore::new(
        aws_sdk_dynamodb::Client::new(&aws_config),
        config.tables.clone(),
    ));
    let queue = Arc::new(SqsQueue::new(
        aws_sdk_sqs::Client::new(&aws_config),
        config.queue_url.clone(),
    ));

    let renderer = Arc::new(SaleNoteRenderer::with_font_dir(config.font_dir.as_deref()));
    let processor = MessageProcessor::new(
        store,
        renderer,
        Publisher::new(object_store),
        config.call_timeout,
    );
    let poll_loop = PollLoop::new(queue, processor, config.poll.clone());

    let shutdown = CancellationToken::new();

    let worker = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { poll_loop.run(shutdown).await }
    });

    let server = tokio::spawn(health::serve(config.http_port, shutdown.clone()));

    // Wait for shutdown signal
    info!("Worker service ready, press Ctrl+C to shutdown");
    signal::ctrl_c().await.context("Failed to listen for Ctrl+C")?;

    info!("Received shutdown signal, waiting for in-flight message...");
    shutdown.cancel();

    if let Err(e) = worker.await {
        error!("Worker task failed: {}", e);
    }
    match server.await {
        Ok(Err(e)) => error!("Health server failed: {}", e),
        Err(e) => error!("Health server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    info!("Worker service shutdown complete");
    Ok(())
}
