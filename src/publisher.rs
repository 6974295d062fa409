//! Object storage for rendered documents.

use crate::error::{sdk_severity, ProcessError, Result};
use crate::model::{RenderedDocument, TagSet, PDF_CONTENT_TYPE};
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Tag, Tagging};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Write-only object storage with tag support.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes the object, replacing whatever was stored under `key`.
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Replaces the tag set of an existing object.
    async fn put_tags(&self, key: &str, tags: &TagSet) -> Result<()>;
}

/// S3 bucket storage.
pub struct S3ObjectStore {
    client: s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                ProcessError::object_store_with(sdk_severity(&e), e.into_service_error())
            })?;

        debug!(bucket = %self.bucket, key, "Wrote object");
        Ok(())
    }

    async fn put_tags(&self, key: &str, tags: &TagSet) -> Result<()> {
        let tag_set = tags
            .pairs()
            .into_iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ProcessError::object_store)?;

        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(ProcessError::object_store)?;

        self.client
            .put_object_tagging()
            .bucket(&self.bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| {
                ProcessError::object_store_with(sdk_severity(&e), e.into_service_error())
            })?;

        debug!(bucket = %self.bucket, key, "Wrote object tags");
        Ok(())
    }
}

/// Local directory storage for development. Tags go to a
/// `<key>.tags.json` sidecar next to the object.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn tags_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.tags.json", key))
    }

    async fn write(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(ProcessError::object_store)?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(ProcessError::object_store)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        Self::write(&self.object_path(key), &bytes).await
    }

    async fn put_tags(&self, key: &str, tags: &TagSet) -> Result<()> {
        let map: BTreeMap<&str, String> = tags.pairs().into_iter().collect();
        let json = serde_json::to_vec_pretty(&map).map_err(ProcessError::object_store)?;
        Self::write(&self.tags_path(key), &json).await
    }
}

/// Publishes rendered documents: object first, then its tags.
///
/// The two writes are not atomic. If the tag write fails the object stays
/// in place untagged and the error is returned.
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn publish(&self, document: RenderedDocument) -> Result<String> {
        let RenderedDocument { key, bytes, tags } = document;
        let size = bytes.len();

        self.store.put_object(&key, bytes, PDF_CONTENT_TYPE).await?;
        self.store.put_tags(&key, &tags).await?;

        info!(key = %key, bytes = size, "Published document");
        Ok(key)
    }
}
