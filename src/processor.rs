//! Per-message pipeline: parse, fetch, render, publish.

use crate::error::{ProcessError, RecordKind, Result};
use crate::model::{parse_note_id, RenderedDocument};
use crate::publisher::Publisher;
use crate::renderer::{SaleNoteLayout, SaleNoteRenderer};
use crate::store::RecordStore;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Successful result of processing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A document was written under `key`.
    Published { key: String },
    /// The payload carried no note id; nothing was fetched.
    Skipped,
}

/// Turns one queue message body into a published sale note PDF.
pub struct MessageProcessor {
    store: Arc<dyn RecordStore>,
    renderer: Arc<SaleNoteRenderer>,
    publisher: Publisher,
    call_timeout: Duration,
}

impl MessageProcessor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        renderer: Arc<SaleNoteRenderer>,
        publisher: Publisher,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            renderer,
            publisher,
            call_timeout,
        }
    }

    /// Processes a raw message body.
    ///
    /// The steps are:
    /// 1. Extract `noteId`, unwrapping a fan-out envelope if present
    /// 2. Load the note, its customer and its line items
    /// 3. Resolve each item's product, tolerating missing ones
    /// 4. Render the PDF and publish it with a fresh tag set
    ///
    /// Each store call is bounded by the configured timeout.
    pub async fn process(&self, body: &str) -> Result<ProcessOutcome> {
        let Some(note_id) = parse_note_id(body)? else {
            warn!("No noteId found in message");
            return Ok(ProcessOutcome::Skipped);
        };

        info!(note_id = %note_id, "Processing note");

        let note = self
            .bounded("note lookup", self.store.note(&note_id))
            .await?
            .ok_or_else(|| ProcessError::NotFound {
                kind: RecordKind::Note,
                id: note_id.clone(),
            })?;

        let customer = self
            .bounded("customer lookup", self.store.customer(&note.customer_id))
            .await?
            .ok_or_else(|| ProcessError::NotFound {
                kind: RecordKind::Customer,
                id: note.customer_id.clone(),
            })?;

        let items = self
            .bounded("line item lookup", self.store.line_items(&note.id))
            .await?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .bounded("product lookup", self.store.product(&item.product_id))
                .await?;
            if product.is_none() {
                warn!(
                    note_id = %note.id,
                    product_id = %item.product_id,
                    "Product not found, using placeholder name"
                );
            }
            lines.push((item, product));
        }

        let layout = SaleNoteLayout::new(&note, &customer, &lines);
        let renderer = Arc::clone(&self.renderer);
        let bytes = tokio::task::spawn_blocking(move || renderer.render(&layout))
            .await
            .map_err(|e| ProcessError::Render(format!("render task failed: {}", e)))??;

        let document = RenderedDocument::new(&customer, &note, bytes, Utc::now());
        let key = self
            .bounded("document upload", self.publisher.publish(document))
            .await?;

        Ok(ProcessOutcome::Published { key })
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| ProcessError::Timeout { operation })?
    }
}
