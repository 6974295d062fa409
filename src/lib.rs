//! Notifications Worker Library
//!
//! This library provides the core functionality for the sale note worker.
//! It consumes note notifications from a queue, loads the note's records,
//! renders a PDF and stores it with descriptive tags.
//!
//! ## Module Overview
//!
//! - `config`: Environment configuration
//! - `error`: Processing error taxonomy and severity
//! - `health`: HTTP health endpoint
//! - `model`: Records, payload parsing and rendered documents
//! - `processor`: Per-message fetch, render and publish pipeline
//! - `publisher`: S3 and local directory object stores
//! - `queue`: SQS queue operations
//! - `renderer`: Sale note layout and SVG to PDF conversion
//! - `store`: DynamoDB record store
//! - `telemetry`: Structured logging
//! - `worker`: Sequential poll loop
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use notifications_worker::{
//!     model::{Customer, LineItem, Note, Product},
//!     renderer::{SaleNoteLayout, SaleNoteRenderer},
//! };
//!
//! let note = Note {
//!     id: "N1".to_string(),
//!     folio: "F-100".to_string(),
//!     customer_id: "C1".to_string(),
//! };
//! let customer = Customer {
//!     id: "C1".to_string(),
//!     tax_id: Some("ACM010101AAA".to_string()),
//!     display_name: "Acme Corp".to_string(),
//! };
//! let item = LineItem {
//!     id: "I1".to_string(),
//!     note_id: "N1".to_string(),
//!     product_id: "P1".to_string(),
//!     quantity: "2".to_string(),
//!     amount: "50".to_string(),
//! };
//! let product = Product {
//!     id: "P1".to_string(),
//!     display_name: Some("Widget".to_string()),
//! };
//!
//! let layout = SaleNoteLayout::new(&note, &customer, &[(item, Some(product))]);
//! let pdf = SaleNoteRenderer::new().render(&layout).unwrap();
//! assert!(!pdf.is_empty());
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod processor;
pub mod publisher;
pub mod queue;
pub mod renderer;
pub mod store;
pub mod telemetry;
pub mod worker;
