//! Record store access: notes, customers, line items and products.

use crate::config::TableNames;
use crate::error::{sdk_severity, ProcessError, RecordKind, Result};
use crate::model::{Customer, LineItem, Note, Product};
use async_trait::async_trait;
use aws_sdk_dynamodb as dynamodb;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use tracing::debug;

type Item = HashMap<String, AttributeValue>;

const KEY_ATTRIBUTE: &str = "ID";

/// Read-only view of the system of record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn note(&self, id: &str) -> Result<Option<Note>>;

    async fn customer(&self, id: &str) -> Result<Option<Customer>>;

    /// All line items belonging to a note, in store order.
    async fn line_items(&self, note_id: &str) -> Result<Vec<LineItem>>;

    async fn product(&self, id: &str) -> Result<Option<Product>>;
}

/// DynamoDB-backed record store.
///
/// Line items are looked up through `items_note_index` when configured,
/// otherwise through a filtered scan of the whole items table.
pub struct DynamoRecordStore {
    client: dynamodb::Client,
    tables: TableNames,
    page_limit: Option<i32>,
}

impl DynamoRecordStore {
    pub fn new(client: dynamodb::Client, tables: TableNames) -> Self {
        Self {
            client,
            tables,
            page_limit: None,
        }
    }

    /// Caps the items evaluated per Scan or Query page.
    pub fn with_page_limit(mut self, limit: i32) -> Self {
        self.page_limit = Some(limit);
        self
    }

    async fn get_item(&self, table: &str, id: &str) -> Result<Option<Item>> {
        let output = self
            .client
            .get_item()
            .table_name(table)
            .key(KEY_ATTRIBUTE, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| {
                ProcessError::record_store_with(sdk_severity(&e), e.into_service_error())
            })?;

        Ok(output.item)
    }

    async fn query_items(&self, index: &str, note_id: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key = None;
        let mut pages = 0usize;

        loop {
            let output = self
                .client
                .query()
                .table_name(&self.tables.items)
                .index_name(index)
                .key_condition_expression("noteId = :note_id")
                .expression_attribute_values(":note_id", AttributeValue::S(note_id.to_string()))
                .set_exclusive_start_key(start_key)
                .set_limit(self.page_limit)
                .send()
                .await
                .map_err(|e| {
                    ProcessError::record_store_with(sdk_severity(&e), e.into_service_error())
                })?;

            pages += 1;
            items.extend(output.items.unwrap_or_default());
            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }

        debug!(note_id, index, pages, "Queried line items index");
        Ok(items)
    }

    async fn scan_items(&self, note_id: &str) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key = None;
        let mut pages = 0usize;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.tables.items)
                .filter_expression("noteId = :note_id")
                .expression_attribute_values(":note_id", AttributeValue::S(note_id.to_string()))
                .set_exclusive_start_key(start_key)
                .set_limit(self.page_limit)
                .send()
                .await
                .map_err(|e| {
                    ProcessError::record_store_with(sdk_severity(&e), e.into_service_error())
                })?;

            pages += 1;
            items.extend(output.items.unwrap_or_default());
            start_key = output.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }

        debug!(note_id, pages, "Scanned line items table");
        Ok(items)
    }
}

#[async_trait]
impl RecordStore for DynamoRecordStore {
    async fn note(&self, id: &str) -> Result<Option<Note>> {
        self.get_item(&self.tables.notes, id)
            .await?
            .map(|item| note_from_item(id, &item))
            .transpose()
    }

    async fn customer(&self, id: &str) -> Result<Option<Customer>> {
        self.get_item(&self.tables.customers, id)
            .await?
            .map(|item| customer_from_item(id, &item))
            .transpose()
    }

    async fn line_items(&self, note_id: &str) -> Result<Vec<LineItem>> {
        let items = match &self.tables.items_note_index {
            Some(index) => self.query_items(index, note_id).await?,
            None => self.scan_items(note_id).await?,
        };

        items
            .iter()
            .map(|item| line_item_from_item(note_id, item))
            .collect()
    }

    async fn product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self
            .get_item(&self.tables.products, id)
            .await?
            .map(|item| product_from_item(id, &item)))
    }
}

/// Reads a text attribute. Numbers keep their stored decimal text.
fn text(item: &Item, name: &str) -> Option<String> {
    match item.get(name)? {
        AttributeValue::S(s) => Some(s.clone()),
        AttributeValue::N(n) => Some(n.clone()),
        _ => None,
    }
}

fn required(item: &Item, record: RecordKind, field: &'static str) -> Result<String> {
    text(item, field).ok_or(ProcessError::MissingField { record, field })
}

fn note_from_item(id: &str, item: &Item) -> Result<Note> {
    Ok(Note {
        id: text(item, KEY_ATTRIBUTE).unwrap_or_else(|| id.to_string()),
        folio: required(item, RecordKind::Note, "folio")?,
        customer_id: required(item, RecordKind::Note, "clienteId")?,
    })
}

fn customer_from_item(id: &str, item: &Item) -> Result<Customer> {
    Ok(Customer {
        id: text(item, KEY_ATTRIBUTE).unwrap_or_else(|| id.to_string()),
        tax_id: text(item, "rfc"),
        display_name: required(item, RecordKind::Customer, "razonSocial")?,
    })
}

fn line_item_from_item(note_id: &str, item: &Item) -> Result<LineItem> {
    Ok(LineItem {
        id: text(item, KEY_ATTRIBUTE).unwrap_or_default(),
        note_id: text(item, "noteId").unwrap_or_else(|| note_id.to_string()),
        product_id: required(item, RecordKind::LineItem, "productoId")?,
        quantity: required(item, RecordKind::LineItem, "cantidad")?,
        amount: required(item, RecordKind::LineItem, "importe")?,
    })
}

fn product_from_item(id: &str, item: &Item) -> Product {
    Product {
        id: text(item, KEY_ATTRIBUTE).unwrap_or_else(|| id.to_string()),
        display_name: text(item, "nombre"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.to_string())
    }

    fn n(v: &str) -> AttributeValue {
        AttributeValue::N(v.to_string())
    }

    #[test]
    fn test_decode_note() {
        let raw = item(&[("ID", s("N1")), ("folio", s("F-100")), ("clienteId", s("C1"))]);
        let note = note_from_item("N1", &raw).unwrap();

        assert_eq!(note.folio, "F-100");
        assert_eq!(note.customer_id, "C1");
    }

    #[test]
    fn test_decode_note_missing_folio() {
        let raw = item(&[("ID", s("N1")), ("clienteId", s("C1"))]);
        let err = note_from_item("N1", &raw).unwrap_err();

        assert!(matches!(
            err,
            ProcessError::MissingField {
                record: RecordKind::Note,
                field: "folio"
            }
        ));
    }

    #[test]
    fn test_decode_customer_without_rfc() {
        let raw = item(&[("ID", s("C1")), ("razonSocial", s("Acme Corp"))]);
        let customer = customer_from_item("C1", &raw).unwrap();

        assert_eq!(customer.display_name, "Acme Corp");
        assert_eq!(customer.tax_id, None);
    }

    #[test]
    fn test_decode_line_item_keeps_number_text() {
        let raw = item(&[
            ("ID", s("I1")),
            ("noteId", s("N1")),
            ("productoId", s("P1")),
            ("cantidad", n("2")),
            ("importe", n("50")),
        ]);
        let line = line_item_from_item("N1", &raw).unwrap();

        assert_eq!(line.quantity, "2");
        assert_eq!(line.amount, "50");
        assert_eq!(line.product_id, "P1");
    }

    #[test]
    fn test_decode_product_without_name() {
        let raw = item(&[("ID", s("P1"))]);
        let product = product_from_item("P1", &raw);

        assert_eq!(product.display_name, None);
    }

    // Note: The tests below require DynamoDB or LocalStack.
    // Run with: AWS_ENDPOINT_URL=http://localhost:4566 cargo test --lib -- --ignored store::tests

    mod live {
        use super::*;
        use aws_sdk_dynamodb::types::{
            AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType,
            Projection, ProjectionType, ScalarAttributeType,
        };

        const NOTE_INDEX: &str = "noteId-index";

        async fn client() -> dynamodb::Client {
            let config = aws_config::load_from_env().await;
            dynamodb::Client::new(&config)
        }

        fn key(name: &str) -> KeySchemaElement {
            KeySchemaElement::builder()
                .attribute_name(name)
                .key_type(KeyType::Hash)
                .build()
                .unwrap()
        }

        fn string_attribute(name: &str) -> AttributeDefinition {
            AttributeDefinition::builder()
                .attribute_name(name)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .unwrap()
        }

        /// Creates an items table with a `noteId` index and seeds `count`
        /// items for `note_id` plus a few for another note.
        async fn seed_items_table(
            client: &dynamodb::Client,
            note_id: &str,
            count: usize,
        ) -> String {
            let table = format!("SalesNoteItems-{}", uuid::Uuid::new_v4());
            client
                .create_table()
                .table_name(&table)
                .attribute_definitions(string_attribute("ID"))
                .attribute_definitions(string_attribute("noteId"))
                .key_schema(key("ID"))
                .global_secondary_indexes(
                    GlobalSecondaryIndex::builder()
                        .index_name(NOTE_INDEX)
                        .key_schema(key("noteId"))
                        .projection(
                            Projection::builder()
                                .projection_type(ProjectionType::All)
                                .build(),
                        )
                        .build()
                        .unwrap(),
                )
                .billing_mode(BillingMode::PayPerRequest)
                .send()
                .await
                .unwrap();

            let owners = std::iter::repeat(note_id)
                .take(count)
                .chain(std::iter::repeat("N-other").take(3));
            for (i, owner) in owners.enumerate() {
                client
                    .put_item()
                    .table_name(&table)
                    .item("ID", s(&format!("I{}", i)))
                    .item("noteId", s(owner))
                    .item("productoId", s("P1"))
                    .item("cantidad", n("1"))
                    .item("importe", n("10"))
                    .send()
                    .await
                    .unwrap();
            }

            table
        }

        fn tables(items: &str, index: Option<&str>) -> TableNames {
            TableNames {
                items: items.to_string(),
                items_note_index: index.map(str::to_string),
                ..TableNames::default()
            }
        }

        #[tokio::test]
        #[ignore]
        async fn test_scan_follows_pagination() {
            let client = client().await;
            let table = seed_items_table(&client, "N-scan", 5).await;

            let store =
                DynamoRecordStore::new(client.clone(), tables(&table, None)).with_page_limit(2);
            let items = store.line_items("N-scan").await.unwrap();

            assert_eq!(items.len(), 5);
            assert!(items.iter().all(|item| item.note_id == "N-scan"));

            client.delete_table().table_name(&table).send().await.unwrap();
        }

        #[tokio::test]
        #[ignore]
        async fn test_index_query_follows_pagination() {
            let client = client().await;
            let table = seed_items_table(&client, "N-query", 5).await;

            let store = DynamoRecordStore::new(client.clone(), tables(&table, Some(NOTE_INDEX)))
                .with_page_limit(2);
            let items = store.line_items("N-query").await.unwrap();

            assert_eq!(items.len(), 5);
            assert!(items.iter().all(|item| item.note_id == "N-query"));

            client.delete_table().table_name(&table).send().await.unwrap();
        }

        #[tokio::test]
        #[ignore]
        async fn test_missing_table_is_fatal() {
            let store = DynamoRecordStore::new(client().await, tables("NoSuchTable-x", None));
            let err = store.line_items("N1").await.unwrap_err();

            assert_eq!(err.severity(), crate::error::Severity::Fatal);
        }
    }
}
